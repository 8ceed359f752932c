//! [`SqliteStore`]: the SQLite implementation of [`LocalStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tally_core::{
  score::{PendingWrite, ScoreKey, ScoreRecord, ScoreWrite},
  store::LocalStore,
};

use crate::{
  Error, Result,
  encode::{
    PENDING_COLUMNS, RawPending, RawScore, SCORE_COLUMNS, decode_dt, encode_dt, placeholders,
  },
  schema::LOCAL_SCHEMA,
};

const LAST_SYNC_KEY: &str = "last_sync";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A tally local store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. After
/// [`close`](Self::close) every clone fails with an unavailable error.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let conn = tokio_rusqlite::Connection::open(&path)
      .await
      .map_err(|e| Error::Unavailable(format!("{}: {e}", path.display())))?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(|e| Error::Unavailable(e.to_string()))?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Close the underlying connection.
  pub async fn close(&self) -> Result<()> {
    self.conn.clone().close().await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(LOCAL_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers (run on the connection thread) ──────────────────────────────

/// Delete whatever row holds the record's key, then insert the record.
fn replace_score(conn: &rusqlite::Connection, row: &RawScore) -> rusqlite::Result<()> {
  conn.execute(
    "DELETE FROM scores WHERE subject_id = ?1 AND dimension = ?2",
    rusqlite::params![row.subject_id, row.dimension],
  )?;
  conn.execute(
    "INSERT INTO scores (id, subject_id, dimension, value, recorded_by, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    rusqlite::params![
      row.id,
      row.subject_id,
      row.dimension,
      row.value,
      row.recorded_by,
      row.recorded_at,
    ],
  )?;
  Ok(())
}

/// Delete any intent for the write's key, insert a fresh one, return its seq.
fn replace_pending(
  conn:       &rusqlite::Connection,
  write:      &ScoreWrite,
  created_at: &str,
) -> rusqlite::Result<i64> {
  conn.execute(
    "DELETE FROM pending_writes WHERE subject_id = ?1 AND dimension = ?2",
    rusqlite::params![write.subject_id, write.dimension],
  )?;
  conn.execute(
    "INSERT INTO pending_writes (subject_id, dimension, value, recorded_by, created_at, attempts)
     VALUES (?1, ?2, ?3, ?4, ?5, 0)",
    rusqlite::params![
      write.subject_id,
      write.dimension,
      write.value,
      write.recorded_by,
      created_at,
    ],
  )?;
  Ok(conn.last_insert_rowid())
}

fn pending_seqs_for(
  conn:       &rusqlite::Connection,
  subject_id: &str,
  dimension:  u8,
) -> rusqlite::Result<Vec<i64>> {
  let mut stmt =
    conn.prepare("SELECT seq FROM pending_writes WHERE subject_id = ?1 AND dimension = ?2")?;
  let seqs = stmt
    .query_map(rusqlite::params![subject_id, dimension], |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<i64>>>()?;
  Ok(seqs)
}

fn fresh_pending(seq: i64, write: ScoreWrite, created_at: DateTime<Utc>) -> PendingWrite {
  PendingWrite {
    seq,
    subject_id: write.subject_id,
    dimension: write.dimension,
    value: write.value,
    recorded_by: write.recorded_by,
    created_at,
    attempts: 0,
    last_error: None,
  }
}

// ─── LocalStore impl ─────────────────────────────────────────────────────────

impl LocalStore for SqliteStore {
  type Error = Error;

  // ── Scores ────────────────────────────────────────────────────────────────

  async fn upsert_score(&self, record: ScoreRecord) -> Result<()> {
    let row = RawScore::from_record(&record);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        replace_score(&tx, &row)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn scores_for(&self, subject_ids: &[String]) -> Result<Vec<ScoreRecord>> {
    if subject_ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids = subject_ids.to_vec();

    let raws: Vec<RawScore> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {SCORE_COLUMNS} FROM scores WHERE subject_id IN ({})",
          placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(ids.iter()), RawScore::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScore::into_record).collect()
  }

  async fn score_for(&self, key: &ScoreKey) -> Result<Option<ScoreRecord>> {
    let key = key.clone();

    let raw: Option<RawScore> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {SCORE_COLUMNS} FROM scores WHERE subject_id = ?1 AND dimension = ?2"
              ),
              rusqlite::params![key.subject_id, key.dimension],
              RawScore::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawScore::into_record).transpose()
  }

  // ── Pending queue ─────────────────────────────────────────────────────────

  async fn enqueue(&self, write: ScoreWrite, created_at: DateTime<Utc>) -> Result<PendingWrite> {
    let at_str = encode_dt(created_at);
    let bound = write.clone();

    let seq = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let seq = replace_pending(&tx, &bound, &at_str)?;
        tx.commit()?;
        Ok(seq)
      })
      .await?;

    Ok(fresh_pending(seq, write, created_at))
  }

  async fn count_pending(&self) -> Result<usize> {
    let count: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM pending_writes", [], |r| r.get(0))?))
      .await?;
    Ok(count as usize)
  }

  async fn all_pending(&self) -> Result<Vec<PendingWrite>> {
    let raws: Vec<RawPending> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {PENDING_COLUMNS} FROM pending_writes ORDER BY seq"))?;
        let rows = stmt
          .query_map([], RawPending::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPending::into_pending).collect()
  }

  async fn has_pending(&self, key: &ScoreKey) -> Result<bool> {
    let key = key.clone();

    let found = self
      .conn
      .call(move |conn| {
        Ok(!pending_seqs_for(conn, &key.subject_id, key.dimension)?.is_empty())
      })
      .await?;
    Ok(found)
  }

  async fn remove_pending(&self, seq: i64) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM pending_writes WHERE seq = ?1", [seq])?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn mark_pending_failed(&self, seq: i64, error: &str) -> Result<()> {
    self.mark_failed(&[seq], error).await?;
    Ok(())
  }

  // ── Composite operations ──────────────────────────────────────────────────

  async fn stage_write(&self, record: ScoreRecord, write: ScoreWrite) -> Result<PendingWrite> {
    let row = RawScore::from_record(&record);
    let created_at = record.recorded_at;
    let at_str = row.recorded_at.clone();
    let bound = write.clone();

    let seq = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        replace_score(&tx, &row)?;
        let seq = replace_pending(&tx, &bound, &at_str)?;
        tx.commit()?;
        Ok(seq)
      })
      .await?;

    Ok(fresh_pending(seq, write, created_at))
  }

  async fn apply_confirmed(&self, confirmed: Vec<ScoreRecord>, attempted: &[i64]) -> Result<usize> {
    let rows: Vec<RawScore> = confirmed.iter().map(RawScore::from_record).collect();
    let attempted = attempted.to_vec();

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = 0;
        for row in &rows {
          let queued = pending_seqs_for(&tx, &row.subject_id, row.dimension)?;
          let superseded = queued.iter().any(|seq| !attempted.contains(seq));
          for seq in queued.iter().filter(|seq| attempted.contains(seq)) {
            removed += tx.execute("DELETE FROM pending_writes WHERE seq = ?1", [seq])?;
          }
          // A write queued after this drain started keeps its optimistic row.
          if !superseded {
            replace_score(&tx, row)?;
          }
        }
        tx.commit()?;
        Ok(removed)
      })
      .await?;
    Ok(removed)
  }

  async fn mark_failed(&self, attempted: &[i64], error: &str) -> Result<usize> {
    let attempted = attempted.to_vec();
    let error = error.to_owned();

    let touched = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut touched = 0;
        for seq in &attempted {
          touched += tx.execute(
            "UPDATE pending_writes SET attempts = attempts + 1, last_error = ?2 WHERE seq = ?1",
            rusqlite::params![seq, error],
          )?;
        }
        tx.commit()?;
        Ok(touched)
      })
      .await?;
    Ok(touched)
  }

  async fn cache_remote(&self, records: Vec<ScoreRecord>) -> Result<usize> {
    if records.is_empty() {
      return Ok(0);
    }
    let rows: Vec<RawScore> = records.iter().map(RawScore::from_record).collect();

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        for row in &rows {
          if !pending_seqs_for(&tx, &row.subject_id, row.dimension)?.is_empty() {
            continue;
          }
          replace_score(&tx, row)?;
          written += 1;
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;
    Ok(written)
  }

  // ── Sync status ───────────────────────────────────────────────────────────

  async fn record_sync(&self, at: DateTime<Utc>) -> Result<()> {
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sync_status (key, value) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value",
          rusqlite::params![LAST_SYNC_KEY, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM sync_status WHERE key = ?1",
              [LAST_SYNC_KEY],
              |r| r.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    raw.as_deref().map(decode_dt).transpose()
  }

  async fn clear(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM scores", [])?;
        tx.execute("DELETE FROM pending_writes", [])?;
        tx.execute("DELETE FROM sync_status", [])?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
