//! [`SqliteBoard`]: an authoritative score board implementing
//! [`RemoteScores`].
//!
//! `(subject_id, dimension)` is the conflict key: an upsert for an existing
//! pair updates the row in place and keeps its id, so retries are harmless.

use std::path::Path;

use chrono::Utc;
use tally_core::{
  remote::{RemoteError, RemoteScores},
  score::{ScoreRecord, ScoreWrite},
};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawScore, SCORE_COLUMNS, encode_dt, placeholders},
  schema::BOARD_SCHEMA,
};

/// Authoritative score storage backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteBoard {
  conn: tokio_rusqlite::Connection,
}

impl SqliteBoard {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let conn = tokio_rusqlite::Connection::open(&path)
      .await
      .map_err(|e| Error::Unavailable(format!("{}: {e}", path.display())))?;
    let board = Self { conn };
    board.init_schema().await?;
    Ok(board)
  }

  /// Open an in-memory board, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(|e| Error::Unavailable(e.to_string()))?;
    let board = Self { conn };
    board.init_schema().await?;
    Ok(board)
  }

  /// Close the underlying connection. Later calls fail as unreachable.
  pub async fn close(&self) -> Result<()> {
    self.conn.clone().close().await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(BOARD_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn upsert(&self, writes: Vec<ScoreWrite>) -> Result<Vec<ScoreRecord>> {
    let at_str = encode_dt(Utc::now());

    let raws: Vec<RawScore> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut out = Vec::with_capacity(writes.len());
        {
          let mut stmt = tx.prepare(&format!(
            "INSERT INTO scores (id, subject_id, dimension, value, recorded_by, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(subject_id, dimension) DO UPDATE SET
               value       = excluded.value,
               recorded_by = excluded.recorded_by,
               recorded_at = excluded.recorded_at
             RETURNING {SCORE_COLUMNS}"
          ))?;
          for w in &writes {
            let id = Uuid::new_v4().hyphenated().to_string();
            let row = stmt.query_row(
              rusqlite::params![id, w.subject_id, w.dimension, w.value, w.recorded_by, at_str],
              RawScore::from_row,
            )?;
            out.push(row);
          }
        }
        tx.commit()?;
        Ok(out)
      })
      .await?;

    raws.into_iter().map(RawScore::into_record).collect()
  }

  async fn fetch(&self, subject_ids: &[String]) -> Result<Vec<ScoreRecord>> {
    if subject_ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids = subject_ids.to_vec();

    let raws: Vec<RawScore> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {SCORE_COLUMNS} FROM scores WHERE subject_id IN ({})
           ORDER BY subject_id, dimension",
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
}

/// Values the board refuses to store.
fn validate(writes: &[ScoreWrite]) -> Result<(), RemoteError> {
  match writes.iter().find(|w| !w.value.is_finite() || w.value < 0.0) {
    Some(w) => Err(RemoteError::Rejected(format!(
      "invalid value {} for {}",
      w.value,
      w.key()
    ))),
    None => Ok(()),
  }
}

fn unavailable(e: Error) -> RemoteError { RemoteError::Unreachable(format!("board storage: {e}")) }

impl RemoteScores for SqliteBoard {
  async fn upsert_scores(&self, writes: Vec<ScoreWrite>) -> Result<Vec<ScoreRecord>, RemoteError> {
    validate(&writes)?;
    if writes.is_empty() {
      return Ok(Vec::new());
    }
    self.upsert(writes).await.map_err(unavailable)
  }

  async fn fetch_scores(&self, subject_ids: &[String]) -> Result<Vec<ScoreRecord>, RemoteError> {
    self.fetch(subject_ids).await.map_err(unavailable)
  }
}
