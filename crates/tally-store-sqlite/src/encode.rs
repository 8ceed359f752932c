//! Encoding and decoding helpers between domain types and the plain values
//! stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings (nanosecond
//! precision, `Z` suffix) so that lexical order matches time order.

use chrono::{DateTime, SecondsFormat, Utc};
use tally_core::score::{PendingWrite, ScoreRecord};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawScore::from_row`].
pub const SCORE_COLUMNS: &str = "id, subject_id, dimension, value, recorded_by, recorded_at";

/// A `scores` row, either read back or ready to bind.
#[derive(Debug, Clone)]
pub struct RawScore {
  pub id:          String,
  pub subject_id:  String,
  pub dimension:   u8,
  pub value:       f64,
  pub recorded_by: Option<String>,
  pub recorded_at: String,
}

impl RawScore {
  pub fn from_record(r: &ScoreRecord) -> Self {
    Self {
      id:          r.id.clone(),
      subject_id:  r.subject_id.clone(),
      dimension:   r.dimension,
      value:       r.value,
      recorded_by: r.recorded_by.clone(),
      recorded_at: encode_dt(r.recorded_at),
    }
  }

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      subject_id:  row.get(1)?,
      dimension:   row.get(2)?,
      value:       row.get(3)?,
      recorded_by: row.get(4)?,
      recorded_at: row.get(5)?,
    })
  }

  pub fn into_record(self) -> Result<ScoreRecord> {
    Ok(ScoreRecord {
      recorded_at: decode_dt(&self.recorded_at)?,
      id:          self.id,
      subject_id:  self.subject_id,
      dimension:   self.dimension,
      value:       self.value,
      recorded_by: self.recorded_by,
    })
  }
}

/// Column list matching [`RawPending::from_row`].
pub const PENDING_COLUMNS: &str =
  "seq, subject_id, dimension, value, recorded_by, created_at, attempts, last_error";

/// Raw values read directly from a `pending_writes` row.
pub struct RawPending {
  pub seq:         i64,
  pub subject_id:  String,
  pub dimension:   u8,
  pub value:       f64,
  pub recorded_by: Option<String>,
  pub created_at:  String,
  pub attempts:    u32,
  pub last_error:  Option<String>,
}

impl RawPending {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      seq:         row.get(0)?,
      subject_id:  row.get(1)?,
      dimension:   row.get(2)?,
      value:       row.get(3)?,
      recorded_by: row.get(4)?,
      created_at:  row.get(5)?,
      attempts:    row.get(6)?,
      last_error:  row.get(7)?,
    })
  }

  pub fn into_pending(self) -> Result<PendingWrite> {
    Ok(PendingWrite {
      seq:         self.seq,
      subject_id:  self.subject_id,
      dimension:   self.dimension,
      value:       self.value,
      recorded_by: self.recorded_by,
      created_at:  decode_dt(&self.created_at)?,
      attempts:    self.attempts,
      last_error:  self.last_error,
    })
  }
}

/// `?1, ?2, …, ?n` for an `IN (…)` clause.
pub fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}
