//! Score records, queued write intents, and drain results.
//!
//! A score is identified for every purpose that matters by its
//! [`ScoreKey`]: the `(subject_id, dimension)` pair. The `id` column is only
//! a label; it starts out synthetic and is swapped for the remote service's
//! canonical id once the write is confirmed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix marking an id as locally generated and not yet confirmed.
pub const LOCAL_ID_PREFIX: &str = "local-";

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The `(subject_id, dimension)` pair identifying one measurable slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScoreKey {
  pub subject_id: String,
  pub dimension:  u8,
}

impl ScoreKey {
  pub fn new(subject_id: impl Into<String>, dimension: u8) -> Self {
    Self { subject_id: subject_id.into(), dimension }
  }
}

impl fmt::Display for ScoreKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.subject_id, self.dimension)
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A score as held in the local cache or returned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
  /// Canonical remote id, or a synthetic `local-…` id while unconfirmed.
  pub id:          String,
  pub subject_id:  String,
  /// Which station (measurement slot) this score fills.
  pub dimension:   u8,
  pub value:       f64,
  pub recorded_by: Option<String>,
  pub recorded_at: DateTime<Utc>,
}

impl ScoreRecord {
  /// Build an optimistic record for a write that has not reached the remote
  /// service yet. The id is derived from the key and the write time.
  pub fn optimistic(write: &ScoreWrite, at: DateTime<Utc>) -> Self {
    Self {
      id:          local_id(&write.subject_id, write.dimension, at),
      subject_id:  write.subject_id.clone(),
      dimension:   write.dimension,
      value:       write.value,
      recorded_by: write.recorded_by.clone(),
      recorded_at: at,
    }
  }

  pub fn key(&self) -> ScoreKey {
    ScoreKey::new(self.subject_id.clone(), self.dimension)
  }

  /// `false` while the id is still a synthetic local one.
  pub fn is_confirmed(&self) -> bool { !self.id.starts_with(LOCAL_ID_PREFIX) }
}

/// `local-{subject}-{dimension}-{unix_millis}`.
pub fn local_id(subject_id: &str, dimension: u8, at: DateTime<Utc>) -> String {
  format!("{LOCAL_ID_PREFIX}{subject_id}-{dimension}-{}", at.timestamp_millis())
}

/// A caller's write request, and the payload sent to the remote upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWrite {
  pub subject_id:  String,
  pub dimension:   u8,
  pub value:       f64,
  #[serde(default)]
  pub recorded_by: Option<String>,
}

impl ScoreWrite {
  pub fn new(
    subject_id: impl Into<String>,
    dimension: u8,
    value: f64,
    recorded_by: Option<String>,
  ) -> Self {
    Self { subject_id: subject_id.into(), dimension, value, recorded_by }
  }

  pub fn key(&self) -> ScoreKey {
    ScoreKey::new(self.subject_id.clone(), self.dimension)
  }
}

// ─── Queue ───────────────────────────────────────────────────────────────────

/// A durable record of a write not yet confirmed by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
  /// Store-assigned sequence number; ordering only.
  pub seq:         i64,
  pub subject_id:  String,
  pub dimension:   u8,
  pub value:       f64,
  pub recorded_by: Option<String>,
  pub created_at:  DateTime<Utc>,
  /// Failed remote submissions so far.
  pub attempts:    u32,
  pub last_error:  Option<String>,
}

impl PendingWrite {
  pub fn key(&self) -> ScoreKey {
    ScoreKey::new(self.subject_id.clone(), self.dimension)
  }

  pub fn to_write(&self) -> ScoreWrite {
    ScoreWrite {
      subject_id:  self.subject_id.clone(),
      dimension:   self.dimension,
      value:       self.value,
      recorded_by: self.recorded_by.clone(),
    }
  }
}

// ─── Drain result ────────────────────────────────────────────────────────────

/// Outcome of one drain of the pending queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
  /// Intents confirmed and removed from the queue.
  pub synced: usize,
  /// Intents that were part of a failed attempt and stay queued.
  pub failed: usize,
  pub errors: Vec<String>,
}

impl DrainReport {
  pub fn is_clean(&self) -> bool { self.failed == 0 && self.errors.is_empty() }
}
