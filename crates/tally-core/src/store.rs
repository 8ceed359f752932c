//! The `LocalStore` trait: durable on-device storage for scores, the
//! pending-write queue, and the sync status marker.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! The sync engine depends on this abstraction, not on any concrete backend.
//!
//! Every method is a single atomic unit against the backend. Methods that
//! touch more than one row (`upsert_score`, `enqueue`, `stage_write`,
//! `apply_confirmed`, `mark_failed`, `cache_remote`, `clear`) must not be
//! observable half-applied.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::score::{PendingWrite, ScoreKey, ScoreRecord, ScoreWrite};

/// Implemented by backend error types so callers can tell "storage is gone"
/// apart from ordinary failures.
pub trait StorageError: std::error::Error + Send + Sync + 'static {
  /// `true` when the medium cannot be opened or has been closed.
  fn is_unavailable(&self) -> bool;
}

/// Abstraction over a tally local store backend.
///
/// At most one [`ScoreRecord`] and at most one [`PendingWrite`] exist per
/// [`ScoreKey`] at any time.
pub trait LocalStore: Send + Sync {
  type Error: StorageError;

  // ── Scores ────────────────────────────────────────────────────────────

  /// Insert `record`, replacing any record with the same key. The id is not
  /// a merge key; the replacement may carry a different id.
  fn upsert_score(
    &self,
    record: ScoreRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// All stored records whose subject is in `subject_ids`, in no particular
  /// order.
  fn scores_for<'a>(
    &'a self,
    subject_ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<ScoreRecord>, Self::Error>> + Send + 'a;

  /// The stored record for one key, if any.
  fn score_for<'a>(
    &'a self,
    key: &'a ScoreKey,
  ) -> impl Future<Output = Result<Option<ScoreRecord>, Self::Error>> + Send + 'a;

  // ── Pending queue ─────────────────────────────────────────────────────

  /// Replace any intent for the write's key with a fresh one
  /// (`attempts = 0`) and return it.
  fn enqueue(
    &self,
    write: ScoreWrite,
    created_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<PendingWrite, Self::Error>> + Send + '_;

  fn count_pending(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Every queued intent in sequence order.
  fn all_pending(
    &self,
  ) -> impl Future<Output = Result<Vec<PendingWrite>, Self::Error>> + Send + '_;

  fn has_pending<'a>(
    &'a self,
    key: &'a ScoreKey,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Delete one intent. Returns `false` if it was already gone.
  fn remove_pending(&self, seq: i64) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Bump `attempts` and set `last_error` on one intent.
  fn mark_pending_failed<'a>(
    &'a self,
    seq: i64,
    error: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Composite operations ──────────────────────────────────────────────

  /// Upsert the optimistic `record` and enqueue `write` as one unit.
  fn stage_write(
    &self,
    record: ScoreRecord,
    write: ScoreWrite,
  ) -> impl Future<Output = Result<PendingWrite, Self::Error>> + Send + '_;

  /// Apply a successful drain.
  ///
  /// Each confirmed record replaces the stored record for its key, unless a
  /// newer intent (one not in `attempted`) is queued for that key. Every
  /// intent in `attempted` whose key was confirmed is deleted. Returns the
  /// number of intents deleted.
  fn apply_confirmed<'a>(
    &'a self,
    confirmed: Vec<ScoreRecord>,
    attempted: &'a [i64],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Bump `attempts` and set `last_error` on every intent in `attempted`
  /// that is still queued. Returns the number of intents touched.
  fn mark_failed<'a>(
    &'a self,
    attempted: &'a [i64],
    error: &'a str,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Cache a remote read, skipping every key with a queued intent. Returns
  /// the number of records written.
  fn cache_remote(
    &self,
    records: Vec<ScoreRecord>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Sync status ───────────────────────────────────────────────────────

  fn record_sync(
    &self,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn last_sync(
    &self,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;

  /// Clear scores, the pending queue, and the sync status marker.
  fn clear(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
