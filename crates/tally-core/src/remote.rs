//! The `RemoteScores` trait: the authoritative score service as seen from a
//! device.
//!
//! Implemented by the HTTP client in `tally-cli` and by `SqliteBoard` in
//! `tally-store-sqlite`, which backs the reference service.

use std::future::Future;

use thiserror::Error;

use crate::score::{ScoreRecord, ScoreWrite};

/// Why a remote call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  /// The call did not complete (connect failure, timeout, 5xx).
  #[error("network unreachable: {0}")]
  Unreachable(String),

  /// The service answered but refused the request (e.g. validation).
  #[error("remote rejected request: {0}")]
  Rejected(String),
}

impl RemoteError {
  pub fn is_unreachable(&self) -> bool { matches!(self, RemoteError::Unreachable(_)) }

  pub fn message(&self) -> &str {
    match self {
      RemoteError::Unreachable(m) | RemoteError::Rejected(m) => m,
    }
  }
}

/// Abstraction over the remote scoring service.
///
/// `(subject_id, dimension)` is the service's conflict key: upserting the
/// same pair twice leaves the latest value, and a repeated call is safe.
pub trait RemoteScores: Send + Sync {
  /// Upsert a batch and return the confirmed records, each carrying the
  /// service's canonical id and `recorded_at`.
  fn upsert_scores(
    &self,
    writes: Vec<ScoreWrite>,
  ) -> impl Future<Output = Result<Vec<ScoreRecord>, RemoteError>> + Send + '_;

  /// Read every score belonging to any of `subject_ids`. No side effects.
  fn fetch_scores<'a>(
    &'a self,
    subject_ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<ScoreRecord>, RemoteError>> + Send + 'a;
}
