//! Error type for `tally-sync`.

use tally_core::{remote::RemoteError, store::StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The local store cannot be opened or has been closed.
  #[error("local storage unavailable: {0}")]
  StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("local store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("network unreachable: {0}")]
  NetworkUnreachable(String),

  #[error("remote rejected request: {0}")]
  RemoteRejected(String),

  /// A batch write stopped part-way; the first `recorded` items are stored
  /// and queued, the rest are not.
  #[error("recorded {recorded} of {total} scores: {source}")]
  PartialBatchFailure {
    recorded: usize,
    total:    usize,
    #[source]
    source:   Box<Error>,
  },

  #[error("background task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

impl Error {
  /// Classify a store backend error.
  pub fn from_store<E: StorageError>(e: E) -> Self {
    if e.is_unavailable() {
      Error::StorageUnavailable(Box::new(e))
    } else {
      Error::Store(Box::new(e))
    }
  }

  pub fn is_storage_unavailable(&self) -> bool {
    match self {
      Error::StorageUnavailable(_) => true,
      Error::PartialBatchFailure { source, .. } => source.is_storage_unavailable(),
      _ => false,
    }
  }
}

impl From<RemoteError> for Error {
  fn from(e: RemoteError) -> Self {
    match e {
      RemoteError::Unreachable(m) => Error::NetworkUnreachable(m),
      RemoteError::Rejected(m) => Error::RemoteRejected(m),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
