//! Error type for `tally-store-sqlite`.

use tally_core::store::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The database file could not be opened.
  #[error("storage unavailable: {0}")]
  Unavailable(String),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl StorageError for Error {
  fn is_unavailable(&self) -> bool {
    matches!(
      self,
      Error::Unavailable(_) | Error::Database(tokio_rusqlite::Error::ConnectionClosed)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
