//! Error types for `tally-core`.
//!
//! Sync and transport failures live in `tally_sync::Error` and
//! [`RemoteError`](crate::remote::RemoteError); this enum covers parsing
//! domain values.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown station: {0}")]
  UnknownStation(u8),

  #[error("unrecognised station {0:?}; expected 1-4 or run, row, bike, ski")]
  InvalidStation(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
