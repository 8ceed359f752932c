//! SQLite backends for tally.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.
//!
//! - [`SqliteStore`] is the on-device [`LocalStore`](tally_core::store::LocalStore).
//! - [`SqliteBoard`] is an authoritative score board implementing
//!   [`RemoteScores`](tally_core::remote::RemoteScores); the reference
//!   service in `tally-api` serves it over HTTP.

mod board;
mod encode;
mod schema;
mod store;

pub mod error;

pub use board::SqliteBoard;
pub use error::{Error, Result};
pub use store::SqliteStore;
