//! Core types and trait definitions for tally, the offline-first score store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Storage backends implement [`store::LocalStore`], remote transports
//! implement [`remote::RemoteScores`], and the sync engine is written against
//! those two traits only.

#![allow(async_fn_in_trait)]

pub mod error;
pub mod merge;
pub mod remote;
pub mod score;
pub mod station;
pub mod store;

pub use error::{Error, Result};
pub use score::{DrainReport, PendingWrite, ScoreKey, ScoreRecord, ScoreWrite};
