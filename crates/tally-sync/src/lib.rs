//! Offline-first score synchronisation for tally.
//!
//! - [`SyncEngine`] turns a score write into a durable local write plus a
//!   queued intent, drains the queue against the remote service, and serves
//!   the merged local/remote view.
//! - [`SyncSignals`] publishes pending count, offline state, drain progress
//!   and the last drain error as `tokio::sync::watch` channels.
//! - [`Scheduler`] tracks connectivity and drives debounced automatic drains.
//!
//! The engine is generic over [`LocalStore`](tally_core::store::LocalStore)
//! and [`RemoteScores`](tally_core::remote::RemoteScores); it owns no global
//! state, so every test and every signed-in session gets its own instance.

#![allow(async_fn_in_trait)]

pub mod engine;
pub mod error;
pub mod monitor;
pub mod signals;

pub use engine::{MergedScores, SyncEngine};
pub use error::{Error, Result};
pub use monitor::{Probe, Scheduler, SchedulerConfig, SchedulerHandle, SyncStatus};
pub use signals::{Subscription, SyncSignals};

#[cfg(test)]
mod tests;
