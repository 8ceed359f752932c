//! Connectivity tracking and automatic drains.
//!
//! The [`Scheduler`] drains the queue:
//! - immediately when connectivity returns,
//! - `debounce` after the pending count changes while online,
//! - every `retry_interval` while online with intents still queued.
//!
//! Connectivity comes from [`Scheduler::set_online`], called by the host or
//! by a [`Probe`] task started with [`Scheduler::spawn_probe`].

use std::{future::Future, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tally_core::{DrainReport, remote::RemoteScores, store::LocalStore};
use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info};

use crate::{engine::SyncEngine, error::Result};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
  /// Quiet period after a pending-count change before draining.
  pub debounce_ms:       u64,
  /// Delay between drains while online with intents still queued.
  pub retry_interval_ms: u64,
  /// How often a [`Probe`] is polled.
  pub probe_interval_ms: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self { debounce_ms: 1000, retry_interval_ms: 1000, probe_interval_ms: 5000 }
  }
}

impl SchedulerConfig {
  pub fn debounce(&self) -> Duration { Duration::from_millis(self.debounce_ms) }

  pub fn retry_interval(&self) -> Duration { Duration::from_millis(self.retry_interval_ms) }

  pub fn probe_interval(&self) -> Duration { Duration::from_millis(self.probe_interval_ms) }
}

/// Reports whether the remote service is reachable right now.
pub trait Probe: Send + Sync + 'static {
  fn probe(&self) -> impl Future<Output = bool> + Send + '_;
}

/// A point-in-time view of the sync state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
  pub online:     bool,
  pub offline:    bool,
  pub syncing:    bool,
  pub pending:    usize,
  pub last_error: Option<String>,
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

pub struct Scheduler<S, R> {
  engine: Arc<SyncEngine<S, R>>,
  online: watch::Sender<bool>,
  config: SchedulerConfig,
}

impl<S, R> Scheduler<S, R>
where
  S: LocalStore + 'static,
  R: RemoteScores + 'static,
{
  pub fn new(engine: Arc<SyncEngine<S, R>>, config: SchedulerConfig, online: bool) -> Arc<Self> {
    Arc::new(Self { engine, online: watch::Sender::new(online), config })
  }

  pub fn engine(&self) -> &Arc<SyncEngine<S, R>> { &self.engine }

  pub fn config(&self) -> &SchedulerConfig { &self.config }

  /// Report a connectivity change. Going online triggers a drain.
  pub fn set_online(&self, online: bool) {
    let changed = self.online.send_if_modified(|current| {
      let changed = *current != online;
      *current = online;
      changed
    });
    if changed {
      info!(online, "connectivity changed");
    }
  }

  pub fn is_online(&self) -> bool { *self.online.borrow() }

  pub fn subscribe_online(&self) -> watch::Receiver<bool> { self.online.subscribe() }

  pub fn status(&self) -> SyncStatus {
    let signals = self.engine.signals();
    SyncStatus {
      online:     self.is_online(),
      offline:    signals.is_offline(),
      syncing:    signals.is_syncing(),
      pending:    signals.pending(),
      last_error: signals.last_error(),
    }
  }

  /// Drain now unless a drain is already running, in which case `None`.
  pub async fn sync_now(&self) -> Result<Option<DrainReport>> { self.engine.try_drain().await }

  /// Start the scheduling loop. Must be called from within a tokio runtime.
  pub fn spawn(self: &Arc<Self>) -> SchedulerHandle {
    // Subscribe before spawning so a change made before the task's first
    // poll still arrives as a transition.
    let online_rx = self.online.subscribe();
    let pending_rx = self.engine.subscribe_pending_count();
    let this = Arc::clone(self);
    SchedulerHandle { tasks: vec![tokio::spawn(this.run(online_rx, pending_rx))] }
  }

  /// Poll `probe` every `probe_interval` and feed the result to
  /// [`set_online`](Self::set_online).
  pub fn spawn_probe<P: Probe>(self: &Arc<Self>, probe: P) -> SchedulerHandle {
    let this = Arc::clone(self);
    let every = self.config.probe_interval();
    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let up = probe.probe().await;
        this.set_online(up);
      }
    });
    SchedulerHandle { tasks: vec![task] }
  }

  async fn run(
    self: Arc<Self>,
    mut online_rx: watch::Receiver<bool>,
    mut pending_rx: watch::Receiver<usize>,
  ) {
    let debounce = self.config.debounce();

    let mut deadline = (*online_rx.borrow() && *pending_rx.borrow_and_update() > 0)
      .then(|| Instant::now() + debounce);

    loop {
      tokio::select! {
        changed = online_rx.changed() => {
          if changed.is_err() {
            break;
          }
          let online = *online_rx.borrow_and_update();
          deadline = if online {
            self.auto_drain("reconnected").await;
            self.retry_deadline()
          } else {
            None
          };
        }
        changed = pending_rx.changed() => {
          if changed.is_err() {
            break;
          }
          let pending = *pending_rx.borrow_and_update();
          deadline = (pending > 0 && self.is_online()).then(|| Instant::now() + debounce);
        }
        _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
          deadline = None;
          if self.is_online() && self.engine.signals().pending() > 0 {
            self.auto_drain("scheduled").await;
            deadline = self.retry_deadline();
          }
        }
      }
    }
    debug!("scheduler loop finished");
  }

  fn retry_deadline(&self) -> Option<Instant> {
    (self.is_online() && self.engine.signals().pending() > 0)
      .then(|| Instant::now() + self.config.retry_interval())
  }

  async fn auto_drain(&self, reason: &'static str) {
    match self.engine.try_drain().await {
      Ok(Some(report)) => {
        debug!(reason, synced = report.synced, failed = report.failed, "automatic drain finished")
      }
      Ok(None) => debug!(reason, "drain already running, skipped"),
      Err(e) => error!(reason, error = %e, "automatic drain aborted"),
    }
  }
}

/// Background tasks started by a [`Scheduler`]. Dropping the handle stops
/// them.
#[must_use = "dropping a SchedulerHandle stops the scheduler"]
pub struct SchedulerHandle {
  tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
  /// Combine two handles so they stop together.
  pub fn join(mut self, mut other: SchedulerHandle) -> SchedulerHandle {
    self.tasks.append(&mut other.tasks);
    self
  }

  pub fn shutdown(self) {}
}

impl Drop for SchedulerHandle {
  fn drop(&mut self) {
    for task in &self.tasks {
      task.abort();
    }
  }
}
