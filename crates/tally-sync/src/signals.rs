//! Observable sync state.
//!
//! Each signal is a `tokio::sync::watch` channel: readers either hold a
//! [`watch::Receiver`] or register a callback through [`on_change`], which
//! returns a [`Subscription`] that stops delivery when dropped. Rapid changes
//! coalesce; a callback always sees the latest value.

use tokio::{sync::watch, task::JoinHandle};

// ─── Signals ─────────────────────────────────────────────────────────────────

/// The state a UI shows next to the score entry form.
pub struct SyncSignals {
  pending:    watch::Sender<usize>,
  offline:    watch::Sender<bool>,
  syncing:    watch::Sender<bool>,
  last_error: watch::Sender<Option<String>>,
}

impl Default for SyncSignals {
  fn default() -> Self { Self::new() }
}

impl SyncSignals {
  pub fn new() -> Self {
    Self {
      pending:    watch::Sender::new(0),
      offline:    watch::Sender::new(false),
      syncing:    watch::Sender::new(false),
      last_error: watch::Sender::new(None),
    }
  }

  // ── Pending count ─────────────────────────────────────────────────────────

  /// Publish a new pending count. Subscribers are woken only if it changed.
  pub fn publish_pending(&self, count: usize) -> bool { set_if_changed(&self.pending, count) }

  pub fn pending(&self) -> usize { *self.pending.borrow() }

  pub fn subscribe_pending(&self) -> watch::Receiver<usize> { self.pending.subscribe() }

  // ── Offline ───────────────────────────────────────────────────────────────

  pub fn set_offline(&self, offline: bool) -> bool { set_if_changed(&self.offline, offline) }

  pub fn is_offline(&self) -> bool { *self.offline.borrow() }

  pub fn subscribe_offline(&self) -> watch::Receiver<bool> { self.offline.subscribe() }

  // ── Drain progress ────────────────────────────────────────────────────────

  pub fn is_syncing(&self) -> bool { *self.syncing.borrow() }

  pub fn subscribe_syncing(&self) -> watch::Receiver<bool> { self.syncing.subscribe() }

  /// Mark a drain as running until the guard is dropped.
  pub(crate) fn syncing_guard(&self) -> SyncingGuard<'_> {
    self.syncing.send_replace(true);
    SyncingGuard { flag: &self.syncing }
  }

  // ── Last error ────────────────────────────────────────────────────────────

  pub fn set_last_error(&self, error: Option<String>) { set_if_changed(&self.last_error, error); }

  pub fn last_error(&self) -> Option<String> { self.last_error.borrow().clone() }

  pub fn subscribe_last_error(&self) -> watch::Receiver<Option<String>> {
    self.last_error.subscribe()
  }
}

fn set_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) -> bool {
  tx.send_if_modified(|current| {
    if *current == value {
      false
    } else {
      *current = value;
      true
    }
  })
}

pub(crate) struct SyncingGuard<'a> {
  flag: &'a watch::Sender<bool>,
}

impl Drop for SyncingGuard<'_> {
  fn drop(&mut self) { self.flag.send_replace(false); }
}

// ─── Callback subscriptions ──────────────────────────────────────────────────

/// A live callback registration. Dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) stops delivery.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
  task: JoinHandle<()>,
}

impl Subscription {
  pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
  fn drop(&mut self) { self.task.abort(); }
}

/// Call `callback` with every new value published on `rx`. The value current
/// at registration time is not delivered.
///
/// Must be called from within a tokio runtime.
pub fn on_change<T, F>(mut rx: watch::Receiver<T>, mut callback: F) -> Subscription
where
  T: Clone + Send + Sync + 'static,
  F: FnMut(T) + Send + 'static,
{
  rx.mark_unchanged();
  let task = tokio::spawn(async move {
    while rx.changed().await.is_ok() {
      let value = rx.borrow_and_update().clone();
      callback(value);
    }
  });
  Subscription { task }
}
