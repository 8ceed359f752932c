//! The sync engine: local-first writes, queue drains, and the merged read.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use tally_core::{
  DrainReport, PendingWrite, ScoreKey, ScoreRecord, ScoreWrite,
  merge::{collapse_pending, merge_scores},
  remote::RemoteScores,
  store::LocalStore,
};
use tokio::{sync::Mutex, sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
  error::{Error, Result},
  signals::{self, Subscription, SyncSignals},
};

/// Reported by a drain when the engine runs without a local store.
pub const NO_OFFLINE_STORAGE: &str = "offline storage not available";

const UNCONFIRMED: &str = "remote did not confirm this write";

/// Coordinates a [`LocalStore`] with a [`RemoteScores`] service.
///
/// With a store, every write lands locally first and is queued for the
/// remote; drains push the queue. Without one (see
/// [`remote_only`](Self::remote_only)) writes go straight to the remote and
/// the queue is always empty.
pub struct SyncEngine<S, R> {
  store:      Option<S>,
  remote:     R,
  signals:    SyncSignals,
  /// Held for the whole of a drain and of a reset.
  drain_gate: Mutex<()>,
}

/// The result of [`SyncEngine::get_merged_scores`]: the best data available
/// now, and the reconciled view once the background refresh finishes.
pub struct MergedScores {
  pub snapshot: Vec<ScoreRecord>,
  refresh:      Option<JoinHandle<Result<Vec<ScoreRecord>>>>,
}

impl MergedScores {
  /// Wait for the background refresh and return the merged view. Without a
  /// background refresh the snapshot is already remote data.
  pub async fn reconciled(self) -> Result<Vec<ScoreRecord>> {
    match self.refresh {
      Some(refresh) => refresh.await?,
      None => Ok(self.snapshot),
    }
  }
}

impl<S: LocalStore, R: RemoteScores> SyncEngine<S, R> {
  /// Build a local-first engine and load the persisted pending count, so
  /// intents queued before a restart are visible immediately.
  pub async fn open(store: S, remote: R) -> Result<Self> {
    let count = store.count_pending().await.map_err(Error::from_store)?;
    let engine = Self::assemble(Some(store), remote);
    engine.signals.publish_pending(count);
    info!(pending = count, "sync engine opened");
    Ok(engine)
  }

  /// Build an engine with no local store. Writes go straight to the remote.
  pub fn remote_only(remote: R) -> Self {
    info!("sync engine running without offline storage");
    Self::assemble(None, remote)
  }

  fn assemble(store: Option<S>, remote: R) -> Self {
    Self { store, remote, signals: SyncSignals::new(), drain_gate: Mutex::new(()) }
  }

  pub fn is_local_first(&self) -> bool { self.store.is_some() }

  pub fn store(&self) -> Option<&S> { self.store.as_ref() }

  pub fn remote(&self) -> &R { &self.remote }

  pub fn signals(&self) -> &SyncSignals { &self.signals }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Record one score.
  ///
  /// Local-first: the optimistic record and its queued intent are stored as
  /// one unit and the record is returned without touching the network.
  /// Remote-only: the write is sent immediately and the confirmed record is
  /// returned.
  pub async fn record_score(
    &self,
    subject_id: &str,
    dimension: u8,
    value: f64,
    recorded_by: Option<&str>,
  ) -> Result<ScoreRecord> {
    self
      .record_write(ScoreWrite::new(subject_id, dimension, value, recorded_by.map(str::to_owned)))
      .await
  }

  pub async fn record_write(&self, write: ScoreWrite) -> Result<ScoreRecord> {
    let Some(store) = &self.store else {
      return self.record_remote(write).await;
    };

    let record = ScoreRecord::optimistic(&write, Utc::now());
    let pending = store.stage_write(record.clone(), write).await.map_err(Error::from_store)?;
    debug!(key = %pending.key(), seq = pending.seq, "score staged");
    self.publish_pending(store).await?;
    Ok(record)
  }

  async fn record_remote(&self, write: ScoreWrite) -> Result<ScoreRecord> {
    let key = write.key();
    let confirmed = match self.remote.upsert_scores(vec![write]).await {
      Ok(confirmed) => confirmed,
      Err(e) => {
        if e.is_unreachable() {
          self.signals.set_offline(true);
        }
        return Err(e.into());
      }
    };
    self.signals.set_offline(false);
    confirmed
      .into_iter()
      .find(|r| r.key() == key)
      .ok_or_else(|| Error::RemoteRejected(format!("no confirmation returned for {key}")))
  }

  /// Record several scores in order. Stops at the first failure; the error
  /// reports how many were recorded before it.
  pub async fn record_scores(&self, writes: Vec<ScoreWrite>) -> Result<Vec<ScoreRecord>> {
    let total = writes.len();
    let mut recorded = Vec::with_capacity(total);
    for write in writes {
      match self.record_write(write).await {
        Ok(record) => recorded.push(record),
        Err(source) => {
          return Err(Error::PartialBatchFailure {
            recorded: recorded.len(),
            total,
            source: Box::new(source),
          });
        }
      }
    }
    Ok(recorded)
  }

  // ─── Drains ────────────────────────────────────────────────────────────────

  /// Push every queued intent to the remote, waiting for any drain already
  /// in progress to finish first.
  ///
  /// Network failures are reported in the [`DrainReport`]; only local store
  /// failures surface as errors.
  pub async fn drain_queue(&self) -> Result<DrainReport> {
    let _gate = self.drain_gate.lock().await;
    self.drain_locked().await
  }

  /// Like [`drain_queue`](Self::drain_queue), but returns `None` instead of
  /// waiting when a drain is already running.
  pub async fn try_drain(&self) -> Result<Option<DrainReport>> {
    let Ok(_gate) = self.drain_gate.try_lock() else {
      debug!("drain already running");
      return Ok(None);
    };
    self.drain_locked().await.map(Some)
  }

  /// A user-initiated sync. Same as [`drain_queue`](Self::drain_queue).
  pub async fn trigger_sync(&self) -> Result<DrainReport> { self.drain_queue().await }

  async fn drain_locked(&self) -> Result<DrainReport> {
    let Some(store) = &self.store else {
      return Ok(DrainReport { synced: 0, failed: 0, errors: vec![NO_OFFLINE_STORAGE.to_owned()] });
    };

    let pending = store.all_pending().await.map_err(Error::from_store)?;
    if pending.is_empty() {
      return Ok(DrainReport::default());
    }

    let _syncing = self.signals.syncing_guard();
    let attempted: Vec<i64> = pending.iter().map(|p| p.seq).collect();
    let batch: Vec<ScoreWrite> =
      collapse_pending(&pending).iter().map(PendingWrite::to_write).collect();
    info!(pending = pending.len(), batch = batch.len(), "draining pending writes");

    let mut report = DrainReport::default();
    match self.remote.upsert_scores(batch).await {
      Ok(confirmed) => {
        self.signals.set_offline(false);
        let confirmed_keys: HashSet<ScoreKey> = confirmed.iter().map(ScoreRecord::key).collect();
        let unconfirmed: Vec<i64> = pending
          .iter()
          .filter(|p| !confirmed_keys.contains(&p.key()))
          .map(|p| p.seq)
          .collect();

        let removed =
          store.apply_confirmed(confirmed, &attempted).await.map_err(Error::from_store)?;
        report.synced = pending.len() - unconfirmed.len();
        if unconfirmed.is_empty() {
          self.signals.set_last_error(None);
        } else {
          store.mark_failed(&unconfirmed, UNCONFIRMED).await.map_err(Error::from_store)?;
          report.failed = unconfirmed.len();
          report.errors.push(UNCONFIRMED.to_owned());
          self.signals.set_last_error(Some(UNCONFIRMED.to_owned()));
          warn!(unconfirmed = unconfirmed.len(), "remote confirmed part of the batch");
        }
        info!(synced = report.synced, removed, "drain confirmed");
      }
      Err(e) => {
        if e.is_unreachable() {
          self.signals.set_offline(true);
        }
        let message = e.to_string();
        let touched = store.mark_failed(&attempted, &message).await.map_err(Error::from_store)?;
        report.failed = pending.len();
        report.errors.push(message.clone());
        self.signals.set_last_error(Some(message));
        warn!(failed = touched, error = %e, "drain failed, writes stay queued");
      }
    }

    store.record_sync(Utc::now()).await.map_err(Error::from_store)?;
    self.publish_pending(store).await?;
    Ok(report)
  }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  /// Fetch `subject_ids` from the remote, cache the result (keys with queued
  /// intents keep their local value), and return the merged view.
  ///
  /// If the remote fails, the local snapshot is returned instead; the error
  /// surfaces only when there is nothing local to show.
  pub async fn refresh_scores(&self, subject_ids: &[String]) -> Result<Vec<ScoreRecord>> {
    if subject_ids.is_empty() {
      return Ok(Vec::new());
    }
    let local = self.local_scores(subject_ids).await;

    match self.remote.fetch_scores(subject_ids).await {
      Ok(remote) => {
        self.signals.set_offline(false);
        if let Some(store) = &self.store {
          match store.cache_remote(remote.clone()).await {
            Ok(cached) => debug!(cached, "remote scores cached"),
            Err(e) => warn!(error = %e, "failed to cache remote scores"),
          }
        }
        Ok(merge_scores(local, remote))
      }
      Err(e) => {
        if e.is_unreachable() {
          self.signals.set_offline(true);
        }
        warn!(error = %e, "remote fetch failed");
        if local.is_empty() { Err(e.into()) } else { Ok(merge_scores(local, Vec::new())) }
      }
    }
  }

  /// The locally stored records for `subject_ids`. Store failures are logged
  /// and read as empty.
  pub async fn local_scores(&self, subject_ids: &[String]) -> Vec<ScoreRecord> {
    let Some(store) = &self.store else {
      return Vec::new();
    };
    match store.scores_for(subject_ids).await {
      Ok(records) => records,
      Err(e) => {
        warn!(error = %e, "local read failed");
        Vec::new()
      }
    }
  }

  // ─── Observers ─────────────────────────────────────────────────────────────

  /// Re-read the pending count from the store and publish it.
  pub async fn pending_count(&self) -> Result<usize> {
    match &self.store {
      Some(store) => self.publish_pending(store).await,
      None => Ok(0),
    }
  }

  pub fn subscribe_pending_count(&self) -> watch::Receiver<usize> {
    self.signals.subscribe_pending()
  }

  /// Call `callback` whenever the pending count changes.
  pub fn on_pending_count<F>(&self, callback: F) -> Subscription
  where
    F: FnMut(usize) + Send + 'static,
  {
    signals::on_change(self.signals.subscribe_pending(), callback)
  }

  pub fn is_offline(&self) -> bool { self.signals.is_offline() }

  pub fn is_syncing(&self) -> bool { self.signals.is_syncing() }

  pub fn last_error(&self) -> Option<String> { self.signals.last_error() }

  /// When the last drain attempt finished, successful or not.
  pub async fn last_sync(&self) -> Result<Option<DateTime<Utc>>> {
    match &self.store {
      Some(store) => store.last_sync().await.map_err(Error::from_store),
      None => Ok(None),
    }
  }

  /// Forget all local state: scores, queued intents and the sync marker.
  /// Waits for a running drain so its results cannot land after the reset.
  pub async fn reset_local_state(&self) -> Result<()> {
    let _gate = self.drain_gate.lock().await;
    if let Some(store) = &self.store {
      store.clear().await.map_err(Error::from_store)?;
    }
    self.signals.publish_pending(0);
    self.signals.set_last_error(None);
    info!("local sync state reset");
    Ok(())
  }

  async fn publish_pending(&self, store: &S) -> Result<usize> {
    let count = store.count_pending().await.map_err(Error::from_store)?;
    self.signals.publish_pending(count);
    Ok(count)
  }
}

impl<S, R> SyncEngine<S, R>
where
  S: LocalStore + 'static,
  R: RemoteScores + 'static,
{
  /// Return the local snapshot immediately and refresh from the remote in
  /// the background. Without a local store the remote read is awaited and
  /// its error surfaced.
  ///
  /// Must be called from within a tokio runtime.
  pub async fn get_merged_scores(self: &Arc<Self>, subject_ids: Vec<String>) -> Result<MergedScores> {
    if self.store.is_none() {
      let snapshot = self.refresh_scores(&subject_ids).await?;
      return Ok(MergedScores { snapshot, refresh: None });
    }

    let snapshot = merge_scores(self.local_scores(&subject_ids).await, Vec::new());
    let engine = Arc::clone(self);
    let refresh = tokio::spawn(async move { engine.refresh_scores(&subject_ids).await });
    Ok(MergedScores { snapshot, refresh: Some(refresh) })
  }
}
