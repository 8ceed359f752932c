//! Engine and scheduler tests against an in-memory `SqliteStore` and a
//! scripted remote.

use std::{
  collections::BTreeMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, Utc};
use tally_core::{
  ScoreKey, ScoreRecord, ScoreWrite,
  remote::{RemoteError, RemoteScores},
  store::LocalStore,
};
use tally_store_sqlite::SqliteStore;
use tokio::{
  sync::{mpsc, oneshot},
  time::timeout,
};

use crate::{
  Error, Probe, Scheduler, SchedulerConfig, SyncEngine, engine::NO_OFFLINE_STORAGE,
};

const WAIT: Duration = Duration::from_secs(5);

// ─── Scripted remote ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Mode {
  Succeed,
  Unreachable,
  Reject,
  /// Confirm only writes for these subjects.
  ConfirmOnly(Vec<String>),
}

struct Script {
  mode:    Mode,
  calls:   Vec<Vec<ScoreWrite>>,
  rows:    BTreeMap<ScoreKey, ScoreRecord>,
  ids:     Vec<String>,
  next_id: u32,
  hold:    Option<oneshot::Receiver<()>>,
}

struct ScriptedRemote {
  script: Mutex<Script>,
}

impl ScriptedRemote {
  fn new(mode: Mode) -> Self {
    Self {
      script: Mutex::new(Script {
        mode,
        calls: Vec::new(),
        rows: BTreeMap::new(),
        ids: Vec::new(),
        next_id: 1,
        hold: None,
      }),
    }
  }

  fn set_mode(&self, mode: Mode) { self.script.lock().unwrap().mode = mode; }

  /// Ids handed out by the next confirmations, in order.
  fn issue_ids(&self, ids: &[&str]) {
    self.script.lock().unwrap().ids = ids.iter().rev().map(|s| s.to_string()).collect();
  }

  fn seed(&self, record: ScoreRecord) {
    self.script.lock().unwrap().rows.insert(record.key(), record);
  }

  fn calls(&self) -> Vec<Vec<ScoreWrite>> { self.script.lock().unwrap().calls.clone() }

  /// Block the next upsert until the returned sender fires.
  fn hold_next_upsert(&self) -> oneshot::Sender<()> {
    let (tx, rx) = oneshot::channel();
    self.script.lock().unwrap().hold = Some(rx);
    tx
  }
}

impl RemoteScores for ScriptedRemote {
  async fn upsert_scores(&self, writes: Vec<ScoreWrite>) -> Result<Vec<ScoreRecord>, RemoteError> {
    let hold = self.script.lock().unwrap().hold.take();
    if let Some(hold) = hold {
      let _ = hold.await;
    }

    let mut script = self.script.lock().unwrap();
    script.calls.push(writes.clone());
    let allowed: Option<Vec<String>> = match &script.mode {
      Mode::Unreachable => return Err(RemoteError::Unreachable("connection refused".into())),
      Mode::Reject => return Err(RemoteError::Rejected("value out of range".into())),
      Mode::Succeed => None,
      Mode::ConfirmOnly(subjects) => Some(subjects.clone()),
    };

    let mut confirmed = Vec::new();
    for write in writes {
      if let Some(allowed) = &allowed
        && !allowed.contains(&write.subject_id)
      {
        continue;
      }
      let id = match script.ids.pop() {
        Some(id) => id,
        None => {
          script.next_id += 1;
          format!("srv-{}", script.next_id)
        }
      };
      let record = ScoreRecord {
        id,
        subject_id: write.subject_id,
        dimension: write.dimension,
        value: write.value,
        recorded_by: write.recorded_by,
        recorded_at: Utc::now(),
      };
      script.rows.insert(record.key(), record.clone());
      confirmed.push(record);
    }
    Ok(confirmed)
  }

  async fn fetch_scores(&self, subject_ids: &[String]) -> Result<Vec<ScoreRecord>, RemoteError> {
    let script = self.script.lock().unwrap();
    if script.mode == Mode::Unreachable {
      return Err(RemoteError::Unreachable("connection refused".into()));
    }
    Ok(
      script
        .rows
        .values()
        .filter(|r| subject_ids.contains(&r.subject_id))
        .cloned()
        .collect(),
    )
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

type Engine = SyncEngine<SqliteStore, ScriptedRemote>;

async fn engine(mode: Mode) -> Arc<Engine> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Arc::new(SyncEngine::open(store, ScriptedRemote::new(mode)).await.expect("engine"))
}

fn store(engine: &Engine) -> &SqliteStore { engine.store().expect("local-first engine") }

async fn stored(engine: &Engine, subject: &str, dimension: u8) -> Option<ScoreRecord> {
  store(engine).score_for(&ScoreKey::new(subject, dimension)).await.unwrap()
}

fn ids(subjects: &[&str]) -> Vec<String> { subjects.iter().map(|s| s.to_string()).collect() }

fn at(rfc3339: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
}

// ─── Writes ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_score_is_local_and_queued() {
  let e = engine(Mode::Succeed).await;

  let record = e.record_score("athlete-1", 1, 4200.0, Some("judge-9")).await.unwrap();

  assert!(!record.is_confirmed());
  assert!(record.id.starts_with("local-athlete-1-1-"));
  assert_eq!(record.recorded_by.as_deref(), Some("judge-9"));
  assert_eq!(e.pending_count().await.unwrap(), 1);
  assert_eq!(stored(&e, "athlete-1", 1).await.unwrap().value, 4200.0);
  assert!(e.remote().calls().is_empty(), "recording must not touch the network");
}

#[tokio::test]
async fn rapid_writes_to_one_key_leave_one_intent() {
  let e = engine(Mode::Succeed).await;

  e.record_score("athlete-9", 4, 100.0, None).await.unwrap();
  e.record_score("athlete-9", 4, 150.0, None).await.unwrap();

  assert_eq!(e.pending_count().await.unwrap(), 1);
  let pending = store(&e).all_pending().await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].value, 150.0);
  assert_eq!(store(&e).scores_for(&ids(&["athlete-9"])).await.unwrap().len(), 1);
  assert_eq!(stored(&e, "athlete-9", 4).await.unwrap().value, 150.0);
}

#[tokio::test]
async fn record_scores_reports_partial_failure() {
  let e = engine(Mode::Succeed).await;
  store(&e).close().await.unwrap();

  let err = e
    .record_scores(vec![
      ScoreWrite::new("athlete-1", 1, 10.0, None),
      ScoreWrite::new("athlete-1", 2, 20.0, None),
    ])
    .await
    .unwrap_err();

  match &err {
    Error::PartialBatchFailure { recorded, total, source } => {
      assert_eq!(*recorded, 0);
      assert_eq!(*total, 2);
      assert!(matches!(**source, Error::StorageUnavailable(_)));
    }
    other => panic!("unexpected error: {other}"),
  }
  assert!(err.is_storage_unavailable());
}

#[tokio::test]
async fn record_scores_records_whole_batch() {
  let e = engine(Mode::Succeed).await;

  let recorded = e
    .record_scores(vec![
      ScoreWrite::new("athlete-1", 1, 10.0, None),
      ScoreWrite::new("athlete-1", 2, 20.0, None),
      ScoreWrite::new("athlete-2", 1, 30.0, None),
    ])
    .await
    .unwrap();

  assert_eq!(recorded.len(), 3);
  assert_eq!(e.pending_count().await.unwrap(), 3);
}

// ─── Drains ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn offline_write_then_reconnect_confirms() {
  let e = engine(Mode::Unreachable).await;
  e.record_score("athlete-1", 1, 4200.0, Some("judge-9")).await.unwrap();

  let report = e.trigger_sync().await.unwrap();
  assert_eq!(report.synced, 0);
  assert_eq!(report.failed, 1);
  assert!(!report.errors.is_empty());
  assert!(e.is_offline());
  assert_eq!(e.pending_count().await.unwrap(), 1);
  assert_eq!(stored(&e, "athlete-1", 1).await.unwrap().value, 4200.0);
  assert!(e.last_error().is_some());

  e.remote().set_mode(Mode::Succeed);
  e.remote().issue_ids(&["srv-77"]);
  let report = e.trigger_sync().await.unwrap();

  assert_eq!(report.synced, 1);
  assert_eq!(report.failed, 0);
  assert!(report.is_clean());
  assert!(!e.is_offline());
  assert_eq!(e.pending_count().await.unwrap(), 0);
  assert_eq!(e.last_error(), None);
  let record = stored(&e, "athlete-1", 1).await.unwrap();
  assert_eq!(record.id, "srv-77");
  assert!(record.is_confirmed());
  assert_eq!(record.value, 4200.0);
}

#[tokio::test]
async fn drain_sends_one_write_per_key() {
  let e = engine(Mode::Succeed).await;
  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
  e.record_score("athlete-1", 1, 2.0, None).await.unwrap();
  e.record_score("athlete-2", 3, 5.0, None).await.unwrap();

  e.drain_queue().await.unwrap();

  let calls = e.remote().calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].len(), 2);
  let sent = calls[0].iter().find(|w| w.subject_id == "athlete-1").unwrap();
  assert_eq!(sent.value, 2.0);
}

#[tokio::test]
async fn drain_leaves_exactly_the_unconfirmed_intents() {
  let e = engine(Mode::ConfirmOnly(vec!["athlete-1".into()])).await;
  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
  e.record_score("athlete-2", 1, 2.0, None).await.unwrap();
  e.record_score("athlete-3", 1, 3.0, None).await.unwrap();

  let report = e.drain_queue().await.unwrap();

  assert_eq!(report.synced, 1);
  assert_eq!(report.failed, 2);
  let left: Vec<String> =
    store(&e).all_pending().await.unwrap().into_iter().map(|p| p.subject_id).collect();
  assert_eq!(left, vec!["athlete-2".to_string(), "athlete-3".to_string()]);
  assert!(store(&e).all_pending().await.unwrap().iter().all(|p| p.attempts == 1));
}

#[tokio::test]
async fn drain_of_empty_queue_is_a_no_op() {
  let e = engine(Mode::Succeed).await;

  let report = e.drain_queue().await.unwrap();

  assert_eq!(report, Default::default());
  assert!(e.remote().calls().is_empty());
  assert_eq!(e.last_sync().await.unwrap(), None);
}

#[tokio::test]
async fn failed_drains_keep_every_intent_and_count_attempts() {
  let e = engine(Mode::Unreachable).await;
  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
  e.record_score("athlete-2", 2, 2.0, None).await.unwrap();

  e.drain_queue().await.unwrap();
  e.drain_queue().await.unwrap();

  let pending = store(&e).all_pending().await.unwrap();
  assert_eq!(pending.len(), 2);
  for intent in pending {
    assert_eq!(intent.attempts, 2);
    assert!(intent.last_error.unwrap().contains("connection refused"));
  }
  assert!(e.last_sync().await.unwrap().is_some());
}

#[tokio::test]
async fn rejection_keeps_intents_but_not_offline() {
  let e = engine(Mode::Reject).await;
  e.record_score("athlete-1", 1, -5.0, None).await.unwrap();

  let report = e.drain_queue().await.unwrap();

  assert_eq!(report.failed, 1);
  assert!(report.errors[0].contains("value out of range"));
  assert!(!e.is_offline());
  assert_eq!(e.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn write_during_drain_survives_confirmation() {
  let e = engine(Mode::Succeed).await;
  e.record_score("athlete-1", 1, 100.0, None).await.unwrap();

  let release = e.remote().hold_next_upsert();
  let mut syncing = e.signals().subscribe_syncing();
  let drain = tokio::spawn({
    let e = Arc::clone(&e);
    async move { e.drain_queue().await }
  });
  timeout(WAIT, syncing.wait_for(|s| *s)).await.unwrap().unwrap();

  e.record_score("athlete-1", 1, 150.0, None).await.unwrap();
  release.send(()).unwrap();
  let report = drain.await.unwrap().unwrap();

  assert_eq!(report.synced, 1);
  assert_eq!(e.pending_count().await.unwrap(), 1);
  let record = stored(&e, "athlete-1", 1).await.unwrap();
  assert_eq!(record.value, 150.0);
  assert!(!record.is_confirmed());

  e.drain_queue().await.unwrap();
  assert_eq!(e.pending_count().await.unwrap(), 0);
  assert_eq!(stored(&e, "athlete-1", 1).await.unwrap().value, 150.0);
}

#[tokio::test]
async fn try_drain_skips_while_a_drain_runs() {
  let e = engine(Mode::Succeed).await;
  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();

  let release = e.remote().hold_next_upsert();
  let mut syncing = e.signals().subscribe_syncing();
  let drain = tokio::spawn({
    let e = Arc::clone(&e);
    async move { e.drain_queue().await }
  });
  timeout(WAIT, syncing.wait_for(|s| *s)).await.unwrap().unwrap();

  assert!(e.is_syncing());
  assert!(e.try_drain().await.unwrap().is_none());

  release.send(()).unwrap();
  drain.await.unwrap().unwrap();
  assert!(!e.is_syncing());
  assert_eq!(e.remote().calls().len(), 1);
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_does_not_overwrite_pending_local_value() {
  let e = engine(Mode::Succeed).await;
  e.remote().seed(ScoreRecord {
    id:          "srv-1".into(),
    subject_id:  "athlete-2".into(),
    dimension:   3,
    value:       8500.0,
    recorded_by: None,
    recorded_at: at("2024-01-01T00:00:00Z"),
  });
  e.record_score("athlete-2", 3, 9000.0, None).await.unwrap();

  let merged = e.refresh_scores(&ids(&["athlete-2"])).await.unwrap();

  assert_eq!(merged.len(), 1);
  assert_eq!(merged[0].value, 9000.0);
  assert_eq!(stored(&e, "athlete-2", 3).await.unwrap().value, 9000.0);
}

#[tokio::test]
async fn refresh_caches_remote_scores() {
  let e = engine(Mode::Succeed).await;
  e.remote().seed(ScoreRecord {
    id:          "srv-5".into(),
    subject_id:  "athlete-4".into(),
    dimension:   2,
    value:       12.5,
    recorded_by: Some("judge-1".into()),
    recorded_at: at("2024-03-01T10:00:00Z"),
  });

  let merged = e.refresh_scores(&ids(&["athlete-4"])).await.unwrap();

  assert_eq!(merged.len(), 1);
  let cached = stored(&e, "athlete-4", 2).await.unwrap();
  assert_eq!(cached.id, "srv-5");
  assert_eq!(cached.value, 12.5);
}

#[tokio::test]
async fn local_edit_newer_by_nanoseconds_wins_refresh() {
  let e = engine(Mode::Succeed).await;
  let local = e.record_score("athlete-3", 2, 200.0, None).await.unwrap();
  e.remote().seed(ScoreRecord {
    id:          "srv-9".into(),
    subject_id:  "athlete-3".into(),
    dimension:   2,
    value:       100.0,
    recorded_by: None,
    recorded_at: local.recorded_at - chrono::Duration::nanoseconds(1),
  });

  assert_eq!(stored(&e, "athlete-3", 2).await.unwrap().recorded_at, local.recorded_at);

  let merged = e.refresh_scores(&ids(&["athlete-3"])).await.unwrap();
  assert_eq!(merged.len(), 1);
  assert_eq!(merged[0].value, 200.0);
}

#[tokio::test]
async fn refresh_falls_back_to_local_when_unreachable() {
  let e = engine(Mode::Unreachable).await;
  e.record_score("athlete-1", 1, 7.0, None).await.unwrap();

  let merged = e.refresh_scores(&ids(&["athlete-1"])).await.unwrap();
  assert_eq!(merged.len(), 1);
  assert!(e.is_offline());

  let err = e.refresh_scores(&ids(&["athlete-8"])).await.unwrap_err();
  assert!(matches!(err, Error::NetworkUnreachable(_)));
}

#[tokio::test]
async fn merged_scores_return_local_then_reconcile() {
  let e = engine(Mode::Succeed).await;
  e.record_score("athlete-1", 1, 7.0, None).await.unwrap();
  e.remote().seed(ScoreRecord {
    id:          "srv-9".into(),
    subject_id:  "athlete-1".into(),
    dimension:   2,
    value:       3.0,
    recorded_by: None,
    recorded_at: at("2024-01-01T00:00:00Z"),
  });

  let merged = e.get_merged_scores(ids(&["athlete-1"])).await.unwrap();
  assert_eq!(merged.snapshot.len(), 1);

  let reconciled = merged.reconciled().await.unwrap();
  let dims: Vec<u8> = reconciled.iter().map(|r| r.dimension).collect();
  assert_eq!(dims, vec![1, 2]);
}

// ─── Observers ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn pending_count_subscription_fires_and_stops() {
  let e = engine(Mode::Succeed).await;
  let (tx, mut rx) = mpsc::unbounded_channel();
  let sub = e.on_pending_count(move |count| {
    let _ = tx.send(count);
  });

  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
  assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(1));

  e.trigger_sync().await.unwrap();
  assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(0));

  sub.unsubscribe();
  e.record_score("athlete-1", 1, 2.0, None).await.unwrap();
  assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);
}

#[tokio::test]
async fn open_publishes_persisted_pending_count() {
  let dir = std::env::temp_dir().join(format!("tally-sync-{}", std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  let path = dir.join("restart.db");
  let _ = std::fs::remove_file(&path);

  {
    let store = SqliteStore::open(&path).await.unwrap();
    let e = SyncEngine::open(store, ScriptedRemote::new(Mode::Unreachable)).await.unwrap();
    e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
    e.record_score("athlete-2", 1, 1.0, None).await.unwrap();
    e.store().unwrap().close().await.unwrap();
  }

  let store = SqliteStore::open(&path).await.unwrap();
  let e = SyncEngine::open(store, ScriptedRemote::new(Mode::Succeed)).await.unwrap();
  assert_eq!(*e.subscribe_pending_count().borrow(), 2);
  assert_eq!(e.drain_queue().await.unwrap().synced, 2);

  e.store().unwrap().close().await.unwrap();
  let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn reset_clears_everything() {
  let e = engine(Mode::Unreachable).await;
  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
  e.drain_queue().await.unwrap();

  e.reset_local_state().await.unwrap();

  assert_eq!(e.pending_count().await.unwrap(), 0);
  assert_eq!(e.last_sync().await.unwrap(), None);
  assert_eq!(e.last_error(), None);
  assert!(e.local_scores(&ids(&["athlete-1"])).await.is_empty());
}

// ─── Remote-only mode ────────────────────────────────────────────────────────

#[tokio::test]
async fn remote_only_writes_go_straight_to_the_remote() {
  let e: SyncEngine<SqliteStore, _> = SyncEngine::remote_only(ScriptedRemote::new(Mode::Succeed));
  e.remote().issue_ids(&["srv-3"]);

  let record = e.record_score("athlete-1", 2, 55.0, None).await.unwrap();

  assert_eq!(record.id, "srv-3");
  assert_eq!(e.pending_count().await.unwrap(), 0);
  assert_eq!(e.remote().calls().len(), 1);

  let report = e.drain_queue().await.unwrap();
  assert_eq!(report.errors, vec![NO_OFFLINE_STORAGE.to_string()]);
  assert_eq!(report.synced, 0);

  let e = Arc::new(e);
  let merged = e.get_merged_scores(ids(&["athlete-1"])).await.unwrap();
  assert_eq!(merged.snapshot.len(), 1);
  assert_eq!(merged.reconciled().await.unwrap()[0].id, "srv-3");
}

#[tokio::test]
async fn remote_only_write_fails_when_unreachable() {
  let e: SyncEngine<SqliteStore, _> =
    SyncEngine::remote_only(ScriptedRemote::new(Mode::Unreachable));

  let err = e.record_score("athlete-1", 2, 55.0, None).await.unwrap_err();

  assert!(matches!(err, Error::NetworkUnreachable(_)));
  assert!(e.is_offline());
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

fn quick() -> SchedulerConfig {
  SchedulerConfig { debounce_ms: 20, retry_interval_ms: 30, probe_interval_ms: 20 }
}

#[tokio::test]
async fn scheduler_drains_after_debounce_when_online() {
  let e = engine(Mode::Succeed).await;
  let scheduler = Scheduler::new(Arc::clone(&e), quick(), true);
  let _handle = scheduler.spawn();

  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();

  let mut pending = e.subscribe_pending_count();
  timeout(WAIT, pending.wait_for(|n| *n == 0)).await.unwrap().unwrap();
  assert!(stored(&e, "athlete-1", 1).await.unwrap().is_confirmed());
}

#[tokio::test]
async fn scheduler_waits_for_connectivity() {
  let e = engine(Mode::Succeed).await;
  let scheduler = Scheduler::new(Arc::clone(&e), quick(), false);
  let _handle = scheduler.spawn();

  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
  tokio::time::sleep(Duration::from_millis(100)).await;
  assert!(e.remote().calls().is_empty());
  assert_eq!(scheduler.status().pending, 1);

  scheduler.set_online(true);
  let mut pending = e.subscribe_pending_count();
  timeout(WAIT, pending.wait_for(|n| *n == 0)).await.unwrap().unwrap();
  assert!(scheduler.status().online);
}

#[tokio::test]
async fn reconnect_drains_without_waiting_for_debounce() {
  let e = engine(Mode::Succeed).await;
  let slow = SchedulerConfig { debounce_ms: 5000, retry_interval_ms: 5000, probe_interval_ms: 5000 };
  let scheduler = Scheduler::new(Arc::clone(&e), slow, false);
  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();

  let _handle = scheduler.spawn();
  scheduler.set_online(true);

  let mut pending = e.subscribe_pending_count();
  timeout(Duration::from_secs(1), pending.wait_for(|n| *n == 0)).await.unwrap().unwrap();
  assert_eq!(e.remote().calls().len(), 1);
}

#[tokio::test]
async fn scheduler_retries_until_the_remote_recovers() {
  let e = engine(Mode::Unreachable).await;
  let scheduler = Scheduler::new(Arc::clone(&e), quick(), true);
  let _handle = scheduler.spawn();

  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();

  timeout(WAIT, async {
    loop {
      let attempts = store(&e).all_pending().await.unwrap()[0].attempts;
      if attempts >= 2 {
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .unwrap();

  e.remote().set_mode(Mode::Succeed);
  let mut pending = e.subscribe_pending_count();
  timeout(WAIT, pending.wait_for(|n| *n == 0)).await.unwrap().unwrap();
}

#[tokio::test]
async fn sync_now_skips_while_a_drain_runs() {
  let e = engine(Mode::Succeed).await;
  let scheduler = Scheduler::new(Arc::clone(&e), quick(), false);
  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();

  let release = e.remote().hold_next_upsert();
  let mut syncing = e.signals().subscribe_syncing();
  let drain = tokio::spawn({
    let e = Arc::clone(&e);
    async move { e.drain_queue().await }
  });
  timeout(WAIT, syncing.wait_for(|s| *s)).await.unwrap().unwrap();

  assert!(scheduler.sync_now().await.unwrap().is_none());
  release.send(()).unwrap();
  drain.await.unwrap().unwrap();
  assert!(scheduler.sync_now().await.unwrap().is_some());
}

struct FlagProbe(Arc<AtomicBool>);

impl Probe for FlagProbe {
  async fn probe(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

#[tokio::test]
async fn health_check_drives_connectivity() {
  let e = engine(Mode::Succeed).await;
  let scheduler = Scheduler::new(Arc::clone(&e), quick(), false);
  let up = Arc::new(AtomicBool::new(false));
  let _handle = scheduler.spawn().join(scheduler.spawn_probe(FlagProbe(Arc::clone(&up))));

  e.record_score("athlete-1", 1, 1.0, None).await.unwrap();
  up.store(true, Ordering::SeqCst);

  let mut online = scheduler.subscribe_online();
  timeout(WAIT, online.wait_for(|o| *o)).await.unwrap().unwrap();
  let mut pending = e.subscribe_pending_count();
  timeout(WAIT, pending.wait_for(|n| *n == 0)).await.unwrap().unwrap();
}
