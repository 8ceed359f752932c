//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tally_core::{DrainReport, PendingWrite, ScoreRecord, ScoreWrite, station::Station, store::LocalStore};
use tally_store_sqlite::SqliteStore;
use tally_sync::{Probe, Scheduler, SyncEngine};
use tracing::warn;

use crate::{client::HttpRemote, config::Settings};

pub type Engine = SyncEngine<SqliteStore, HttpRemote>;

// ─── Engine setup ─────────────────────────────────────────────────────────────

/// Open the local store and build a local-first engine. If the store cannot
/// be opened, fall back to a remote-only engine.
pub async fn open_engine(settings: &Settings) -> Result<Arc<Engine>> {
  let remote = HttpRemote::new(&settings.url)?;
  let engine = match open_store(settings).await {
    Ok(store) => SyncEngine::open(store, remote).await.context("opening sync engine")?,
    Err(e) => {
      warn!(error = %e, "offline storage not available, writes go straight to the service");
      SyncEngine::remote_only(remote)
    }
  };
  Ok(Arc::new(engine))
}

async fn open_store(settings: &Settings) -> Result<SqliteStore> {
  let path = &settings.store_path;
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("creating {}", parent.display()))?;
  }
  SqliteStore::open(path)
    .await
    .with_context(|| format!("opening local store at {}", path.display()))
}

// ─── Writes ───────────────────────────────────────────────────────────────────

/// One `ATHLETE:STATION:VALUE` argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEntry {
  pub athlete: String,
  pub station: Station,
  pub value:   f64,
}

pub fn parse_entry(s: &str) -> Result<ScoreEntry, String> {
  let mut parts = s.rsplitn(3, ':');
  let (Some(value), Some(station), Some(athlete)) = (parts.next(), parts.next(), parts.next())
  else {
    return Err(format!("expected ATHLETE:STATION:VALUE, got {s:?}"));
  };
  if athlete.is_empty() {
    return Err(format!("missing athlete in {s:?}"));
  }
  let station = station.parse::<Station>().map_err(|e| e.to_string())?;
  let value = value.parse::<f64>().map_err(|e| format!("bad value {value:?}: {e}"))?;
  Ok(ScoreEntry { athlete: athlete.to_string(), station, value })
}

pub async fn record(
  engine: &Engine,
  settings: &Settings,
  entry: ScoreEntry,
  sync: bool,
) -> Result<()> {
  let record = engine
    .record_score(&entry.athlete, entry.station.dimension(), entry.value, settings.actor.as_deref())
    .await
    .context("recording score")?;
  print_scores(std::slice::from_ref(&record));
  after_write(engine, sync).await
}

pub async fn batch(
  engine: &Engine,
  settings: &Settings,
  entries: Vec<ScoreEntry>,
  sync: bool,
) -> Result<()> {
  let writes = entries
    .into_iter()
    .map(|e| ScoreWrite::new(e.athlete, e.station.dimension(), e.value, settings.actor.clone()))
    .collect();
  let records = engine.record_scores(writes).await.context("recording scores")?;
  print_scores(&records);
  after_write(engine, sync).await
}

async fn after_write(engine: &Engine, sync: bool) -> Result<()> {
  if !engine.is_local_first() {
    return Ok(());
  }
  if sync {
    return self::sync(engine).await;
  }
  println!("{} write(s) waiting to sync", engine.pending_count().await?);
  Ok(())
}

// ─── Reads ────────────────────────────────────────────────────────────────────

pub async fn show(engine: &Arc<Engine>, athletes: Vec<String>, local_only: bool) -> Result<()> {
  if local_only {
    let mut records = engine.local_scores(&athletes).await;
    records.sort_by_key(ScoreRecord::key);
    print_scores(&records);
    return Ok(());
  }

  let merged = engine.get_merged_scores(athletes).await.context("reading scores")?;
  if engine.is_local_first() && !merged.snapshot.is_empty() {
    println!("local:");
    print_scores(&merged.snapshot);
  }
  match merged.reconciled().await {
    Ok(records) => {
      if engine.is_local_first() {
        println!("reconciled:");
      }
      print_scores(&records);
    }
    Err(e) => println!("could not reach the score service: {e}"),
  }
  Ok(())
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusReport {
  service:     String,
  reachable:   bool,
  local_first: bool,
  pending:     usize,
  last_sync:   Option<DateTime<Utc>>,
  queue:       Vec<PendingWrite>,
}

pub async fn status(engine: &Engine, json: bool) -> Result<()> {
  let queue = match engine.store() {
    Some(store) => store.all_pending().await.context("reading pending writes")?,
    None => Vec::new(),
  };
  let report = StatusReport {
    service:     engine.remote().base_url().to_string(),
    reachable:   engine.remote().probe().await,
    local_first: engine.is_local_first(),
    pending:     engine.pending_count().await?,
    last_sync:   engine.last_sync().await?,
    queue,
  };

  if json {
    println!("{}", serde_json::to_string_pretty(&report)?);
    return Ok(());
  }

  println!("service     {} ({})", report.service, if report.reachable { "reachable" } else { "unreachable" });
  println!("mode        {}", if report.local_first { "local-first" } else { "remote-only" });
  println!("pending     {}", report.pending);
  println!("last sync   {}", report.last_sync.map_or_else(|| "never".to_string(), fmt_time));
  for intent in &report.queue {
    println!(
      "  #{:<4} {:<16} {:<6} {:>10}  attempts {}{}",
      intent.seq,
      intent.subject_id,
      station_label(intent.dimension),
      intent.value,
      intent.attempts,
      intent.last_error.as_deref().map(|e| format!("  ({e})")).unwrap_or_default(),
    );
  }
  Ok(())
}

// ─── Sync ─────────────────────────────────────────────────────────────────────

pub async fn sync(engine: &Engine) -> Result<()> {
  let report = engine.trigger_sync().await.context("syncing")?;
  print_report(&report);
  Ok(())
}

/// Run the scheduler with a health probe until interrupted.
pub async fn watch(engine: &Arc<Engine>, settings: &Settings) -> Result<()> {
  let online = engine.remote().probe().await;
  let scheduler = Scheduler::new(Arc::clone(engine), settings.sync.clone(), online);
  let _tasks = scheduler.spawn().join(scheduler.spawn_probe(engine.remote().clone()));
  let _pending = engine.on_pending_count(|n| println!("pending {n}"));

  println!(
    "watching {} ({}), {} pending; ctrl-c to stop",
    settings.url,
    if online { "online" } else { "offline" },
    engine.pending_count().await?,
  );

  let mut online_rx = scheduler.subscribe_online();
  let mut error_rx = engine.signals().subscribe_last_error();
  loop {
    tokio::select! {
      res = tokio::signal::ctrl_c() => {
        res.context("waiting for ctrl-c")?;
        break;
      }
      changed = online_rx.changed() => {
        if changed.is_err() {
          break;
        }
        let up = *online_rx.borrow_and_update();
        println!("{}", if up { "online" } else { "offline" });
      }
      changed = error_rx.changed() => {
        if changed.is_err() {
          break;
        }
        if let Some(e) = error_rx.borrow_and_update().clone() {
          println!("sync failed: {e}");
        }
      }
    }
  }

  let status = scheduler.status();
  println!("stopped with {} pending", status.pending);
  Ok(())
}

pub async fn reset(engine: &Engine, yes: bool) -> Result<()> {
  if !yes {
    bail!("reset discards unsynced scores; pass --yes to confirm");
  }
  engine.reset_local_state().await.context("resetting local state")?;
  println!("local state cleared");
  Ok(())
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn station_label(dimension: u8) -> String {
  Station::from_dimension(dimension)
    .map(|s| s.label().to_string())
    .unwrap_or_else(|_| format!("dim {dimension}"))
}

fn fmt_time(at: DateTime<Utc>) -> String {
  at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_scores(records: &[ScoreRecord]) {
  if records.is_empty() {
    println!("  (no scores)");
    return;
  }
  for r in records {
    println!(
      "  {:<16} {:<6} {:>10}  {:<9} {}  {}",
      r.subject_id,
      station_label(r.dimension),
      r.value,
      if r.is_confirmed() { "confirmed" } else { "pending" },
      fmt_time(r.recorded_at),
      r.recorded_by.as_deref().unwrap_or("-"),
    );
  }
}

fn print_report(report: &DrainReport) {
  println!("synced {}, failed {}", report.synced, report.failed);
  for e in &report.errors {
    println!("  {e}");
  }
}
