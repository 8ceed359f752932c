//! `tally`: offline-first score entry for event judges.
//!
//! Scores are written to a local SQLite store first and pushed to the score
//! service when it is reachable.
//!
//! # Usage
//!
//! ```
//! tally --url http://scores.local:8080 --actor judge-9 record athlete-1 run 4200
//! tally batch athlete-1:row:95.5 athlete-2:bike:610 --sync
//! tally show athlete-1 athlete-2
//! tally watch
//! ```

mod client;
mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::ScoreEntry;
use config::{ConfigFile, Settings};
use tally_core::station::Station;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Offline-first score entry for event judges")]
struct Args {
  /// Path to a TOML config file (url, actor, store, [sync]).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the score service (default: http://localhost:8080).
  #[arg(long, env = "TALLY_URL")]
  url: Option<String>,

  /// Judge id recorded with every score.
  #[arg(long, env = "TALLY_ACTOR")]
  actor: Option<String>,

  /// Local store file (default: ~/.local/share/tally/local.db).
  #[arg(long, env = "TALLY_STORE", value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Record one score.
  Record {
    athlete: String,
    /// 1-4 or run, row, bike, ski.
    station: Station,
    value:   f64,
    /// Push queued writes right away.
    #[arg(long)]
    sync:    bool,
  },
  /// Record several scores given as ATHLETE:STATION:VALUE.
  Batch {
    #[arg(required = true, value_parser = commands::parse_entry)]
    entries: Vec<ScoreEntry>,
    #[arg(long)]
    sync:    bool,
  },
  /// Show scores for athletes: the local copy, then the reconciled view.
  Show {
    #[arg(required = true)]
    athletes: Vec<String>,
    /// Only read the local store.
    #[arg(long)]
    local:    bool,
  },
  /// Show the pending queue, last sync and service reachability.
  Status {
    #[arg(long)]
    json: bool,
  },
  /// Push queued writes now.
  Sync,
  /// Keep running and sync whenever the service is reachable.
  Watch,
  /// Discard local scores and queued writes.
  Reset {
    #[arg(long)]
    yes: bool,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg = match &args.config {
    Some(path) => ConfigFile::load(path)?,
    None => ConfigFile::default(),
  };
  let settings = Settings::resolve(args.url, args.actor, args.store, file_cfg);

  let engine = commands::open_engine(&settings).await?;

  match args.command {
    Command::Record { athlete, station, value, sync } => {
      commands::record(&engine, &settings, ScoreEntry { athlete, station, value }, sync).await
    }
    Command::Batch { entries, sync } => commands::batch(&engine, &settings, entries, sync).await,
    Command::Show { athletes, local } => commands::show(&engine, athletes, local).await,
    Command::Status { json } => commands::status(&engine, json).await,
    Command::Sync => commands::sync(&engine).await,
    Command::Watch => commands::watch(&engine, &settings).await,
    Command::Reset { yes } => commands::reset(&engine, yes).await,
  }
}
