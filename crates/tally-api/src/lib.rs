//! Reference remote scoring service for tally.
//!
//! Exposes an axum [`Router`] backed by any
//! [`tally_core::remote::RemoteScores`] implementation, normally a
//! [`tally_store_sqlite::SqliteBoard`]. Devices running the sync engine push
//! their queued writes here and read the authoritative scores back.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/health` | `200 ok` |
//! | `GET`  | `/scores` | `?subject_id=a&subject_id=b` (or `?subject_ids=a,b`) |
//! | `POST` | `/scores` | Body: JSON array of `ScoreWrite`; returns the confirmed records |

pub mod error;
pub mod scores;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use serde::Deserialize;
use tally_core::remote::RemoteScores;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `server.toml` and
/// `TALLY_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("~/.local/share/tally/board.db"),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `board`.
pub fn api_router<B>(board: Arc<B>) -> Router<()>
where
  B: RemoteScores + 'static,
{
  Router::new()
    .route("/health", get(health))
    .route("/scores", get(scores::list::<B>).post(scores::upsert::<B>))
    .layer(TraceLayer::new_for_http())
    .with_state(board)
}

/// `GET /health`
async fn health() -> &'static str { "ok" }
