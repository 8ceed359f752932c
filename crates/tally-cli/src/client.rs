//! Async HTTP client for the tally score service.
//!
//! [`HttpRemote`] implements [`RemoteScores`] for the sync engine and
//! [`Probe`] for the scheduler. Transport failures, timeouts and `5xx`
//! answers are reported as unreachable; `4xx` answers as rejected.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tally_core::{
  ScoreRecord, ScoreWrite,
  remote::{RemoteError, RemoteScores},
};
use tally_sync::Probe;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpRemote {
  client:   Client,
  base_url: String,
}

#[derive(Deserialize)]
struct ErrorBody {
  error: String,
}

impl HttpRemote {
  pub fn new(base_url: impl Into<String>) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, base_url: base_url.into() })
  }

  pub fn base_url(&self) -> &str { &self.base_url }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }
}

fn transport(what: &str, e: reqwest::Error) -> RemoteError {
  RemoteError::Unreachable(format!("{what}: {e}"))
}

/// Turn a non-success answer into the matching [`RemoteError`].
async fn check(what: &str, resp: Response) -> Result<Response, RemoteError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let message = match resp.json::<ErrorBody>().await {
    Ok(body) => body.error,
    Err(_) => status.canonical_reason().unwrap_or("no reason").to_string(),
  };
  let message = format!("{what} → {status}: {message}");
  if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
    Err(RemoteError::Unreachable(message))
  } else {
    Err(RemoteError::Rejected(message))
  }
}

impl RemoteScores for HttpRemote {
  /// `POST /scores`
  async fn upsert_scores(&self, writes: Vec<ScoreWrite>) -> Result<Vec<ScoreRecord>, RemoteError> {
    let resp = self
      .client
      .post(self.url("/scores"))
      .json(&writes)
      .send()
      .await
      .map_err(|e| transport("POST /scores", e))?;
    let resp = check("POST /scores", resp).await?;
    resp.json().await.map_err(|e| transport("decoding confirmed scores", e))
  }

  /// `GET /scores?subject_id=a&subject_id=b`
  async fn fetch_scores(&self, subject_ids: &[String]) -> Result<Vec<ScoreRecord>, RemoteError> {
    let query: Vec<(&str, &str)> =
      subject_ids.iter().map(|id| ("subject_id", id.as_str())).collect();
    let resp = self
      .client
      .get(self.url("/scores"))
      .query(&query)
      .send()
      .await
      .map_err(|e| transport("GET /scores", e))?;
    let resp = check("GET /scores", resp).await?;
    resp.json().await.map_err(|e| transport("decoding scores", e))
  }
}

impl Probe for HttpRemote {
  /// `GET /health`
  async fn probe(&self) -> bool {
    match self.client.get(self.url("/health")).timeout(PROBE_TIMEOUT).send().await {
      Ok(resp) => resp.status().is_success(),
      Err(e) => {
        debug!(error = %e, "health probe failed");
        false
      }
    }
  }
}
