//! Handlers for `/scores`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use tally_core::{ScoreRecord, ScoreWrite, remote::RemoteScores};
use tracing::info;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

/// Subject ids named by a list query.
///
/// Each `subject_id` pair names one id verbatim, so ids may contain commas.
/// `subject_ids` takes a comma-separated list.
fn requested_ids(pairs: Vec<(String, String)>) -> Vec<String> {
  let mut ids = Vec::new();
  for (key, value) in pairs {
    match key.as_str() {
      "subject_id" if !value.is_empty() => ids.push(value),
      "subject_ids" => {
        ids.extend(value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned))
      }
      _ => {}
    }
  }
  ids
}

/// `GET /scores?subject_id=a&subject_id=b` or `GET /scores?subject_ids=a,b`
pub async fn list<B>(
  State(board): State<Arc<B>>,
  Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<ScoreRecord>>, ApiError>
where
  B: RemoteScores,
{
  let ids = requested_ids(pairs);
  if ids.is_empty() {
    return Err(ApiError::BadRequest("name at least one subject with subject_id".into()));
  }
  let records = board.fetch_scores(&ids).await?;
  Ok(Json(records))
}

// ─── Upsert ───────────────────────────────────────────────────────────────────

/// `POST /scores` with a JSON array of writes. Returns the confirmed records.
pub async fn upsert<B>(
  State(board): State<Arc<B>>,
  Json(writes): Json<Vec<ScoreWrite>>,
) -> Result<Json<Vec<ScoreRecord>>, ApiError>
where
  B: RemoteScores,
{
  let count = writes.len();
  let confirmed = board.upsert_scores(writes).await?;
  info!(count, "scores upserted");
  Ok(Json(confirmed))
}
