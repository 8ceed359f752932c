//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use tally_core::remote::RemoteError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("rejected: {0}")]
  Rejected(String),

  #[error("board unavailable: {0}")]
  Unavailable(String),
}

impl From<RemoteError> for ApiError {
  fn from(e: RemoteError) -> Self {
    match e {
      RemoteError::Rejected(m) => ApiError::Rejected(m),
      RemoteError::Unreachable(m) => ApiError::Unavailable(m),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Rejected(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Unavailable(m) => {
        tracing::error!(error = %m, "board unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, m.clone())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
