//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request lost against current store state. `detail` carries what
  /// was expected and what was found so a curator can decide to retry.
  #[error("conflict: {message}")]
  Conflict {
    message: String,
    detail:  serde_json::Value,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<biomap_core::Error> for ApiError {
  fn from(e: biomap_core::Error) -> Self {
    use biomap_core::Error as E;

    let message = e.to_string();
    match e {
      E::Malformed(_) | E::InvalidDecision(_) | E::SelfMapping(_) | E::NotAPrediction(_) => {
        Self::BadRequest(message)
      }
      E::NotFound { .. } => Self::NotFound(message),
      E::StaleRecord { key, expected_position, found } => Self::Conflict {
        message,
        detail: json!({
          "reason": "stale",
          "retryable": true,
          "key": key,
          "expected_position": expected_position,
          "found": found,
        }),
      },
      E::DuplicateMapping { candidate, existing } => Self::Conflict {
        message,
        detail: json!({
          "reason": "duplicate",
          "retryable": false,
          "candidate": candidate,
          "existing": existing,
        }),
      },
      E::Store(inner) => Self::Store(inner),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, json!({ "error": m })),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Conflict { message, detail } => {
        (StatusCode::CONFLICT, json!({ "error": message, "conflict": detail }))
      }
      ApiError::Store(e) => {
        tracing::error!("store error: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": e.to_string() }))
      }
      ApiError::Internal(m) => {
        tracing::error!("internal error: {m}");
        (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": m }))
      }
    };
    (status, Json(body)).into_response()
  }
}
