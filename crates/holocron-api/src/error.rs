//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is `{"code": ..., "message": ...}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use holocron_core::sanity::ReasonCode;
use holocron_ingest::IngestError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }

  pub fn code(&self) -> &'static str {
    match self {
      Self::NotFound(_) => "NOT_FOUND",
      Self::BadRequest(_) => "BAD_REQUEST",
      Self::Store(_) => "STORE_ERROR",
    }
  }
}

impl From<IngestError> for ApiError {
  /// Undecodable uploads are the caller's fault; anything else is ours.
  fn from(e: IngestError) -> Self {
    match e.code() {
      ReasonCode::IngestDecodeFailed => Self::BadRequest(e.to_string()),
      _ => Self::store(e),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Store(e) => {
        error!(error = %e, "request failed in the store");
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    let message = match &self {
      ApiError::NotFound(m) | ApiError::BadRequest(m) => m.clone(),
      ApiError::Store(e) => e.to_string(),
    };
    (status, Json(json!({ "code": self.code(), "message": message }))).into_response()
  }
}
