//! Handler for `POST /upload`: an out-of-band snapshot fed through the same
//! pipeline as watched files.

use axum::{
  Json,
  extract::{Query, State},
};
use bytes::Bytes;
use chrono::Utc;
use holocron_addons::{MapContext, Stream};
use holocron_core::{CharacterId, store::SyncStore};
use holocron_ingest::RunReport;
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

/// Origin recorded in logs and, for streamless uploads, on the sanity board.
pub const ORIGIN: &str = "upload";

#[derive(Debug, Deserialize, Default)]
pub struct UploadParams {
  /// Addon or file name, e.g. `DeepPockets`. Detected from the body if absent.
  pub stream:    Option<String>,
  /// Owner of a per-character snapshot.
  pub character: Option<String>,
  pub account:   Option<String>,
}

/// `POST /upload[?stream=...][&character=...]`, body is the raw snapshot.
pub async fn handler<S: SyncStore + 'static>(
  State(state): State<ApiState<S>>,
  Query(params): Query<UploadParams>,
  body: Bytes,
) -> Result<Json<RunReport>, ApiError> {
  if body.is_empty() {
    return Err(ApiError::BadRequest("empty upload".into()));
  }
  let stream = params
    .stream
    .as_deref()
    .map(|s| {
      Stream::from_file_name(s)
        .or_else(|| Stream::from_name(s))
        .ok_or_else(|| ApiError::BadRequest(format!("unknown stream {s:?}")))
    })
    .transpose()?;

  let mut ctx = MapContext::new(Utc::now());
  ctx.character = params
    .character
    .as_deref()
    .map(CharacterId::parse)
    .transpose()
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
  ctx.account = params.account;

  let report = state
    .pipeline
    .run_bytes(stream, body.to_vec(), ctx, ORIGIN)
    .await?;
  Ok(Json(report))
}
