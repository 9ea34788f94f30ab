//! Handler for `POST /jobs`, the feed behind the artifact's `JobsDB`.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use holocron_core::{CharacterId, record::JobRecord, store::SyncStore};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct JobBody {
  pub character: String,
  pub item_id:   u32,
  pub count:     u32,
  pub target:    String,
}

/// `POST /jobs`, returns 201 + the stored job.
pub async fn create<S: SyncStore + 'static>(
  State(state): State<ApiState<S>>,
  Json(body): Json<JobBody>,
) -> Result<impl IntoResponse, ApiError> {
  let character =
    CharacterId::parse(&body.character).map_err(|e| ApiError::BadRequest(e.to_string()))?;
  if body.target.trim().is_empty() {
    return Err(ApiError::BadRequest("missing field `target`".into()));
  }
  let job = JobRecord {
    character,
    item_id: body.item_id,
    count: body.count,
    target: body.target.trim().to_owned(),
  };
  state.store.upsert_job(job.clone()).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(job)))
}
