//! Handler for `GET /characters/{id}`.

use axum::{
  Json,
  extract::{Path, State},
};
use holocron_core::{CharacterId, record::Character, store::SyncStore};

use crate::{ApiState, error::ApiError};

/// `GET /characters/{id}` where `id` is any accepted identity spelling.
pub async fn show<S: SyncStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(raw): Path<String>,
) -> Result<Json<Character>, ApiError> {
  let id = CharacterId::parse(&raw)
    .map_err(|e| ApiError::BadRequest(format!("invalid character id: {e}")))?;
  state
    .store
    .get_character(id.clone())
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("character {id} not found")))
}
