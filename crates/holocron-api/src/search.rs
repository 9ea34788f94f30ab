//! Handler for `GET /search`.

use axum::{
  Json,
  extract::{Query, State},
};
use holocron_core::{
  record::ItemSearchHit,
  store::{ItemQuery, SyncStore},
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  /// An item id, or a case-insensitive name fragment.
  pub q: Option<String>,
}

/// `GET /search?q=<name-or-id>`
pub async fn handler<S: SyncStore + 'static>(
  State(state): State<ApiState<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ItemSearchHit>>, ApiError> {
  let query = params
    .q
    .as_deref()
    .and_then(ItemQuery::parse)
    .ok_or_else(|| ApiError::BadRequest("query parameter `q` is required".into()))?;

  let hits = state.store.search_items(&query).await.map_err(ApiError::store)?;
  Ok(Json(hits))
}
