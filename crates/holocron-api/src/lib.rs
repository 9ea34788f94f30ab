//! JSON Read API for Holocron.
//!
//! Exposes an axum [`Router`] backed by any [`SyncStore`], the shared sanity
//! board and the ingest pipeline used for uploads. Logging layers, TLS and
//! listener setup are the caller's responsibility.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET`  | `/health` | liveness |
//! | `GET`  | `/sanity/status` | [`sanity::status`] |
//! | `POST` | `/sanity/report` | [`sanity::report`] |
//! | `GET`  | `/characters/{id}` | [`characters::show`] |
//! | `GET`  | `/search?q=` | [`search::handler`] |
//! | `POST` | `/upload` | [`upload::handler`] |
//! | `POST` | `/jobs` | [`jobs::create`] |

pub mod characters;
pub mod error;
pub mod jobs;
pub mod sanity;
pub mod search;
pub mod upload;

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use holocron_core::store::SyncStore;
use holocron_ingest::{Pipeline, SharedBoard};
use serde_json::{Value, json};

pub use error::ApiError;

/// Saved-variables files of heavy inventory addons run to tens of megabytes.
pub const UPLOAD_LIMIT: usize = 64 * 1024 * 1024;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub sanity:   SharedBoard,
  pub pipeline: Pipeline<S>,
}

impl<S: SyncStore + 'static> ApiState<S> {
  pub fn new(pipeline: Pipeline<S>) -> Self {
    Self {
      store: pipeline.store().clone(),
      sanity: pipeline.sanity().clone(),
      pipeline,
    }
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      sanity:   self.sanity.clone(),
      pipeline: self.pipeline.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router. The returned `Router<()>` can be nested into any
/// parent router regardless of its own state type.
pub fn api_router<S: SyncStore + 'static>(state: ApiState<S>) -> Router<()> {
  Router::new()
    .route("/health", get(health))
    // Sanity
    .route("/sanity/status", get(sanity::status::<S>))
    .route("/sanity/report", post(sanity::report::<S>))
    // Inventory
    .route("/characters/{id}", get(characters::show::<S>))
    .route("/search", get(search::handler::<S>))
    .route(
      "/upload",
      post(upload::handler::<S>).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
    )
    .route("/jobs", post(jobs::create::<S>))
    .with_state(state)
}

async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

#[cfg(test)]
mod tests;
