//! Handlers for `/sanity` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sanity/status` | Full [`SanityDocument`]; always 200 |
//! | `POST` | `/sanity/report` | Body: [`ReportBody`]; returns the addon's new entry |

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use holocron_core::{
  CharacterId,
  board::SanityDocument,
  sanity::{Reported, Snapshot, Status, TelemetryRecord},
  store::SyncStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::{ApiState, error::ApiError};

/// `GET /sanity/status`
pub async fn status<S: SyncStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Json<SanityDocument> {
  Json(state.sanity.lock().await.document(Utc::now()))
}

/// JSON body accepted by `POST /sanity/report`.
///
/// `character` and `addon` are optional here so their absence can be
/// answered with a structured 400 instead of axum's plain-text rejection.
#[derive(Debug, Deserialize)]
pub struct ReportBody {
  pub character: Option<String>,
  pub addon:     Option<String>,
  #[serde(default)]
  pub status:    Status,
  pub code:      Option<String>,
  pub message:   Option<String>,
  pub timestamp: Option<DateTime<Utc>>,
  pub snapshot:  Option<Snapshot>,
}

/// `POST /sanity/report`
pub async fn report<S: SyncStore + 'static>(
  State(state): State<ApiState<S>>,
  Json(body): Json<ReportBody>,
) -> Result<Json<Value>, ApiError> {
  let character = required(body.character, "character")?;
  let addon = required(body.addon, "addon")?;
  // Canonicalize when it names a player; accounts and `System` pass through.
  let character = CharacterId::parse(&character)
    .map(|id| id.to_string())
    .unwrap_or(character);

  let record = TelemetryRecord {
    character: character.clone(),
    addon:     addon.clone(),
    reported:  Reported {
      status:    body.status,
      code:      body.code,
      message:   body.message,
      timestamp: Some(body.timestamp.unwrap_or_else(Utc::now)),
    },
    snapshot:  body.snapshot,
  };
  debug!(character = %character, addon = %addon, "telemetry reported");

  let mut board = state.sanity.lock().await;
  board.record(record);
  let entry = board
    .document(Utc::now())
    .characters
    .remove(&character)
    .and_then(|mut c| c.addons.remove(&addon));
  Ok(Json(json!({ "character": character, "addon": addon, "sanity": entry })))
}

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
  field
    .map(|s| s.trim().to_owned())
    .filter(|s| !s.is_empty())
    .ok_or_else(|| ApiError::BadRequest(format!("missing field `{name}`")))
}
