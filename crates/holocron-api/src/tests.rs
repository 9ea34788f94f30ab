//! Router tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use holocron_core::{CharacterId, store::SyncStore};
use holocron_ingest::{Pipeline, SharedBoard};
use holocron_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{ApiState, api_router};

const INVENTORY: &str =
  r#"DeepPocketsDB = { ["Aria - Ridge"] = { { id = 101, count = 5, loc = "Bag" } } }"#;

async fn state() -> ApiState<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  ApiState::new(Pipeline::new(Arc::new(store), SharedBoard::default()))
}

async fn send(state: &ApiState<SqliteStore>, req: Request<Body>) -> Response {
  api_router(state.clone()).oneshot(req).await.unwrap()
}

async fn get(state: &ApiState<SqliteStore>, uri: &str) -> Response {
  send(state, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post_json(state: &ApiState<SqliteStore>, uri: &str, body: Value) -> Response {
  let req = Request::post(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap();
  send(state, req).await
}

async fn post_raw(state: &ApiState<SqliteStore>, uri: &str, body: &str) -> Response {
  send(state, Request::post(uri).body(Body::from(body.to_owned())).unwrap()).await
}

async fn json_body(resp: Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

// ── Health & sanity ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_is_ok() {
  let state = state().await;
  let resp = get(&state, "/health").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn empty_board_reports_ok() {
  let state = state().await;
  let resp = get(&state, "/sanity/status").await;
  assert_eq!(resp.status(), StatusCode::OK);
  let doc = json_body(resp).await;
  assert_eq!(doc["overall"], "OK");
  assert_eq!(doc["characters"], json!({}));
}

#[tokio::test]
async fn reported_failure_surfaces_with_its_code() {
  let state = state().await;
  let resp = post_json(
    &state,
    "/sanity/report",
    json!({
      "character": "Aria - Ridge",
      "addon": "PetWeaver",
      "status": "FAIL",
      "code": "PW_NO_TEAMS",
      "message": "no teams configured",
    }),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["character"], "Player-Ridge-Aria");

  let doc = json_body(get(&state, "/sanity/status").await).await;
  assert_eq!(doc["overall"], "FAIL");
  let pw = &doc["characters"]["Player-Ridge-Aria"]["addons"]["PetWeaver"];
  assert_eq!(pw["status"], "FAIL");
  let reasons = pw["reasons"].as_array().unwrap();
  assert!(reasons.iter().all(|r| r["code"].is_string() && r["message"].is_string()));
}

#[tokio::test]
async fn report_without_addon_is_rejected() {
  let state = state().await;
  let resp = post_json(&state, "/sanity/report", json!({ "character": "Aria - Ridge" })).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  let body = json_body(resp).await;
  assert_eq!(body["code"], "BAD_REQUEST");
  assert!(body["message"].as_str().unwrap().contains("addon"));
}

// ── Upload & search ─────────────────────────────────────────────────────────

#[tokio::test]
async fn uploaded_inventory_is_searchable() {
  let state = state().await;
  let resp = post_raw(&state, "/upload?stream=DeepPockets", INVENTORY).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let report = json_body(resp).await;
  assert_eq!(report["characters"], 1);
  assert_eq!(report["stacks"], 1);

  let resp = get(&state, "/search?q=101").await;
  assert_eq!(resp.status(), StatusCode::OK);
  let hits = json_body(resp).await;
  let hits = hits.as_array().unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0]["item_id"], 101);
  assert_eq!(hits[0]["count"], 5);
  assert_eq!(hits[0]["character"], "Player-Ridge-Aria");
}

#[tokio::test]
async fn truncated_upload_is_a_bad_request_and_flagged() {
  let state = state().await;
  let resp = post_raw(&state, "/upload", r#"DeepPocketsDB = { ["Aria - Ridge"] = {"#).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert_eq!(json_body(resp).await["code"], "BAD_REQUEST");

  let doc = json_body(get(&state, "/sanity/status").await).await;
  assert_ne!(doc["overall"], "OK");
  let aria = CharacterId::parse("Aria - Ridge").unwrap();
  assert!(state.store.get_character(aria).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_stream_parameter_is_rejected() {
  let state = state().await;
  let resp = post_raw(&state, "/upload?stream=NotAnAddon", INVENTORY).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_requires_a_query() {
  let state = state().await;
  for uri in ["/search", "/search?q=", "/search?q=%20"] {
    let resp = get(&state, uri).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
  }
  let resp = get(&state, "/search?q=nothing").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await, json!([]));
}

#[tokio::test]
async fn character_lookup_accepts_any_spelling() {
  let state = state().await;
  let resp = post_raw(&state, "/upload?stream=DeepPockets", INVENTORY).await;
  assert_eq!(resp.status(), StatusCode::OK);

  for uri in ["/characters/Player-Ridge-Aria", "/characters/aria-ridge"] {
    let resp = get(&state, uri).await;
    assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    let body = json_body(resp).await;
    assert_eq!(body["id"], "Player-Ridge-Aria");
    assert_eq!(body["class"], "Unknown");
    assert_eq!(body["level"], 80);
  }
}

#[tokio::test]
async fn unknown_character_is_not_found() {
  let state = state().await;
  let resp = get(&state, "/characters/Player-Ridge-Nobody").await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  let body = json_body(resp).await;
  assert_eq!(body["code"], "NOT_FOUND");
  assert_eq!(body["message"], "character Player-Ridge-Nobody not found");

  let resp = get(&state, "/characters/Nobody").await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Jobs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn jobs_feed_the_artifact_rows() {
  let state = state().await;
  let resp = post_json(
    &state,
    "/jobs",
    json!({ "character": "Aria - Ridge", "item_id": 194820, "count": 40, "target": "Bank" }),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::CREATED);

  let rows = state.store.artifact_rows().await.unwrap();
  assert_eq!(rows.jobs.len(), 1);
  assert_eq!(rows.jobs[0].character.as_str(), "Player-Ridge-Aria");
  assert_eq!(rows.jobs[0].count, 40);

  let resp = post_json(
    &state,
    "/jobs",
    json!({ "character": "nohyphen", "item_id": 1, "count": 1, "target": "Bank" }),
  )
  .await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
