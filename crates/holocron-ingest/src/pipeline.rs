//! decode → map → persist for one snapshot.
//!
//! Decoding and mapping are CPU-bound and run on the blocking pool. Records
//! are persisted one by one, in mapper order, so a character row always
//! exists before its inventory is replaced. Telemetry goes to the sanity
//! board only after every write succeeded.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use holocron_addons::{MapContext, MapOutput, Record, Stream};
use holocron_core::{
  board::SanityBoard, sanity::TelemetryRecord, store::SyncStore,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{IngestError, Result, source::SnapshotSource};

/// The sanity board shared by the pipeline, the enrichment worker and the
/// Read API.
pub type SharedBoard = Arc<Mutex<SanityBoard>>;

const PERSIST_ATTEMPTS: u32 = 3;
const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// What one run wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub characters:  usize,
  pub stacks:      usize,
  pub professions: usize,
  pub recipes:     usize,
  pub price_rows:  usize,
  pub telemetry:   usize,
  /// Records dropped by the mapper.
  pub dropped:     usize,
}

pub struct Pipeline<S> {
  store:  Arc<S>,
  sanity: SharedBoard,
}

impl<S> Clone for Pipeline<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), sanity: self.sanity.clone() }
  }
}

impl<S: SyncStore + 'static> Pipeline<S> {
  pub fn new(store: Arc<S>, sanity: SharedBoard) -> Self {
    Self { store, sanity }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn sanity(&self) -> &SharedBoard { &self.sanity }

  /// Read a snapshot file and run it, using its mtime as observation time.
  pub async fn run_file(&self, source: &SnapshotSource) -> Result<RunReport> {
    let read = async {
      let meta = tokio::fs::metadata(&source.path).await?;
      let bytes = tokio::fs::read(&source.path).await?;
      Ok::<_, std::io::Error>((bytes, meta.modified()?))
    };
    let (bytes, mtime) = match read.await {
      Ok(read) => read,
      Err(e) => {
        let err = IngestError::Read { path: source.path.clone(), source: e };
        self.report_failure(&source.component(), &err).await;
        return Err(err);
      }
    };
    let ctx = source.context(DateTime::<Utc>::from(mtime));
    let origin = source.path.display().to_string();
    self.run_bytes(Some(source.stream), bytes, ctx, &origin).await
  }

  /// Run already-read snapshot bytes. Without a `stream`, the stream is
  /// detected from the snapshot's global names.
  pub async fn run_bytes(
    &self,
    stream: Option<Stream>,
    bytes: Vec<u8>,
    ctx: MapContext,
    origin: &str,
  ) -> Result<RunReport> {
    let component = stream
      .map(Stream::file_name)
      .unwrap_or_else(|| origin.to_owned());

    let mapped = {
      let origin = origin.to_owned();
      tokio::task::spawn_blocking(move || decode_and_map(stream, &bytes, &ctx, origin))
        .await
        .map_err(IngestError::from)
        .and_then(|r| r)
    };
    let (stream, output) = match mapped {
      Ok(mapped) => mapped,
      Err(err) => {
        self.report_failure(&component, &err).await;
        return Err(err);
      }
    };

    for e in &output.errors {
      warn!(origin, stream = %stream, path = %e.path, reason = %e.reason, "dropped record");
    }

    match self.persist(output, origin).await {
      Ok((mut report, telemetry)) => {
        report.telemetry = telemetry.len();
        let mut board = self.sanity.lock().await;
        board.component_ok(&stream.file_name(), Utc::now());
        for t in telemetry {
          board.record(t);
        }
        drop(board);
        info!(origin, stream = %stream, ?report, "snapshot ingested");
        Ok(report)
      }
      Err(err) => {
        self.report_failure(&stream.file_name(), &err).await;
        Err(err)
      }
    }
  }

  async fn persist(
    &self,
    output: MapOutput,
    origin: &str,
  ) -> Result<(RunReport, Vec<TelemetryRecord>)> {
    let store = &*self.store;
    let mut report = RunReport { dropped: output.errors.len(), ..RunReport::default() };
    let mut prices = Vec::new();
    let mut telemetry = Vec::new();

    for record in output.records {
      match record {
        Record::Character(r) => {
          self.retry(origin, || store.upsert_character(r.clone())).await?;
          report.characters += 1;
        }
        Record::Inventory { character, scan } => {
          let summary = self.retry(origin, || {
            store.replace_inventory(character.clone(), scan.clone())
          })
          .await?;
          report.stacks += summary.inserted;
        }
        Record::Profession(r) => {
          let previous = self.retry(origin, || store.upsert_profession(r.clone())).await?;
          if let Some(was) = previous
            && was > r.skill
          {
            debug!(character = %r.character, profession = %r.name, was, now = r.skill, "skill decreased");
          }
          report.professions += 1;
        }
        Record::Recipe(r) => {
          self.retry(origin, || store.upsert_recipe(r.clone())).await?;
          report.recipes += 1;
        }
        Record::PriceScan(row) => prices.push(row),
        Record::Telemetry(t) => telemetry.push(t),
      }
    }

    if !prices.is_empty() {
      report.price_rows =
        self.retry(origin, || store.append_scan_batch(prices.clone())).await?;
    }
    Ok((report, telemetry))
  }

  /// Retry `op` while the store reports a transient error.
  async fn retry<T, F, Fut>(&self, origin: &str, mut op: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, S::Error>>,
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(e) if S::is_transient(&e) && attempt + 1 < PERSIST_ATTEMPTS => {
          let delay = PERSIST_BACKOFF * 2u32.pow(attempt);
          warn!(origin, attempt, delay_ms = delay.as_millis() as u64, error = %e, "store busy, retrying");
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => {
          return Err(IngestError::Persist {
            origin:  origin.to_owned(),
            message: e.to_string(),
          });
        }
      }
    }
  }

  pub(crate) async fn report_failure(&self, component: &str, err: &IngestError) {
    warn!(component, error = %err, "ingest failed");
    self
      .sanity
      .lock()
      .await
      .component_issue(component, err.code(), err.to_string(), Utc::now());
  }
}

fn decode_and_map(
  stream: Option<Stream>,
  bytes: &[u8],
  ctx: &MapContext,
  origin: String,
) -> Result<(Stream, MapOutput)> {
  let decoded = match holocron_lua::decode(bytes) {
    Ok(decoded) => decoded,
    Err(source) => return Err(IngestError::Decode { origin, source }),
  };
  if decoded.truncated {
    return Err(IngestError::Truncated { origin });
  }
  for dup in &decoded.duplicates {
    debug!(origin = %origin, path = %dup.path, key = %dup.key, occurrences = dup.occurrences, "duplicate key");
  }
  let Some(stream) = stream.or_else(|| Stream::detect(&decoded)) else {
    return Err(IngestError::UnknownStream { origin });
  };
  Ok((stream, holocron_addons::map(stream, &decoded, ctx)))
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use holocron_core::{CharacterId, board::SYSTEM, sanity::Status};
  use holocron_store_sqlite::SqliteStore;

  use super::*;

  const INVENTORY: &str =
    r#"DeepPocketsDB = { ["Aria - Ridge"] = { { id = 101, count = 5, loc = "Bag" } } }"#;

  async fn pipeline() -> Pipeline<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    Pipeline::new(Arc::new(store), SharedBoard::default())
  }

  fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
  }

  fn aria() -> CharacterId { CharacterId::parse("Aria - Ridge").unwrap() }

  #[tokio::test]
  async fn inventory_run_updates_store_and_board() {
    let p = pipeline().await;
    let report = p
      .run_bytes(Some(Stream::Inventory), INVENTORY.into(), MapContext::new(at(1_700_000_000)), "test")
      .await
      .unwrap();
    assert_eq!(report.characters, 1);
    assert_eq!(report.stacks, 1);
    assert_eq!(report.telemetry, 1);

    let stacks = p.store().inventory(aria()).await.unwrap();
    assert_eq!(stacks.len(), 1);
    assert_eq!(stacks[0].count, 5);

    let board = p.sanity().lock().await;
    let state = board.get("Player-Ridge-Aria", "DeepPockets").unwrap();
    assert_eq!(state.snapshot.as_ref().unwrap().count("inv_count"), Some(5));
  }

  #[tokio::test]
  async fn bare_inventory_keeps_known_character_attributes() {
    let p = pipeline().await;
    let full = r#"DeepPocketsDB = { ["Aria - Ridge"] = {
      class = "Warrior", level = 70,
      items = { { id = 101, count = 5, loc = "Bag" } },
    } }"#;
    p.run_bytes(Some(Stream::Inventory), full.into(), MapContext::new(at(1_700_000_000)), "test")
      .await
      .unwrap();

    let bare = r#"DeepPocketsDB = { ["Aria - Ridge"] = { { id = 101, count = 6, loc = "Bag" } } }"#;
    p.run_bytes(Some(Stream::Inventory), bare.into(), MapContext::new(at(1_700_000_600)), "test")
      .await
      .unwrap();

    let c = p.store().get_character(aria()).await.unwrap().unwrap();
    assert_eq!(c.class.as_deref(), Some("Warrior"));
    assert_eq!(c.level, Some(70));
    assert_eq!(p.store().inventory(aria()).await.unwrap()[0].count, 6);
  }

  #[tokio::test]
  async fn truncated_snapshot_is_reported_and_writes_nothing() {
    let p = pipeline().await;
    let err = p
      .run_bytes(
        Some(Stream::Inventory),
        br#"DeepPocketsDB = { ["Aria - Ridge"] = { { id = 101"#.to_vec(),
        MapContext::new(at(1_700_000_000)),
        "test",
      )
      .await
      .unwrap_err();
    assert!(matches!(err, IngestError::Truncated { .. }), "{err}");
    assert!(p.store().get_character(aria()).await.unwrap().is_none());

    let board = p.sanity().lock().await;
    let state = board.get(SYSTEM, "DeepPockets.lua").unwrap();
    assert_eq!(state.reported.code.as_deref(), Some("INGEST_DECODE_FAILED"));
  }

  #[tokio::test]
  async fn uploads_detect_their_stream() {
    let p = pipeline().await;
    let ctx = MapContext::new(at(1_700_000_000));
    p.run_bytes(None, INVENTORY.into(), ctx.clone(), "upload").await.unwrap();
    assert!(p.store().get_character(aria()).await.unwrap().is_some());

    let err = p.run_bytes(None, b"Unrelated = 1".to_vec(), ctx, "upload").await.unwrap_err();
    assert!(matches!(err, IngestError::UnknownStream { .. }));
    let board = p.sanity().lock().await;
    assert_eq!(
      board.get(SYSTEM, "upload").unwrap().reported.status,
      Status::Warn
    );
  }

  #[tokio::test]
  async fn replaying_a_snapshot_leaves_state_unchanged() {
    let p = pipeline().await;
    let ctx = MapContext::new(at(1_700_000_000));
    p.run_bytes(Some(Stream::Inventory), INVENTORY.into(), ctx.clone(), "test").await.unwrap();
    let first = p.store().state_digest().await.unwrap();
    p.run_bytes(Some(Stream::Inventory), INVENTORY.into(), ctx, "test").await.unwrap();
    assert_eq!(p.store().state_digest().await.unwrap(), first);
  }

  #[tokio::test]
  async fn per_character_files_take_identity_from_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let sv = dir.path().join("WTF/Account/ACME/Ridge/Aria/SavedVariables");
    std::fs::create_dir_all(&sv).unwrap();
    let file = sv.join("SkillWeaver.lua");
    std::fs::write(&file, "SkillWeaverDB = { spec = 62, sequences = {} }").unwrap();

    let p = pipeline().await;
    let source = SnapshotSource::from_path(Path::new(&file)).unwrap();
    p.run_file(&source).await.unwrap();

    let doc = p.sanity().lock().await.document(Utc::now());
    let sw = &doc.characters["Player-Ridge-Aria"].addons["SkillWeaver"];
    let codes: Vec<_> = sw.reasons.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["SW_SPEC_NO_MODULES"]);
  }
}
