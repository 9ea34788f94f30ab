//! The client-loadable artifact: `IndexDB` and `JobsDB` in table-literal
//! form.
//!
//! Rendering is a pure function of the store rows, and the output carries no
//! timestamp, so unchanged inputs give byte-identical files. Writes go
//! through `<path>.tmp`, are fsynced, then renamed over `<path>`.

use std::{
  ffi::OsString,
  path::{Path, PathBuf},
};

use holocron_core::{record::ArtifactRows, store::SyncStore};
use holocron_lua::{Key, Table, Value, emit_globals};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{IngestError, Result};

const HEADER: &str = "-- Generated by Holocron. Do not edit; this file is overwritten on sync.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitted {
  Written,
  Unchanged,
}

#[derive(Debug, Clone)]
pub struct ArtifactEmitter {
  path: PathBuf,
}

impl ArtifactEmitter {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }

  pub fn path(&self) -> &Path { &self.path }

  /// Read the store in one transaction and write the artifact if its bytes
  /// changed.
  pub async fn emit<S: SyncStore>(&self, store: &S) -> Result<Emitted> {
    let rows = store
      .artifact_rows()
      .await
      .map_err(|e| IngestError::ArtifactStore(e.to_string()))?;
    let text = render(&rows);

    match tokio::fs::read(&self.path).await {
      Ok(existing) if existing == text.as_bytes() => {
        debug!(path = %self.path.display(), "artifact unchanged");
        return Ok(Emitted::Unchanged);
      }
      Ok(_) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(source) => return Err(self.io_error(source)),
    }

    self.write_atomic(text.as_bytes()).await.map_err(|e| self.io_error(e))?;
    info!(
      path = %self.path.display(),
      items = rows.index.len(),
      jobs = rows.jobs.len(),
      "artifact written"
    );
    Ok(Emitted::Written)
  }

  async fn write_atomic(&self, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = self.path.parent()
      && !dir.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = tmp_path(&self.path);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, &self.path).await
  }

  fn io_error(&self, source: std::io::Error) -> IngestError {
    IngestError::Artifact { path: self.path.clone(), source }
  }
}

fn tmp_path(path: &Path) -> PathBuf {
  let mut tmp = OsString::from(path.as_os_str());
  tmp.push(".tmp");
  PathBuf::from(tmp)
}

/// Render the artifact text. Rows arrive ordered by item id then container
/// type, and jobs by character.
pub fn render(rows: &ArtifactRows) -> String {
  let mut index: Vec<(u32, Option<String>, u64, Table)> = Vec::new();
  for row in &rows.index {
    if index.last().is_none_or(|last| last.0 != row.item_id) {
      index.push((row.item_id, None, 0, Table::new()));
    }
    let Some(entry) = index.last_mut() else { continue };
    if entry.1.is_none() {
      entry.1 = row.name.clone();
    }
    entry.2 += row.count;
    entry.3.insert(row.container_type.as_str(), Value::Int(clamp(row.count)));
  }

  let index_db: Table = index
    .into_iter()
    .map(|(item_id, name, total, locations)| {
      let mut item = Table::new();
      if let Some(name) = name {
        item.insert("name", Value::Str(name));
      }
      item.insert("total", Value::Int(clamp(total)));
      item.insert("locations", Value::Map(locations));
      (Key::Int(i64::from(item_id)), Value::Map(item))
    })
    .collect();

  let mut jobs_db = Table::new();
  let mut current: Option<(String, Vec<Value>)> = None;
  for job in &rows.jobs {
    let mut entry = Table::new();
    entry.insert("itemID", Value::Int(i64::from(job.item_id)));
    entry.insert("count", Value::Int(i64::from(job.count)));
    entry.insert("target", Value::Str(job.target.clone()));

    match &mut current {
      Some((character, list)) if character == job.character.as_str() => {
        list.push(Value::Map(entry));
      }
      _ => {
        if let Some((character, list)) = current.take() {
          jobs_db.insert(character, Value::List(list));
        }
        current = Some((job.character.to_string(), vec![Value::Map(entry)]));
      }
    }
  }
  if let Some((character, list)) = current {
    jobs_db.insert(character, Value::List(list));
  }

  let mut globals = Table::new();
  globals.insert("IndexDB", Value::Map(index_db));
  globals.insert("JobsDB", Value::Map(jobs_db));

  let mut out = String::from(HEADER);
  out.push_str(&emit_globals(&globals));
  out
}

fn clamp(n: u64) -> i64 { i64::try_from(n).unwrap_or(i64::MAX) }
