//! Polling watcher over the SavedVariables roots.
//!
//! Every `poll` interval the roots are walked and each tracked file's mtime
//! is fed to the [`Debouncer`]. When a file settles, a confirmation stat
//! checks the mtime has not moved, then the pipeline runs on a worker. The
//! processed `(mtime, sha256)` per path suppresses reruns of identical
//! content; failures back off and eventually quarantine the path until its
//! mtime changes.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  path::PathBuf,
  sync::Arc,
  time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use holocron_core::{sanity::ReasonCode, store::SyncStore};
use sha2::{Digest, Sha256};
use tokio::{
  sync::Semaphore,
  task::{Id, JoinSet},
  time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::{
  IngestError, Result,
  artifact::ArtifactEmitter,
  debounce::Debouncer,
  pipeline::Pipeline,
  source::SnapshotSource,
};

#[derive(Debug, Clone)]
pub struct WatchConfig {
  pub roots:       Vec<PathBuf>,
  pub cooldown:    Duration,
  pub poll:        Duration,
  pub max_workers: usize,
  /// Consecutive failures before a path is quarantined.
  pub max_retries: u32,
  /// How long in-flight runs may take to finish on shutdown.
  pub grace:       Duration,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      roots:       Vec::new(),
      cooldown:    Duration::from_millis(2000),
      poll:        Duration::from_millis(500),
      max_workers: 4,
      max_retries: 3,
      grace:       Duration::from_secs(30),
    }
  }
}

impl WatchConfig {
  /// `min(available_parallelism, max_workers)`, at least one.
  pub fn worker_cap(&self) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    self.max_workers.min(cores).max(1)
  }
}

type Digest256 = [u8; 32];

#[derive(Debug, Default)]
struct FileState {
  processed:   Option<(SystemTime, Digest256)>,
  failures:    u32,
  /// Set while quarantined, to the mtime that kept failing.
  quarantined: Option<SystemTime>,
}

enum Outcome {
  Ran(Digest256),
  Unchanged,
}

struct Done {
  path:   PathBuf,
  mtime:  SystemTime,
  result: Result<Outcome>,
}

pub struct Watcher<S> {
  config:   WatchConfig,
  pipeline: Pipeline<S>,
  artifact: Option<ArtifactEmitter>,
}

impl<S: SyncStore + 'static> Watcher<S> {
  pub fn new(config: WatchConfig, pipeline: Pipeline<S>) -> Self {
    Self { config, pipeline, artifact: None }
  }

  /// Re-emit this artifact after every successful run.
  pub fn with_artifact(mut self, artifact: ArtifactEmitter) -> Self {
    self.artifact = Some(artifact);
    self
  }

  /// Watch until `cancel` fires, then drain in-flight runs within the
  /// grace period and abort the rest.
  pub async fn run(self, cancel: CancellationToken) {
    let workers = self.config.worker_cap();
    info!(roots = ?self.config.roots, workers, "watcher started");

    let mut state = LoopState {
      permits:   Arc::new(Semaphore::new(workers)),
      debouncer: Debouncer::new(self.config.cooldown),
      files:     BTreeMap::new(),
      in_flight: BTreeSet::new(),
      tasks:     JoinSet::new(),
      task_ids:  HashMap::new(),
    };

    let mut ticker = tokio::time::interval(self.config.poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        Some(joined) = state.tasks.join_next_with_id() => {
          self.complete(&mut state, joined).await;
        }
        _ = ticker.tick() => {
          match scan(self.config.roots.clone()).await {
            Ok(seen) => self.observe(&mut state, seen).await,
            Err(e) => error!(error = %e, "scan failed"),
          }
          self.dispatch(&mut state).await;
        }
      }
    }

    let pending = state.tasks.len();
    if pending > 0 {
      info!(pending, grace_secs = self.config.grace.as_secs(), "draining ingest runs");
    }
    let drained = tokio::time::timeout(self.config.grace, async {
      while let Some(joined) = state.tasks.join_next_with_id().await {
        self.complete(&mut state, joined).await;
      }
    })
    .await;
    if drained.is_err() {
      warn!(remaining = state.tasks.len(), "grace period elapsed, aborting ingest runs");
      state.tasks.abort_all();
      while state.tasks.join_next().await.is_some() {}
    }
    info!("watcher stopped");
  }

  async fn observe(&self, state: &mut LoopState, seen: Vec<(PathBuf, SystemTime)>) {
    let now = Instant::now().into_std();
    let present: BTreeSet<&PathBuf> = seen.iter().map(|(p, _)| p).collect();

    let vanished: Vec<PathBuf> = state
      .files
      .keys()
      .filter(|p| !present.contains(p))
      .cloned()
      .collect();
    for path in vanished {
      state.files.remove(&path);
      state.debouncer.cancel(&path);
      if let Some(source) = SnapshotSource::from_path(&path) {
        warn!(path = %path.display(), "snapshot disappeared");
        self.pipeline.sanity().lock().await.component_issue(
          &source.component(),
          ReasonCode::SnapshotMissing,
          format!("{} disappeared", path.display()),
          Utc::now(),
        );
      }
    }

    for (path, mtime) in seen {
      let file = state.files.entry(path.clone()).or_default();
      if let Some(stuck) = file.quarantined {
        if stuck == mtime {
          continue;
        }
        info!(path = %path.display(), "quarantined snapshot changed, retrying");
        file.quarantined = None;
        file.failures = 0;
      }
      if file.processed.is_some_and(|(done, _)| done == mtime) {
        continue;
      }
      state.debouncer.touch(path, mtime, now);
    }
  }

  async fn dispatch(&self, state: &mut LoopState) {
    let now = Instant::now().into_std();
    for (path, mtime) in state.debouncer.due(now) {
      if state.in_flight.contains(&path) {
        state.debouncer.retry_at(path, mtime, now + self.config.poll);
        continue;
      }

      // Confirmation stat: the write has settled only if the mtime held.
      let current = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
        Ok(current) => current,
        Err(e) => {
          debug!(path = %path.display(), error = %e, "snapshot vanished before dispatch");
          continue;
        }
      };
      if current != mtime {
        state.debouncer.touch(path, current, now);
        continue;
      }

      let Some(source) = SnapshotSource::from_path(&path) else { continue };
      let previous = state.files.get(&path).and_then(|f| f.processed);
      let pipeline = self.pipeline.clone();
      let permits = state.permits.clone();

      state.in_flight.insert(path.clone());
      let handle = state.tasks.spawn(async move {
        let result = match permits.acquire_owned().await {
          Ok(_permit) => run_one(&pipeline, &source, mtime, previous).await,
          Err(_) => Ok(Outcome::Unchanged),
        };
        Done { path: source.path, mtime, result }
      });
      state.task_ids.insert(handle.id(), path);
    }
  }

  async fn complete(
    &self,
    state: &mut LoopState,
    joined: std::result::Result<(Id, Done), tokio::task::JoinError>,
  ) {
    let done = match joined {
      Ok((id, done)) => {
        state.task_ids.remove(&id);
        done
      }
      Err(e) => {
        error!(error = %e, "ingest worker panicked");
        if let Some(path) = state.task_ids.remove(&e.id()) {
          state.in_flight.remove(&path);
        }
        return;
      }
    };
    state.in_flight.remove(&done.path);
    let Some(file) = state.files.get_mut(&done.path) else { return };

    match done.result {
      Ok(Outcome::Ran(digest)) => {
        file.processed = Some((done.mtime, digest));
        file.failures = 0;
        if let Some(artifact) = &self.artifact
          && let Err(e) = artifact.emit(&**self.pipeline.store()).await
        {
          error!(path = %artifact.path().display(), error = %e, "artifact emit failed");
          self.pipeline.sanity().lock().await.component_issue(
            "artifact",
            e.code(),
            e.to_string(),
            Utc::now(),
          );
        }
      }
      Ok(Outcome::Unchanged) => {
        debug!(path = %done.path.display(), "content unchanged, skipped");
        file.processed = file.processed.map(|(_, digest)| (done.mtime, digest));
      }
      Err(e) => {
        file.failures += 1;
        let attempt = file.failures;
        if attempt >= self.config.max_retries {
          file.quarantined = Some(done.mtime);
          warn!(path = %done.path.display(), attempt, error = %e, "snapshot quarantined");
          if let Some(source) = SnapshotSource::from_path(&done.path) {
            self.pipeline.sanity().lock().await.component_issue(
              &source.component(),
              ReasonCode::IngestQuarantined,
              format!("quarantined after {attempt} failures: {e}"),
              Utc::now(),
            );
          }
        } else {
          let delay = self.config.cooldown * 2u32.saturating_pow(attempt);
          warn!(
            path = %done.path.display(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "ingest failed, retrying"
          );
          state.debouncer.retry_at(
            done.path,
            done.mtime,
            Instant::now().into_std() + delay,
          );
        }
      }
    }
  }
}

struct LoopState {
  permits:   Arc<Semaphore>,
  debouncer: Debouncer<PathBuf>,
  files:     BTreeMap<PathBuf, FileState>,
  in_flight: BTreeSet<PathBuf>,
  tasks:     JoinSet<Done>,
  task_ids:  HashMap<Id, PathBuf>,
}

async fn run_one<S: SyncStore + 'static>(
  pipeline: &Pipeline<S>,
  source: &SnapshotSource,
  mtime: SystemTime,
  previous: Option<(SystemTime, Digest256)>,
) -> Result<Outcome> {
  let bytes = match tokio::fs::read(&source.path).await {
    Ok(bytes) => bytes,
    Err(e) => {
      let err = IngestError::Read { path: source.path.clone(), source: e };
      pipeline.report_failure(&source.component(), &err).await;
      return Err(err);
    }
  };
  let digest: Digest256 = Sha256::digest(&bytes).into();
  if previous == Some((mtime, digest)) {
    return Ok(Outcome::Unchanged);
  }

  let ctx = source.context(DateTime::<Utc>::from(mtime));
  let origin = source.path.display().to_string();
  pipeline
    .run_bytes(Some(source.stream), bytes, ctx, &origin)
    .await?;
  Ok(Outcome::Ran(digest))
}

/// Walk the roots for tracked snapshot files and their mtimes.
async fn scan(roots: Vec<PathBuf>) -> Result<Vec<(PathBuf, SystemTime)>> {
  let found = tokio::task::spawn_blocking(move || {
    let mut found = Vec::new();
    for root in &roots {
      for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
          Ok(entry) => entry,
          Err(e) => {
            debug!(root = %root.display(), error = %e, "skipping unreadable entry");
            continue;
          }
        };
        if !entry.file_type().is_file()
          || SnapshotSource::from_path(entry.path()).is_none()
        {
          continue;
        }
        match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
          Ok(mtime) => found.push((entry.into_path(), mtime)),
          Err(e) => debug!(path = %entry.path().display(), error = %e, "cannot stat"),
        }
      }
    }
    found
  })
  .await?;
  Ok(found)
}
