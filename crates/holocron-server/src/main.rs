//! holocron-server binary.
//!
//! Reads `holocron.toml` (or the path given with `--config`) plus the
//! environment, opens the SQLite store, and either serves (watcher,
//! enrichment and Read API) or runs one pipeline step and exits.
//!
//! Exit codes: 0 on success, 1 for configuration errors, 2 when the store
//! cannot be opened.

mod config;
mod serve;

use std::{collections::HashMap, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context as _, anyhow};
use clap::{Parser, Subcommand};
use holocron_addons::Stream;
use holocron_ingest::{ArtifactEmitter, Emitted, Pipeline, SharedBoard, SnapshotSource};
use holocron_store_sqlite::SqliteStore;
use holocron_uplink::{ApiConfig, BlizzardClient, Scheduler, Task};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Holocron addon data sync")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "holocron.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Watch, enrich and serve the Read API (the default).
  Serve,
  /// Run one snapshot file through the pipeline.
  Ingest {
    file:   PathBuf,
    /// Addon or stream name, when the file name does not tell.
    #[arg(long)]
    stream: Option<String>,
  },
  /// Write the in-game artifact once.
  Emit {
    /// Defaults to `artifact_path` from the configuration.
    #[arg(long)]
    out: Option<PathBuf>,
  },
  /// Run one enrichment task.
  Enrich { task: Task },
}

/// A fatal error and the exit code it maps to.
enum Failure {
  Config(anyhow::Error),
  Store(anyhow::Error),
  Runtime(anyhow::Error),
}

impl Failure {
  fn exit_code(&self) -> ExitCode {
    match self {
      Self::Config(_) | Self::Runtime(_) => ExitCode::from(1),
      Self::Store(_) => ExitCode::from(2),
    }
  }

  fn error(&self) -> &anyhow::Error {
    match self {
      Self::Config(e) | Self::Store(e) | Self::Runtime(e) => e,
    }
  }
}

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(failure) => {
      let kind = match &failure {
        Failure::Config(_) => "configuration",
        Failure::Store(_) => "store",
        Failure::Runtime(_) => "runtime",
      };
      error!(kind, "{:#}", failure.error());
      failure.exit_code()
    }
  }
}

/// A command with its prerequisites checked.
enum Plan {
  Serve,
  Ingest { file: PathBuf, stream: Option<String> },
  Emit(PathBuf),
  Enrich(ApiConfig, Task),
}

async fn run(cli: Cli) -> Result<(), Failure> {
  let env: HashMap<String, String> = std::env::vars().collect();
  let cfg = ServerConfig::load(&cli.config, &env).map_err(Failure::Config)?;
  cfg.validate().map_err(Failure::Config)?;

  // Fail on missing prerequisites before touching the store.
  let plan = match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => Plan::Serve,
    Command::Ingest { file, stream } => Plan::Ingest { file, stream },
    Command::Emit { out } => Plan::Emit(out.or_else(|| cfg.artifact_path.clone()).ok_or_else(
      || Failure::Config(anyhow!("no --out given and artifact_path is not set")),
    )?),
    Command::Enrich { task } => Plan::Enrich(
      cfg.api_config().ok_or_else(|| {
        Failure::Config(anyhow!("BLIZZARD_CLIENT_ID and BLIZZARD_CLIENT_SECRET are required"))
      })?,
      task,
    ),
  };

  let store = SqliteStore::connect(&cfg.database_url)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.database_url))
    .map_err(Failure::Store)?;
  let store = Arc::new(store);
  info!(database_url = %cfg.database_url, "store ready");

  match plan {
    Plan::Serve => serve::run(cfg, store).await,
    Plan::Ingest { file, stream } => ingest(&cfg, store, file, stream).await,
    Plan::Emit(out) => emit(&store, ArtifactEmitter::new(out)).await,
    Plan::Enrich(api, task) => enrich(&cfg, store, api, task).await,
  }
  .map_err(Failure::Runtime)
}

// ─── One-shot commands ────────────────────────────────────────────────────────

async fn ingest(
  cfg: &ServerConfig,
  store: Arc<SqliteStore>,
  file: PathBuf,
  stream: Option<String>,
) -> anyhow::Result<()> {
  let stream = stream
    .map(|s| {
      Stream::from_name(&s)
        .or_else(|| Stream::from_file_name(&s))
        .ok_or_else(|| anyhow!("unknown stream {s:?}"))
    })
    .transpose()?;

  let pipeline = Pipeline::new(store.clone(), SharedBoard::default());
  let source = match (SnapshotSource::from_path(&file), stream) {
    (Some(source), None) => source,
    (Some(source), Some(stream)) => SnapshotSource { stream, ..source },
    (None, Some(stream)) => {
      SnapshotSource { path: file.clone(), stream, character: None, account: None }
    }
    (None, None) => {
      return Err(anyhow!("cannot tell the stream of {}; pass --stream", file.display()));
    }
  };

  let report = pipeline
    .run_file(&source)
    .await
    .with_context(|| format!("ingest of {} failed", file.display()))?;
  println!("{}", serde_json::to_string_pretty(&report)?);

  if let Some(path) = &cfg.artifact_path {
    emit(&store, ArtifactEmitter::new(path)).await?;
  }
  Ok(())
}

async fn emit(store: &SqliteStore, artifact: ArtifactEmitter) -> anyhow::Result<()> {
  let outcome = artifact
    .emit(store)
    .await
    .with_context(|| format!("failed to write {}", artifact.path().display()))?;
  match outcome {
    Emitted::Written => info!(path = %artifact.path().display(), "artifact written"),
    Emitted::Unchanged => info!(path = %artifact.path().display(), "artifact unchanged"),
  }
  Ok(())
}

async fn enrich(
  cfg: &ServerConfig,
  store: Arc<SqliteStore>,
  api: ApiConfig,
  task: Task,
) -> anyhow::Result<()> {
  let client = BlizzardClient::new(api).context("failed to build API client")?;
  let scheduler =
    Scheduler::new(Arc::new(client), store, SharedBoard::default(), cfg.schedule());
  let count = scheduler
    .run_task(task)
    .await
    .with_context(|| format!("task {task} failed"))?;
  info!(task = %task, count, "task complete");
  Ok(())
}
