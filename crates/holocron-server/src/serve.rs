//! Long-running mode: watcher, enrichment scheduler and Read API on one
//! runtime, stopped together by a single cancellation token.

use std::sync::Arc;

use anyhow::Context as _;
use holocron_api::{ApiState, api_router};
use holocron_ingest::{ArtifactEmitter, Pipeline, SharedBoard, Watcher};
use holocron_store_sqlite::SqliteStore;
use holocron_uplink::{BlizzardClient, Scheduler};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;

pub async fn run(cfg: ServerConfig, store: Arc<SqliteStore>) -> anyhow::Result<()> {
  let sanity = SharedBoard::default();
  let pipeline = Pipeline::new(store.clone(), sanity.clone());
  let cancel = CancellationToken::new();
  let mut workers = JoinSet::new();

  let artifact = cfg.artifact_path.clone().map(ArtifactEmitter::new);
  if let Some(artifact) = &artifact {
    artifact.emit(&*store).await.context("initial artifact emit failed")?;
  }

  if cfg.wtf_path.is_some() {
    let mut watcher = Watcher::new(cfg.watch_config(), pipeline.clone());
    if let Some(artifact) = artifact {
      watcher = watcher.with_artifact(artifact);
    }
    workers.spawn(watcher.run(cancel.child_token()));
  } else {
    warn!("WOW_WTF_PATH not set; file watcher disabled");
  }

  match cfg.api_config() {
    Some(api) => {
      let client = BlizzardClient::new(api).context("failed to build API client")?;
      let scheduler =
        Scheduler::new(Arc::new(client), store.clone(), sanity.clone(), cfg.schedule());
      workers.spawn(scheduler.run(cancel.child_token()));
    }
    None => warn!("Blizzard credentials missing; enrichment disabled"),
  }

  let app = api_router(ApiState::new(pipeline)).layer(TraceLayer::new_for_http());
  let address = cfg.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  info!("Listening on http://{address}");

  tokio::spawn(forward_signals(cancel.clone()));
  axum::serve(listener, app)
    .with_graceful_shutdown(cancel.clone().cancelled_owned())
    .await
    .context("server error")?;

  // Workers apply the grace period themselves; this only bounds the join.
  cancel.cancel();
  let drained = tokio::time::timeout(cfg.grace() * 2, async {
    while workers.join_next().await.is_some() {}
  })
  .await;
  if drained.is_err() {
    warn!("workers did not stop in time; aborting");
    workers.abort_all();
  }
  info!("shutdown complete");
  Ok(())
}

/// Cancel on Ctrl-C, or on SIGTERM where there is one.
async fn forward_signals(cancel: CancellationToken) {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(error = %e, "cannot listen for Ctrl-C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut sig) => {
        sig.recv().await;
      }
      Err(e) => {
        warn!(error = %e, "cannot listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };
  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
    _ = cancel.cancelled() => return,
  }
  info!("shutdown requested");
  cancel.cancel();
}
