//! Runtime configuration.
//!
//! Sources, later ones winning:
//!
//! 1. the TOML file given with `--config` (optional, default `holocron.toml`)
//! 2. `HOLOCRON_*` variables, `__` separating nested keys
//!    (`HOLOCRON_WATCH__COOLDOWN_MS=500`)
//! 3. the bare deployment variables in [`OVERRIDES`]

use std::{collections::HashMap, path::{Path, PathBuf}, time::Duration};

use anyhow::{Context as _, bail};
use holocron_ingest::WatchConfig;
use holocron_store_sqlite::database_path;
use holocron_uplink::{ApiConfig, Schedule};
use serde::Deserialize;

/// Unprefixed environment variables and the keys they override.
pub const OVERRIDES: &[(&str, &str)] = &[
  ("DATABASE_URL", "database_url"),
  ("BLIZZARD_CLIENT_ID", "blizzard_client_id"),
  ("BLIZZARD_CLIENT_SECRET", "blizzard_client_secret"),
  ("WOW_WTF_PATH", "wtf_path"),
  ("REGION", "region"),
  ("LOCALE", "locale"),
];

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                   String,
  pub port:                   u16,
  pub database_url:           String,
  /// Game `WTF` directory to watch. The watcher is off without it.
  pub wtf_path:               Option<PathBuf>,
  pub region:                 String,
  pub locale:                 String,
  pub blizzard_client_id:     Option<String>,
  pub blizzard_client_secret: Option<String>,
  /// Where the generated `IndexDB`/`JobsDB` file goes.
  pub artifact_path:          Option<PathBuf>,
  pub connected_realm_id:     Option<u32>,
  pub shutdown_grace_secs:    u64,
  pub watch:                  WatchSettings,
  pub enrich:                 EnrichSettings,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                   "127.0.0.1".to_owned(),
      port:                   8765,
      database_url:           "sqlite://holocron.db".to_owned(),
      wtf_path:               None,
      region:                 "us".to_owned(),
      locale:                 "en_US".to_owned(),
      blizzard_client_id:     None,
      blizzard_client_secret: None,
      artifact_path:          None,
      connected_realm_id:     None,
      shutdown_grace_secs:    30,
      watch:                  WatchSettings::default(),
      enrich:                 EnrichSettings::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
  pub cooldown_ms: u64,
  pub poll_ms:     u64,
  pub max_workers: usize,
  pub max_retries: u32,
}

impl Default for WatchSettings {
  fn default() -> Self {
    Self { cooldown_ms: 2000, poll_ms: 500, max_workers: 4, max_retries: 3 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichSettings {
  pub token_every_secs:       u64,
  pub commodities_every_secs: u64,
  pub recipes_every_secs:     u64,
  pub recipe_pass_cap:        usize,
  pub requests_per_second:    u32,
}

impl Default for EnrichSettings {
  fn default() -> Self {
    Self {
      token_every_secs:       900,
      commodities_every_secs: 3600,
      recipes_every_secs:     21600,
      recipe_pass_cap:        200,
      requests_per_second:    10,
    }
  }
}

// ─── Loading ──────────────────────────────────────────────────────────────────

impl ServerConfig {
  /// Layer the file at `path` (if present) under `env`.
  pub fn load(path: &Path, env: &HashMap<String, String>) -> anyhow::Result<Self> {
    let mut builder = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("HOLOCRON")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true)
          .source(Some(env.clone())),
      );
    for (var, key) in OVERRIDES {
      let value = env.get(*var).filter(|v| !v.trim().is_empty()).cloned();
      builder = builder
        .set_override_option(*key, value)
        .with_context(|| format!("invalid {var}"))?;
    }

    builder
      .build()
      .with_context(|| format!("failed to read {}", path.display()))?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  /// Checks that need the filesystem but not the store.
  pub fn validate(&self) -> anyhow::Result<()> {
    database_path(&self.database_url)
      .with_context(|| format!("DATABASE_URL {:?}", self.database_url))?;
    if let Some(root) = &self.wtf_path {
      std::fs::read_dir(root)
        .with_context(|| format!("game root {} is not a readable directory", root.display()))?;
    }
    if self.port == 0 {
      bail!("port must be non-zero");
    }
    Ok(())
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// Both client credentials, when present and non-empty.
  pub fn credentials(&self) -> Option<(&str, &str)> {
    let id = self.blizzard_client_id.as_deref().map(str::trim)?;
    let secret = self.blizzard_client_secret.as_deref().map(str::trim)?;
    (!id.is_empty() && !secret.is_empty()).then_some((id, secret))
  }

  pub fn api_config(&self) -> Option<ApiConfig> {
    let (id, secret) = self.credentials()?;
    let mut api = ApiConfig::new(&self.region, id, secret);
    api.locale = self.locale.clone();
    api.requests_per_second = self.enrich.requests_per_second;
    Some(api)
  }

  pub fn schedule(&self) -> Schedule {
    Schedule {
      token_every:        Duration::from_secs(self.enrich.token_every_secs),
      commodities_every:  Duration::from_secs(self.enrich.commodities_every_secs),
      recipes_every:      Duration::from_secs(self.enrich.recipes_every_secs),
      recipe_pass_cap:    self.enrich.recipe_pass_cap,
      connected_realm_id: self.connected_realm_id,
    }
  }

  pub fn grace(&self) -> Duration { Duration::from_secs(self.shutdown_grace_secs) }

  pub fn watch_config(&self) -> WatchConfig {
    WatchConfig {
      roots:       self.wtf_path.iter().cloned().collect(),
      cooldown:    Duration::from_millis(self.watch.cooldown_ms),
      poll:        Duration::from_millis(self.watch.poll_ms),
      max_workers: self.watch.max_workers,
      max_retries: self.watch.max_retries,
      grace:       self.grace(),
    }
  }
}
