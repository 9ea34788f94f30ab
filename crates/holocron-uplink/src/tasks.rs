//! Enrichment tasks and their scheduler.
//!
//! Each task is a plain async function over a [`BlizzardClient`] and a
//! [`SyncStore`]. Writes are committed per item, so a run that fails midway
//! still leaves the store improved, and the next tick picks up the rest.

use std::{collections::BTreeMap, fmt, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use holocron_core::{
  board::SanityBoard,
  record::{ItemPriceSnapshot, PriceScanRow, RecipeReference},
  sanity::ReasonCode,
  store::SyncStore,
};
use serde_json::json;
use tokio::{sync::Mutex, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
  client::BlizzardClient,
  error::{Result, TaskError},
  model::Auctions,
};

pub const TOKEN_KEY: &str = "WOW_TOKEN";
pub const COMMODITIES_SOURCE: &str = "blizzard_commodities";
pub const AUCTIONS_SOURCE: &str = "blizzard_auctions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
  Token,
  Commodities,
  Auctions,
  Recipes,
  Catalog,
}

impl Task {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Token => "token",
      Self::Commodities => "commodities",
      Self::Auctions => "auctions",
      Self::Recipes => "recipes",
      Self::Catalog => "catalog",
    }
  }

  /// Sanity component name, e.g. `enrich/token`.
  pub fn component(self) -> String { format!("enrich/{}", self.as_str()) }
}

impl fmt::Display for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Task {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, String> {
    [Self::Token, Self::Commodities, Self::Auctions, Self::Recipes, Self::Catalog]
      .into_iter()
      .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| format!("unknown task {s:?}"))
  }
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

/// Persist the current token price under [`TOKEN_KEY`]. Returns copper.
pub async fn token_price<S: SyncStore>(client: &BlizzardClient, store: &S) -> Result<u64> {
  let index = client.token_index().await?;
  let at = index.updated_at().unwrap_or_else(Utc::now);
  store
    .set_constant(
      TOKEN_KEY.to_owned(),
      json!({ "price": index.price, "gold": index.price / 10_000 }),
      at,
    )
    .await
    .map_err(TaskError::store)?;
  info!(price = index.price, "token price stored");
  Ok(index.price)
}

/// Append the region commodity listings and refresh per-item aggregates.
pub async fn commodities<S: SyncStore>(client: &BlizzardClient, store: &S) -> Result<usize> {
  let auctions = client.commodities().await?;
  let at = Utc::now();
  let rows = scan_rows(&auctions, COMMODITIES_SOURCE, at);
  let snapshots = aggregate(&rows, at);

  let written = store.append_scan_batch(rows).await.map_err(TaskError::store)?;
  let items = snapshots.len();
  store
    .upsert_price_snapshots(snapshots)
    .await
    .map_err(TaskError::store)?;
  info!(rows = written, items, "commodities scan stored");
  Ok(written)
}

/// Append one connected realm's buyout listings.
pub async fn realm_auctions<S: SyncStore>(
  client: &BlizzardClient,
  store: &S,
  connected_realm_id: u32,
) -> Result<usize> {
  let auctions = client.realm_auctions(connected_realm_id).await?;
  let rows = scan_rows(&auctions, AUCTIONS_SOURCE, Utc::now());
  let written = store.append_scan_batch(rows).await.map_err(TaskError::store)?;
  info!(connected_realm_id, rows = written, "realm auctions stored");
  Ok(written)
}

/// Fill in materials for up to `cap` recipes that lack them.
pub async fn enrich_recipes<S: SyncStore>(
  client: &BlizzardClient,
  store: &S,
  cap: usize,
) -> Result<usize> {
  let pending = store
    .recipes_missing_materials(cap)
    .await
    .map_err(TaskError::store)?;
  let attempted = pending.len();
  let mut enriched = 0;
  let mut failed = 0;
  let mut last = None;

  for recipe in pending {
    match client.recipe(recipe.recipe_id).await {
      Ok(detail) => {
        store
          .upsert_recipe(detail.into_reference(Utc::now()))
          .await
          .map_err(TaskError::store)?;
        enriched += 1;
      }
      Err(e) => {
        warn!(recipe_id = recipe.recipe_id, error = %e, "recipe enrichment failed");
        failed += 1;
        last = Some(e);
      }
    }
  }

  info!(attempted, enriched, failed, "recipe enrichment pass complete");
  match last {
    Some(last) => Err(TaskError::Partial { attempted, failed, last }),
    None => Ok(enriched),
  }
}

/// Walk profession index → profession → skill tiers and upsert every
/// recipe name with its profession and tier.
pub async fn import_catalog<S: SyncStore>(client: &BlizzardClient, store: &S) -> Result<usize> {
  let index = client.profession_index().await?;
  let mut imported = 0;

  for entry in index.professions {
    let profession = client.profession(entry.id).await?;
    for tier in &profession.skill_tiers {
      let detail = client.skill_tier(profession.id, tier.id).await?;
      let at = Utc::now();
      for recipe in detail.categories.iter().flat_map(|c| &c.recipes) {
        store
          .upsert_recipe(RecipeReference {
            profession: Some(profession.name.clone()),
            skill_tier: Some(detail.name.clone()),
            ..RecipeReference::catalog(recipe.id, recipe.name.clone(), at)
          })
          .await
          .map_err(TaskError::store)?;
        imported += 1;
      }
    }
  }

  info!(recipes = imported, "recipe catalog imported");
  Ok(imported)
}

fn scan_rows(auctions: &Auctions, source: &str, at: DateTime<Utc>) -> Vec<PriceScanRow> {
  auctions
    .auctions
    .iter()
    .filter_map(|a| {
      Some(PriceScanRow {
        item_id:   a.item.id,
        price:     a.unit_price().filter(|p| *p > 0)?,
        quantity:  a.quantity,
        timestamp: at,
        source:    source.to_owned(),
      })
    })
    .collect()
}

fn aggregate(rows: &[PriceScanRow], at: DateTime<Utc>) -> Vec<ItemPriceSnapshot> {
  let mut by_item: BTreeMap<u32, ItemPriceSnapshot> = BTreeMap::new();
  for row in rows {
    by_item
      .entry(row.item_id)
      .and_modify(|s| {
        s.min_price = s.min_price.min(row.price);
        s.total_quantity += u64::from(row.quantity);
      })
      .or_insert_with(|| ItemPriceSnapshot {
        item_id:        row.item_id,
        min_price:      row.price,
        total_quantity: u64::from(row.quantity),
        scanned_at:     at,
        source:         row.source.clone(),
      });
  }
  by_item.into_values().collect()
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Schedule {
  pub token_every:        Duration,
  pub commodities_every:  Duration,
  pub recipes_every:      Duration,
  pub recipe_pass_cap:    usize,
  /// Realm auctions are only fetched when a connected realm is configured.
  pub connected_realm_id: Option<u32>,
}

impl Default for Schedule {
  fn default() -> Self {
    Self {
      token_every:        Duration::from_secs(900),
      commodities_every:  Duration::from_secs(3600),
      recipes_every:      Duration::from_secs(21_600),
      recipe_pass_cap:    200,
      connected_realm_id: None,
    }
  }
}

pub struct Scheduler<S> {
  client:   Arc<BlizzardClient>,
  store:    Arc<S>,
  sanity:   Arc<Mutex<SanityBoard>>,
  schedule: Schedule,
}

impl<S: SyncStore + 'static> Scheduler<S> {
  pub fn new(
    client: Arc<BlizzardClient>,
    store: Arc<S>,
    sanity: Arc<Mutex<SanityBoard>>,
    schedule: Schedule,
  ) -> Self {
    Self { client, store, sanity, schedule }
  }

  /// Run one task now and report the outcome to the sanity board.
  pub async fn run_task(&self, task: Task) -> Result<usize> {
    let client = &*self.client;
    let store = &*self.store;
    let outcome = match task {
      Task::Token => token_price(client, store).await.map(|_| 1),
      Task::Commodities => commodities(client, store).await,
      Task::Auctions => match self.schedule.connected_realm_id {
        Some(id) => realm_auctions(client, store, id).await,
        None => Err(TaskError::Config("connected_realm_id")),
      },
      Task::Recipes => enrich_recipes(client, store, self.schedule.recipe_pass_cap).await,
      Task::Catalog => import_catalog(client, store).await,
    };

    let mut board = self.sanity.lock().await;
    match &outcome {
      Ok(_) => board.component_ok(&task.component(), Utc::now()),
      Err(e) => {
        error!(task = %task, error = %e, "enrichment task failed");
        board.component_issue(
          &task.component(),
          ReasonCode::EnrichTaskFailed,
          e.to_string(),
          Utc::now(),
        );
      }
    }
    outcome
  }

  /// Tick every task on its own interval until `cancel` fires. The first
  /// tick of each interval runs immediately.
  pub async fn run(self, cancel: CancellationToken) {
    let ticker = |every: Duration| {
      let mut t = tokio::time::interval(every);
      t.set_missed_tick_behavior(MissedTickBehavior::Delay);
      t
    };
    let mut token = ticker(self.schedule.token_every);
    let mut market = ticker(self.schedule.commodities_every);
    let mut recipes = ticker(self.schedule.recipes_every);
    info!(schedule = ?self.schedule, "enrichment scheduler started");

    loop {
      let task = tokio::select! {
        _ = cancel.cancelled() => break,
        _ = token.tick() => Task::Token,
        _ = market.tick() => Task::Commodities,
        _ = recipes.tick() => Task::Recipes,
      };
      // Failures are reported inside `run_task`; the next tick retries.
      let _ = self.run_task(task).await;
      if task == Task::Commodities && self.schedule.connected_realm_id.is_some() {
        let _ = self.run_task(Task::Auctions).await;
      }
    }
    info!("enrichment scheduler stopped");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Auction, Ref};

  fn auction(id: u64, item: u32, quantity: u32, unit_price: Option<u64>) -> Auction {
    Auction { id, item: Ref { id: item }, quantity, unit_price, buyout: None }
  }

  #[test]
  fn scan_rows_skip_unpriced_listings() {
    let auctions = Auctions {
      auctions: vec![
        auction(1, 10, 5, Some(300)),
        auction(2, 10, 2, Some(250)),
        auction(3, 11, 1, None),
        auction(4, 12, 1, Some(0)),
      ],
    };
    let at = Utc::now();
    let rows = scan_rows(&auctions, COMMODITIES_SOURCE, at);
    assert_eq!(rows.len(), 2);

    let snapshots = aggregate(&rows, at);
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].min_price, 250);
    assert_eq!(snapshots[0].total_quantity, 7);
  }

  #[test]
  fn task_names_parse() {
    assert_eq!("Recipes".parse::<Task>(), Ok(Task::Recipes));
    assert_eq!(Task::Token.component(), "enrich/token");
    assert!("everything".parse::<Task>().is_err());
  }
}
