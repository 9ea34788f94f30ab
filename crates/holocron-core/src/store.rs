//! The `SyncStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `holocron-store-sqlite`). The ingest pipeline, the enrichment worker, the
//! artifact emitter and the Read API all depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  CharacterId,
  record::{
    ArtifactRows, Character, CharacterRecord, GlobalConstant, InventoryScan,
    InventorySummary, ItemPriceSnapshot, ItemSearchHit, ItemStack, JobRecord,
    PriceScanRow, ProfessionRecord, RecipeReference,
  },
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`SyncStore::search_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemQuery {
  /// Exact item id.
  Id(u32),
  /// Case-insensitive substring match on the item name.
  Name(String),
}

impl ItemQuery {
  /// Integers search by id; anything else by name.
  pub fn parse(q: &str) -> Option<Self> {
    let q = q.trim();
    if q.is_empty() {
      return None;
    }
    Some(match q.parse() {
      Ok(id) => Self::Id(id),
      Err(_) => Self::Name(q.to_owned()),
    })
  }
}

pub const SEARCH_LIMIT: usize = 50;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Holocron persistence backend.
///
/// Every write is an idempotent upsert keyed on stable domain ids, except
/// [`append_scan_batch`](Self::append_scan_batch), which is an append-only
/// time series.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait SyncStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether a failed call may succeed if retried unchanged, e.g. on lock
  /// contention. Backends without such a notion keep the default.
  fn is_transient(_error: &Self::Error) -> bool { false }

  // ── Characters & inventory ────────────────────────────────────────────

  /// Insert or merge a character. `last_seen` is always updated; `None`
  /// attributes never overwrite stored values.
  fn upsert_character(
    &self,
    record: CharacterRecord,
  ) -> impl Future<Output = Result<CharacterId, Self::Error>> + Send + '_;

  fn get_character(
    &self,
    id: CharacterId,
  ) -> impl Future<Output = Result<Option<Character>, Self::Error>> + Send + '_;

  /// Replace the character's stacks on the scan surface with exactly
  /// `scan.stacks`, in one transaction. Containers outside the surface are
  /// untouched.
  fn replace_inventory(
    &self,
    character: CharacterId,
    scan: InventoryScan,
  ) -> impl Future<Output = Result<InventorySummary, Self::Error>> + Send + '_;

  /// All stacks held by a character, ordered by location then item id.
  fn inventory(
    &self,
    character: CharacterId,
  ) -> impl Future<Output = Result<Vec<ItemStack>, Self::Error>> + Send + '_;

  // ── Professions & recipes ─────────────────────────────────────────────

  /// Upsert on `(character, profession_id)`. Returns the previously stored
  /// skill, if any.
  fn upsert_profession(
    &self,
    record: ProfessionRecord,
  ) -> impl Future<Output = Result<Option<u32>, Self::Error>> + Send + '_;

  fn professions(
    &self,
    character: CharacterId,
  ) -> impl Future<Output = Result<Vec<ProfessionRecord>, Self::Error>> + Send + '_;

  /// Merge a catalog entry. `None` fields keep the stored value.
  fn upsert_recipe(
    &self,
    record: RecipeReference,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_recipe(
    &self,
    recipe_id: u32,
  ) -> impl Future<Output = Result<Option<RecipeReference>, Self::Error>> + Send + '_;

  /// Recipes whose materials have not been enriched yet, lowest id first.
  fn recipes_missing_materials(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RecipeReference>, Self::Error>> + Send + '_;

  // ── Market & constants ────────────────────────────────────────────────

  /// Bulk append; returns the number of rows written.
  fn append_scan_batch(
    &self,
    rows: Vec<PriceScanRow>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn upsert_price_snapshots(
    &self,
    snapshots: Vec<ItemPriceSnapshot>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_constant(
    &self,
    key: String,
    value: serde_json::Value,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_constant(
    &self,
    key: String,
  ) -> impl Future<Output = Result<Option<GlobalConstant>, Self::Error>> + Send + '_;

  // ── Jobs ──────────────────────────────────────────────────────────────

  fn upsert_job(
    &self,
    job: JobRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// At most [`SEARCH_LIMIT`] stacks matching `query`.
  fn search_items<'a>(
    &'a self,
    query: &'a ItemQuery,
  ) -> impl Future<Output = Result<Vec<ItemSearchHit>, Self::Error>> + Send + 'a;

  /// Index rows and jobs for the artifact, read in one transaction.
  fn artifact_rows(
    &self,
  ) -> impl Future<Output = Result<ArtifactRows, Self::Error>> + Send + '_;

  /// Hex SHA-256 over every persisted row in key order.
  fn state_digest(
    &self,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn query_parsing() {
    assert_eq!(ItemQuery::parse(" 101 "), Some(ItemQuery::Id(101)));
    assert_eq!(
      ItemQuery::parse("Hochenblume"),
      Some(ItemQuery::Name("Hochenblume".into()))
    );
    assert_eq!(ItemQuery::parse("   "), None);
  }
}
