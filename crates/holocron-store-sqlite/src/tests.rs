//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use holocron_core::{
  CharacterId,
  record::{
    CharacterRecord, ContainerType, InventoryScan, ItemPriceSnapshot,
    ItemStackRecord, JobRecord, MAX_LEVEL_DEFAULT, Material, PriceScanRow,
    ProfessionRecord, RecipeReference, StorageLocation, UNKNOWN_CLASS,
  },
  store::{ItemQuery, SyncStore},
};

use crate::{SqliteStore, database_path};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { DateTime::from_timestamp(1_700_000_000, 0).unwrap() }

fn aria() -> CharacterId { CharacterId::parse("Aria - Ridge").unwrap() }

fn stack(t: ContainerType, index: u32, item_id: u32, count: u32) -> ItemStackRecord {
  ItemStackRecord {
    location: StorageLocation::new(t, index),
    item_id,
    count,
    name: Some(format!("Item {item_id}")),
  }
}

fn scan(at: DateTime<Utc>, stacks: Vec<ItemStackRecord>) -> InventoryScan {
  let mut scan = InventoryScan::new(at);
  for s in stacks {
    scan.push(s);
  }
  scan
}

// ─── Urls ────────────────────────────────────────────────────────────────────

#[test]
fn database_urls() {
  assert_eq!(database_path("sqlite://holocron.db").unwrap().as_deref(), Some("holocron.db"));
  assert_eq!(database_path("sqlite:/var/h.db").unwrap().as_deref(), Some("/var/h.db"));
  assert_eq!(database_path("data/h.db").unwrap().as_deref(), Some("data/h.db"));
  assert_eq!(database_path("sqlite::memory:").unwrap(), None);
  assert!(database_path("postgres://localhost/h").is_err());
}

// ─── Characters ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_character_keeps_known_fields() {
  let s = store().await;

  let mut full = CharacterRecord::sighting(aria(), t0());
  full.class = Some("Mage".into());
  full.level = Some(70);
  s.upsert_character(full).await.unwrap();

  let later = t0() + Duration::hours(1);
  let id = s.upsert_character(CharacterRecord::sighting(aria(), later)).await.unwrap();
  assert_eq!(id, aria());

  let c = s.get_character(aria()).await.unwrap().unwrap();
  assert_eq!(c.name, "Aria");
  assert_eq!(c.realm, "Ridge");
  assert_eq!(c.class.as_deref(), Some("Mage"));
  assert_eq!(c.level, Some(70));
  assert_eq!(c.first_seen, t0());
  assert_eq!(c.last_seen, later);
}

#[tokio::test]
async fn sentinels_fill_only_a_first_sighting() {
  let s = store().await;
  s.upsert_character(CharacterRecord::sighting(aria(), t0())).await.unwrap();
  let c = s.get_character(aria()).await.unwrap().unwrap();
  assert_eq!(c.class.as_deref(), Some(UNKNOWN_CLASS));
  assert_eq!(c.level, Some(MAX_LEVEL_DEFAULT));

  // Real values replace the sentinels...
  let mut full = CharacterRecord::sighting(aria(), t0());
  full.class = Some("Warrior".into());
  full.level = Some(70);
  s.upsert_character(full).await.unwrap();

  // ...and a later bare sighting never puts them back.
  s.upsert_character(CharacterRecord::sighting(aria(), t0() + Duration::hours(1)))
    .await
    .unwrap();
  let c = s.get_character(aria()).await.unwrap().unwrap();
  assert_eq!(c.class.as_deref(), Some("Warrior"));
  assert_eq!(c.level, Some(70));
}

#[tokio::test]
async fn missing_character_is_none() {
  let s = store().await;
  assert!(s.get_character(aria()).await.unwrap().is_none());
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn replace_covers_only_the_scan_surface() {
  let s = store().await;
  s.replace_inventory(
    aria(),
    scan(t0(), vec![
      stack(ContainerType::Bag, 0, 101, 5),
      stack(ContainerType::Bank, 2, 202, 10),
    ]),
  )
  .await
  .unwrap();

  let summary = s
    .replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Bag, 1, 303, 1)]))
    .await
    .unwrap();
  assert_eq!(summary.removed, 1);
  assert_eq!(summary.inserted, 1);

  let held: BTreeSet<(ContainerType, u32)> = s
    .inventory(aria())
    .await
    .unwrap()
    .into_iter()
    .map(|st| (st.location.container_type, st.item_id))
    .collect();
  assert_eq!(
    held,
    BTreeSet::from([(ContainerType::Bag, 303), (ContainerType::Bank, 202)])
  );
}

#[tokio::test]
async fn bag_stacks_equal_exactly_the_scan() {
  let s = store().await;
  s.replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Bag, 0, 1, 1)]))
    .await
    .unwrap();

  let wanted = vec![
    stack(ContainerType::Bag, 0, 7, 3),
    stack(ContainerType::Bag, 4, 7, 2),
    stack(ContainerType::Bag, 4, 9, 1),
  ];
  s.replace_inventory(aria(), scan(t0(), wanted.clone())).await.unwrap();

  let stored: Vec<(StorageLocation, u32, u32)> = s
    .inventory(aria())
    .await
    .unwrap()
    .into_iter()
    .map(|st| (st.location, st.item_id, st.count))
    .collect();
  let expected: Vec<(StorageLocation, u32, u32)> =
    wanted.into_iter().map(|st| (st.location, st.item_id, st.count)).collect();
  assert_eq!(stored, expected);
}

#[tokio::test]
async fn empty_surface_clears_container() {
  let s = store().await;
  s.replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Mail, 0, 5, 2)]))
    .await
    .unwrap();

  let mut empty = InventoryScan::new(t0());
  empty.mark_scanned(ContainerType::Mail);
  let summary = s.replace_inventory(aria(), empty).await.unwrap();
  assert_eq!(summary.removed, 1);
  assert!(s.inventory(aria()).await.unwrap().is_empty());
}

#[tokio::test]
async fn stack_handles_are_composite() {
  let s = store().await;
  s.replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Warbank, 3, 42, 1)]))
    .await
    .unwrap();
  let stacks = s.inventory(aria()).await.unwrap();
  assert_eq!(stacks[0].handle, "Player-Ridge-Aria:42:Warbank:3");
  assert_eq!(stacks[0].last_updated, t0());
}

// ─── Professions & recipes ───────────────────────────────────────────────────

#[tokio::test]
async fn profession_upsert_reports_previous_skill() {
  let s = store().await;
  let mut record = ProfessionRecord {
    character:     aria(),
    profession_id: 171,
    name:          "Alchemy".into(),
    skill:         50,
    max_skill:     100,
    updated_at:    t0(),
  };
  assert_eq!(s.upsert_profession(record.clone()).await.unwrap(), None);

  record.skill = 40;
  assert_eq!(s.upsert_profession(record).await.unwrap(), Some(50));

  let stored = s.professions(aria()).await.unwrap();
  assert_eq!(stored.len(), 1);
  assert_eq!(stored[0].skill, 40);
}

#[tokio::test]
async fn recipe_enrichment_and_catalog_merge() {
  let s = store().await;
  s.upsert_recipe(RecipeReference::catalog(370607, "Potion", t0()))
    .await
    .unwrap();

  let missing = s.recipes_missing_materials(10).await.unwrap();
  assert_eq!(missing.len(), 1);

  let enriched = RecipeReference {
    recipe_id:        370607,
    name:             None,
    profession:       None,
    skill_tier:       None,
    materials:        Some(vec![
      Material { item_id: 194820, quantity: 2 },
      Material { item_id: 200111, quantity: 1 },
    ]),
    crafted_item_id:  Some(191304),
    crafted_quantity: Some(1),
    updated_at:       t0(),
  };
  s.upsert_recipe(enriched.clone()).await.unwrap();

  // A later catalog pass must not wipe the enrichment columns.
  s.upsert_recipe(RecipeReference::catalog(370607, "Potion", t0())).await.unwrap();

  let stored = s.get_recipe(370607).await.unwrap().unwrap();
  assert_eq!(stored.name.as_deref(), Some("Potion"));
  assert_eq!(stored.materials, enriched.materials);
  assert_eq!(stored.crafted_item_id, Some(191304));
  assert!(s.recipes_missing_materials(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn first_recipe_name_wins_in_either_order() {
  let s = store().await;

  // Ingest first, enrichment second.
  s.upsert_recipe(RecipeReference::catalog(1, "Ingest Name", t0())).await.unwrap();
  let mut api = RecipeReference::catalog(1, "API Name", t0());
  api.materials = Some(vec![]);
  s.upsert_recipe(api).await.unwrap();
  let r = s.get_recipe(1).await.unwrap().unwrap();
  assert_eq!(r.name.as_deref(), Some("Ingest Name"));
  assert_eq!(r.materials, Some(vec![]));

  // Enrichment first, ingest second.
  let mut api = RecipeReference::catalog(2, "API Name", t0());
  api.materials = Some(vec![Material { item_id: 5, quantity: 1 }]);
  s.upsert_recipe(api).await.unwrap();
  s.upsert_recipe(RecipeReference::catalog(2, "Ingest Name", t0())).await.unwrap();
  let r = s.get_recipe(2).await.unwrap().unwrap();
  assert_eq!(r.name.as_deref(), Some("API Name"));
  assert_eq!(r.materials, Some(vec![Material { item_id: 5, quantity: 1 }]));

  // A nameless row still learns a name.
  let mut bare = RecipeReference::catalog(3, "x", t0());
  bare.name = None;
  s.upsert_recipe(bare).await.unwrap();
  s.upsert_recipe(RecipeReference::catalog(3, "Learned", t0())).await.unwrap();
  assert_eq!(s.get_recipe(3).await.unwrap().unwrap().name.as_deref(), Some("Learned"));
}

#[tokio::test]
async fn empty_materials_are_not_missing() {
  let s = store().await;
  let mut r = RecipeReference::catalog(1, "Nothing", t0());
  r.materials = Some(vec![]);
  s.upsert_recipe(r).await.unwrap();
  assert!(s.recipes_missing_materials(10).await.unwrap().is_empty());
  assert_eq!(s.get_recipe(1).await.unwrap().unwrap().materials, Some(vec![]));
}

// ─── Market, constants, jobs ─────────────────────────────────────────────────

fn listing(item_id: u32, price: u64) -> PriceScanRow {
  PriceScanRow {
    item_id,
    price,
    quantity: 1,
    timestamp: t0(),
    source: "GoblinAI".into(),
  }
}

#[tokio::test]
async fn scan_batches_append_and_replay_idempotently() {
  let s = store().await;
  let batch = vec![listing(1, 10), listing(1, 10), listing(2, 5)];
  assert_eq!(s.append_scan_batch(batch.clone()).await.unwrap(), 3);
  assert_eq!(s.append_scan_batch(batch).await.unwrap(), 0);

  let mut later = listing(1, 10);
  later.timestamp = t0() + Duration::minutes(5);
  assert_eq!(s.append_scan_batch(vec![later]).await.unwrap(), 1);
}

#[tokio::test]
async fn constants_round_trip_json() {
  let s = store().await;
  s.set_constant("WOW_TOKEN".into(), serde_json::json!({"price": 2_500_000_000_u64}), t0())
    .await
    .unwrap();
  let c = s.get_constant("WOW_TOKEN".into()).await.unwrap().unwrap();
  assert_eq!(c.value["price"], 2_500_000_000_u64);
  assert_eq!(c.updated_at, t0());
  assert!(s.get_constant("NOPE".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn price_snapshots_upsert() {
  let s = store().await;
  let snap = |min_price| ItemPriceSnapshot {
    item_id: 7,
    min_price,
    total_quantity: 40,
    scanned_at: t0(),
    source: "blizzard_commodities".into(),
  };
  s.upsert_price_snapshots(vec![snap(100)]).await.unwrap();
  s.upsert_price_snapshots(vec![snap(90)]).await.unwrap();
  let before = s.state_digest().await.unwrap();
  s.upsert_price_snapshots(vec![snap(90)]).await.unwrap();
  assert_eq!(s.state_digest().await.unwrap(), before);
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_by_id_and_name() {
  let s = store().await;
  let alt = CharacterId::parse("Brax - Ridge").unwrap();
  s.replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Bag, 0, 101, 5)]))
    .await
    .unwrap();
  s.replace_inventory(alt.clone(), scan(t0(), vec![stack(ContainerType::Bank, 0, 101, 10)]))
    .await
    .unwrap();

  let hits = s.search_items(&ItemQuery::Id(101)).await.unwrap();
  assert_eq!(hits.len(), 2);
  assert_eq!(hits[0].character, aria());
  assert_eq!(hits[1].character, alt);
  assert_eq!(hits[1].container_type, ContainerType::Bank);

  let hits = s.search_items(&ItemQuery::Name("item 1".into())).await.unwrap();
  assert_eq!(hits.len(), 2);
  assert!(s.search_items(&ItemQuery::Name("100%".into())).await.unwrap().is_empty());
}

#[tokio::test]
async fn artifact_rows_aggregate_per_container() {
  let s = store().await;
  let alt = CharacterId::parse("Brax - Ridge").unwrap();
  s.replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Bag, 0, 101, 5)]))
    .await
    .unwrap();
  s.replace_inventory(alt.clone(), scan(t0(), vec![
    stack(ContainerType::Bank, 0, 101, 10),
    stack(ContainerType::Bank, 1, 101, 1),
  ]))
  .await
  .unwrap();
  s.upsert_job(JobRecord {
    character: alt.clone(),
    item_id:   101,
    count:     3,
    target:    "Mail".into(),
  })
  .await
  .unwrap();

  let rows = s.artifact_rows().await.unwrap();
  let index: Vec<(u32, ContainerType, u64)> = rows
    .index
    .iter()
    .map(|r| (r.item_id, r.container_type, r.count))
    .collect();
  assert_eq!(index, vec![(101, ContainerType::Bag, 5), (101, ContainerType::Bank, 11)]);
  assert_eq!(rows.index[0].name.as_deref(), Some("Item 101"));
  assert_eq!(rows.jobs.len(), 1);
  assert_eq!(rows.jobs[0].character, alt);
}

async fn replay(s: &SqliteStore) {
  let mut character = CharacterRecord::sighting(aria(), t0());
  character.class = Some("Mage".into());
  s.upsert_character(character).await.unwrap();
  s.replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Bag, 0, 101, 5)]))
    .await
    .unwrap();
  s.append_scan_batch(vec![listing(101, 20)]).await.unwrap();
}

#[tokio::test]
async fn digest_is_stable_under_replay() {
  let s = store().await;
  replay(&s).await;
  let first = s.state_digest().await.unwrap();
  replay(&s).await;
  assert_eq!(s.state_digest().await.unwrap(), first);

  s.replace_inventory(aria(), scan(t0(), vec![stack(ContainerType::Bag, 0, 101, 6)]))
    .await
    .unwrap();
  assert_ne!(s.state_digest().await.unwrap(), first);
}

#[tokio::test]
async fn legacy_tables_gain_new_columns() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("legacy.db");
  {
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "CREATE TABLE characters (
           character_id TEXT PRIMARY KEY, name TEXT NOT NULL, realm TEXT NOT NULL,
           class TEXT, level INTEGER, race TEXT, faction TEXT,
           first_seen TEXT NOT NULL, last_seen TEXT NOT NULL
         );",
      )
      .unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let mut record = CharacterRecord::sighting(aria(), t0());
  record.spec = Some("Frost".into());
  record.item_level = Some(600.0);
  s.upsert_character(record).await.unwrap();
  let c = s.get_character(aria()).await.unwrap().unwrap();
  assert_eq!(c.spec.as_deref(), Some("Frost"));
  assert_eq!(c.item_level, Some(600.0));
}
