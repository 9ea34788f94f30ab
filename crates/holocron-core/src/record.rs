//! Typed records produced by the schema mappers and persisted by a
//! [`SyncStore`](crate::store::SyncStore).
//!
//! Timestamps on records are observation times (the snapshot file's mtime,
//! or the moment an API response was received). Stores never stamp rows with
//! the wall clock, so replaying an unchanged snapshot writes identical rows.

use std::{
  collections::{BTreeSet, HashMap},
  fmt,
  str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CharacterId, Error, Result};

// ─── Containers ──────────────────────────────────────────────────────────────

/// Where an item stack lives.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub enum ContainerType {
  Bag,
  Bank,
  Warbank,
  GuildBank,
  Mail,
  Void,
}

impl ContainerType {
  pub const ALL: [ContainerType; 6] = [
    Self::Bag,
    Self::Bank,
    Self::Warbank,
    Self::GuildBank,
    Self::Mail,
    Self::Void,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Bag => "Bag",
      Self::Bank => "Bank",
      Self::Warbank => "Warbank",
      Self::GuildBank => "GuildBank",
      Self::Mail => "Mail",
      Self::Void => "Void",
    }
  }

  /// Resolve the location spellings addons actually write.
  pub fn from_alias(raw: &str) -> Option<Self> {
    let key: String = raw
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .collect::<String>()
      .to_ascii_lowercase();
    match key.as_str() {
      "bag" | "bags" | "inventory" | "backpack" => Some(Self::Bag),
      "bank" | "reagentbank" => Some(Self::Bank),
      "warbank" | "accountbank" | "warband" | "warbandbank" => {
        Some(Self::Warbank)
      }
      "guild" | "guildbank" => Some(Self::GuildBank),
      "mail" | "mailbox" => Some(Self::Mail),
      "void" | "voidstorage" => Some(Self::Void),
      _ => None,
    }
  }
}

impl fmt::Display for ContainerType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ContainerType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| Error::UnknownContainer(s.to_owned()))
  }
}

/// A storage location owned by one character.
/// Unique per `(character, container_type, container_index)`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
pub struct StorageLocation {
  pub container_type:  ContainerType,
  pub container_index: u32,
}

impl StorageLocation {
  pub fn new(container_type: ContainerType, container_index: u32) -> Self {
    Self { container_type, container_index }
  }
}

// ─── Characters ──────────────────────────────────────────────────────────────

/// Class stored for a character first seen without one.
pub const UNKNOWN_CLASS: &str = "Unknown";
/// Level stored for a character first seen without one.
pub const MAX_LEVEL_DEFAULT: u32 = 80;

/// A character sighting. `None` fields never overwrite stored values; a
/// character's first sighting stores [`UNKNOWN_CLASS`] and
/// [`MAX_LEVEL_DEFAULT`] in place of a missing class or level.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterRecord {
  pub id:         CharacterId,
  pub class:      Option<String>,
  pub level:      Option<u32>,
  pub race:       Option<String>,
  pub faction:    Option<String>,
  pub spec:       Option<String>,
  pub item_level: Option<f64>,
  pub seen_at:    DateTime<Utc>,
}

impl CharacterRecord {
  /// A bare sighting carrying identity and observation time only.
  pub fn sighting(id: CharacterId, seen_at: DateTime<Utc>) -> Self {
    Self {
      id,
      class: None,
      level: None,
      race: None,
      faction: None,
      spec: None,
      item_level: None,
      seen_at,
    }
  }
}

/// A persisted character row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
  pub id:         CharacterId,
  pub name:       String,
  pub realm:      String,
  pub class:      Option<String>,
  pub level:      Option<u32>,
  pub race:       Option<String>,
  pub faction:    Option<String>,
  pub spec:       Option<String>,
  pub item_level: Option<f64>,
  pub first_seen: DateTime<Utc>,
  pub last_seen:  DateTime<Utc>,
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStackRecord {
  pub location: StorageLocation,
  pub item_id:  u32,
  pub count:    u32,
  pub name:     Option<String>,
}

/// One character's inventory scan: the new ground truth for `surface`.
#[derive(Debug, Clone)]
pub struct InventoryScan {
  /// Container types covered by this scan. Only these are replaced.
  pub surface:    BTreeSet<ContainerType>,
  pub stacks:     Vec<ItemStackRecord>,
  pub scanned_at: DateTime<Utc>,
  /// `(location, item_id)` to its slot in `stacks`.
  slots:          HashMap<(StorageLocation, u32), usize>,
}

impl PartialEq for InventoryScan {
  fn eq(&self, other: &Self) -> bool {
    self.surface == other.surface
      && self.stacks == other.stacks
      && self.scanned_at == other.scanned_at
  }
}

impl InventoryScan {
  pub fn new(scanned_at: DateTime<Utc>) -> Self {
    Self {
      surface: BTreeSet::new(),
      stacks: Vec::new(),
      scanned_at,
      slots: HashMap::new(),
    }
  }

  /// Add a stack, folding it into an existing stack at the same location.
  pub fn push(&mut self, stack: ItemStackRecord) {
    self.surface.insert(stack.location.container_type);
    let key = (stack.location, stack.item_id);
    // A slot is only trusted while it still points at a matching stack.
    let existing = self.slots.get(&key).and_then(|&at| {
      self
        .stacks
        .get_mut(at)
        .filter(|s| s.location == stack.location && s.item_id == stack.item_id)
    });
    if let Some(existing) = existing {
      existing.count = existing.count.saturating_add(stack.count);
      if existing.name.is_none() {
        existing.name = stack.name;
      }
      return;
    }
    self.slots.insert(key, self.stacks.len());
    self.stacks.push(stack);
  }

  /// Mark a container type as scanned even if it holds nothing.
  pub fn mark_scanned(&mut self, container_type: ContainerType) {
    self.surface.insert(container_type);
  }
}

/// Stable handle for an item stack: `<character>:<item_id>:<type>:<index>`.
pub fn item_handle(
  character: &CharacterId,
  item_id: u32,
  location: StorageLocation,
) -> String {
  format!(
    "{character}:{item_id}:{}:{}",
    location.container_type, location.container_index
  )
}

/// A persisted item stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
  pub handle:       String,
  pub character:    CharacterId,
  pub location:     StorageLocation,
  pub item_id:      u32,
  pub count:        u32,
  pub name:         Option<String>,
  pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventorySummary {
  pub removed:  usize,
  pub inserted: usize,
}

// ─── Professions & recipes ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfessionRecord {
  pub character:     CharacterId,
  pub profession_id: u32,
  pub name:          String,
  pub skill:         u32,
  pub max_skill:     u32,
  pub updated_at:    DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
  pub item_id:  u32,
  pub quantity: u32,
}

/// Global recipe catalog entry.
///
/// Catalog fields (`name`, `profession`, `skill_tier`) come from ingest or
/// the catalog import; `materials` and the crafted fields come from
/// enrichment. Any field left `None` keeps whatever the store already holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeReference {
  pub recipe_id:        u32,
  pub name:             Option<String>,
  pub profession:       Option<String>,
  pub skill_tier:       Option<String>,
  pub materials:        Option<Vec<Material>>,
  pub crafted_item_id:  Option<u32>,
  pub crafted_quantity: Option<u32>,
  pub updated_at:       DateTime<Utc>,
}

impl RecipeReference {
  pub fn catalog(
    recipe_id: u32,
    name: impl Into<String>,
    updated_at: DateTime<Utc>,
  ) -> Self {
    Self {
      recipe_id,
      name: Some(name.into()),
      profession: None,
      skill_tier: None,
      materials: None,
      crafted_item_id: None,
      crafted_quantity: None,
      updated_at,
    }
  }
}

// ─── Market ──────────────────────────────────────────────────────────────────

/// One observed listing. `price` is per unit, in copper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceScanRow {
  pub item_id:   u32,
  pub price:     u64,
  pub quantity:  u32,
  pub timestamp: DateTime<Utc>,
  pub source:    String,
}

/// Per-item aggregate of a commodity scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPriceSnapshot {
  pub item_id:        u32,
  pub min_price:      u64,
  pub total_quantity: u64,
  pub scanned_at:     DateTime<Utc>,
  pub source:         String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConstant {
  pub key:        String,
  pub value:      serde_json::Value,
  pub updated_at: DateTime<Utc>,
}

// ─── Jobs & read models ──────────────────────────────────────────────────────

/// A logistics job surfaced to the client through `JobsDB`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
  pub character: CharacterId,
  pub item_id:   u32,
  pub count:     u32,
  pub target:    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSearchHit {
  pub name:            String,
  pub item_id:         u32,
  pub count:           u32,
  pub container_type:  ContainerType,
  pub container_index: u32,
  pub character:       CharacterId,
}

/// Per-item, per-container total across all characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
  pub item_id:        u32,
  pub name:           Option<String>,
  pub container_type: ContainerType,
  pub count:          u64,
}

/// Everything the artifact emitter needs, read in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactRows {
  pub index: Vec<IndexRow>,
  pub jobs:  Vec<JobRecord>,
}
