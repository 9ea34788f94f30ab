//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Recipe materials and constant values are
//! compact JSON. Container types use their canonical names.

use chrono::{DateTime, Utc};
use holocron_core::{
  CharacterId,
  record::{
    Character, ContainerType, ItemStack, Material, RecipeReference,
    StorageLocation,
  },
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_u32(column: &'static str, value: i64) -> Result<u32> {
  u32::try_from(value).map_err(|_| Error::NegativeCount { column, value })
}

pub fn decode_container(s: &str) -> Result<ContainerType> { Ok(s.parse()?) }

pub fn encode_materials(materials: &[Material]) -> Result<String> {
  Ok(serde_json::to_string(materials)?)
}

pub fn decode_materials(s: &str) -> Result<Vec<Material>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw columns read from a `characters` row.
pub struct RawCharacter {
  pub character_id: String,
  pub name:         String,
  pub realm:        String,
  pub class:        Option<String>,
  pub level:        Option<i64>,
  pub race:         Option<String>,
  pub faction:      Option<String>,
  pub spec:         Option<String>,
  pub item_level:   Option<f64>,
  pub first_seen:   String,
  pub last_seen:    String,
}

impl RawCharacter {
  pub fn into_character(self) -> Result<Character> {
    Ok(Character {
      id:         CharacterId::parse(&self.character_id)?,
      name:       self.name,
      realm:      self.realm,
      class:      self.class,
      level:      self.level.map(|l| decode_u32("level", l)).transpose()?,
      race:       self.race,
      faction:    self.faction,
      spec:       self.spec,
      item_level: self.item_level,
      first_seen: decode_dt(&self.first_seen)?,
      last_seen:  decode_dt(&self.last_seen)?,
    })
  }
}

/// Raw columns read from an `items` row.
pub struct RawItem {
  pub item_handle:     String,
  pub character_id:    String,
  pub container_type:  String,
  pub container_index: i64,
  pub item_id:         i64,
  pub count:           i64,
  pub name:            Option<String>,
  pub last_updated:    String,
}

impl RawItem {
  pub fn into_stack(self) -> Result<ItemStack> {
    Ok(ItemStack {
      handle:       self.item_handle,
      character:    CharacterId::parse(&self.character_id)?,
      location:     StorageLocation::new(
        decode_container(&self.container_type)?,
        decode_u32("container_index", self.container_index)?,
      ),
      item_id:      decode_u32("item_id", self.item_id)?,
      count:        decode_u32("count", self.count)?,
      name:         self.name,
      last_updated: decode_dt(&self.last_updated)?,
    })
  }
}

/// Raw columns read from a `recipe_reference` row.
pub struct RawRecipe {
  pub recipe_id:        i64,
  pub name:             Option<String>,
  pub profession:       Option<String>,
  pub skill_tier:       Option<String>,
  pub materials:        Option<String>,
  pub crafted_item_id:  Option<i64>,
  pub crafted_quantity: Option<i64>,
  pub updated_at:       String,
}

impl RawRecipe {
  pub const COLUMNS: &'static str = "recipe_id, name, profession, skill_tier, \
                                     materials, crafted_item_id, \
                                     crafted_quantity, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      recipe_id:        row.get(0)?,
      name:             row.get(1)?,
      profession:       row.get(2)?,
      skill_tier:       row.get(3)?,
      materials:        row.get(4)?,
      crafted_item_id:  row.get(5)?,
      crafted_quantity: row.get(6)?,
      updated_at:       row.get(7)?,
    })
  }

  pub fn into_recipe(self) -> Result<RecipeReference> {
    Ok(RecipeReference {
      recipe_id:        decode_u32("recipe_id", self.recipe_id)?,
      name:             self.name,
      profession:       self.profession,
      skill_tier:       self.skill_tier,
      materials:        self.materials.as_deref().map(decode_materials).transpose()?,
      crafted_item_id:  self
        .crafted_item_id
        .map(|v| decode_u32("crafted_item_id", v))
        .transpose()?,
      crafted_quantity: self
        .crafted_quantity
        .map(|v| decode_u32("crafted_quantity", v))
        .transpose()?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}
