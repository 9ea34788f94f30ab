//! Response bodies of the game data API, reduced to the fields we read.

use chrono::{DateTime, Utc};
use holocron_core::record::{Material, RecipeReference};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthToken {
  pub access_token: String,
  #[serde(default = "default_expires_in")]
  pub expires_in:   u64,
}

fn default_expires_in() -> u64 { 86_400 }

#[derive(Debug, Clone, Deserialize)]
pub struct TokenIndex {
  /// Milliseconds since the epoch.
  pub last_updated_timestamp: i64,
  /// Copper.
  pub price:                  u64,
}

impl TokenIndex {
  pub fn updated_at(&self) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(self.last_updated_timestamp)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auctions {
  #[serde(default)]
  pub auctions: Vec<Auction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auction {
  pub id:         u64,
  pub item:       Ref,
  #[serde(default)]
  pub quantity:   u32,
  pub unit_price: Option<u64>,
  /// Whole-auction buyout; realm auctions of non-stackables carry this
  /// instead of `unit_price`.
  pub buyout:     Option<u64>,
}

impl Auction {
  /// Per-unit price in copper, if the auction can be bought out.
  pub fn unit_price(&self) -> Option<u64> {
    self.unit_price.or_else(|| {
      let quantity = u64::from(self.quantity.max(1));
      self.buyout.map(|b| b / quantity)
    })
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Ref {
  pub id: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Named {
  pub id:   u32,
  pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfessionIndex {
  #[serde(default)]
  pub professions: Vec<Named>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profession {
  pub id:          u32,
  pub name:        String,
  #[serde(default)]
  pub skill_tiers: Vec<Named>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkillTier {
  pub id:         u32,
  pub name:       String,
  #[serde(default)]
  pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
  #[serde(default)]
  pub recipes: Vec<Named>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
  pub id:               u32,
  pub name:             Option<String>,
  #[serde(default)]
  pub reagents:         Vec<Reagent>,
  pub crafted_item:     Option<Ref>,
  pub crafted_quantity: Option<CraftedQuantity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reagent {
  pub reagent:  Ref,
  pub quantity: u32,
}

/// Either a fixed `value` or a `minimum`..`maximum` range.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CraftedQuantity {
  pub value:   Option<f64>,
  pub minimum: Option<f64>,
}

impl Recipe {
  /// The enrichment half of a catalog entry. A recipe without reagents
  /// yields `Some(vec![])` so it is not fetched again.
  pub fn into_reference(self, at: DateTime<Utc>) -> RecipeReference {
    let crafted_quantity = self
      .crafted_quantity
      .and_then(|q| q.value.or(q.minimum))
      .filter(|q| q.is_finite() && *q >= 0.0)
      .map(|q| q.round() as u32);
    RecipeReference {
      recipe_id: self.id,
      name: self.name,
      profession: None,
      skill_tier: None,
      materials: Some(
        self
          .reagents
          .into_iter()
          .map(|r| Material { item_id: r.reagent.id, quantity: r.quantity })
          .collect(),
      ),
      crafted_item_id: self.crafted_item.map(|r| r.id),
      crafted_quantity,
      updated_at: at,
    }
  }
}
