//! Inventory stream: characters, storage locations, and item stacks.

use holocron_core::{
  CharacterId,
  record::{
    CharacterRecord, ContainerType, InventoryScan, ItemStackRecord,
    StorageLocation,
  },
  sanity::{Metric, Reported, Snapshot, TelemetryRecord},
};
use holocron_lua::{Decoded, Table, Value};

use crate::{
  MapContext, MapOutput, MappingError, Record, Stream,
  walk::{
    child_path, float_field, index_path, int_field, str_field, u32_from,
  },
};

/// Fixture characters that show up in shared test data.
const SKIPPED_NAMES: &[&str] = &["Jaina", "Thrall"];

pub(crate) fn map(decoded: &Decoded, ctx: &MapContext, out: &mut MapOutput) {
  for (key, global) in decoded.globals.iter() {
    let Some(root) = character_root(global) else {
      continue;
    };
    let path = key.to_string();
    for (entry_key, entry) in root.iter() {
      let entry_path = child_path(&path, entry_key);
      if !entry.is_table() {
        continue;
      }
      let raw = entry_key.to_string();
      let id = match CharacterId::parse(&raw) {
        Ok(id) => id,
        Err(e) => {
          out.fail(MappingError::new(entry_path, e.to_string()));
          continue;
        }
      };
      if SKIPPED_NAMES.contains(&id.name()) {
        continue;
      }
      map_character(id, entry, &entry_path, ctx, out);
    }
  }
}

/// `<global>.global.Inventory`, then `<global>.Inventory`, then the global.
fn character_root(global: &Value) -> Option<&Table> {
  let top = global.as_map()?;
  let nested = top
    .get("global")
    .and_then(|g| g.get("Inventory"))
    .or_else(|| top.get("Inventory"));
  match nested {
    Some(v) => v.as_map(),
    None => Some(top),
  }
}

fn map_character(
  id: CharacterId,
  entry: &Value,
  path: &str,
  ctx: &MapContext,
  out: &mut MapOutput,
) {
  let fields = entry.as_map();
  let items = match fields {
    Some(t) => t.get_ignore_case("items"),
    None => Some(entry),
  };

  let mut record = CharacterRecord::sighting(id.clone(), ctx.observed_at);
  let mut money = None;
  if let Some(t) = fields {
    record.class = str_field(t, &["class"]);
    record.level = int_field(t, &["level"]).and_then(u32_from);
    record.race = str_field(t, &["race"]);
    record.faction = str_field(t, &["faction"]);
    record.spec = str_field(t, &["spec"]);
    record.item_level = float_field(t, &["ilvl", "itemLevel"]);
    money = int_field(t, &["money"]);
  }
  out.push(Record::Character(record));

  let mut scan = InventoryScan::new(ctx.observed_at);
  if let Some(scanned) = fields.and_then(|t| t.get_ignore_case("scanned")) {
    for (i, v) in scanned.values().enumerate() {
      match v.as_str().and_then(ContainerType::from_alias) {
        Some(t) => scan.mark_scanned(t),
        None => out.fail(MappingError::new(
          index_path(&format!("{path}.scanned"), i),
          format!("unknown container {v:?}"),
        )),
      }
    }
  }

  let mut entries = 0_i64;
  let items_path = if fields.is_some() {
    format!("{path}.items")
  } else {
    path.to_owned()
  };
  for (i, item) in items.into_iter().flat_map(Value::values).enumerate() {
    let item_path = index_path(&items_path, i);
    match item_stack(item) {
      Ok(stack) => {
        entries += 1;
        if stack.count == 0 {
          scan.mark_scanned(stack.location.container_type);
        } else {
          scan.push(stack);
        }
      }
      Err(reason) => out.fail(MappingError::new(item_path, reason)),
    }
  }

  let mut snapshot = Snapshot::new().with("inv_count", Metric::Count(entries));
  if let Some(money) = money {
    snapshot.insert("money_copper", Metric::Count(money));
  }
  out.push(Record::Telemetry(TelemetryRecord {
    character: id.to_string(),
    addon:     Stream::Inventory.addon().to_owned(),
    reported:  Reported::ok(ctx.observed_at),
    snapshot:  Some(snapshot),
  }));
  out.push(Record::Inventory { character: id, scan });
}

fn item_stack(item: &Value) -> Result<ItemStackRecord, String> {
  let Some(t) = item.as_map() else {
    return Err(format!("expected item table, found {}", item.type_name()));
  };
  let item_id = int_field(t, &["id", "itemID"])
    .ok_or("missing item id")?;
  let item_id =
    u32_from(item_id).ok_or_else(|| format!("invalid item id {item_id}"))?;

  let count = int_field(t, &["count"]).unwrap_or(1);
  let count =
    u32_from(count).ok_or_else(|| format!("invalid count {count}"))?;

  let container_type = match str_field(t, &["loc", "location"]) {
    Some(alias) => ContainerType::from_alias(&alias)
      .ok_or_else(|| format!("unknown container {alias:?}"))?,
    None => ContainerType::Bag,
  };
  let index = int_field(t, &["bag", "container", "index"]).unwrap_or(0);
  let index =
    u32_from(index).ok_or_else(|| format!("invalid container index {index}"))?;

  Ok(ItemStackRecord {
    location: StorageLocation::new(container_type, index),
    item_id,
    count,
    name: str_field(t, &["name"]),
  })
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, Utc};
  use holocron_lua::decode_str;

  use super::*;
  use crate::map as map_stream;

  fn at() -> DateTime<Utc> { DateTime::from_timestamp(1_700_000_000, 0).unwrap() }

  fn run(src: &str) -> MapOutput {
    let decoded = decode_str(src).unwrap();
    map_stream(Stream::Inventory, &decoded, &MapContext::new(at()))
  }

  fn scans(out: &MapOutput) -> Vec<(&CharacterId, &InventoryScan)> {
    out
      .records
      .iter()
      .filter_map(|r| match r {
        Record::Inventory { character, scan } => Some((character, scan)),
        _ => None,
      })
      .collect()
  }

  #[test]
  fn minimal_inventory() {
    let out = run(r#"Inv = { ["Aria - Ridge"] = { { id=101, count=5, loc="Bag" } } }"#);
    assert!(out.errors.is_empty(), "{:?}", out.errors);

    let Some(Record::Character(c)) = out.records.first() else {
      panic!("{:?}", out.records);
    };
    assert_eq!(c.id.as_str(), "Player-Ridge-Aria");
    // Sentinels are the store's job; a missing field stays missing here.
    assert_eq!(c.class, None);
    assert_eq!(c.level, None);
    assert_eq!(c.seen_at, at());

    let found = scans(&out);
    let [(id, scan)] = found.as_slice() else { panic!() };
    assert_eq!(id.as_str(), "Player-Ridge-Aria");
    assert_eq!(scan.stacks, vec![ItemStackRecord {
      location: StorageLocation::new(ContainerType::Bag, 0),
      item_id:  101,
      count:    5,
      name:     None,
    }]);
    assert!(scan.surface.contains(&ContainerType::Bag));
  }

  #[test]
  fn nested_root_with_fields() {
    let out = run(
      r#"DeepPocketsDB = { global = { Inventory = {
        ["Brax-Twisting Nether"] = {
          class = "Warrior", level = 70, ilvl = 612.5, money = 12345,
          scanned = { "Bank" },
          items = {
            { itemID = 7, count = 2, location = "reagentbank", bag = 3, name = "Ore" },
            { itemID = 7, count = 3, location = "Bank", bag = 3 },
          },
        },
      } } }"#,
    );
    assert!(out.errors.is_empty(), "{:?}", out.errors);
    let Some(Record::Character(c)) = out.records.first() else { panic!() };
    assert_eq!(c.id.as_str(), "Player-TwistingNether-Brax");
    assert_eq!(c.class.as_deref(), Some("Warrior"));
    assert_eq!(c.level, Some(70));
    assert_eq!(c.item_level, Some(612.5));

    let found = scans(&out);
    let [(_, scan)] = found.as_slice() else { panic!() };
    assert_eq!(scan.stacks.len(), 1);
    assert_eq!(scan.stacks[0].count, 5);
    assert_eq!(scan.stacks[0].name.as_deref(), Some("Ore"));

    let telemetry = out
      .records
      .iter()
      .find_map(|r| match r {
        Record::Telemetry(t) => Some(t),
        _ => None,
      })
      .unwrap();
    let snapshot = telemetry.snapshot.as_ref().unwrap();
    assert_eq!(snapshot.count("inv_count"), Some(2));
    assert_eq!(snapshot.count("money_copper"), Some(12345));
  }

  #[test]
  fn bad_items_are_dropped_individually() {
    let out = run(
      r#"Inv = { ["Aria - Ridge"] = {
        { id = 1, count = -4 },
        { id = 2, loc = "Saddlebag" },
        { count = 1 },
        { id = 3, count = 1 },
      } }"#,
    );
    assert_eq!(out.errors.len(), 3);
    assert!(out.errors[1].path.ends_with("[2]"), "{}", out.errors[1]);
    let found = scans(&out);
    let [(_, scan)] = found.as_slice() else { panic!() };
    assert_eq!(scan.stacks.len(), 1);
    assert_eq!(scan.stacks[0].item_id, 3);
  }

  #[test]
  fn zero_counts_cover_the_surface_without_rows() {
    let out = run(r#"Inv = { ["Aria - Ridge"] = { { id = 1, count = 0, loc = "Mail" } } }"#);
    let found = scans(&out);
    let [(_, scan)] = found.as_slice() else { panic!() };
    assert!(scan.stacks.is_empty());
    assert!(scan.surface.contains(&ContainerType::Mail));
  }

  #[test]
  fn fixture_characters_are_skipped() {
    let out = run(
      r#"Inv = {
        ["Jaina - Ridge"] = { { id = 1 } },
        ["Thrall-Ridge"] = { { id = 1 } },
        ["not an identity"] = { { id = 1 } },
      }"#,
    );
    assert!(scans(&out).is_empty());
    assert_eq!(out.errors.len(), 1);
  }
}
