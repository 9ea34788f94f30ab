//! Auction snapshot stream.

use chrono::{DateTime, Utc};
use holocron_core::record::PriceScanRow;
use holocron_lua::{Decoded, Table, Value};

use crate::{
  MapContext, MapOutput, MappingError, Record,
  walk::{index_path, int_field, str_field, timestamp_field, u32_from},
};

pub const DEFAULT_SOURCE: &str = "GoblinAI";

const COPPER_PER_SILVER: i64 = 100;
const COPPER_PER_GOLD: i64 = 100 * COPPER_PER_SILVER;

pub(crate) fn map(decoded: &Decoded, ctx: &MapContext, out: &mut MapOutput) {
  for (key, global) in decoded.globals.iter() {
    let path = key.to_string();
    let meta = global.as_map();
    let scanned_at = meta
      .and_then(|t| timestamp_field(t, &["lastScan"]))
      .unwrap_or(ctx.observed_at);
    let source = meta
      .and_then(|t| str_field(t, &["source"]))
      .unwrap_or_else(|| DEFAULT_SOURCE.to_owned());

    let (items, items_path) = match meta {
      Some(t) => match ["scanData", "scans", "items", "auctions"]
        .into_iter()
        .find_map(|k| t.get(k).map(|v| (v, k)))
      {
        Some((v, k)) => (v, format!("{path}.{k}")),
        None => continue,
      },
      None if global.as_list().is_some() => (global, path),
      None => continue,
    };

    for (i, item) in items.values().enumerate() {
      let item_path = index_path(&items_path, i);
      if let Err(reason) = map_listing(item, &item_path, scanned_at, &source, out) {
        out.fail(MappingError::new(item_path, reason));
      }
    }
  }
}

fn map_listing(
  item: &Value,
  path: &str,
  scanned_at: DateTime<Utc>,
  source: &str,
  out: &mut MapOutput,
) -> Result<(), String> {
  let Some(t) = item.as_map() else {
    return Err(format!("expected listing table, found {}", item.type_name()));
  };
  let item_id = int_field(t, &["itemID", "id", "item"]).ok_or("missing item id")?;
  let item_id =
    u32_from(item_id).ok_or_else(|| format!("invalid item id {item_id}"))?;
  let timestamp = timestamp_field(t, &["time", "ts", "timestamp"]).unwrap_or(scanned_at);

  let row = |listing: &Table| -> Result<Option<PriceScanRow>, String> {
    let Some(price) = price(listing)?.filter(|p| *p > 0) else { return Ok(None) };
    let quantity = int_field(listing, &["quantity", "count"]).unwrap_or(1);
    Ok(u32_from(quantity).filter(|q| *q > 0).map(|quantity| PriceScanRow {
      item_id,
      price: price.unsigned_abs(),
      quantity,
      timestamp,
      source: source.to_owned(),
    }))
  };

  match t.get_ignore_case("listings") {
    Some(listings) => {
      for (i, listing) in listings.values().enumerate() {
        let Some(listing) = listing.as_map() else { continue };
        match row(listing) {
          Ok(Some(r)) => out.push(Record::PriceScan(r)),
          Ok(None) => {}
          Err(reason) => out.fail(MappingError::new(
            index_path(&format!("{path}.listings"), i),
            reason,
          )),
        }
      }
    }
    None => {
      if let Some(r) = row(t)? {
        out.push(Record::PriceScan(r));
      }
    }
  }
  Ok(())
}

/// Unit price in copper, from a copper field or `gold`/`silver`/`copper`.
/// `Ok(None)` when the listing carries no price at all.
fn price(t: &Table) -> Result<Option<i64>, String> {
  if let Some(p) = int_field(t, &["price", "unitPrice", "buyout", "minBuyout"]) {
    return Ok(Some(p));
  }
  let gold = int_field(t, &["gold"]);
  let silver = int_field(t, &["silver"]);
  let copper = int_field(t, &["copper"]);
  if gold.is_none() && silver.is_none() && copper.is_none() {
    return Ok(None);
  }
  gold
    .unwrap_or(0)
    .checked_mul(COPPER_PER_GOLD)
    .and_then(|g| g.checked_add(silver.unwrap_or(0).checked_mul(COPPER_PER_SILVER)?))
    .and_then(|c| c.checked_add(copper.unwrap_or(0)))
    .map(Some)
    .ok_or_else(|| {
      format!("price overflows: {gold:?} gold {silver:?} silver {copper:?} copper")
    })
}

#[cfg(test)]
mod tests {
  use holocron_lua::decode_str;

  use super::*;
  use crate::{Stream, map as map_stream};

  fn rows(src: &str) -> (Vec<PriceScanRow>, Vec<MappingError>) {
    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let out =
      map_stream(Stream::PriceScan, &decode_str(src).unwrap(), &MapContext::new(at));
    let rows = out
      .records
      .into_iter()
      .filter_map(|r| match r {
        Record::PriceScan(row) => Some(row),
        _ => None,
      })
      .collect();
    (rows, out.errors)
  }

  #[test]
  fn listings_and_price_forms() {
    let (rows, errors) = rows(
      r#"GoblinAIDB = {
        lastScan = 1700000100,
        scanData = {
          { itemID = 1, price = 250, quantity = 4 },
          { id = 2, gold = 1, silver = 2, copper = 3 },
          { item = 3, listings = { { price = 10, quantity = 2 }, { price = 12 } } },
          { itemID = 4, buyout = 0 },
          { itemID = 5, price = 9, ts = 1700000200 },
          { price = 1 },
        },
      }"#,
    );
    assert_eq!(errors.len(), 1);
    let summary: Vec<_> = rows.iter().map(|r| (r.item_id, r.price, r.quantity)).collect();
    assert_eq!(summary, vec![(1, 250, 4), (2, 10203, 1), (3, 10, 2), (3, 12, 1), (5, 9, 1)]);
    assert_eq!(rows[0].timestamp.timestamp(), 1_700_000_100);
    assert_eq!(rows[4].timestamp.timestamp(), 1_700_000_200);
    assert!(rows.iter().all(|r| r.source == DEFAULT_SOURCE));
  }

  #[test]
  fn overflowing_price_drops_only_that_listing() {
    let (rows, errors) = rows(
      r#"GoblinAIDB = { scanData = {
        { itemID = 5, gold = 1000000000000000 },
        { itemID = 6, gold = 2 },
        { itemID = 7, listings = { { silver = 9223372036854775807 }, { price = 3 } } },
      } }"#,
    );
    let summary: Vec<_> = rows.iter().map(|r| (r.item_id, r.price)).collect();
    assert_eq!(summary, vec![(6, 20_000), (7, 3)]);
    let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["GoblinAIDB.scanData[1]", "GoblinAIDB.scanData[3].listings[1]"]);
  }

  #[test]
  fn bare_list_global_uses_observation_time() {
    let (rows, errors) = rows("Scans = { { itemID = 9, unitPrice = 5 } }");
    assert!(errors.is_empty());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp.timestamp(), 1_700_000_000);
  }
}
