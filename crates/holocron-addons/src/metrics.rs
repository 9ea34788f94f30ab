//! Metric-only streams: these addons feed the sanity board and nothing else.

use holocron_core::sanity::{Metric, Reported, Snapshot, TelemetryRecord};
use holocron_lua::{Decoded, Value};

use crate::{
  MapContext, MapOutput, Record, Stream,
  walk::{count_tables_with, find_key},
};

pub(crate) fn map_battle_pets(
  decoded: &Decoded,
  ctx: &MapContext,
  out: &mut MapOutput,
) {
  let mut pets = 0;
  let mut strategies = 0;
  for (_, global) in decoded.globals.iter() {
    pets += count_tables_with(global, &["speciesId", "speciesID"]);
    strategies += find_key(global, &["teams", "strategies"]).map_or(0, Value::table_len);
  }
  let snapshot = Snapshot::new()
    .with("owned_pet_count", count(pets))
    .with("strategy_count", count(strategies));
  push(Stream::BattlePets, snapshot, ctx, out);
}

pub(crate) fn map_combat_helper(
  decoded: &Decoded,
  ctx: &MapContext,
  out: &mut MapOutput,
) {
  let mut modules = 0;
  let mut spec = false;
  for (_, global) in decoded.globals.iter() {
    modules += find_key(global, &["sequences", "modules"]).map_or(0, Value::table_len);
    spec |= find_key(global, &["spec", "activeSpec", "specID"])
      .is_some_and(|v| v.as_int().is_some_and(|id| id > 0));
  }
  let snapshot = Snapshot::new()
    .with("module_count", count(modules))
    .with("active_spec_present", Metric::Flag(spec));
  push(Stream::CombatHelper, snapshot, ctx, out);
}

fn count(n: usize) -> Metric { Metric::Count(i64::try_from(n).unwrap_or(i64::MAX)) }

fn push(stream: Stream, snapshot: Snapshot, ctx: &MapContext, out: &mut MapOutput) {
  out.push(Record::Telemetry(TelemetryRecord {
    character: ctx.subject(),
    addon:     stream.addon().to_owned(),
    reported:  Reported::ok(ctx.observed_at),
    snapshot:  Some(snapshot),
  }));
}
