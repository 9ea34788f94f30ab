//! Per-addon schema mappers.
//!
//! Each mapper is a pure function from a decoded snapshot to typed records.
//! Mappers never touch persistence; the ingest pipeline decides what to do
//! with the [`Record`]s. A subtree that does not have the expected shape
//! produces a [`MappingError`] and is dropped while its siblings proceed.

pub mod characters;
pub mod error;
pub mod metrics;
pub mod price_scan;
pub mod professions;
pub mod telemetry;
mod walk;

use std::fmt;

use chrono::{DateTime, Utc};
use holocron_core::{
  CharacterId,
  board::SYSTEM,
  record::{
    CharacterRecord, InventoryScan, PriceScanRow, ProfessionRecord,
    RecipeReference,
  },
  sanity::{ReasonCode, Reported, TelemetryRecord},
};
use holocron_lua::Decoded;

pub use error::MappingError;

// ─── Streams ─────────────────────────────────────────────────────────────────

/// A known addon stream: which file it arrives in and which mapper reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stream {
  Inventory,
  Professions,
  PriceScan,
  Telemetry,
  BattlePets,
  CombatHelper,
}

impl Stream {
  pub const ALL: [Stream; 6] = [
    Self::Inventory,
    Self::Professions,
    Self::PriceScan,
    Self::Telemetry,
    Self::BattlePets,
    Self::CombatHelper,
  ];

  /// The addon that writes this stream.
  pub fn addon(self) -> &'static str {
    match self {
      Self::Inventory => "DeepPockets",
      Self::Professions => "TradeSkillMaster",
      Self::PriceScan => "GoblinAI",
      Self::Telemetry => "HolocronSanity",
      Self::BattlePets => "PetWeaver",
      Self::CombatHelper => "SkillWeaver",
    }
  }

  pub fn file_name(self) -> String { format!("{}.lua", self.addon()) }

  pub fn from_file_name(name: &str) -> Option<Self> {
    let stem = name.strip_suffix(".lua").or_else(|| name.strip_suffix(".LUA"))?;
    Self::ALL
      .into_iter()
      .find(|s| s.addon().eq_ignore_ascii_case(stem))
  }

  /// Accepts the addon name or the stream's own name, any case.
  pub fn from_name(name: &str) -> Option<Self> {
    let name = name.trim();
    Self::ALL.into_iter().find(|s| {
      s.addon().eq_ignore_ascii_case(name) || s.to_string().eq_ignore_ascii_case(name)
    })
  }

  /// Infer the stream from the snapshot's global names, e.g. `DeepPocketsDB`.
  pub fn detect(decoded: &Decoded) -> Option<Self> {
    decoded.globals.iter().find_map(|(key, _)| {
      let name = key.to_string().to_ascii_lowercase();
      Self::ALL
        .into_iter()
        .find(|s| name.starts_with(&s.addon().to_ascii_lowercase()))
    })
  }
}

impl fmt::Display for Stream {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Inventory => "inventory",
      Self::Professions => "professions",
      Self::PriceScan => "price_scan",
      Self::Telemetry => "telemetry",
      Self::BattlePets => "battle_pets",
      Self::CombatHelper => "combat_helper",
    })
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Where and when a snapshot was observed.
#[derive(Debug, Clone, PartialEq)]
pub struct MapContext {
  /// Observation time: the file's mtime, or the upload time.
  pub observed_at: DateTime<Utc>,
  /// Set for per-character files (`<realm>/<character>/SavedVariables`).
  pub character:   Option<CharacterId>,
  pub account:     Option<String>,
}

impl MapContext {
  pub fn new(observed_at: DateTime<Utc>) -> Self {
    Self { observed_at, character: None, account: None }
  }

  /// Sanity key for account-wide streams that name no character.
  pub fn subject(&self) -> String {
    match (&self.character, &self.account) {
      (Some(id), _) => id.to_string(),
      (None, Some(account)) => format!("Account-{account}"),
      (None, None) => "Account".to_owned(),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
  Character(CharacterRecord),
  Inventory {
    character: CharacterId,
    scan:      InventoryScan,
  },
  Profession(ProfessionRecord),
  Recipe(RecipeReference),
  PriceScan(PriceScanRow),
  Telemetry(TelemetryRecord),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapOutput {
  pub records: Vec<Record>,
  pub errors:  Vec<MappingError>,
}

impl MapOutput {
  pub(crate) fn push(&mut self, record: Record) { self.records.push(record); }

  pub(crate) fn fail(&mut self, error: MappingError) { self.errors.push(error); }
}

/// Run the mapper for `stream`.
///
/// A snapshot with no globals maps to a single `SNAPSHOT_EMPTY` component
/// record under [`SYSTEM`], keyed by the stream's file name.
pub fn map(stream: Stream, decoded: &Decoded, ctx: &MapContext) -> MapOutput {
  let mut out = MapOutput::default();

  if decoded.is_empty() {
    out.push(Record::Telemetry(TelemetryRecord {
      character: SYSTEM.to_owned(),
      addon:     stream.file_name(),
      reported:  Reported::issue(
        ReasonCode::SnapshotEmpty,
        "DB empty or parse failed",
      )
      .at(ctx.observed_at),
      snapshot:  None,
    }));
    return out;
  }

  match stream {
    Stream::Inventory => characters::map(decoded, ctx, &mut out),
    Stream::Professions => professions::map(decoded, ctx, &mut out),
    Stream::PriceScan => price_scan::map(decoded, ctx, &mut out),
    Stream::Telemetry => telemetry::map(decoded, ctx, &mut out),
    Stream::BattlePets => metrics::map_battle_pets(decoded, ctx, &mut out),
    Stream::CombatHelper => metrics::map_combat_helper(decoded, ctx, &mut out),
  }
  out
}

#[cfg(test)]
mod tests {
  use holocron_lua::decode_str;

  use super::*;

  #[test]
  fn stream_names() {
    assert_eq!(Stream::from_file_name("DeepPockets.lua"), Some(Stream::Inventory));
    assert_eq!(Stream::from_file_name("skillweaver.lua"), Some(Stream::CombatHelper));
    assert_eq!(Stream::from_file_name("DeepPockets.lua.bak"), None);
    assert_eq!(Stream::from_name("price_scan"), Some(Stream::PriceScan));
    assert_eq!(Stream::from_name("goblinai"), Some(Stream::PriceScan));
  }

  #[test]
  fn detects_stream_from_globals() {
    let d = decode_str("TradeSkillMasterDB = { }").unwrap();
    assert_eq!(Stream::detect(&d), Some(Stream::Professions));
    let d = decode_str("Unrelated = 1").unwrap();
    assert_eq!(Stream::detect(&d), None);
  }

  #[test]
  fn empty_snapshot_reports_empty() {
    let d = decode_str("-- nothing here\n").unwrap();
    let ctx = MapContext {
      account: Some("ACCT".into()),
      ..MapContext::new(Utc::now())
    };
    let out = map(Stream::BattlePets, &d, &ctx);
    let [Record::Telemetry(t)] = out.records.as_slice() else {
      panic!("{:?}", out.records);
    };
    assert_eq!(t.character, SYSTEM);
    assert_eq!(t.addon, "PetWeaver.lua");
    assert_eq!(t.reported.code.as_deref(), Some("SNAPSHOT_EMPTY"));
  }
}
