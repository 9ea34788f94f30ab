//! In-memory sanity state: one entry per `(character, addon)` stream.
//!
//! The board holds raw observations only. Verdicts are computed on read by
//! [`evaluate`](crate::sanity::evaluate), so the document always reflects the
//! current clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sanity::{
  Reason, ReasonCode, Reported, Snapshot, Status, TelemetryRecord, evaluate,
};

/// Pseudo-character under which pipeline components report their health.
pub const SYSTEM: &str = "System";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamState {
  pub reported:      Reported,
  pub snapshot:      Option<Snapshot>,
  pub prev_snapshot: Option<Snapshot>,
}

#[derive(Debug, Default)]
pub struct SanityBoard {
  streams: BTreeMap<String, BTreeMap<String, StreamState>>,
}

impl SanityBoard {
  pub fn new() -> Self { Self::default() }

  /// Record an observation. A snapshot with different metrics rotates the
  /// current one into `prev_snapshot`; an identical snapshot or none at all
  /// keeps both, so a re-read file does not erase the comparison.
  pub fn record(&mut self, record: TelemetryRecord) {
    let state = self
      .streams
      .entry(record.character)
      .or_default()
      .entry(record.addon)
      .or_default();

    if let Some(snapshot) = record.snapshot
      && state.snapshot.as_ref() != Some(&snapshot)
    {
      state.prev_snapshot = state.snapshot.replace(snapshot);
    }
    state.reported = record.reported;
  }

  /// Report component health under [`SYSTEM`].
  pub fn component_issue(
    &mut self,
    component: &str,
    code: ReasonCode,
    message: impl Into<String>,
    at: DateTime<Utc>,
  ) {
    self.record(TelemetryRecord {
      character: SYSTEM.to_owned(),
      addon:     component.to_owned(),
      reported:  Reported::issue(code, message).at(at),
      snapshot:  None,
    });
  }

  /// Clear a component's issue after it recovers.
  pub fn component_ok(&mut self, component: &str, at: DateTime<Utc>) {
    let Some(state) = self
      .streams
      .get_mut(SYSTEM)
      .and_then(|addons| addons.get_mut(component))
    else {
      return;
    };
    state.reported = Reported::ok(at);
  }

  pub fn get(&self, character: &str, addon: &str) -> Option<&StreamState> {
    self.streams.get(character)?.get(addon)
  }

  /// Evaluate every stream and aggregate worst-of per character and overall.
  pub fn document(&self, now: DateTime<Utc>) -> SanityDocument {
    let mut characters = BTreeMap::new();

    for (character, addons) in &self.streams {
      let mut entries = BTreeMap::new();
      for (addon, state) in addons {
        let verdict = evaluate(
          addon,
          state.snapshot.as_ref(),
          state.prev_snapshot.as_ref(),
          &state.reported,
          component_clock(character, &state.reported, now),
        );
        entries.insert(addon.clone(), AddonSanity {
          status:          verdict.status,
          reported_status: state.reported.status,
          reasons:         verdict.reasons,
          timestamp:       state.reported.timestamp,
          snapshot:        state.snapshot.clone(),
        });
      }
      let overall = worst(entries.values().map(|a| a.status));
      characters.insert(character.clone(), CharacterSanity {
        overall,
        addons: entries,
      });
    }

    SanityDocument {
      overall: worst(characters.values().map(|c| c.overall)),
      characters,
    }
  }
}

/// Component entries are health flags, not game reports, so they never go
/// stale: evaluate them at their own timestamp.
fn component_clock(
  character: &str,
  reported: &Reported,
  now: DateTime<Utc>,
) -> DateTime<Utc> {
  match (character, reported.timestamp) {
    (SYSTEM, Some(ts)) => ts,
    _ => now,
  }
}

fn worst(statuses: impl Iterator<Item = Status>) -> Status {
  statuses.max().unwrap_or(Status::Ok)
}

// ─── Read model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanityDocument {
  pub overall:    Status,
  pub characters: BTreeMap<String, CharacterSanity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacterSanity {
  pub overall: Status,
  pub addons:  BTreeMap<String, AddonSanity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddonSanity {
  pub status:          Status,
  pub reported_status: Status,
  pub reasons:         Vec<Reason>,
  pub timestamp:       Option<DateTime<Utc>>,
  pub snapshot:        Option<Snapshot>,
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::sanity::Metric;

  fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
  }

  fn inventory(character: &str, count: i64, ts: DateTime<Utc>) -> TelemetryRecord {
    TelemetryRecord {
      character: character.to_owned(),
      addon:     "DeepPockets".to_owned(),
      reported:  Reported::ok(ts),
      snapshot:  Some(Snapshot::new().with("inv_count", Metric::Count(count))),
    }
  }

  #[test]
  fn empty_board_is_ok() {
    let doc = SanityBoard::new().document(Utc::now());
    assert_eq!(doc.overall, Status::Ok);
    assert!(doc.characters.is_empty());
  }

  #[test]
  fn successive_snapshots_rotate_and_alert() {
    let first = at(1_700_000_000);
    let second = first + Duration::minutes(10);

    let mut board = SanityBoard::new();
    board.record(inventory("Player-Ridge-Aria", 120, first));
    board.record(inventory("Player-Ridge-Aria", 0, second));

    let state = board.get("Player-Ridge-Aria", "DeepPockets").unwrap();
    assert_eq!(state.prev_snapshot.as_ref().unwrap().count("inv_count"), Some(120));

    let doc = board.document(second);
    let aria = &doc.characters["Player-Ridge-Aria"];
    let dp = &aria.addons["DeepPockets"];
    let codes: Vec<_> = dp.reasons.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["DP_INV_ZERO_AFTER_NONZERO"]);
    assert_eq!(aria.overall, Status::Warn);
    assert_eq!(doc.overall, Status::Warn);
  }

  #[test]
  fn identical_snapshot_keeps_the_comparison() {
    let first = at(1_700_000_000);
    let second = first + Duration::minutes(10);
    let third = second + Duration::minutes(10);

    let mut board = SanityBoard::new();
    board.record(inventory("Player-Ridge-Aria", 120, first));
    board.record(inventory("Player-Ridge-Aria", 0, second));
    board.record(inventory("Player-Ridge-Aria", 0, third));

    let state = board.get("Player-Ridge-Aria", "DeepPockets").unwrap();
    assert_eq!(state.prev_snapshot.as_ref().unwrap().count("inv_count"), Some(120));
    assert_eq!(state.reported.timestamp, Some(third));

    let dp = &board.document(third).characters["Player-Ridge-Aria"].addons["DeepPockets"];
    let codes: Vec<_> = dp.reasons.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["DP_INV_ZERO_AFTER_NONZERO"]);
  }

  #[test]
  fn report_without_snapshot_keeps_history() {
    let ts = at(1_700_000_000);
    let mut board = SanityBoard::new();
    board.record(inventory("Player-Ridge-Aria", 80, ts));
    board.record(TelemetryRecord {
      character: "Player-Ridge-Aria".into(),
      addon:     "DeepPockets".into(),
      reported:  Reported::ok(ts),
      snapshot:  None,
    });
    let state = board.get("Player-Ridge-Aria", "DeepPockets").unwrap();
    assert!(state.snapshot.is_some());
    assert!(state.prev_snapshot.is_none());
  }

  #[test]
  fn overall_is_worst_across_characters() {
    let ts = at(1_700_000_000);
    let mut board = SanityBoard::new();
    board.record(inventory("Player-Ridge-Aria", 10, ts));
    board.component_issue(
      "ingest/DeepPockets.lua",
      ReasonCode::IngestQuarantined,
      "quarantined after 3 failures",
      ts,
    );

    // A day later the component issue is still FAIL, not stale-WARN.
    let doc = board.document(ts + Duration::hours(30));
    assert_eq!(doc.characters[SYSTEM].overall, Status::Fail);
    assert_eq!(doc.characters["Player-Ridge-Aria"].overall, Status::Warn);
    assert_eq!(doc.overall, Status::Fail);

    board.component_ok("ingest/DeepPockets.lua", ts);
    let doc = board.document(ts);
    assert_eq!(doc.characters[SYSTEM].overall, Status::Ok);
    assert_eq!(doc.overall, Status::Ok);
  }
}
