//! Sanity heuristics over addon telemetry.
//!
//! [`evaluate`] is a pure function of its inputs, including `now`. The set of
//! codes it can emit is [`ReasonCode::ALL`]; a reported FAIL or WARN passes
//! the addon's own code through unchanged.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Ordered by severity, so `max` gives the worst.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
  #[default]
  Ok,
  Warn,
  Fail,
}

impl Status {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Ok => "OK",
      Self::Warn => "WARN",
      Self::Fail => "FAIL",
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Status {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_uppercase().as_str() {
      "OK" => Ok(Self::Ok),
      "WARN" | "WARNING" => Ok(Self::Warn),
      "FAIL" | "ERROR" => Ok(Self::Fail),
      _ => Err(Error::UnknownStatus(s.to_owned())),
    }
  }
}

// ─── Reason codes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReasonCode {
  SanityStale24h,
  DpInvZeroAfterNonzero,
  DpInvDrop80,
  DpMoneyZero,
  PwPetsNoStrats,
  SwSpecNoModules,
  TsmSkillDecreased,
  ReportedFail,
  ReportedWarn,
  IngestDecodeFailed,
  IngestPersistFailed,
  IngestQuarantined,
  EnrichTaskFailed,
  SnapshotMissing,
  SnapshotEmpty,
}

impl ReasonCode {
  pub const ALL: [ReasonCode; 15] = [
    Self::SanityStale24h,
    Self::DpInvZeroAfterNonzero,
    Self::DpInvDrop80,
    Self::DpMoneyZero,
    Self::PwPetsNoStrats,
    Self::SwSpecNoModules,
    Self::TsmSkillDecreased,
    Self::ReportedFail,
    Self::ReportedWarn,
    Self::IngestDecodeFailed,
    Self::IngestPersistFailed,
    Self::IngestQuarantined,
    Self::EnrichTaskFailed,
    Self::SnapshotMissing,
    Self::SnapshotEmpty,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::SanityStale24h => "SANITY_STALE_24H",
      Self::DpInvZeroAfterNonzero => "DP_INV_ZERO_AFTER_NONZERO",
      Self::DpInvDrop80 => "DP_INV_DROP_80",
      Self::DpMoneyZero => "DP_MONEY_ZERO",
      Self::PwPetsNoStrats => "PW_PETS_NO_STRATS",
      Self::SwSpecNoModules => "SW_SPEC_NO_MODULES",
      Self::TsmSkillDecreased => "TSM_SKILL_DECREASED",
      Self::ReportedFail => "REPORTED_FAIL",
      Self::ReportedWarn => "REPORTED_WARN",
      Self::IngestDecodeFailed => "INGEST_DECODE_FAILED",
      Self::IngestPersistFailed => "INGEST_PERSIST_FAILED",
      Self::IngestQuarantined => "INGEST_QUARANTINED",
      Self::EnrichTaskFailed => "ENRICH_TASK_FAILED",
      Self::SnapshotMissing => "SNAPSHOT_MISSING",
      Self::SnapshotEmpty => "SNAPSHOT_EMPTY",
    }
  }

  pub fn severity(self) -> Status {
    match self {
      Self::ReportedFail | Self::IngestQuarantined | Self::SnapshotMissing => {
        Status::Fail
      }
      _ => Status::Warn,
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|c| c.as_str() == s)
  }
}

impl fmt::Display for ReasonCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `{code, message}` as exposed by the Read API. Only `code` is contractual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
  pub code:     String,
  pub message:  String,
  #[serde(skip)]
  pub severity: Status,
}

impl Reason {
  pub fn new(code: ReasonCode, message: impl Into<String>) -> Self {
    Self {
      code:     code.as_str().to_owned(),
      message:  message.into(),
      severity: code.severity(),
    }
  }
}

// ─── Snapshot metrics ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
  Flag(bool),
  Count(i64),
  Amount(f64),
}

/// Named metrics extracted from one addon snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Metric>);

impl Snapshot {
  pub fn new() -> Self { Self::default() }

  pub fn with(mut self, key: &str, metric: Metric) -> Self {
    self.insert(key, metric);
    self
  }

  pub fn insert(&mut self, key: &str, metric: Metric) {
    self.0.insert(key.to_owned(), metric);
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn get(&self, key: &str) -> Option<Metric> { self.0.get(key).copied() }

  pub fn count(&self, key: &str) -> Option<i64> {
    match self.get(key)? {
      Metric::Count(n) => Some(n),
      Metric::Amount(x) => Some(x as i64),
      Metric::Flag(b) => Some(i64::from(b)),
    }
  }

  pub fn flag(&self, key: &str) -> bool {
    match self.get(key) {
      Some(Metric::Flag(b)) => b,
      Some(Metric::Count(n)) => n != 0,
      Some(Metric::Amount(x)) => x != 0.0,
      None => false,
    }
  }
}

// ─── Streams ─────────────────────────────────────────────────────────────────

/// Which heuristic family applies to an addon stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonKind {
  Inventory,
  BattlePets,
  CombatHelper,
  Professions,
  Other,
}

impl AddonKind {
  pub fn classify(addon: &str) -> Self {
    match addon.to_ascii_lowercase().as_str() {
      "deeppockets" | "inventory" => Self::Inventory,
      "petweaver" | "battlepets" => Self::BattlePets,
      "skillweaver" | "combathelper" => Self::CombatHelper,
      "tradeskillmaster" | "tsm" | "professions" => Self::Professions,
      _ => Self::Other,
    }
  }
}

/// What the addon itself claimed about the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reported {
  pub status:    Status,
  pub code:      Option<String>,
  pub message:   Option<String>,
  pub timestamp: Option<DateTime<Utc>>,
}

impl Reported {
  pub fn ok(timestamp: DateTime<Utc>) -> Self {
    Self { timestamp: Some(timestamp), ..Self::default() }
  }

  pub fn issue(code: ReasonCode, message: impl Into<String>) -> Self {
    Self {
      status:    code.severity(),
      code:      Some(code.as_str().to_owned()),
      message:   Some(message.into()),
      timestamp: None,
    }
  }

  pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
    self.timestamp = Some(timestamp);
    self
  }
}

/// One `(character, addon)` observation, as produced by the telemetry mapper
/// or synthesized by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
  pub character: String,
  pub addon:     String,
  pub reported:  Reported,
  pub snapshot:  Option<Snapshot>,
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
  pub status:  Status,
  pub reasons: Vec<Reason>,
}

/// Reports older than this are flagged stale.
pub const STALE_AFTER_SECS: i64 = 24 * 60 * 60;
const DROP_FLOOR: i64 = 50;
const DROP_RATIO: f64 = 0.2;

/// Label one addon stream from its current and previous snapshots.
pub fn evaluate(
  addon: &str,
  current: Option<&Snapshot>,
  previous: Option<&Snapshot>,
  reported: &Reported,
  now: DateTime<Utc>,
) -> Verdict {
  let mut reasons = Vec::new();

  if let Some(ts) = reported.timestamp
    && now - ts > Duration::seconds(STALE_AFTER_SECS)
  {
    reasons.push(Reason::new(
      ReasonCode::SanityStale24h,
      format!("Report stale (last {})", ts.to_rfc3339()),
    ));
  }

  if let Some(curr) = current.filter(|s| !s.is_empty()) {
    let prev = previous.filter(|s| !s.is_empty());
    match AddonKind::classify(addon) {
      AddonKind::Inventory => inventory_rules(curr, prev, &mut reasons),
      AddonKind::BattlePets => {
        let pets = curr.count("owned_pet_count").unwrap_or(0);
        let strats = curr.count("strategy_count").unwrap_or(0);
        if pets > 0 && strats == 0 {
          reasons.push(Reason::new(
            ReasonCode::PwPetsNoStrats,
            format!("{pets} pets owned but no strategies"),
          ));
        }
      }
      AddonKind::CombatHelper => {
        if curr.flag("active_spec_present")
          && curr.count("module_count").unwrap_or(0) == 0
        {
          reasons.push(Reason::new(
            ReasonCode::SwSpecNoModules,
            "Active spec present but no modules loaded",
          ));
        }
      }
      AddonKind::Professions => {
        if let (Some(now_total), Some(was_total)) = (
          curr.count("skill_total"),
          prev.and_then(|p| p.count("skill_total")),
        ) && now_total < was_total
        {
          reasons.push(Reason::new(
            ReasonCode::TsmSkillDecreased,
            format!("Profession skill decreased ({was_total} -> {now_total})"),
          ));
        }
      }
      AddonKind::Other => {}
    }
  }

  match reported.status {
    Status::Ok => {}
    status => {
      let fallback = if status == Status::Fail {
        ReasonCode::ReportedFail
      } else {
        ReasonCode::ReportedWarn
      };
      reasons.push(Reason {
        code: reported
          .code
          .clone()
          .unwrap_or_else(|| fallback.as_str().to_owned()),
        message: reported
          .message
          .clone()
          .unwrap_or_else(|| format!("Addon reported {status}")),
        severity: status,
      });
    }
  }

  let mut seen = Vec::new();
  reasons.retain(|r| {
    if seen.contains(&r.code) {
      false
    } else {
      seen.push(r.code.clone());
      true
    }
  });

  let status = reasons
    .iter()
    .map(|r| r.severity)
    .max()
    .unwrap_or(Status::Ok);
  Verdict { status, reasons }
}

fn inventory_rules(
  curr: &Snapshot,
  prev: Option<&Snapshot>,
  reasons: &mut Vec<Reason>,
) {
  let Some(prev) = prev else { return };

  if let (Some(inv), Some(was)) =
    (curr.count("inv_count"), prev.count("inv_count"))
  {
    if inv == 0 && was > 0 {
      reasons.push(Reason::new(
        ReasonCode::DpInvZeroAfterNonzero,
        format!("Inventory dropped to 0 (was {was})"),
      ));
    } else if was >= DROP_FLOOR && (inv as f64) <= DROP_RATIO * was as f64 {
      reasons.push(Reason::new(
        ReasonCode::DpInvDrop80,
        format!("Inventory dropped >80% ({was} -> {inv})"),
      ));
    }
  }

  if let (Some(money), Some(was)) =
    (curr.count("money_copper"), prev.count("money_copper"))
    && money == 0
    && was > 0
  {
    reasons.push(Reason::new(ReasonCode::DpMoneyZero, "Money is 0"));
  }
}
