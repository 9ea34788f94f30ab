//! Self-reported sanity telemetry.
//!
//! ```text
//! HolocronSanityDB = {
//!   ["Aria - Ridge"] = {
//!     PetWeaver = { status = "WARN", code = "X", timestamp = 1700000000,
//!                   snapshot = { owned_pet_count = 3 } },
//!   },
//!   Account = { ... },
//! }
//! ```
//!
//! Keys that are not character identities become `Account-<key>`.

use holocron_core::{
  CharacterId,
  sanity::{Metric, Reported, Snapshot, Status, TelemetryRecord},
};
use holocron_lua::{Decoded, Table, Value};

use crate::{
  MapContext, MapOutput, MappingError, Record,
  walk::{child_path, str_field, timestamp_field},
};

pub(crate) fn map(decoded: &Decoded, ctx: &MapContext, out: &mut MapOutput) {
  for (key, global) in decoded.globals.iter() {
    let Some(root) = global.as_map() else { continue };
    let path = key.to_string();
    for (subject_key, addons) in root.iter() {
      let Some(addons) = addons.as_map() else { continue };
      let raw = subject_key.to_string();
      let subject = match CharacterId::parse(&raw) {
        Ok(id) => id.to_string(),
        Err(_) => format!("Account-{raw}"),
      };
      let subject_path = child_path(&path, subject_key);

      for (addon_key, report) in addons.iter() {
        let report_path = child_path(&subject_path, addon_key);
        let Some(report) = report.as_map() else {
          out.fail(MappingError::new(
            report_path,
            format!("expected report table, found {}", report.type_name()),
          ));
          continue;
        };
        match reported(report, ctx) {
          Ok(reported) => out.push(Record::Telemetry(TelemetryRecord {
            character: subject.clone(),
            addon: addon_key.to_string(),
            reported,
            snapshot: report.get_ignore_case("snapshot").map(snapshot),
          })),
          Err(reason) => out.fail(MappingError::new(report_path, reason)),
        }
      }
    }
  }
}

fn reported(report: &Table, ctx: &MapContext) -> Result<Reported, String> {
  let status = match str_field(report, &["status"]) {
    Some(raw) => raw.parse::<Status>().map_err(|e| e.to_string())?,
    None => Status::Ok,
  };
  Ok(Reported {
    status,
    code: str_field(report, &["code"]),
    message: str_field(report, &["message", "msg"]),
    timestamp: Some(
      timestamp_field(report, &["timestamp", "ts", "time"])
        .unwrap_or(ctx.observed_at),
    ),
  })
}

/// Scalar entries of a `snapshot` table; anything else is ignored.
pub(crate) fn snapshot(v: &Value) -> Snapshot {
  let mut snapshot = Snapshot::new();
  let Some(t) = v.as_map() else { return snapshot };
  for (key, value) in t.iter() {
    let metric = match value {
      Value::Bool(b) => Metric::Flag(*b),
      Value::Int(i) => Metric::Count(*i),
      Value::Float(f) if f.is_finite() => Metric::Amount(*f),
      _ => continue,
    };
    snapshot.insert(&key.to_string(), metric);
  }
  snapshot
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, Utc};
  use holocron_lua::decode_str;

  use super::*;
  use crate::{Stream, map as map_stream};

  fn records(src: &str) -> (Vec<TelemetryRecord>, Vec<MappingError>) {
    let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let out =
      map_stream(Stream::Telemetry, &decode_str(src).unwrap(), &MapContext::new(at));
    let records = out
      .records
      .into_iter()
      .filter_map(|r| match r {
        Record::Telemetry(t) => Some(t),
        _ => None,
      })
      .collect();
    (records, out.errors)
  }

  #[test]
  fn reports_per_character_and_account() {
    let (records, errors) = records(
      r#"HolocronSanityDB = {
        ["Aria - Ridge"] = {
          PetWeaver = { status = "warn", code = "PW_CUSTOM", message = "hm",
                        timestamp = "2023-11-14T22:13:20Z",
                        snapshot = { owned_pet_count = 3, strategy_count = 0, ratio = 0.5, label = "x" } },
          SkillWeaver = { status = "OK" },
        },
        Main = { DeepPockets = { status = "FAIL", timestamp = 1699990000 } },
      }"#,
    );
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(records.len(), 3);

    let pw = &records[0];
    assert_eq!(pw.character, "Player-Ridge-Aria");
    assert_eq!(pw.addon, "PetWeaver");
    assert_eq!(pw.reported.status, Status::Warn);
    assert_eq!(pw.reported.code.as_deref(), Some("PW_CUSTOM"));
    let snapshot = pw.snapshot.as_ref().unwrap();
    assert_eq!(snapshot.count("owned_pet_count"), Some(3));
    assert_eq!(snapshot.get("ratio"), Some(Metric::Amount(0.5)));
    assert_eq!(snapshot.get("label"), None);

    assert_eq!(records[1].reported.timestamp.unwrap().timestamp(), 1_700_000_000);
    assert!(records[1].snapshot.is_none());

    assert_eq!(records[2].character, "Account-Main");
    assert_eq!(records[2].reported.status, Status::Fail);
  }

  #[test]
  fn unknown_status_is_a_mapping_error() {
    let (records, errors) = records(
      r#"S = { ["Aria - Ridge"] = { A = { status = "MAYBE" }, B = { status = "OK" } } }"#,
    );
    assert_eq!(records.len(), 1);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].path.ends_with(".A"));
  }
}
