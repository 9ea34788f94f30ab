//! Small accessors shared by the mappers.

use chrono::{DateTime, Utc};
use holocron_lua::{Key, Table, Value};

/// Lookups below this depth are not attempted.
const SEARCH_DEPTH: usize = 6;

pub(crate) fn child_path(parent: &str, key: &Key) -> String {
  match key {
    Key::Int(i) => format!("{parent}[{i}]"),
    Key::Str(s) if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
      format!("{parent}.{s}")
    }
    Key::Str(s) => format!("{parent}[{s:?}]"),
  }
}

pub(crate) fn index_path(parent: &str, i: usize) -> String {
  format!("{parent}[{}]", i + 1)
}

pub(crate) fn int_field(t: &Table, keys: &[&str]) -> Option<i64> {
  keys.iter().find_map(|k| t.get_ignore_case(k)?.as_int())
}

pub(crate) fn float_field(t: &Table, keys: &[&str]) -> Option<f64> {
  keys.iter().find_map(|k| t.get_ignore_case(k)?.as_f64())
}

pub(crate) fn str_field(t: &Table, keys: &[&str]) -> Option<String> {
  keys.iter().find_map(|k| {
    let s = t.get_ignore_case(k)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_owned())
  })
}

pub(crate) fn u32_from(i: i64) -> Option<u32> { u32::try_from(i).ok() }

/// Epoch seconds (or milliseconds, if implausibly large), a numeric string,
/// or an RFC 3339 string.
pub(crate) fn timestamp(v: &Value) -> Option<DateTime<Utc>> {
  let from_secs = |secs: i64| {
    let secs = if secs > 100_000_000_000 { secs / 1000 } else { secs };
    DateTime::from_timestamp(secs, 0)
  };
  match v {
    Value::Int(i) => from_secs(*i),
    Value::Float(f) if f.is_finite() => from_secs(*f as i64),
    Value::Str(s) => match s.trim().parse::<i64>() {
      Ok(i) => from_secs(i),
      Err(_) => DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc)),
    },
    _ => None,
  }
}

pub(crate) fn timestamp_field(t: &Table, keys: &[&str]) -> Option<DateTime<Utc>> {
  keys.iter().find_map(|k| timestamp(t.get_ignore_case(k)?))
}

/// Depth-first search for the first value stored under any of `keys`.
pub(crate) fn find_key<'v>(v: &'v Value, keys: &[&str]) -> Option<&'v Value> {
  find_key_at(v, keys, 0)
}

fn find_key_at<'v>(v: &'v Value, keys: &[&str], depth: usize) -> Option<&'v Value> {
  if depth > SEARCH_DEPTH {
    return None;
  }
  if let Some(t) = v.as_map()
    && let Some(hit) = keys.iter().find_map(|k| t.get(k))
  {
    return Some(hit);
  }
  v.values().find_map(|child| find_key_at(child, keys, depth + 1))
}

/// Number of tables in the tree that carry any of `keys`.
pub(crate) fn count_tables_with(v: &Value, keys: &[&str]) -> usize {
  count_at(v, keys, 0)
}

fn count_at(v: &Value, keys: &[&str], depth: usize) -> usize {
  if depth > SEARCH_DEPTH {
    return 0;
  }
  let here = v
    .as_map()
    .is_some_and(|t| keys.iter().any(|k| t.contains(k)));
  usize::from(here)
    + v
      .values()
      .map(|child| count_at(child, keys, depth + 1))
      .sum::<usize>()
}
