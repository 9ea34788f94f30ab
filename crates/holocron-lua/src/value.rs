//! The tagged value tree produced by the decoder and consumed by mappers.

use std::{collections::HashMap, fmt};

/// A decoded value. Bare identifiers materialize as [`Value::Str`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Nil,
  Bool(bool),
  Int(i64),
  Float(f64),
  Str(String),
  /// A table whose keys were exactly `1..=N` (or `0..=N`), in key order.
  List(Vec<Value>),
  /// Any other table, in insertion order.
  Map(Table),
}

/// A table key. Float and boolean keys are kept as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
  Int(i64),
  Str(String),
}

impl fmt::Display for Key {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Key::Int(i) => write!(f, "[{i}]"),
      Key::Str(s) => f.write_str(s),
    }
  }
}

impl From<&str> for Key {
  fn from(s: &str) -> Self { Key::Str(s.to_owned()) }
}

impl From<String> for Key {
  fn from(s: String) -> Self { Key::Str(s) }
}

impl From<i64> for Key {
  fn from(i: i64) -> Self { Key::Int(i) }
}

/// Insertion-ordered map with last-write-wins replacement in place.
///
/// Entries live in a `Vec`; the two indexes map each key to its position so
/// inserts and lookups stay constant-time on large tables.
#[derive(Debug, Clone, Default)]
pub struct Table {
  entries: Vec<(Key, Value)>,
  strs:    HashMap<String, usize>,
  ints:    HashMap<i64, usize>,
}

impl PartialEq for Table {
  fn eq(&self, other: &Self) -> bool { self.entries == other.entries }
}

impl Table {
  pub fn new() -> Self { Self::default() }

  /// Insert or replace. A replaced key keeps its original position; the old
  /// value is returned.
  pub fn insert(&mut self, key: impl Into<Key>, value: Value) -> Option<Value> {
    let key = key.into();
    if let Some(&at) = self.position(&key) {
      return Some(std::mem::replace(&mut self.entries[at].1, value));
    }
    let at = self.entries.len();
    match &key {
      Key::Int(i) => self.ints.insert(*i, at),
      Key::Str(s) => self.strs.insert(s.clone(), at),
    };
    self.entries.push((key, value));
    None
  }

  fn position(&self, key: &Key) -> Option<&usize> {
    match key {
      Key::Int(i) => self.ints.get(i),
      Key::Str(s) => self.strs.get(s.as_str()),
    }
  }

  /// Look up a string key.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.strs.get(key).map(|&at| &self.entries[at].1)
  }

  /// Look up a string key, ignoring ASCII case.
  pub fn get_ignore_case(&self, key: &str) -> Option<&Value> {
    self.get(key).or_else(|| {
      self.entries.iter().find_map(|(k, v)| match k {
        Key::Str(s) if s.eq_ignore_ascii_case(key) => Some(v),
        _ => None,
      })
    })
  }

  /// First present key among `keys`.
  pub fn get_any(&self, keys: &[&str]) -> Option<&Value> {
    keys.iter().find_map(|k| self.get(k))
  }

  pub fn get_key(&self, key: &Key) -> Option<&Value> {
    self.position(key).map(|&at| &self.entries[at].1)
  }

  pub fn contains(&self, key: &str) -> bool { self.strs.contains_key(key) }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
    self.entries.iter().map(|(k, v)| (k, v))
  }

  pub(crate) fn into_entries(self) -> Vec<(Key, Value)> { self.entries }
}

impl FromIterator<(Key, Value)> for Table {
  fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
    let mut table = Table::new();
    for (k, v) in iter {
      table.insert(k, v);
    }
    table
  }
}

impl Value {
  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Nil => "nil",
      Value::Bool(_) => "boolean",
      Value::Int(_) => "integer",
      Value::Float(_) => "float",
      Value::Str(_) => "string",
      Value::List(_) => "list",
      Value::Map(_) => "map",
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  /// Integers, integral floats, and numeric strings.
  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(i) => Some(*i),
      Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
      Value::Str(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(*i as f64),
      Value::Float(f) => Some(*f),
      Value::Str(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&Table> {
    match self {
      Value::Map(t) => Some(t),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Value::List(items) => Some(items),
      _ => None,
    }
  }

  pub fn is_table(&self) -> bool {
    matches!(self, Value::List(_) | Value::Map(_))
  }

  /// Look up a string key on a map; `None` for anything else.
  pub fn get(&self, key: &str) -> Option<&Value> { self.as_map()?.get(key) }

  /// The values of a table regardless of whether it decoded as a list or a
  /// map. Scalars yield nothing.
  pub fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
    match self {
      Value::List(items) => Box::new(items.iter()),
      Value::Map(t) => Box::new(t.iter().map(|(_, v)| v)),
      _ => Box::new(std::iter::empty()),
    }
  }

  /// Number of entries in a table; 0 for scalars.
  pub fn table_len(&self) -> usize {
    match self {
      Value::List(items) => items.len(),
      Value::Map(t) => t.len(),
      _ => 0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_replaces_in_place() {
    let mut t = Table::new();
    t.insert("a", Value::Int(1));
    t.insert("b", Value::Int(2));
    let old = t.insert("a", Value::Int(3));
    assert_eq!(old, Some(Value::Int(1)));
    let keys: Vec<_> = t.iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(t.get("a"), Some(&Value::Int(3)));
  }

  #[test]
  fn case_insensitive_lookup_prefers_exact() {
    let mut t = Table::new();
    t.insert("Count", Value::Int(1));
    t.insert("count", Value::Int(2));
    assert_eq!(t.get_ignore_case("count"), Some(&Value::Int(2)));
    assert_eq!(t.get_ignore_case("COUNT"), Some(&Value::Int(1)));
  }

  #[test]
  fn large_tables_keep_order_and_replace_in_place() {
    let mut t = Table::new();
    for i in 0..50_000_i64 {
      t.insert(Key::Int(i), Value::Int(i));
      t.insert(format!("k{i}"), Value::Int(i));
    }
    assert_eq!(t.len(), 100_000);
    assert_eq!(t.insert(Key::Int(7), Value::Int(-7)), Some(Value::Int(7)));
    assert_eq!(t.insert("k49999", Value::Nil), Some(Value::Int(49_999)));
    assert_eq!(t.len(), 100_000);

    assert_eq!(t.get_key(&Key::Int(7)), Some(&Value::Int(-7)));
    assert_eq!(t.get("k49999"), Some(&Value::Nil));
    assert!(t.contains("k0"));
    assert!(!t.contains("k50000"));
    let first: Vec<_> = t.iter().take(4).map(|(k, _)| k.to_string()).collect();
    assert_eq!(first, vec!["[0]", "k0", "[1]", "k1"]);
  }

  #[test]
  fn equality_ignores_index_state() {
    let a: Table = [(Key::from("x"), Value::Int(1))].into_iter().collect();
    let mut b = Table::new();
    b.insert("x", Value::Int(0));
    b.insert("x", Value::Int(1));
    assert_eq!(a, b);
  }

  #[test]
  fn numeric_coercions() {
    assert_eq!(Value::Float(5.0).as_int(), Some(5));
    assert_eq!(Value::Float(5.5).as_int(), None);
    assert_eq!(Value::Str(" 42 ".into()).as_int(), Some(42));
    assert_eq!(Value::Bool(true).as_int(), None);
  }
}
