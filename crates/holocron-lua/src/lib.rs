//! Codec for the game client's SavedVariables table-literal format.
//!
//! Converts between snapshot text and a tagged [`Value`] tree. Pure
//! synchronous; no filesystem, logging, or async dependencies. Every component
//! that reads or writes snapshot text goes through this crate.
//!
//! # Quick start
//!
//! ```no_run
//! use holocron_lua::decode;
//!
//! let snapshot = br#"Inv = { ["Aria - Ridge"] = { { id = 101, count = 5 } } }"#;
//! let decoded = decode(snapshot).unwrap();
//! assert!(!decoded.truncated);
//! println!("{:?}", decoded.global("Inv"));
//! ```
//!
//! # Documented constraints
//!
//! - A long string `[[ ... ]]` ends at the first `]]`; escapes inside it are
//!   not processed. Use the leveled form `[==[ ... ]==]` to embed `]]`.
//! - Duplicate keys: last write wins, in the position of the first write.
//!   Every duplicate is listed in [`Decoded::duplicates`].
//! - An empty table `{}` decodes as an empty [`Value::Map`].

pub mod error;
mod parse;
mod serialize;
pub mod value;

pub use error::{Error, Result};
pub use parse::MAX_DEPTH;
pub use serialize::{emit_globals, emit_value};
pub use value::{Key, Table, Value};

// ─── Public types
// ─────────────────────────────────────────────────────────────

/// The result of decoding one snapshot file.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
  /// Top-level `Name = value` assignments, in file order.
  pub globals:    Table,
  /// Input ended inside an open table or string. `globals` then holds the
  /// best-effort prefix and must not be treated as a complete snapshot.
  pub truncated:  bool,
  pub duplicates: Vec<DuplicateKey>,
}

impl Decoded {
  pub fn global(&self, name: &str) -> Option<&Value> { self.globals.get(name) }

  pub fn is_empty(&self) -> bool { self.globals.is_empty() }
}

/// A key written more than once in the same table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateKey {
  /// Dotted path of the containing table; empty for top-level globals.
  pub path:        String,
  pub key:         Key,
  pub occurrences: usize,
}

// ─── Public API
// ───────────────────────────────────────────────────────────────

/// Decode a snapshot file from raw bytes.
pub fn decode(bytes: &[u8]) -> Result<Decoded> {
  let text = parse::decode_text(bytes);
  parse::decode_file(&text)
}

/// Decode a snapshot file already held as text.
pub fn decode_str(text: &str) -> Result<Decoded> { parse::decode_file(text) }

/// Decode a single expression such as `{ 1, 2 }` or `"text"`.
pub fn decode_value(text: &str) -> Result<Value> {
  parse::decode_expression(text)
}

// ─── Round-trip tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod roundtrip_tests {
  use super::*;

  fn scalars() -> Vec<Value> {
    vec![
      Value::Nil,
      Value::Bool(true),
      Value::Bool(false),
      Value::Int(0),
      Value::Int(-1),
      Value::Int(i64::MAX),
      Value::Int(i64::MIN),
      Value::Float(0.5),
      Value::Float(-2.25),
      Value::Float(3.0),
      Value::Float(1e-7),
      Value::Float(6.02e23),
      Value::Float(f64::MAX),
      Value::Str(String::new()),
      Value::Str("plain".into()),
      Value::Str("quote \" and backslash \\".into()),
      Value::Str("lines\nand\ttabs\r".into()),
      Value::Str("bell \u{7} del \u{7f} nul \u{0}9".into()),
      Value::Str("]] not special in quotes [[".into()),
      Value::Str("unicode: Ærthas ✓ 龍".into()),
      Value::Str("-- not a comment".into()),
    ]
  }

  #[test]
  fn scalars_round_trip() {
    for v in scalars() {
      let text = emit_value(&v);
      let back = decode_value(&text)
        .unwrap_or_else(|e| panic!("decode {text:?}: {e}"));
      assert_eq!(back, v, "via {text:?}");
    }
  }

  #[test]
  fn scalars_round_trip_as_globals() {
    let mut globals = Table::new();
    for (i, v) in scalars().into_iter().enumerate() {
      globals.insert(format!("G{i}"), v);
    }
    let decoded = decode(emit_globals(&globals).as_bytes()).unwrap();
    assert_eq!(decoded.globals, globals);
    assert!(!decoded.truncated);
  }

  #[test]
  fn nested_tables_round_trip() {
    let src = r#"DB = {
      ["Aria - Ridge"] = { { id = 101, count = 5, loc = "Bag" }, { id = 7, count = 1 } },
      settings = { enabled = true, ratio = 0.25, tags = { "a", "b" } },
    }"#;
    let first = decode_str(src).unwrap();
    let emitted = emit_globals(&first.globals);
    let second = decode_str(&emitted).unwrap();
    assert_eq!(first.globals, second.globals);
    assert_eq!(emit_globals(&second.globals), emitted);
  }

  #[test]
  fn trailing_input_is_rejected_for_expressions() {
    assert!(decode_value("1 2").is_err());
    assert!(decode_value("{ 1, 2").is_err());
  }
}
