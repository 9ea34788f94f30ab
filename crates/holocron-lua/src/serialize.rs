//! Emitter: [`Value`] trees back to the table-literal format.
//!
//! Output is deterministic: map entries are written in insertion order, one
//! entry per line, tab-indented, each followed by a comma. Identifier-safe
//! string keys are written bare (`name = "x"`), integer keys bracketed.

use std::fmt::Write as _;

use crate::value::{Key, Table, Value};

const KEYWORDS: &[&str] = &[
  "and", "break", "do", "else", "elseif", "end", "false", "for", "function",
  "goto", "if", "in", "local", "nil", "not", "or", "repeat", "return", "then",
  "true", "until", "while",
];

/// One expression, e.g. for embedding or tests.
pub fn emit_value(value: &Value) -> String {
  let mut out = String::new();
  write_value(&mut out, value, 0);
  out
}

/// `Name = value` per string-keyed global, each on its own line. Non-string
/// keys cannot name a global and are skipped.
pub fn emit_globals(globals: &Table) -> String {
  let mut out = String::new();
  for (key, value) in globals.iter() {
    let Key::Str(name) = key else { continue };
    out.push_str(name);
    out.push_str(" = ");
    write_value(&mut out, value, 0);
    out.push('\n');
  }
  out
}

fn write_value(out: &mut String, value: &Value, indent: usize) {
  match value {
    Value::Nil => out.push_str("nil"),
    Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    Value::Int(i) => {
      let _ = write!(out, "{i}");
    }
    Value::Float(f) => write_float(out, *f),
    Value::Str(s) => write_string(out, s),
    Value::List(items) if items.is_empty() => out.push_str("{}"),
    Value::List(items) => {
      out.push_str("{\n");
      for item in items {
        push_indent(out, indent + 1);
        write_value(out, item, indent + 1);
        out.push_str(",\n");
      }
      push_indent(out, indent);
      out.push('}');
    }
    Value::Map(table) if table.is_empty() => out.push_str("{}"),
    Value::Map(table) => {
      out.push_str("{\n");
      for (key, item) in table.iter() {
        push_indent(out, indent + 1);
        write_key(out, key);
        out.push_str(" = ");
        write_value(out, item, indent + 1);
        out.push_str(",\n");
      }
      push_indent(out, indent);
      out.push('}');
    }
  }
}

fn push_indent(out: &mut String, indent: usize) {
  for _ in 0..indent {
    out.push('\t');
  }
}

fn write_key(out: &mut String, key: &Key) {
  match key {
    Key::Int(i) => {
      let _ = write!(out, "[{i}]");
    }
    Key::Str(s) if is_identifier(s) => out.push_str(s),
    Key::Str(s) => {
      out.push('[');
      write_string(out, s);
      out.push(']');
    }
  }
}

/// Shortest round-tripping form; always contains `.` or an exponent so it
/// decodes back as a float. Non-finite values have no literal and emit `nil`.
fn write_float(out: &mut String, f: f64) {
  if !f.is_finite() {
    out.push_str("nil");
    return;
  }
  let text = format!("{f:?}");
  out.push_str(&text);
  if !text.contains(['.', 'e', 'E']) {
    out.push_str(".0");
  }
}

fn write_string(out: &mut String, s: &str) {
  out.push('"');
  for c in s.chars() {
    match c {
      '"' => out.push_str("\\\""),
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      c if (c as u32) < 0x20 || c == '\u{7f}' => {
        let _ = write!(out, "\\{:03}", c as u32);
      }
      c => out.push(c),
    }
  }
  out.push('"');
}

fn is_identifier(s: &str) -> bool {
  let mut bytes = s.bytes();
  let starts_ok = bytes
    .next()
    .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');
  starts_ok
    && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
    && !KEYWORDS.contains(&s)
}
