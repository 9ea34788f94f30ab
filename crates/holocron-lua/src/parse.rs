//! SavedVariables table-literal decoder.
//!
//! Pipeline:
//!   raw bytes
//!     └─ decode_text()        → &str (UTF-8, invalid bytes dropped)
//!          └─ Parser::file()   → global assignments
//!               └─ Parser::value() / table() / entry() → Value
//!
//! Truncated input (the client died mid-write) is not an error: every table
//! still open at end of input is closed with the entries completed so far,
//! and [`Decoded::truncated`] is set.

use std::{borrow::Cow, collections::HashMap};

use crate::{
  Decoded, DuplicateKey,
  error::{Error, Result},
  value::{Key, Table, Value},
};

pub const MAX_DEPTH: usize = 200;

/// UTF-8 with a lossy fallback: a leading BOM and invalid sequences are
/// dropped rather than replaced.
pub(crate) fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
  let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
  match std::str::from_utf8(bytes) {
    Ok(s) => Cow::Borrowed(s),
    Err(_) => Cow::Owned(
      String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect(),
    ),
  }
}

pub(crate) fn decode_file(src: &str) -> Result<Decoded> {
  let mut parser = Parser::new(src);
  let globals = parser.file()?;
  Ok(Decoded {
    globals,
    truncated: parser.truncated,
    duplicates: parser.duplicates,
  })
}

pub(crate) fn decode_expression(src: &str) -> Result<Value> {
  let mut parser = Parser::new(src);
  let value = parser.value()?;
  parser.skip_trivia();
  match value {
    Some(v) if !parser.truncated && parser.at_eof() => Ok(v),
    Some(_) if !parser.truncated => Err(parser.error("trailing input after value")),
    _ => Err(parser.error("unexpected end of input")),
  }
}

// ─── Parser ──────────────────────────────────────────────────────────────────

struct Parser<'a> {
  src:        &'a [u8],
  pos:        usize,
  depth:      usize,
  truncated:  bool,
  path:       Vec<String>,
  duplicates: Vec<DuplicateKey>,
  /// `(path, key)` to its slot in `duplicates`.
  seen_dups:  HashMap<(String, Key), usize>,
}

/// `None` means input ended before the value could be completed.
type Parsed = Option<Value>;

impl<'a> Parser<'a> {
  fn new(src: &'a str) -> Self {
    Self {
      src:        src.as_bytes(),
      pos:        0,
      depth:      0,
      truncated:  false,
      path:       Vec::new(),
      duplicates: Vec::new(),
      seen_dups:  HashMap::new(),
    }
  }

  // ── Low-level helpers ─────────────────────────────────────────────────

  fn peek(&self) -> Option<u8> { self.src.get(self.pos).copied() }

  fn peek_at(&self, offset: usize) -> Option<u8> {
    self.src.get(self.pos + offset).copied()
  }

  fn at_eof(&self) -> bool { self.pos >= self.src.len() }

  fn error(&self, message: impl Into<String>) -> Error {
    let consumed = &self.src[..self.pos.min(self.src.len())];
    let line = consumed.iter().filter(|b| **b == b'\n').count() + 1;
    let column = consumed
      .iter()
      .rev()
      .take_while(|b| **b != b'\n')
      .count()
      + 1;
    Error::Syntax { line, column, message: message.into() }
  }

  /// Skip whitespace, `-- line` comments and `--[[ block ]]` comments.
  fn skip_trivia(&mut self) {
    loop {
      while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
        self.pos += 1;
      }
      if !(self.peek() == Some(b'-') && self.peek_at(1) == Some(b'-')) {
        return;
      }
      self.pos += 2;
      if let Some(level) = self.long_bracket_level(self.pos) {
        self.pos += level + 2;
        if self.long_body(level).is_none() {
          return;
        }
      } else {
        while self.peek().is_some_and(|b| b != b'\n') {
          self.pos += 1;
        }
      }
    }
  }

  /// If `[`, `=`*, `[` starts at `at`, return the number of `=`.
  fn long_bracket_level(&self, at: usize) -> Option<usize> {
    if self.src.get(at) != Some(&b'[') {
      return None;
    }
    let level = self.src[at + 1..].iter().take_while(|b| **b == b'=').count();
    (self.src.get(at + 1 + level) == Some(&b'[')).then_some(level)
  }

  /// Body of a long bracket whose opener was consumed. Escapes are not
  /// processed and the first matching closer ends the body.
  fn long_body(&mut self, level: usize) -> Option<&'a [u8]> {
    if self.peek() == Some(b'\r') {
      self.pos += 1;
    }
    if self.peek() == Some(b'\n') {
      self.pos += 1;
    }
    let start = self.pos;
    let mut i = start;
    while i < self.src.len() {
      if self.src[i] == b']'
        && self.src[i + 1..].iter().take(level).all(|b| *b == b'=')
        && self.src.len() > i + 1 + level
        && self.src[i + 1 + level] == b']'
      {
        self.pos = i + level + 2;
        return Some(&self.src[start..i]);
      }
      i += 1;
    }
    self.pos = self.src.len();
    self.truncated = true;
    None
  }

  fn ident(&mut self) -> String {
    let start = self.pos;
    while self.peek().is_some_and(is_ident_char) {
      self.pos += 1;
    }
    String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
  }

  fn note_duplicate(&mut self, key: &Key) {
    let path = self.path.join(".");
    let next = self.duplicates.len();
    let at = *self.seen_dups.entry((path.clone(), key.clone())).or_insert(next);
    match self.duplicates.get_mut(at) {
      Some(d) => d.occurrences += 1,
      None => self.duplicates.push(DuplicateKey { path, key: key.clone(), occurrences: 2 }),
    }
  }

  fn insert(&mut self, table: &mut Table, key: Key, value: Value) {
    if table.get_key(&key).is_some() {
      self.note_duplicate(&key);
    }
    table.insert(key, value);
  }

  // ── Grammar ───────────────────────────────────────────────────────────

  /// `{ [local] Name = value [;] }*`
  fn file(&mut self) -> Result<Table> {
    let mut globals = Table::new();
    loop {
      self.skip_trivia();
      let Some(c) = self.peek() else { break };
      if c == b';' || c == b',' {
        self.pos += 1;
        continue;
      }
      if !is_ident_start(c) {
        return Err(self.error(format!(
          "expected a global assignment, found {:?}",
          c as char
        )));
      }

      let mut name = self.ident();
      self.skip_trivia();
      if name == "local" && self.peek().is_some_and(is_ident_start) {
        name = self.ident();
        self.skip_trivia();
      }

      match self.peek() {
        Some(b'=') => self.pos += 1,
        None => {
          self.truncated = true;
          break;
        }
        Some(_) => return Err(self.error(format!("expected '=' after {name}"))),
      }

      self.path.push(name.clone());
      let value = self.value()?;
      self.path.pop();

      let Some(value) = value else { break };
      self.insert(&mut globals, Key::Str(name), value);
      if self.truncated {
        break;
      }
    }
    Ok(globals)
  }

  fn value(&mut self) -> Result<Parsed> {
    self.skip_trivia();
    let Some(c) = self.peek() else {
      self.truncated = true;
      return Ok(None);
    };

    match c {
      b'{' => self.table(),
      b'"' | b'\'' => Ok(self.quoted(c).map(Value::Str)),
      b'[' => match self.long_bracket_level(self.pos) {
        Some(level) => {
          self.pos += level + 2;
          Ok(
            self
              .long_body(level)
              .map(|body| Value::Str(String::from_utf8_lossy(body).into_owned())),
          )
        }
        None => Err(self.error("unexpected '['")),
      },
      b'-' | b'.' | b'0'..=b'9' => self.number(),
      c if is_ident_start(c) => {
        let word = self.ident();
        Ok(Some(match word.as_str() {
          "true" => Value::Bool(true),
          "false" => Value::Bool(false),
          "nil" => Value::Nil,
          _ => Value::Str(word),
        }))
      }
      other => Err(self.error(format!("unexpected character {:?}", other as char))),
    }
  }

  fn table(&mut self) -> Result<Parsed> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      return Err(Error::TooDeep(MAX_DEPTH));
    }
    self.pos += 1;

    let mut table = Table::new();
    let mut next_index: i64 = 1;

    loop {
      self.skip_trivia();
      let Some(c) = self.peek() else {
        self.truncated = true;
        break;
      };
      match c {
        b'}' => {
          self.pos += 1;
          break;
        }
        b',' | b';' => {
          self.pos += 1;
          continue;
        }
        _ => {}
      }

      match self.entry(&mut next_index)? {
        Some((key, value)) => self.insert(&mut table, key, value),
        None => break,
      }
      if self.truncated {
        break;
      }
    }

    self.depth -= 1;
    Ok(Some(finish(table)))
  }

  /// `[expr] = value`, `ident = value`, or a positional value.
  fn entry(&mut self, next_index: &mut i64) -> Result<Option<(Key, Value)>> {
    let c = self.peek();

    if c == Some(b'[') && self.long_bracket_level(self.pos).is_none() {
      self.pos += 1;
      let Some(raw_key) = self.value()? else {
        return Ok(None);
      };
      self.skip_trivia();
      match self.peek() {
        Some(b']') => self.pos += 1,
        None => {
          self.truncated = true;
          return Ok(None);
        }
        Some(_) => return Err(self.error("expected ']' after key")),
      }
      self.skip_trivia();
      match self.peek() {
        Some(b'=') => self.pos += 1,
        None => {
          self.truncated = true;
          return Ok(None);
        }
        Some(_) => return Err(self.error("expected '=' after ']'")),
      }
      let key = self.key_from(raw_key)?;
      return self.keyed_value(key);
    }

    if c.is_some_and(is_ident_start) {
      let save = self.pos;
      let word = self.ident();
      self.skip_trivia();
      if self.peek() == Some(b'=') && self.peek_at(1) != Some(b'=') {
        self.pos += 1;
        return self.keyed_value(Key::Str(word));
      }
      self.pos = save;
    }

    let key = Key::Int(*next_index);
    *next_index += 1;
    self.keyed_value(key)
  }

  fn keyed_value(&mut self, key: Key) -> Result<Option<(Key, Value)>> {
    self.path.push(key.to_string());
    let value = self.value()?;
    self.path.pop();
    Ok(value.map(|v| (key, v)))
  }

  fn key_from(&self, raw: Value) -> Result<Key> {
    match raw {
      Value::Int(i) => Ok(Key::Int(i)),
      Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => {
        Ok(Key::Int(f as i64))
      }
      Value::Float(f) => Ok(Key::Str(f.to_string())),
      Value::Str(s) => Ok(Key::Str(s)),
      Value::Bool(b) => Ok(Key::Str(b.to_string())),
      other => Err(self.error(format!("{} is not a valid key", other.type_name()))),
    }
  }

  fn number(&mut self) -> Result<Parsed> {
    let start = self.pos;
    if self.peek() == Some(b'-') {
      self.pos += 1;
      if self.at_eof() {
        self.truncated = true;
        return Ok(None);
      }
    }

    let hex = self.peek() == Some(b'0')
      && matches!(self.peek_at(1), Some(b'x') | Some(b'X'));
    if hex {
      self.pos += 2;
      let digits = self.pos;
      while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
        self.pos += 1;
      }
      let text = std::str::from_utf8(&self.src[digits..self.pos]).unwrap_or("");
      let magnitude = i64::from_str_radix(text, 16)
        .map_err(|_| self.error("malformed hex literal"))?;
      let negative = self.src[start] == b'-';
      return Ok(Some(Value::Int(if negative { -magnitude } else { magnitude })));
    }

    let mut float = false;
    while let Some(b) = self.peek() {
      match b {
        b'0'..=b'9' => {}
        b'.' => float = true,
        b'e' | b'E' => {
          float = true;
          if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
            self.pos += 1;
          }
        }
        _ => break,
      }
      self.pos += 1;
    }

    let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
    if !float && let Ok(i) = text.parse::<i64>() {
      return Ok(Some(Value::Int(i)));
    }
    text
      .parse::<f64>()
      .map(|f| Some(Value::Float(f)))
      .map_err(|_| self.error(format!("malformed number {text:?}")))
  }

  fn quoted(&mut self, quote: u8) -> Option<String> {
    self.pos += 1;
    let mut buf = Vec::new();
    loop {
      let Some(b) = self.peek() else {
        self.truncated = true;
        return None;
      };
      self.pos += 1;
      match b {
        b if b == quote => break,
        b'\\' => {
          let Some(e) = self.peek() else {
            self.truncated = true;
            return None;
          };
          self.pos += 1;
          match e {
            b'n' => buf.push(b'\n'),
            b't' => buf.push(b'\t'),
            b'r' => buf.push(b'\r'),
            b'a' => buf.push(0x07),
            b'b' => buf.push(0x08),
            b'f' => buf.push(0x0c),
            b'v' => buf.push(0x0b),
            b'\n' => buf.push(b'\n'),
            b'z' => {
              while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
                self.pos += 1;
              }
            }
            b'x' => {
              let hex = self
                .src
                .get(self.pos..self.pos + 2)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok());
              match hex {
                Some(byte) => {
                  buf.push(byte);
                  self.pos += 2;
                }
                None => buf.push(b'x'),
              }
            }
            b'0'..=b'9' => {
              let mut code = u32::from(e - b'0');
              for _ in 0..2 {
                match self.peek() {
                  Some(d @ b'0'..=b'9') => {
                    code = code * 10 + u32::from(d - b'0');
                    self.pos += 1;
                  }
                  _ => break,
                }
              }
              buf.push(u8::try_from(code).unwrap_or(u8::MAX));
            }
            // `\\`, `\"`, `\'` and anything unrecognised: keep the byte.
            other => buf.push(other),
          }
        }
        other => buf.push(other),
      }
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
  }
}

/// Keys exactly `1..=N` or `0..=N` become a list; anything else stays a map.
fn finish(table: Table) -> Value {
  let int_keys: Option<Vec<i64>> = table
    .iter()
    .map(|(k, _)| match k {
      Key::Int(i) => Some(*i),
      Key::Str(_) => None,
    })
    .collect();

  if let Some(mut keys) = int_keys
    && !keys.is_empty()
  {
    keys.sort_unstable();
    let start = keys[0];
    let contiguous = (start == 0 || start == 1)
      && keys
        .iter()
        .enumerate()
        .all(|(i, k)| *k == start + i as i64);
    if contiguous {
      let mut entries = table.into_entries();
      entries.sort_by(|a, b| a.0.cmp(&b.0));
      return Value::List(entries.into_iter().map(|(_, v)| v).collect());
    }
  }
  Value::Map(table)
}

fn is_ident_start(b: u8) -> bool { b.is_ascii_alphabetic() || b == b'_' }

fn is_ident_char(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' }

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(src: &str) -> Decoded { decode_file(src).unwrap() }

  #[test]
  fn three_entry_kinds() {
    let d = parse(r#"DB = { "pos", ["key"] = 1, ident = true, [10] = 2.5 }"#);
    let db = d.globals.get("DB").unwrap().as_map().unwrap();
    assert_eq!(db.get_key(&Key::Int(1)), Some(&Value::Str("pos".into())));
    assert_eq!(db.get("key"), Some(&Value::Int(1)));
    assert_eq!(db.get("ident"), Some(&Value::Bool(true)));
    assert_eq!(db.get_key(&Key::Int(10)), Some(&Value::Float(2.5)));
    assert!(!d.truncated);
  }

  #[test]
  fn sequences_one_and_zero_based() {
    let d = parse("A = { 1, 2, 3 }\nB = { [0] = 'z', [1] = 'o' }\nC = { [2] = 1, [3] = 2 }");
    assert_eq!(
      d.globals.get("A"),
      Some(&Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
    );
    assert_eq!(
      d.globals.get("B"),
      Some(&Value::List(vec![Value::Str("z".into()), Value::Str("o".into())]))
    );
    assert!(matches!(d.globals.get("C"), Some(Value::Map(_))));
  }

  #[test]
  fn mixed_keys_stay_a_map() {
    let d = parse("A = { 1, 2, name = 'x' }");
    let a = d.globals.get("A").unwrap().as_map().unwrap();
    assert_eq!(a.len(), 3);
  }

  #[test]
  fn comments_and_separators() {
    let src = "-- header\nA = { -- trailing\n 1; 2, --[[ block\n comment ]] 3,\n}\n--[==[ tail ]==]";
    let d = parse(src);
    assert_eq!(d.globals.get("A").unwrap().table_len(), 3);
  }

  #[test]
  fn escapes() {
    let d = parse(r#"S = "a\"b\\c\nd\te\65\x41""#);
    assert_eq!(d.globals.get("S"), Some(&Value::Str("a\"b\\c\nd\teAA".into())));
  }

  #[test]
  fn long_string_first_closer_wins() {
    let d = parse("S = [[\nline \\n ]]");
    assert_eq!(d.globals.get("S"), Some(&Value::Str("line \\n ".into())));
    // The body ends at the first `]]`, so a second one is stray input.
    assert!(decode_file("S = [[a ]] b]]").is_err());
  }

  #[test]
  fn leveled_long_string() {
    let d = parse("S = [==[ has ]] inside ]==]");
    assert_eq!(d.globals.get("S"), Some(&Value::Str(" has ]] inside ".into())));
  }

  #[test]
  fn bare_identifiers_materialize_as_strings() {
    let d = parse("A = { Bag, nil, false }");
    assert_eq!(
      d.globals.get("A"),
      Some(&Value::List(vec![
        Value::Str("Bag".into()),
        Value::Nil,
        Value::Bool(false)
      ]))
    );
  }

  #[test]
  fn numbers() {
    let d = parse("A = { -5, 3.0, 1e3, 0x1F, 9223372036854775808 }");
    assert_eq!(
      d.globals.get("A"),
      Some(&Value::List(vec![
        Value::Int(-5),
        Value::Float(3.0),
        Value::Float(1000.0),
        Value::Int(31),
        Value::Float(9_223_372_036_854_775_808.0),
      ]))
    );
  }

  #[test]
  fn duplicate_keys_last_write_wins() {
    let d = parse("A = { x = 1, x = 2, x = 3, y = 0 }\nA = { x = 4 }");
    assert_eq!(d.globals.get("A").unwrap().get("x"), Some(&Value::Int(4)));
    let inner = d.duplicates.iter().find(|dk| dk.path == "A").unwrap();
    assert_eq!(inner.key, Key::Str("x".into()));
    assert_eq!(inner.occurrences, 3);
    let top = d.duplicates.iter().find(|dk| dk.path.is_empty()).unwrap();
    assert_eq!(top.key, Key::Str("A".into()));
  }

  #[test]
  fn long_lists_decode_in_order() {
    let items: Vec<String> = (0..200_000).map(|i| i.to_string()).collect();
    let d = parse(&format!("A = {{ {} }}", items.join(", ")));
    let list = d.globals.get("A").unwrap().as_list().unwrap();
    assert_eq!(list.len(), 200_000);
    assert_eq!(list[0], Value::Int(0));
    assert_eq!(list[199_999], Value::Int(199_999));
    assert!(d.duplicates.is_empty());
  }

  #[test]
  fn many_distinct_duplicates_are_each_counted() {
    let body: Vec<String> = (0..5_000).map(|i| format!("k{i} = 1, k{i} = 2")).collect();
    let d = parse(&format!("A = {{ {} }}", body.join(", ")));
    assert_eq!(d.duplicates.len(), 5_000);
    assert!(d.duplicates.iter().all(|dk| dk.occurrences == 2 && dk.path == "A"));
    assert_eq!(d.globals.get("A").unwrap().get("k42"), Some(&Value::Int(2)));
  }

  #[test]
  fn truncated_file_keeps_prefix() {
    let d = parse("A = { done = 1 }\nB = { ok = { 1, 2 }, partial = { 3, \"unterm");
    assert!(d.truncated);
    assert_eq!(d.globals.get("A").unwrap().get("done"), Some(&Value::Int(1)));
    let b = d.globals.get("B").unwrap();
    assert_eq!(b.get("ok").unwrap().table_len(), 2);
    assert_eq!(
      b.get("partial"),
      Some(&Value::List(vec![Value::Int(3)]))
    );
  }

  #[test]
  fn truncated_after_equals() {
    let d = parse("A = 1\nB =");
    assert!(d.truncated);
    assert_eq!(d.globals.len(), 1);
  }

  #[test]
  fn syntax_errors_carry_position() {
    let err = decode_file("A = { 1 }\n}").unwrap_err();
    assert!(matches!(err, Error::Syntax { line: 2, column: 1, .. }), "{err:?}");
    assert!(decode_file("A { }").is_err());
    assert!(decode_file("A = { [nil] = 1 }").is_err());
  }

  #[test]
  fn nesting_is_bounded() {
    let src = format!("A = {}{}", "{".repeat(MAX_DEPTH + 1), "}".repeat(MAX_DEPTH + 1));
    assert_eq!(decode_file(&src).unwrap_err(), Error::TooDeep(MAX_DEPTH));
  }

  #[test]
  fn invalid_utf8_is_dropped() {
    let text = decode_text(b"A = \"caf\xff\xc3\xa9\"");
    assert_eq!(text, "A = \"caf\u{e9}\"");
  }
}
