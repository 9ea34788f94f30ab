//! Character identity canonicalization.
//!
//! Every record that references a character carries a [`CharacterId`], and
//! the only way to build one is through this module. Snapshot keys such as
//! `"aria - ridge"`, `"Aria-Ridge"` and `"Player-Ridge-Aria"` all resolve to
//! the same identity string `Player-Ridge-Aria`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const PREFIX: &str = "Player-";

/// Canonical `Player-<Realm>-<Name>` identity.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct CharacterId(String);

impl CharacterId {
  /// Build an identity from its two components.
  pub fn new(realm: &str, name: &str) -> Result<Self> {
    let realm = canonical_realm(realm);
    let name = canonical_name(name);
    if realm.is_empty() || name.is_empty() || name.contains('-') {
      return Err(Error::InvalidIdentity(format!("{name}-{realm}")));
    }
    Ok(Self(format!("{PREFIX}{realm}-{name}")))
  }

  /// Parse any of the accepted spellings:
  ///
  /// - `"<name> - <realm>"` (the addon dictionary key form)
  /// - `"<name>-<realm>"`
  /// - `"Player-<realm>-<name>"`
  ///
  /// Names never contain `-`, so the first hyphen separates name from realm
  /// and hyphenated realms (`Azjol-Nerub`) survive intact.
  pub fn parse(raw: &str) -> Result<Self> {
    let trimmed = raw.trim();

    if let Some(head) = trimmed.get(..PREFIX.len())
      && head.eq_ignore_ascii_case(PREFIX)
      && let Some((realm, name)) = trimmed[PREFIX.len()..].rsplit_once('-')
      && !realm.trim().is_empty()
    {
      return Self::new(realm, name);
    }

    let (name, realm) = trimmed
      .split_once('-')
      .ok_or_else(|| Error::InvalidIdentity(raw.to_owned()))?;
    Self::new(realm, name)
  }

  pub fn as_str(&self) -> &str { &self.0 }

  pub fn realm(&self) -> &str { self.split().0 }

  pub fn name(&self) -> &str { self.split().1 }

  fn split(&self) -> (&str, &str) {
    let rest = &self.0[PREFIX.len()..];
    rest.rsplit_once('-').unwrap_or((rest, ""))
  }
}

impl fmt::Display for CharacterId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl FromStr for CharacterId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for CharacterId {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<CharacterId> for String {
  fn from(id: CharacterId) -> Self { id.0 }
}

/// First letter uppercase, the rest lowercase; inner whitespace dropped.
fn canonical_name(raw: &str) -> String {
  let joined: String = raw.split_whitespace().collect();
  title_word(&joined)
}

/// Each whitespace-separated word title-cased, then concatenated. Hyphenated
/// words are title-cased per segment: `azjol-nerub` becomes `Azjol-Nerub`.
fn canonical_realm(raw: &str) -> String {
  raw
    .split_whitespace()
    .map(|word| word.split('-').map(title_word).collect::<Vec<_>>().join("-"))
    .collect()
}

fn title_word(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first
      .to_uppercase()
      .chain(chars.flat_map(char::to_lowercase))
      .collect(),
    None => String::new(),
  }
}
