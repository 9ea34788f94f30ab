//! Where a snapshot file came from.
//!
//! The game client lays SavedVariables out as
//!
//! ```text
//! WTF/Account/<ACCOUNT>/SavedVariables/<Addon>.lua
//! WTF/Account/<ACCOUNT>/<Realm>/<Character>/SavedVariables/<Addon>.lua
//! ```
//!
//! Account-wide files name their characters inside the data; per-character
//! files get their identity from the path.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use holocron_addons::{MapContext, Stream};
use holocron_core::CharacterId;

const SAVED_VARIABLES: &str = "SavedVariables";
const ACCOUNT: &str = "Account";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSource {
  pub path:      PathBuf,
  pub stream:    Stream,
  pub character: Option<CharacterId>,
  pub account:   Option<String>,
}

impl SnapshotSource {
  /// `None` when the file name is not a known addon stream.
  pub fn from_path(path: &Path) -> Option<Self> {
    let stream = Stream::from_file_name(path.file_name()?.to_str()?)?;

    let parts: Vec<&str> = path
      .components()
      .filter_map(|c| match c {
        Component::Normal(s) => s.to_str(),
        _ => None,
      })
      .collect();

    let (mut character, mut account) = (None, None);
    // Index of the SavedVariables directory, just above the file.
    if let Some(sv) = parts.len().checked_sub(2)
      && parts[sv].eq_ignore_ascii_case(SAVED_VARIABLES)
    {
      let above: &[&str] = &parts[..sv];
      match above {
        [.., acct_dir, acct, realm, name] if acct_dir.eq_ignore_ascii_case(ACCOUNT) => {
          account = Some((*acct).to_owned());
          character = CharacterId::new(realm, name).ok();
        }
        [.., acct_dir, acct] if acct_dir.eq_ignore_ascii_case(ACCOUNT) => {
          account = Some((*acct).to_owned());
        }
        _ => {}
      }
    }

    Some(Self { path: path.to_path_buf(), stream, character, account })
  }

  /// Component name used for sanity reporting, e.g. `DeepPockets.lua`.
  pub fn component(&self) -> String { self.stream.file_name() }

  pub fn context(&self, observed_at: DateTime<Utc>) -> MapContext {
    MapContext {
      observed_at,
      character: self.character.clone(),
      account: self.account.clone(),
    }
  }
}
