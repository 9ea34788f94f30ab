//! Mapping errors.

use thiserror::Error;

/// A record could not be built from its subtree. The record is dropped and
/// its siblings proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{path}: {reason}")]
pub struct MappingError {
  /// Location of the failing subtree, e.g. `Inv["Aria - Ridge"][3]`.
  pub path:   String,
  pub reason: String,
}

impl MappingError {
  pub(crate) fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
    Self { path: path.into(), reason: reason.into() }
  }
}
