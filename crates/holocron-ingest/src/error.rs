//! Error types for `holocron-ingest`.

use std::{io, path::PathBuf};

use holocron_core::sanity::ReasonCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
  #[error("cannot read {path}: {source}")]
  Read {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("cannot decode {origin}: {source}")]
  Decode {
    origin: String,
    #[source]
    source: holocron_lua::Error,
  },

  /// The decoder hit end of input inside an open table or string. The file
  /// is most likely still being written.
  #[error("{origin} is truncated")]
  Truncated { origin: String },

  #[error("{origin} does not match any known addon stream")]
  UnknownStream { origin: String },

  #[error("cannot persist {origin}: {message}")]
  Persist { origin: String, message: String },

  #[error("cannot write artifact {path}: {source}")]
  Artifact {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("store error while emitting artifact: {0}")]
  ArtifactStore(String),

  #[error("worker task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl IngestError {
  /// The sanity code recorded against the originating component.
  pub fn code(&self) -> ReasonCode {
    match self {
      Self::Read { .. }
      | Self::Decode { .. }
      | Self::Truncated { .. }
      | Self::UnknownStream { .. } => ReasonCode::IngestDecodeFailed,
      Self::Persist { .. }
      | Self::Artifact { .. }
      | Self::ArtifactStore(_)
      | Self::Join(_) => ReasonCode::IngestPersistFailed,
    }
  }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
