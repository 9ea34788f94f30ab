//! Error types for `holocron-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("cannot derive a character identity from {0:?}")]
  InvalidIdentity(String),

  #[error("unknown container type: {0:?}")]
  UnknownContainer(String),

  #[error("unknown sanity status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
