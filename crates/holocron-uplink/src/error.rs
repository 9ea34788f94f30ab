//! Error types for `holocron-uplink`.
//!
//! Every HTTP call resolves to a value or a [`CallError`]. The retry policy
//! branches only on [`CallError::transient`].

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallErrorKind {
  Timeout,
  Network,
  Status(u16),
  RateLimited,
  Auth,
  Decode,
}

impl fmt::Display for CallErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Timeout => f.write_str("timeout"),
      Self::Network => f.write_str("network error"),
      Self::Status(code) => write!(f, "HTTP {code}"),
      Self::RateLimited => f.write_str("rate limited"),
      Self::Auth => f.write_str("authentication failed"),
      Self::Decode => f.write_str("unexpected response body"),
    }
  }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} calling {endpoint}: {detail}")]
pub struct CallError {
  pub kind:      CallErrorKind,
  pub transient: bool,
  pub endpoint:  String,
  pub detail:    String,
}

impl CallError {
  pub fn new(kind: CallErrorKind, endpoint: &str, detail: impl Into<String>) -> Self {
    let transient = match kind {
      CallErrorKind::Timeout | CallErrorKind::Network | CallErrorKind::RateLimited => true,
      CallErrorKind::Status(code) => code >= 500,
      CallErrorKind::Auth | CallErrorKind::Decode => false,
    };
    Self { kind, transient, endpoint: endpoint.to_owned(), detail: detail.into() }
  }

  pub(crate) fn from_reqwest(endpoint: &str, e: reqwest::Error) -> Self {
    let kind = if e.is_timeout() {
      CallErrorKind::Timeout
    } else if e.is_decode() {
      CallErrorKind::Decode
    } else if let Some(status) = e.status() {
      CallErrorKind::Status(status.as_u16())
    } else {
      CallErrorKind::Network
    };
    Self::new(kind, endpoint, e.to_string())
  }
}

/// Failure of one enrichment task run.
#[derive(Debug, Error)]
pub enum TaskError {
  #[error(transparent)]
  Call(#[from] CallError),

  #[error("store error: {0}")]
  Store(String),

  /// Some items failed; the rest were committed.
  #[error("{failed} of {attempted} items failed, last: {last}")]
  Partial {
    attempted: usize,
    failed:    usize,
    last:      CallError,
  },

  #[error("missing configuration: {0}")]
  Config(&'static str),
}

impl TaskError {
  pub(crate) fn store(e: impl std::error::Error) -> Self { Self::Store(e.to_string()) }
}

pub type Result<T, E = TaskError> = std::result::Result<T, E>;
