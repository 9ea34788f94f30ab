//! Error types for the holocron-lua codec.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
  #[error("syntax error at {line}:{column}: {message}")]
  Syntax {
    line:    usize,
    column:  usize,
    message: String,
  },

  #[error("tables nested deeper than {0} levels")]
  TooDeep(usize),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
