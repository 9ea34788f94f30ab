//! Error type for `holocron-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] holocron_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored count or id does not fit its domain type.
  #[error("negative or out-of-range value {value} in {column}")]
  NegativeCount { column: &'static str, value: i64 },

  #[error("unsupported database url: {0}")]
  UnsupportedUrl(String),
}

impl Error {
  /// Lock contention that is worth retrying: `SQLITE_BUSY` or
  /// `SQLITE_LOCKED`.
  pub fn is_transient(&self) -> bool {
    let Self::Database(tokio_rusqlite::Error::Rusqlite(
      rusqlite::Error::SqliteFailure(e, _),
    )) = self
    else {
      return false;
    };
    matches!(
      e.code,
      rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
