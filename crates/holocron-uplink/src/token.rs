//! OAuth access-token cache.
//!
//! The mutex is held across the refresh, so concurrent callers that find
//! the token expired wait for one fetch instead of each issuing their own.

use std::{future::Future, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::error::CallError;

/// Tokens are treated as expired this long before the server says so.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct AccessToken {
  value:      String,
  expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct TokenCache {
  slot: Mutex<Option<AccessToken>>,
}

impl TokenCache {
  pub fn new() -> Self { Self::default() }

  /// The cached token, or a fresh one from `fetch`, which yields the token
  /// and its `expires_in`.
  pub async fn get<F, Fut>(&self, fetch: F) -> Result<String, CallError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(String, Duration), CallError>>,
  {
    let mut slot = self.slot.lock().await;
    if let Some(token) = slot.as_ref()
      && token.expires_at > Instant::now()
    {
      return Ok(token.value.clone());
    }

    let (value, expires_in) = fetch().await?;
    *slot = Some(AccessToken {
      value:      value.clone(),
      expires_at: Instant::now() + expires_in.saturating_sub(EXPIRY_MARGIN),
    });
    Ok(value)
  }

  /// Drop `rejected` after the server refused it. A newer token fetched by
  /// someone else in the meantime is kept.
  pub async fn invalidate(&self, rejected: &str) {
    let mut slot = self.slot.lock().await;
    if slot.as_ref().is_some_and(|t| t.value == rejected) {
      *slot = None;
    }
  }
}
