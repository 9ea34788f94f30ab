//! Bounded exponential backoff with full jitter.

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

use crate::error::CallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub attempts: u32,
  pub base:     Duration,
  pub cap:      Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts: 4,
      base:     Duration::from_millis(500),
      cap:      Duration::from_secs(8),
    }
  }
}

impl RetryPolicy {
  /// Upper bound of the delay before retry number `attempt` (0-based).
  pub fn ceiling(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    self.base.saturating_mul(factor).min(self.cap)
  }

  /// A uniformly random delay in `[0, ceiling(attempt)]`.
  pub fn delay(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
    let ceiling = u64::try_from(self.ceiling(attempt).as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rng.gen_range(0..=ceiling))
  }

  /// Run `op` until it succeeds, fails permanently, or attempts run out.
  pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, CallError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
  {
    let mut attempt = 0;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(e) if e.transient && attempt + 1 < self.attempts => {
          let delay = self.delay(attempt, &mut rand::thread_rng());
          warn!(
            endpoint = %e.endpoint,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "transient failure, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }
}
