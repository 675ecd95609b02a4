//! Retry with exponential backoff
//!
//! Retry `n` waits `base_delay * 2^(n-1)`: with a 1s base that is 1s, 2s, 4s.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::QueryOptions;
use crate::error::QueryError;

// == Retry Policy ==
/// How many times to retry a failed operation and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Policy described by the `retry`/`retry_delay` options, if retries are on.
    pub fn from_options(options: &QueryOptions) -> Option<Self> {
        match options.retry.max_retries() {
            0 => None,
            n => Some(Self::new(n, options.retry_delay)),
        }
    }

    /// Total attempts including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based). Saturates instead of overflowing.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

// == Retry With Backoff ==
/// Runs `operation` until it succeeds or the policy is exhausted.
///
/// Only the last failure is returned; earlier ones are logged.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, QueryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueryError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay_for(retry);
                warn!(
                    retry,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                if policy.max_retries > 0 {
                    warn!(attempts = retry + 1, %error, "Retries exhausted");
                }
                return Err(error);
            }
        }
    }
}
