//! Configuration Module
//!
//! Per-query options and the client-wide defaults loaded from the environment.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Defaults ==
const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_CACHE_TIME_MS: u64 = 10 * 60 * 1000;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

// == Retry ==
/// Retry setting of a query.
///
/// The read path never retries on its own; this value seeds the
/// [`RetryPolicy`](crate::mutation::RetryPolicy) of mutations built from the
/// same options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// No retries
    Disabled,
    /// Retry up to this many times after the first attempt
    Count(u32),
}

impl Retry {
    /// Number of retries after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        match self {
            Retry::Disabled => 0,
            Retry::Count(n) => *n,
        }
    }
}

impl From<bool> for Retry {
    fn from(enabled: bool) -> Self {
        if enabled {
            Retry::Count(DEFAULT_RETRY_COUNT)
        } else {
            Retry::Disabled
        }
    }
}

impl From<u32> for Retry {
    fn from(count: u32) -> Self {
        if count == 0 {
            Retry::Disabled
        } else {
            Retry::Count(count)
        }
    }
}

// == Query Options ==
/// Options recognized by [`QueryClient::read`](crate::QueryClient::read).
///
/// `stale_time` and `cache_time` are part of the cache key; the rest are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Age after which cached data is considered stale
    pub stale_time: Duration,
    /// How long an unused entry may live. Advisory only: nothing sweeps it.
    pub cache_time: Duration,
    /// Whether a revalidation signal refetches this query when stale
    pub refetch_on_window_focus: bool,
    /// Retry setting handed to mutations derived from these options
    pub retry: Retry,
    /// Base delay between retries
    pub retry_delay: Duration,
    /// Skip the freshness check and fetch even when cached data is fresh
    pub force_refresh: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_millis(DEFAULT_STALE_TIME_MS),
            cache_time: Duration::from_millis(DEFAULT_CACHE_TIME_MS),
            refetch_on_window_focus: true,
            retry: Retry::Count(DEFAULT_RETRY_COUNT),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            force_refresh: false,
        }
    }
}

impl QueryOptions {
    /// Sets the stale time.
    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Sets the cache time.
    #[must_use]
    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    /// Enables or disables refetching on a revalidation signal.
    #[must_use]
    pub fn refetch_on_window_focus(mut self, enabled: bool) -> Self {
        self.refetch_on_window_focus = enabled;
        self
    }

    /// Sets the retry setting.
    #[must_use]
    pub fn retry(mut self, retry: impl Into<Retry>) -> Self {
        self.retry = retry.into();
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Forces the next read to fetch regardless of freshness.
    #[must_use]
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    // == Validate ==
    /// Checks the option values for consistency.
    ///
    /// # Errors
    /// - `cache_time` shorter than `stale_time`
    /// - zero `retry_delay` while retries are enabled
    pub fn validate(&self) -> Result<()> {
        if self.cache_time < self.stale_time {
            return Err(CacheError::InvalidConfig(format!(
                "cache_time ({}ms) must not be shorter than stale_time ({}ms)",
                self.cache_time.as_millis(),
                self.stale_time.as_millis()
            )));
        }
        if self.retry != Retry::Disabled && self.retry_delay.is_zero() {
            return Err(CacheError::InvalidConfig(
                "retry_delay must be positive when retries are enabled".to_string(),
            ));
        }
        Ok(())
    }
}

// == Client Config ==
/// Client-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Options used when a call does not supply its own
    pub defaults: QueryOptions,
}

impl ClientConfig {
    /// Loads the default query options from environment variables.
    ///
    /// # Environment Variables
    /// - `QUERY_STALE_TIME_MS` - Stale time in milliseconds (default: 300000)
    /// - `QUERY_CACHE_TIME_MS` - Cache time in milliseconds (default: 600000)
    /// - `QUERY_REFETCH_ON_FOCUS` - `true`/`false` (default: true)
    /// - `QUERY_RETRY` - Retry count, or `true`/`false` (default: 3)
    /// - `QUERY_RETRY_DELAY_MS` - Base retry delay in milliseconds (default: 1000)
    pub fn from_env() -> Result<Self> {
        let defaults = QueryOptions {
            stale_time: Duration::from_millis(env_parse("QUERY_STALE_TIME_MS", DEFAULT_STALE_TIME_MS)),
            cache_time: Duration::from_millis(env_parse("QUERY_CACHE_TIME_MS", DEFAULT_CACHE_TIME_MS)),
            refetch_on_window_focus: env_parse("QUERY_REFETCH_ON_FOCUS", true),
            retry: env::var("QUERY_RETRY")
                .ok()
                .and_then(|v| parse_retry(&v))
                .unwrap_or(Retry::Count(DEFAULT_RETRY_COUNT)),
            retry_delay: Duration::from_millis(env_parse("QUERY_RETRY_DELAY_MS", DEFAULT_RETRY_DELAY_MS)),
            force_refresh: false,
        };
        defaults.validate()?;
        Ok(Self { defaults })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_retry(value: &str) -> Option<Retry> {
    match value.trim() {
        "true" => Some(Retry::from(true)),
        "false" => Some(Retry::Disabled),
        other => other.parse::<u32>().ok().map(Retry::from),
    }
}
