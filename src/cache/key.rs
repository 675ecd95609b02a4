//! Cache Key Module
//!
//! A cache key is the query name plus the options that decide how long its
//! result lives, so reads with different staleness windows never share an
//! entry.

use std::fmt;
use std::time::Duration;

use crate::cache::MAX_KEY_LENGTH;
use crate::config::QueryOptions;
use crate::error::{CacheError, Result};

/// Identifies one cached query variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    name: String,
    stale_time_ms: u64,
    cache_time_ms: u64,
}

impl CacheKey {
    /// Derives the key for `name` under `options`.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidKey`] for an empty name or one longer than
    /// [`MAX_KEY_LENGTH`] bytes.
    pub fn new(name: &str, options: &QueryOptions) -> Result<Self> {
        if name.is_empty() {
            return Err(CacheError::InvalidKey("Query name cannot be empty".to_string()));
        }
        if name.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidKey(format!(
                "Query name exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }

        Ok(Self {
            name: name.to_string(),
            stale_time_ms: millis("stale_time", options.stale_time)?,
            cache_time_ms: millis("cache_time", options.cache_time)?,
        })
    }

    /// The query name this key was derived from.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn millis(option: &str, duration: Duration) -> Result<u64> {
    u64::try_from(duration.as_millis()).map_err(|_| {
        CacheError::InvalidConfig(format!("{} does not fit in u64 milliseconds", option))
    })
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.name, self.stale_time_ms, self.cache_time_ms)
    }
}
