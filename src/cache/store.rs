//! Cache Store Module
//!
//! Keyed storage of the latest snapshot per cache key. Pure storage: it never
//! notifies anyone, that is the subscription hub's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::entry::{downcast, CacheEntry};
use crate::cache::{CacheKey, QueryState};
use crate::error::{CacheError, Result};

// == Cache Store ==
/// Latest snapshot per cache key, last write wins.
#[derive(Default)]
pub struct CacheStore {
    entries: HashMap<CacheKey, Arc<dyn CacheEntry>>,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Get ==
    /// Returns a copy of the snapshot stored under `key`.
    ///
    /// # Errors
    /// [`CacheError::TypeMismatch`] when the entry holds another payload type.
    pub fn get<T>(&self, key: &CacheKey) -> Result<Option<QueryState<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.entries.get(key) {
            Some(entry) => match downcast::<T>(entry.as_ref()) {
                Some(state) => Ok(Some(state.clone())),
                None => Err(CacheError::TypeMismatch(format!(
                    "{} holds {}, requested {}",
                    key,
                    entry.type_name(),
                    std::any::type_name::<T>()
                ))),
            },
            None => Ok(None),
        }
    }

    pub(crate) fn get_entry(&self, key: &CacheKey) -> Option<Arc<dyn CacheEntry>> {
        self.entries.get(key).cloned()
    }

    // == Set ==
    /// Stores a snapshot, replacing whatever was under `key`.
    pub fn set<T>(&mut self, key: CacheKey, state: QueryState<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.entries.insert(key, Arc::new(state));
    }

    pub(crate) fn set_entry(&mut self, key: CacheKey, entry: Arc<dyn CacheEntry>) {
        self.entries.insert(key, entry);
    }

    // == Lookup ==
    /// Every key derived from the query `name`, in key order.
    pub fn keys_named(&self, name: &str) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|key| key.name() == name)
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Whether the entry under `key` is stale. Absent entries are stale.
    pub fn is_stale(&self, key: &CacheKey, now: DateTime<Utc>, stale_time: Duration) -> bool {
        self.entries
            .get(key)
            .map_or(true, |entry| entry.is_stale_at(now, stale_time))
    }

    /// Last successful write of the entry under `key`.
    pub fn last_updated(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        self.entries.get(key).and_then(|entry| entry.last_updated())
    }

    // == Clear ==
    /// Removes every entry, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
