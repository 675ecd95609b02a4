//! Query Statistics Module
//!
//! Counts cache hits, fetches and invalidations across the client.

use serde::Serialize;

// == Query Stats ==
/// Tracks query cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryStats {
    /// Reads served from a fresh entry without fetching
    pub hits: u64,
    /// Reads that started a fetch
    pub misses: u64,
    /// Reads that attached to a fetch already in flight
    pub deduplicated: u64,
    /// Fetches that completed successfully
    pub fetches: u64,
    /// Fetches that failed
    pub fetch_errors: u64,
    /// Entries marked stale by invalidation
    pub invalidations: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl QueryStats {
    // == Constructor ==
    /// Creates a new QueryStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Deduplicated reads count as hits since they issue no fetch. Returns
    /// 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.deduplicated;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_dedup(&mut self) {
        self.deduplicated += 1;
    }

    pub fn record_fetch(&mut self) {
        self.fetches += 1;
    }

    pub fn record_fetch_error(&mut self) {
        self.fetch_errors += 1;
    }

    pub fn record_invalidations(&mut self, count: usize) {
        self.invalidations += count as u64;
    }

    // == Update Entry Count ==
    /// Updates the total entries count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}
