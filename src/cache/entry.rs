//! Cache Entry Module
//!
//! The store holds snapshots of many payload types side by side, so entries
//! are kept behind a type-erased trait and downcast on typed access.

use std::any::{self, Any};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::QueryState;

// == Cache Entry ==
/// A type-erased [`QueryState`] snapshot.
pub(crate) trait CacheEntry: Send + Sync {
    /// Access for downcasting back to `QueryState<T>`.
    fn as_any(&self) -> &dyn Any;

    /// Name of the payload type, for mismatch diagnostics.
    fn type_name(&self) -> &'static str;

    /// See [`QueryState::is_stale_at`].
    fn is_stale_at(&self, now: DateTime<Utc>, stale_time: Duration) -> bool;

    fn last_updated(&self) -> Option<DateTime<Utc>>;

    /// A new snapshot identical to this one but marked stale.
    fn invalidated(&self) -> Arc<dyn CacheEntry>;
}

impl<T> CacheEntry for QueryState<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn is_stale_at(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
        QueryState::is_stale_at(self, now, stale_time)
    }

    fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    fn invalidated(&self) -> Arc<dyn CacheEntry> {
        Arc::new(QueryState::invalidated(self))
    }
}

/// Downcasts an entry to the snapshot type `T`, if it holds one.
pub(crate) fn downcast<T>(entry: &dyn CacheEntry) -> Option<&QueryState<T>>
where
    T: Clone + Send + Sync + 'static,
{
    entry.as_any().downcast_ref::<QueryState<T>>()
}
