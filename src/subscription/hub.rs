//! Subscription Hub
//!
//! One replaying broadcaster per cache key.

use std::any::Any;
use std::collections::HashMap;

use tracing::debug;

use crate::cache::{CacheEntry, CacheKey, QueryState};
use crate::error::{CacheError, Result};
use crate::subscription::{Broadcast, QueryStream};

/// A per-key broadcaster with its payload type erased.
trait Topic: Send + Sync {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Publishes `entry` if it holds this topic's payload type.
    fn publish_entry(&mut self, entry: &dyn CacheEntry) -> bool;

    fn live(&mut self) -> usize;
}

impl<T> Topic for Broadcast<QueryState<T>>
where
    T: Clone + Send + Sync + 'static,
{
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn publish_entry(&mut self, entry: &dyn CacheEntry) -> bool {
        match entry.as_any().downcast_ref::<QueryState<T>>() {
            Some(state) => {
                self.publish(state.clone());
                true
            }
            None => false,
        }
    }

    fn live(&mut self) -> usize {
        Broadcast::live(self)
    }
}

// == Subscription Hub ==
/// Per-key hot streams of [`QueryState`] snapshots.
#[derive(Default)]
pub struct SubscriptionHub {
    topics: HashMap<CacheKey, Box<dyn Topic>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    // == Observe ==
    /// Subscribes to `key`.
    ///
    /// The stream starts with the key's latest published snapshot. When the
    /// key has no broadcaster yet, one is created seeded with `current`.
    ///
    /// # Errors
    /// [`CacheError::TypeMismatch`] if the key is broadcasting another type.
    pub fn observe<T>(&mut self, key: &CacheKey, current: QueryState<T>) -> Result<QueryStream<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let topic = self
            .topics
            .entry(key.clone())
            .or_insert_with(|| Box::new(Broadcast::new(current)));

        match topic
            .as_any_mut()
            .downcast_mut::<Broadcast<QueryState<T>>>()
        {
            Some(broadcast) => Ok(broadcast.subscribe()),
            None => Err(CacheError::TypeMismatch(format!(
                "{} is broadcasting another type than {}",
                key,
                std::any::type_name::<T>()
            ))),
        }
    }

    // == Publish ==
    /// Delivers a snapshot to every subscriber of `key`.
    ///
    /// Keys nobody has observed yet have no broadcaster; the snapshot is then
    /// only visible through the store, which seeds the next `observe`.
    pub(crate) fn publish(&mut self, key: &CacheKey, entry: &dyn CacheEntry) {
        if let Some(topic) = self.topics.get_mut(key) {
            if !topic.publish_entry(entry) {
                debug!(key = %key, "Skipped publish of mismatched snapshot type");
            }
        }
    }

    /// Number of live subscribers of `key`.
    pub fn live(&mut self, key: &CacheKey) -> usize {
        self.topics.get_mut(key).map_or(0, |topic| topic.live())
    }

    /// Drops every broadcaster, ending all streams.
    pub fn clear(&mut self) -> usize {
        let count = self.topics.len();
        self.topics.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}
