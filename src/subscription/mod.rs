//! Subscription Module
//!
//! Hot streams with replay: per-key query streams and mutation state streams.

mod broadcast;
mod hub;

pub use broadcast::{Broadcast, StateStream};
pub use hub::SubscriptionHub;

use crate::cache::QueryState;
use crate::mutation::MutationState;

/// Stream of snapshots for one cached query.
pub type QueryStream<T> = StateStream<QueryState<T>>;

/// Stream of states for one mutation.
pub type MutationStream<T> = StateStream<MutationState<T>>;
