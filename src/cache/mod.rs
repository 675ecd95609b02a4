//! Cache Module
//!
//! Snapshot storage for the query cache: keys, states and the keyed store.

mod entry;
mod key;
mod state;
mod stats;
mod store;


pub(crate) use entry::CacheEntry;

// Re-export public types
pub use key::CacheKey;
pub use state::QueryState;
pub use stats::QueryStats;
pub use store::CacheStore;

// == Public Constants ==
/// Maximum allowed query name length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
