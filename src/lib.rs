//! Query Cache - A stale-while-revalidate query cache
//!
//! Keeps fetched data in a keyed cache, serves it while fresh, refetches it
//! once stale, deduplicates concurrent fetches and pushes every state change
//! to subscribers as a stream of snapshots. Mutations run with lifecycle hooks
//! and optional exponential backoff.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod mutation;
pub mod query;
pub mod services;
pub mod subscription;
pub mod tasks;

pub use cache::{CacheKey, QueryState, QueryStats};
pub use config::{ClientConfig, QueryOptions, Retry};
pub use error::{CacheError, QueryError};
pub use mutation::{retry_with_backoff, Mutation, MutationState, RetryPolicy};
pub use query::QueryClient;
pub use subscription::{MutationStream, QueryStream};
pub use tasks::{spawn_revalidation_task, RevalidationTrigger};
