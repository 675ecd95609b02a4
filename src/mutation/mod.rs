//! Mutation Module
//!
//! Write operations with lifecycle hooks and retry with exponential backoff.

mod retry;
mod runner;

pub use retry::{retry_with_backoff, RetryPolicy};
pub use runner::{Mutation, MutationState};
