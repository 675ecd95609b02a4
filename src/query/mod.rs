//! Query Module
//!
//! Reads with stale-while-revalidate semantics, invalidation and manual
//! cache writes.

mod client;

pub use client::QueryClient;
