//! Background Tasks Module
//!
//! # Tasks
//! - Revalidation: refetches stale observed queries when the trigger fires

mod revalidate;

pub use revalidate::{spawn_revalidation_task, RevalidationTrigger};
