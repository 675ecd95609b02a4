//! Revalidation Task
//!
//! Background task that refetches stale, observed queries whenever the
//! revalidation trigger fires (e.g. the user returning to the view).

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::query::QueryClient;

// == Revalidation Trigger ==
/// Fire-once signal with no payload.
///
/// Firing while the task is busy is remembered; several fires before the task
/// wakes collapse into one revalidation pass.
#[derive(Debug, Clone, Default)]
pub struct RevalidationTrigger {
    notify: Arc<Notify>,
}

impl RevalidationTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals that queries should be re-checked.
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    async fn fired(&self) {
        self.notify.notified().await;
    }
}

/// Spawns a task that runs [`QueryClient::revalidate_stale`] on every fire.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let client = QueryClient::new();
/// let trigger = RevalidationTrigger::new();
/// let handle = spawn_revalidation_task(client.clone(), trigger.clone());
/// trigger.fire(); // window regained focus
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_revalidation_task(client: QueryClient, trigger: RevalidationTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting revalidation task");

        loop {
            trigger.fired().await;

            let refetched = client.revalidate_stale();

            if refetched > 0 {
                info!("Revalidation: refetching {} stale queries", refetched);
            } else {
                debug!("Revalidation: no stale observed queries");
            }
        }
    })
}
