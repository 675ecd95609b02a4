//! Mutation runner
//!
//! Runs a write operation with lifecycle hooks, in a fixed order:
//!
//! 1. publish a loading state
//! 2. `on_mutate(&variables)`, synchronously, before any network call
//! 3. the operation (retried with backoff when a [`RetryPolicy`] is set)
//! 4. on success: publish the data, then `on_success(&data, &variables)`
//! 5. on failure: publish the error, then `on_error(&error, &variables)`
//! 6. always `on_settled(data, error, &variables)` last
//!
//! The runner takes no snapshot of the cache. Callers that write optimistic
//! data in `on_mutate` restore it themselves in `on_error`.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::mutation::{retry_with_backoff, RetryPolicy};
use crate::subscription::{Broadcast, MutationStream};

// == Mutation State ==
/// Observable state of a mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationState<T> {
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<QueryError>,
    pub data: Option<T>,
}

impl<T> MutationState<T> {
    /// Not started yet.
    pub fn idle() -> Self {
        Self {
            is_loading: false,
            is_error: false,
            error: None,
            data: None,
        }
    }

    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::idle()
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            ..Self::idle()
        }
    }

    pub fn failure(error: QueryError) -> Self {
        Self {
            is_error: true,
            error: Some(error),
            ..Self::idle()
        }
    }
}

type Operation<V, T> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;
type MutateHook<V> = Box<dyn Fn(&V) + Send + Sync>;
type SuccessHook<T, V> = Box<dyn Fn(&T, &V) + Send + Sync>;
type ErrorHook<V> = Box<dyn Fn(&QueryError, &V) + Send + Sync>;
type SettledHook<T, V> = Box<dyn Fn(Option<&T>, Option<&QueryError>, &V) + Send + Sync>;

// == Mutation ==
/// A write operation plus its hooks and state stream.
pub struct Mutation<V, T> {
    operation: Operation<V, T>,
    retry: Option<RetryPolicy>,
    on_mutate: Option<MutateHook<V>>,
    on_success: Option<SuccessHook<T, V>>,
    on_error: Option<ErrorHook<V>>,
    on_settled: Option<SettledHook<T, V>>,
    state: Mutex<Broadcast<MutationState<T>>>,
}

impl<V, T> Mutation<V, T>
where
    V: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Wraps `operation` in an idle mutation with no hooks.
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        Self {
            operation: Arc::new(move |variables| operation(variables).boxed()),
            retry: None,
            on_mutate: None,
            on_success: None,
            on_error: None,
            on_settled: None,
            state: Mutex::new(Broadcast::new(MutationState::idle())),
        }
    }

    /// Retries the operation per `policy` before reporting failure.
    #[must_use]
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    #[must_use]
    pub fn on_mutate(mut self, hook: impl Fn(&V) + Send + Sync + 'static) -> Self {
        self.on_mutate = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_success(mut self, hook: impl Fn(&T, &V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_error(mut self, hook: impl Fn(&QueryError, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn on_settled(
        mut self,
        hook: impl Fn(Option<&T>, Option<&QueryError>, &V) + Send + Sync + 'static,
    ) -> Self {
        self.on_settled = Some(Box::new(hook));
        self
    }

    /// Stream of this mutation's states, starting with the current one.
    pub fn subscribe(&self) -> MutationStream<T> {
        self.state.lock().subscribe()
    }

    /// The most recently published state.
    pub fn state(&self) -> MutationState<T> {
        self.state.lock().latest().clone()
    }

    // == Mutate ==
    /// Runs the mutation with `variables`.
    ///
    /// The outcome is both published on the state stream and returned.
    pub async fn mutate(&self, variables: V) -> Result<T, QueryError> {
        self.publish(MutationState::loading());

        if let Some(hook) = &self.on_mutate {
            hook(&variables);
        }

        let result = match self.retry {
            Some(policy) => {
                retry_with_backoff(policy, || (self.operation)(variables.clone())).await
            }
            None => (self.operation)(variables.clone()).await,
        };

        match &result {
            Ok(data) => {
                debug!("Mutation succeeded");
                self.publish(MutationState::success(data.clone()));
                if let Some(hook) = &self.on_success {
                    hook(data, &variables);
                }
            }
            Err(error) => {
                warn!(%error, "Mutation failed");
                self.publish(MutationState::failure(error.clone()));
                if let Some(hook) = &self.on_error {
                    hook(error, &variables);
                }
            }
        }

        if let Some(hook) = &self.on_settled {
            hook(result.as_ref().ok(), result.as_ref().err(), &variables);
        }

        result
    }

    fn publish(&self, state: MutationState<T>) {
        self.state.lock().publish(state);
    }
}
