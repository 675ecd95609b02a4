//! Query client
//!
//! The cache context: owns the store, the subscription hub and the in-flight
//! fetch table, and is the only way to write to them. Cloning a client is
//! cheap and every clone shares the same cache.
//!
//! All writes and publishes for a key happen while holding one lock that is
//! never held across an `.await`, so every subscriber sees the snapshots of
//! a key in the order they were stored.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheStore, QueryState, QueryStats};
use crate::config::{ClientConfig, QueryOptions};
use crate::error::{CacheError, QueryError, Result};
use crate::subscription::{QueryStream, SubscriptionHub};

type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, std::result::Result<T, QueryError>> + Send + Sync>;
type Refetch = Arc<dyn Fn(&QueryClient) + Send + Sync>;

/// Last fetcher and options seen for a key, replayed on revalidation.
struct Registration {
    options: QueryOptions,
    refetch: Refetch,
}

#[derive(Default)]
struct ClientState {
    store: CacheStore,
    hub: SubscriptionHub,
    /// Generation of the fetch currently running for a key
    in_flight: HashMap<CacheKey, u64>,
    registrations: HashMap<CacheKey, Registration>,
    stats: QueryStats,
    next_generation: u64,
}

impl ClientState {
    fn begin_fetch(&mut self, key: &CacheKey) -> u64 {
        self.next_generation += 1;
        self.in_flight.insert(key.clone(), self.next_generation);
        self.next_generation
    }
}

struct Shared {
    config: ClientConfig,
    state: Mutex<ClientState>,
}

/// Settles the fetch it was created for, even if the fetch task panics or
/// is aborted before producing a result.
struct FetchGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pending: Option<(QueryClient, CacheKey, u64)>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> FetchGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(client: QueryClient, key: CacheKey, generation: u64) -> Self {
        Self {
            pending: Some((client, key, generation)),
            _payload: PhantomData,
        }
    }

    fn complete(mut self, result: std::result::Result<T, QueryError>) {
        if let Some((client, key, generation)) = self.pending.take() {
            client.complete_fetch(&key, generation, result);
        }
    }
}

impl<T> Drop for FetchGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some((client, key, generation)) = self.pending.take() {
            warn!(key = %key, generation, "Fetch task ended without a result");
            client.complete_fetch::<T>(&key, generation, Err(QueryError::new("fetch task aborted")));
        }
    }
}

// == Query Client ==
/// Shared handle to a query cache.
#[derive(Clone)]
pub struct QueryClient {
    shared: Arc<Shared>,
}

impl QueryClient {
    /// Creates a client with the default options.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a client whose name-only operations use `config.defaults`.
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ClientState::default()),
            }),
        }
    }

    /// Default options of this client.
    pub fn defaults(&self) -> &QueryOptions {
        &self.shared.config.defaults
    }

    // == Read ==
    /// Reads query `name`, fetching with `fetcher` when needed.
    ///
    /// A fresh entry is served from cache. A stale or missing one publishes a
    /// fetching snapshot and spawns `fetcher` on the Tokio runtime; reads
    /// arriving while that fetch is outstanding attach to it. The returned
    /// stream starts with the key's current snapshot.
    ///
    /// Fetch failures never surface here, they arrive as error snapshots. A
    /// fetch task that panics or is aborted settles as an error snapshot too.
    ///
    /// # Errors
    /// Caller misuse only: an invalid name or options, a key already holding
    /// another payload type, or a fetch needed outside a Tokio runtime
    /// ([`CacheError::NoRuntime`], reported before any state is written).
    pub fn read<T, F, Fut>(&self, name: &str, fetcher: F, options: QueryOptions) -> Result<QueryStream<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, QueryError>> + Send + 'static,
    {
        let fetcher: Fetcher<T> = Arc::new(move || fetcher().boxed());
        self.read_with(name, fetcher, options)
    }

    fn read_with<T>(&self, name: &str, fetcher: Fetcher<T>, options: QueryOptions) -> Result<QueryStream<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        options.validate()?;
        let key = CacheKey::new(name, &options)?;
        let refetch = Self::refetch_for(name, &fetcher, &options);
        let now = Utc::now();

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let cached = state.store.get::<T>(&key)?;
        state.registrations.insert(
            key.clone(),
            Registration {
                options: options.clone().force_refresh(false),
                refetch,
            },
        );

        if state.in_flight.contains_key(&key) {
            debug!(key = %key, "Attaching to in-flight fetch");
            state.stats.record_dedup();
            return state.hub.observe(&key, cached.unwrap_or_default());
        }

        let previous = match cached {
            Some(current) if !options.force_refresh && !current.is_stale_at(now, options.stale_time) => {
                debug!(key = %key, "Cache hit");
                state.stats.record_hit();
                return state.hub.observe(&key, current);
            }
            cached => cached.unwrap_or_default(),
        };

        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        state.stats.record_miss();
        let fetching = previous.fetching(now, options.stale_time);
        state.store.set(key.clone(), fetching.clone());
        state.hub.publish(&key, &fetching);
        let stream = state.hub.observe(&key, fetching)?;
        let generation = state.begin_fetch(&key);
        state.stats.set_total_entries(state.store.len());
        drop(guard);

        self.spawn_fetch(&runtime, key, generation, fetcher);
        Ok(stream)
    }

    /// Closure that re-reads `name` with the same fetcher and options.
    fn refetch_for<T>(name: &str, fetcher: &Fetcher<T>, options: &QueryOptions) -> Refetch
    where
        T: Clone + Send + Sync + 'static,
    {
        let name = name.to_string();
        let fetcher = fetcher.clone();
        let options = options.clone().force_refresh(false);
        Arc::new(move |client: &QueryClient| {
            if let Err(err) = client.read_with(&name, fetcher.clone(), options.clone()) {
                warn!(query = %name, error = %err, "Revalidation read rejected");
            }
        })
    }

    fn spawn_fetch<T>(&self, runtime: &Handle, key: CacheKey, generation: u64, fetcher: Fetcher<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        info!(key = %key, generation, "Fetching query");
        let guard = FetchGuard::<T>::new(self.clone(), key, generation);
        runtime.spawn(async move {
            let result = fetcher().await;
            guard.complete(result);
        });
    }

    fn complete_fetch<T>(&self, key: &CacheKey, generation: u64, result: std::result::Result<T, QueryError>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.in_flight.get(key) != Some(&generation) {
            debug!(key = %key, generation, "Discarding result of superseded fetch");
            return;
        }
        state.in_flight.remove(key);

        let next = match result {
            Ok(data) => {
                info!(key = %key, "Fetch succeeded");
                state.stats.record_fetch();
                QueryState::success(data, Utc::now())
            }
            Err(error) => {
                warn!(key = %key, %error, "Fetch failed, keeping previous data");
                state.stats.record_fetch_error();
                let previous = state.store.get::<T>(key).ok().flatten().unwrap_or_default();
                previous.failed(error)
            }
        };

        state.store.set(key.clone(), next.clone());
        state.hub.publish(key, &next);
    }

    // == Subscribe ==
    /// Observes query `name` under `options` without fetching.
    ///
    /// Replays the current snapshot, or an idle one if nothing is cached.
    pub fn subscribe<T>(&self, name: &str, options: &QueryOptions) -> Result<QueryStream<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = CacheKey::new(name, options)?;
        let mut state = self.shared.state.lock();
        let current = state.store.get::<T>(&key)?.unwrap_or_default();
        state.hub.observe(&key, current)
    }

    // == Invalidate ==
    /// Marks every cached variant of query `name` stale, without fetching.
    ///
    /// The next read of any of them fetches. Returns the number of entries
    /// marked.
    pub fn invalidate(&self, name: &str) -> usize {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let keys = state.store.keys_named(name);

        for key in &keys {
            if let Some(entry) = state.store.get_entry(key) {
                let stale = entry.invalidated();
                state.store.set_entry(key.clone(), stale.clone());
                state.hub.publish(key, stale.as_ref());
            }
        }

        state.stats.record_invalidations(keys.len());
        info!(query = name, entries = keys.len(), "Invalidated query");
        keys.len()
    }

    // == Set Query Data ==
    /// Writes `data` as the fresh result of query `name`.
    ///
    /// Every cached variant of `name` is replaced; if none exists, an entry
    /// is created under the client's default options. A fetch already in
    /// flight keeps running and its result lands on top of this one.
    ///
    /// # Errors
    /// Invalid name, or an existing variant holding another payload type. No
    /// entry is written in that case.
    pub fn set_query_data<T>(&self, name: &str, data: T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        let default_key = CacheKey::new(name, self.defaults())?;
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        let mut keys = state.store.keys_named(name);
        if keys.is_empty() {
            keys.push(default_key);
        }
        for key in &keys {
            state.store.get::<T>(key)?;
        }

        let written = QueryState::success(data, Utc::now());
        for key in keys {
            let next = QueryState {
                is_fetching: state.in_flight.contains_key(&key),
                ..written.clone()
            };
            state.store.set(key.clone(), next.clone());
            state.hub.publish(&key, &next);
            debug!(key = %key, "Query data set");
        }
        state.stats.set_total_entries(state.store.len());
        Ok(())
    }

    // == Query Data ==
    /// Current data of query `name`.
    ///
    /// Looks under the default options first, then at the most recently
    /// updated variant.
    pub fn query_data<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let default_key = CacheKey::new(name, self.defaults())?;
        let state = self.shared.state.lock();

        if let Some(current) = state.store.get::<T>(&default_key)? {
            return Ok(current.data);
        }

        let latest = state
            .store
            .keys_named(name)
            .into_iter()
            .max_by_key(|key| state.store.last_updated(key));
        match latest {
            Some(key) => Ok(state.store.get::<T>(&key)?.and_then(|s| s.data)),
            None => Ok(None),
        }
    }

    // == Revalidate ==
    /// Re-reads every stale query that is observed and opted into refetch on
    /// focus. Returns the number of reads issued.
    pub fn revalidate_stale(&self) -> usize {
        let now = Utc::now();
        let due: Vec<Refetch> = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let mut due = Vec::new();
            for (key, registration) in &state.registrations {
                if !registration.options.refetch_on_window_focus
                    || state.in_flight.contains_key(key)
                    || state.hub.live(key) == 0
                {
                    continue;
                }
                if state.store.is_stale(key, now, registration.options.stale_time) {
                    due.push(registration.refetch.clone());
                }
            }
            due
        };

        for refetch in &due {
            refetch(self);
        }
        due.len()
    }

    // == Clear ==
    /// Drops every entry, subscription and registration.
    ///
    /// Open streams end. Fetches still running complete into nothing.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        let entries = state.store.clear();
        let topics = state.hub.clear();
        state.in_flight.clear();
        state.registrations.clear();
        state.stats.set_total_entries(0);
        info!(entries, topics, "Query cache cleared");
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> QueryStats {
        let state = self.shared.state.lock();
        let mut stats = state.stats.clone();
        stats.set_total_entries(state.store.len());
        stats
    }

    /// Whether a fetch is outstanding for query `name` under `options`.
    pub fn is_fetching(&self, name: &str, options: &QueryOptions) -> bool {
        CacheKey::new(name, options)
            .map(|key| self.shared.state.lock().in_flight.contains_key(&key))
            .unwrap_or(false)
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_fetcher(
        calls: &Arc<AtomicUsize>,
        value: i32,
    ) -> impl Fn() -> BoxFuture<'static, std::result::Result<i32, QueryError>> + Send + Sync + 'static {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value) }.boxed()
        }
    }

    async fn settle(stream: &mut QueryStream<i32>) -> QueryState<i32> {
        loop {
            let state = stream.recv().await.expect("stream ended");
            if !state.is_fetching {
                return state;
            }
        }
    }

    #[tokio::test]
    async fn test_first_read_loads_then_succeeds() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut stream = client
            .read("todos", counting_fetcher(&calls, 7), QueryOptions::default())
            .unwrap();

        let loading = stream.recv().await.unwrap();
        assert!(loading.is_loading);
        assert!(loading.is_fetching);
        assert!(loading.data.is_none());

        let done = stream.recv().await.unwrap();
        assert_eq!(done.data, Some(7));
        assert!(!done.is_loading && !done.is_fetching && !done.is_error && !done.is_stale);
        assert!(done.last_updated.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_read_is_cache_hit() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut first = client
            .read("todos", counting_fetcher(&calls, 1), QueryOptions::default())
            .unwrap();
        settle(&mut first).await;

        let mut second = client
            .read("todos", counting_fetcher(&calls, 2), QueryOptions::default())
            .unwrap();
        assert_eq!(second.recv().await.unwrap().data, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_fetch() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let slow = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(3)
            }
        };

        let options = QueryOptions::default();
        let mut a = client.read("slow", slow.clone(), options.clone()).unwrap();
        let mut b = client.read("slow", slow, options.clone()).unwrap();
        assert!(client.is_fetching("slow", &options));

        assert_eq!(settle(&mut a).await.data, Some(3));
        assert_eq!(settle(&mut b).await.data, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats().deduplicated, 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_data() {
        let client = QueryClient::new();
        client.set_query_data("profile", 10).unwrap();
        client.invalidate("profile");

        let mut stream = client
            .read(
                "profile",
                || async { Err::<i32, _>(QueryError::with_status("unavailable", 503)) },
                QueryOptions::default(),
            )
            .unwrap();

        let fetching = stream.recv().await.unwrap();
        assert_eq!(fetching.data, Some(10));
        assert!(!fetching.is_loading);

        let failed = stream.recv().await.unwrap();
        assert_eq!(failed.data, Some(10));
        assert!(failed.is_error);
        assert!(!failed.is_fetching);
        assert_eq!(failed.error.unwrap().status, Some(503));
    }

    #[tokio::test]
    async fn test_error_is_cleared_by_next_success() {
        let client = QueryClient::new();
        let mut failing = client
            .read(
                "flaky",
                || async { Err::<i32, _>(QueryError::new("offline")) },
                QueryOptions::default(),
            )
            .unwrap();
        let failed = settle(&mut failing).await;
        assert!(failed.is_error);
        assert!(failed.data.is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let mut retry = client
            .read("flaky", counting_fetcher(&calls, 4), QueryOptions::default())
            .unwrap();
        let fetching = retry.recv().await.unwrap();
        assert!(fetching.is_loading);
        assert!(fetching.is_error);

        let done = settle(&mut retry).await;
        assert_eq!(done.data, Some(4));
        assert!(!done.is_error);
        assert!(done.error.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_forces_one_fetch() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut stream = client
            .read("todos", counting_fetcher(&calls, 1), QueryOptions::default())
            .unwrap();
        settle(&mut stream).await;

        assert_eq!(client.invalidate("todos"), 1);
        let invalidated = stream.recv().await.unwrap();
        assert!(invalidated.is_stale);

        let mut again = client
            .read("todos", counting_fetcher(&calls, 1), QueryOptions::default())
            .unwrap();
        settle(&mut again).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_unknown_query() {
        let client = QueryClient::new();
        assert_eq!(client.invalidate("nothing"), 0);
    }

    #[tokio::test]
    async fn test_invalidate_covers_every_variant() {
        let client = QueryClient::new();
        let short = QueryOptions::default().stale_time(Duration::from_secs(1));
        client.set_query_data("todos", 1).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut stream = client.read("todos", counting_fetcher(&calls, 2), short).unwrap();
        settle(&mut stream).await;

        assert_eq!(client.invalidate("todos"), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_fetches_fresh_entry() {
        let client = QueryClient::new();
        client.set_query_data("todos", 1).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut stream = client
            .read(
                "todos",
                counting_fetcher(&calls, 2),
                QueryOptions::default().force_refresh(true),
            )
            .unwrap();
        assert_eq!(settle(&mut stream).await.data, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_query_data_marks_fetching_when_in_flight() {
        let client = QueryClient::new();
        let options = QueryOptions::default();
        let mut stream = client
            .read(
                "slow",
                || async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok(9)
                },
                options.clone(),
            )
            .unwrap();
        stream.recv().await.unwrap();

        client.set_query_data("slow", 5).unwrap();
        let optimistic = stream.recv().await.unwrap();
        assert_eq!(optimistic.data, Some(5));
        assert!(optimistic.is_fetching);

        let done = stream.recv().await.unwrap();
        assert_eq!(done.data, Some(9));
    }

    #[tokio::test]
    async fn test_type_mismatch_is_rejected() {
        let client = QueryClient::new();
        client.set_query_data("todos", 1i32).unwrap();

        let result = client.read(
            "todos",
            || async { Ok("text".to_string()) },
            QueryOptions::default(),
        );
        assert!(matches!(result, Err(CacheError::TypeMismatch(_))));
        assert!(matches!(
            client.set_query_data("todos", "text".to_string()),
            Err(CacheError::TypeMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_fetch() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = QueryOptions::default().cache_time(Duration::ZERO);

        let result = client.read("todos", counting_fetcher(&calls, 1), options);
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_data() {
        let client = QueryClient::new();
        assert_eq!(client.query_data::<i32>("todos").unwrap(), None);

        client.set_query_data("todos", 12).unwrap();
        assert_eq!(client.query_data::<i32>("todos").unwrap(), Some(12));
    }

    #[tokio::test]
    async fn test_clear_ends_streams_and_discards_in_flight() {
        let client = QueryClient::new();
        let options = QueryOptions::default();
        let mut stream = client
            .read(
                "slow",
                || async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(1)
                },
                options.clone(),
            )
            .unwrap();
        stream.recv().await.unwrap();

        client.clear();
        assert!(stream.recv().await.is_none());
        assert!(!client.is_fetching("slow", &options));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.query_data::<i32>("slow").unwrap(), None);
        assert_eq!(client.stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_subscribe_without_fetch() {
        let client = QueryClient::new();
        let mut stream = client
            .subscribe::<i32>("todos", &QueryOptions::default())
            .unwrap();
        assert_eq!(stream.recv().await.unwrap(), QueryState::idle());

        client.set_query_data("todos", 3).unwrap();
        assert_eq!(stream.recv().await.unwrap().data, Some(3));
    }

    #[tokio::test]
    async fn test_revalidate_skips_unobserved_and_fresh() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut stream = client
            .read("todos", counting_fetcher(&calls, 1), QueryOptions::default())
            .unwrap();
        settle(&mut stream).await;
        assert_eq!(client.revalidate_stale(), 0);

        client.invalidate("todos");
        drop(stream);
        assert_eq!(client.revalidate_stale(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_revalidate_refetches_observed_stale() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut stream = client
            .read("todos", counting_fetcher(&calls, 1), QueryOptions::default())
            .unwrap();
        settle(&mut stream).await;

        client.invalidate("todos");
        assert!(stream.recv().await.unwrap().is_stale);

        assert_eq!(client.revalidate_stale(), 1);
        let done = settle(&mut stream).await;
        assert!(!done.is_stale);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_revalidate_respects_opt_out() {
        let client = QueryClient::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let options = QueryOptions::default().refetch_on_window_focus(false);

        let mut stream = client
            .read("todos", counting_fetcher(&calls, 1), options)
            .unwrap();
        settle(&mut stream).await;

        client.invalidate("todos");
        assert_eq!(client.revalidate_stale(), 0);
    }

    #[tokio::test]
    async fn test_panicking_fetch_settles_as_error() {
        let client = QueryClient::new();
        let options = QueryOptions::default();
        let exploding = || async {
            if true {
                panic!("fetcher exploded");
            }
            Ok::<i32, QueryError>(0)
        };

        let mut stream = client.read("boom", exploding, options.clone()).unwrap();
        let failed = settle(&mut stream).await;
        assert!(failed.is_error);
        assert_eq!(failed.error.unwrap().message, "fetch task aborted");
        assert!(!client.is_fetching("boom", &options));

        let calls = Arc::new(AtomicUsize::new(0));
        let mut retry = client
            .read("boom", counting_fetcher(&calls, 1), options.force_refresh(true))
            .unwrap();
        assert_eq!(settle(&mut retry).await.data, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fetch_dropped_with_runtime_settles_as_error() {
        let client = QueryClient::new();
        let options = QueryOptions::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let mut stream = runtime.block_on(async {
            client
                .read("hung", || std::future::pending::<std::result::Result<i32, QueryError>>(), options.clone())
                .unwrap()
        });
        assert!(client.is_fetching("hung", &options));

        drop(runtime);
        assert!(!client.is_fetching("hung", &options));
        assert!(stream.try_recv().unwrap().is_fetching);
        let failed = stream.try_recv().unwrap();
        assert!(failed.is_error);
        assert!(!failed.is_fetching);
    }

    #[test]
    fn test_read_outside_runtime_rejected_before_writing() {
        let client = QueryClient::new();
        let options = QueryOptions::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let result = client.read("todos", counting_fetcher(&calls, 1), options.clone());
        assert!(matches!(result, Err(CacheError::NoRuntime)));
        assert!(!client.is_fetching("todos", &options));
        assert_eq!(client.stats().total_entries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Fresh data needs no fetch, so no runtime either
        client.set_query_data("todos", 5).unwrap();
        let mut cached = client.read("todos", counting_fetcher(&calls, 1), options).unwrap();
        assert_eq!(cached.try_recv().unwrap().data, Some(5));
    }
}
