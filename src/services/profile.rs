//! Profile service
//!
//! Reads and updates the signed-in user's profile through the query cache.
//! Updates are optimistic: the expected profile is written to the cache
//! before the request goes out and restored from a snapshot if it fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::QueryOptions;
use crate::error::{CacheError, QueryError, Result};
use crate::models::{UpdateProfileRequest, UserProfile};
use crate::mutation::{Mutation, RetryPolicy};
use crate::query::QueryClient;
use crate::subscription::QueryStream;

/// Base delay of the address update backoff (1s, 2s, 4s...)
const ADDRESS_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

// == Collaborators ==
/// Transport for the profile endpoints.
#[async_trait]
pub trait ProfileApi: Send + Sync + 'static {
    async fn fetch_profile(&self, user_id: u64) -> std::result::Result<UserProfile, QueryError>;

    async fn update_profile(
        &self,
        user_id: u64,
        request: UpdateProfileRequest,
    ) -> std::result::Result<UserProfile, QueryError>;
}

/// Source of the signed-in identity. Token handling lives behind it.
pub trait AuthProvider: Send + Sync + 'static {
    fn current_user_id(&self) -> Option<u64>;
}

// == Profile Error ==
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProfileError {
    /// Rejected before any request was sent
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The request was sent and failed
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Cache key of a user's profile.
pub fn profile_key(user_id: u64) -> String {
    format!("profile-{}", user_id)
}

// == Profile Service ==
pub struct ProfileService {
    client: QueryClient,
    api: Arc<dyn ProfileApi>,
    auth: Arc<dyn AuthProvider>,
    options: QueryOptions,
}

impl ProfileService {
    /// Creates a service reading profiles with the client's default options.
    pub fn new(client: QueryClient, api: Arc<dyn ProfileApi>, auth: Arc<dyn AuthProvider>) -> Self {
        let options = client.defaults().clone();
        Self {
            client,
            api,
            auth,
            options,
        }
    }

    fn user_id(&self) -> Result<u64> {
        self.auth.current_user_id().ok_or(CacheError::Unauthenticated)
    }

    // == Read ==
    /// Stream of the current user's profile, fetching it if stale or
    /// `force_refresh` is set.
    pub fn profile(&self, force_refresh: bool) -> Result<QueryStream<UserProfile>> {
        let user_id = self.user_id()?;
        let api = self.api.clone();
        self.client.read(
            &profile_key(user_id),
            move || {
                let api = api.clone();
                async move { api.fetch_profile(user_id).await }
            },
            self.options.clone().force_refresh(force_refresh),
        )
    }

    /// Forces a canonical re-read.
    pub fn refresh(&self) -> Result<QueryStream<UserProfile>> {
        self.profile(true)
    }

    /// Profile currently in the cache, if any.
    pub fn current_profile(&self) -> Result<Option<UserProfile>> {
        let user_id = self.user_id()?;
        self.client.query_data(&profile_key(user_id))
    }

    // == Update ==
    /// Builds the profile update mutation for the current user.
    ///
    /// `on_mutate` writes the optimistic profile, `on_error` puts back the
    /// profile cached when the mutation was built, and `on_success` stores the
    /// server's answer and invalidates it so the next read reconciles.
    ///
    /// # Errors
    /// No signed-in user, or no profile loaded yet.
    pub fn update_mutation(
        &self,
        retry: Option<RetryPolicy>,
    ) -> Result<Mutation<UpdateProfileRequest, UserProfile>> {
        let user_id = self.user_id()?;
        let key = profile_key(user_id);
        let snapshot = self
            .client
            .query_data::<UserProfile>(&key)?
            .ok_or(CacheError::NoProfile)?;

        let api = self.api.clone();
        let (optimistic_client, rollback_client, success_client) =
            (self.client.clone(), self.client.clone(), self.client.clone());
        let (optimistic_key, rollback_key, success_key) = (key.clone(), key.clone(), key);
        let base = snapshot.clone();

        let mutation = Mutation::new(move |request: UpdateProfileRequest| {
            let api = api.clone();
            async move { api.update_profile(user_id, request).await }
        })
        .on_mutate(move |request| {
            let optimistic = base.with_update(request, Utc::now());
            if let Err(err) = optimistic_client.set_query_data(&optimistic_key, optimistic) {
                warn!(error = %err, "Optimistic profile write rejected");
            }
        })
        .on_error(move |_, _| {
            info!("Reverting optimistic profile update");
            if let Err(err) = rollback_client.set_query_data(&rollback_key, snapshot.clone()) {
                warn!(error = %err, "Profile rollback rejected");
            }
        })
        .on_success(move |updated, _| {
            if let Err(err) = success_client.set_query_data(&success_key, updated.clone()) {
                warn!(error = %err, "Profile write rejected");
            }
            success_client.invalidate(&success_key);
        });

        Ok(match retry {
            Some(policy) => mutation.with_retry(policy),
            None => mutation,
        })
    }

    /// Sends a profile update with an optimistic cache write.
    pub async fn update_profile(
        &self,
        request: UpdateProfileRequest,
    ) -> std::result::Result<UserProfile, ProfileError> {
        let mutation = self.update_mutation(None)?;
        Ok(mutation.mutate(request).await?)
    }

    /// Sends an update that spans the address service, retrying with
    /// exponential backoff.
    ///
    /// Once retries are exhausted the cached profile is no longer trusted: a
    /// canonical re-read is started and the terminal error returned.
    pub async fn update_address_with_retry(
        &self,
        request: UpdateProfileRequest,
        max_retries: u32,
    ) -> std::result::Result<UserProfile, ProfileError> {
        let policy = RetryPolicy::new(max_retries, ADDRESS_RETRY_BASE_DELAY);
        let mutation = self.update_mutation(Some(policy))?;

        match mutation.mutate(request).await {
            Ok(profile) => Ok(profile),
            Err(error) => {
                warn!(%error, max_retries, "Address update failed after retries, refreshing profile");
                // Dropping the stream leaves the refetch running
                if let Err(refresh_error) = self.refresh() {
                    warn!(error = %refresh_error, "Profile refresh after failed address update rejected");
                }
                Err(error.into())
            }
        }
    }

    /// Drops all cached data.
    pub fn clear(&self) {
        self.client.clear();
    }
}
