//! Query Cache demo
//!
//! Drives a profile screen against an in-memory profile API: first load,
//! cached re-read, optimistic update, invalidation and a focus revalidation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use query_cache::models::{Address, UpdateAddressRequest, UpdateProfileRequest, UserProfile};
use query_cache::services::{AuthProvider, ProfileApi, ProfileService};
use query_cache::{
    spawn_revalidation_task, ClientConfig, QueryClient, QueryError, QueryState, QueryStream, RevalidationTrigger,
};

const DEMO_USER_ID: u64 = 1;

// == In-memory collaborators ==
struct InMemoryProfileApi {
    profile: Mutex<UserProfile>,
}

#[async_trait]
impl ProfileApi for InMemoryProfileApi {
    async fn fetch_profile(&self, user_id: u64) -> Result<UserProfile, QueryError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let profile = self.profile.lock().clone();
        if profile.id != user_id {
            return Err(QueryError::with_status("profile not found", 404));
        }
        Ok(profile)
    }

    async fn update_profile(&self, user_id: u64, request: UpdateProfileRequest) -> Result<UserProfile, QueryError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut profile = self.profile.lock();
        if profile.id != user_id {
            return Err(QueryError::with_status("profile not found", 404));
        }
        *profile = profile.with_update(&request, Utc::now());
        Ok(profile.clone())
    }
}

struct SignedIn(u64);

impl AuthProvider for SignedIn {
    fn current_user_id(&self) -> Option<u64> {
        Some(self.0)
    }
}

fn seed_profile() -> anyhow::Result<UserProfile> {
    let now = Utc::now();
    Ok(UserProfile {
        id: DEMO_USER_ID,
        username: "jdoe".to_string(),
        email: "jdoe@example.com".to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        phone_number: "555-0100".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1991, 6, 24).context("invalid date of birth")?,
        created_at: now,
        updated_at: now,
        address: Address {
            id: Some(1),
            user_id: Some(DEMO_USER_ID),
            line1: Some("26 Main St".to_string()),
            line2: None,
            city: "New York".to_string(),
            state: "NY".to_string(),
            country: "USA".to_string(),
            postal_code: "63101".to_string(),
            is_primary: Some(true),
            created_at: Some(now),
            updated_at: Some(now),
        },
    })
}

fn print_json<T: Serialize>(label: &str, value: &T) -> anyhow::Result<()> {
    println!("{}: {}", label, serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Waits for the first snapshot with no fetch outstanding.
async fn settled(stream: &mut QueryStream<UserProfile>) -> anyhow::Result<QueryState<UserProfile>> {
    loop {
        let state = stream.recv().await.context("profile stream closed")?;
        if !state.is_fetching {
            return Ok(state);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to debug for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "query_cache=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env()?;
    info!(
        stale_ms = config.defaults.stale_time.as_millis() as u64,
        cache_ms = config.defaults.cache_time.as_millis() as u64,
        "Configuration loaded"
    );

    let client = QueryClient::with_config(config);
    let api = Arc::new(InMemoryProfileApi {
        profile: Mutex::new(seed_profile()?),
    });
    let service = ProfileService::new(client.clone(), api, Arc::new(SignedIn(DEMO_USER_ID)));

    let trigger = RevalidationTrigger::new();
    let revalidation = spawn_revalidation_task(client.clone(), trigger.clone());

    // First load goes to the API
    let mut screen = service.profile(false)?;
    print_json("loading", &screen.recv().await.context("profile stream closed")?)?;
    print_json("loaded", &settled(&mut screen).await?)?;

    // Second read is served from cache
    let mut cached = service.profile(false)?;
    print_json("cached", &cached.recv().await.context("profile stream closed")?)?;

    // Optimistic update, confirmed by the server
    let request = UpdateProfileRequest {
        id: DEMO_USER_ID,
        first_name: "Janet".to_string(),
        last_name: "Doe".to_string(),
        phone_number: "555-0199".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(1991, 6, 24).context("invalid date of birth")?,
        address: UpdateAddressRequest {
            street: "1 Elm St".to_string(),
            city: "Boston".to_string(),
            state: "MA".to_string(),
            zip_code: "02101".to_string(),
            country: "USA".to_string(),
        },
    };
    let updated = service.update_profile(request).await?;
    print_json("updated", &updated)?;

    // The update invalidated the profile; a focus signal refetches it
    trigger.fire();
    tokio::time::sleep(Duration::from_millis(200)).await;
    print_json("current", &service.current_profile()?)?;
    print_json("stats", &client.stats())?;

    revalidation.abort();
    service.clear();
    info!("Demo complete");
    Ok(())
}
