//! Query State Module
//!
//! The immutable snapshot published for every cached query.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::QueryError;

// == Query State ==
/// A full snapshot of one query.
///
/// Snapshots are never mutated in place once published; every transition
/// builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState<T> {
    /// Last known-good payload. Errors never clear it.
    pub data: Option<T>,
    /// First fetch in flight, no data yet
    pub is_loading: bool,
    /// Any fetch in flight
    pub is_fetching: bool,
    /// Most recent fetch failed
    pub is_error: bool,
    /// Failure of the most recent fetch
    pub error: Option<QueryError>,
    /// Marked stale by invalidation or a failed revalidation
    pub is_stale: bool,
    /// Time of the last successful write
    pub last_updated: Option<DateTime<Utc>>,
}

impl<T> QueryState<T> {
    // == Constructors ==
    /// State of a query that has never been fetched.
    pub fn idle() -> Self {
        Self {
            data: None,
            is_loading: false,
            is_fetching: false,
            is_error: false,
            error: None,
            is_stale: false,
            last_updated: None,
        }
    }

    /// Fresh state holding `data`, written at `now`.
    pub fn success(data: T, now: DateTime<Utc>) -> Self {
        Self {
            data: Some(data),
            is_loading: false,
            is_fetching: false,
            is_error: false,
            error: None,
            is_stale: false,
            last_updated: Some(now),
        }
    }

    // == Staleness ==
    /// Checks whether this snapshot is stale at `now` for a given stale time.
    ///
    /// A snapshot without a successful write is always stale. Clock skew that
    /// puts `last_updated` in the future counts as fresh.
    pub fn is_stale_at(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
        if self.is_stale {
            return true;
        }
        match self.last_updated {
            Some(updated) => match (now - updated).to_std() {
                Ok(age) => age > stale_time,
                Err(_) => false,
            },
            None => true,
        }
    }

    /// True when data is present and the last fetch did not fail.
    pub fn is_success(&self) -> bool {
        self.data.is_some() && !self.is_error
    }
}

impl<T: Clone> QueryState<T> {
    // == Transitions ==
    /// Snapshot published when a fetch starts.
    ///
    /// Keeps the data and any previous error; `is_loading` only when there is
    /// nothing to show yet.
    pub(crate) fn fetching(&self, now: DateTime<Utc>, stale_time: Duration) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.data.is_none(),
            is_fetching: true,
            is_error: self.is_error,
            error: self.error.clone(),
            is_stale: self.data.is_some() && self.is_stale_at(now, stale_time),
            last_updated: self.last_updated,
        }
    }

    /// Snapshot published when a fetch fails. Data and timestamp survive.
    pub(crate) fn failed(&self, error: QueryError) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: false,
            is_fetching: false,
            is_error: true,
            error: Some(error),
            is_stale: true,
            last_updated: self.last_updated,
        }
    }

    /// Same snapshot, marked stale.
    pub(crate) fn invalidated(&self) -> Self {
        Self {
            is_stale: true,
            ..self.clone()
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TimeDelta;

    #[test]
    fn test_idle_state() {
        let state: QueryState<i32> = QueryState::idle();
        assert!(state.data.is_none());
        assert!(!state.is_loading && !state.is_fetching && !state.is_error);
        assert!(state.is_stale_at(Utc::now(), Duration::from_secs(60)));
    }

    #[test]
    fn test_success_is_fresh_within_stale_time() {
        let now = Utc::now();
        let state = QueryState::success(7, now);
        assert!(state.is_success());
        assert!(!state.is_stale_at(now + TimeDelta::seconds(30), Duration::from_secs(60)));
        assert!(state.is_stale_at(now + TimeDelta::seconds(61), Duration::from_secs(60)));
    }

    #[test]
    fn test_stale_boundary_is_exclusive() {
        let now = Utc::now();
        let state = QueryState::success(7, now);
        assert!(!state.is_stale_at(now + TimeDelta::seconds(60), Duration::from_secs(60)));
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        let now = Utc::now();
        let state = QueryState::success(7, now + TimeDelta::seconds(5));
        assert!(!state.is_stale_at(now, Duration::ZERO));
    }

    #[test]
    fn test_fetching_first_load() {
        let state: QueryState<i32> = QueryState::idle().fetching(Utc::now(), Duration::ZERO);
        assert!(state.is_loading);
        assert!(state.is_fetching);
        assert!(!state.is_stale);
    }

    #[test]
    fn test_fetching_background_keeps_data_and_error() {
        let now = Utc::now();
        let failed = QueryState::success(1, now - TimeDelta::seconds(10))
            .failed(QueryError::new("offline"));
        let state = failed.fetching(now, Duration::from_secs(1));

        assert_eq!(state.data, Some(1));
        assert!(!state.is_loading);
        assert!(state.is_fetching);
        assert!(state.is_error);
        assert!(state.is_stale);
    }

    #[test]
    fn test_failed_keeps_data_and_timestamp() {
        let now = Utc::now();
        let state = QueryState::success("profile", now).failed(QueryError::with_status("down", 503));

        assert_eq!(state.data, Some("profile"));
        assert_eq!(state.last_updated, Some(now));
        assert!(state.is_error);
        assert_eq!(state.error.as_ref().and_then(|e| e.status), Some(503));
        assert!(!state.is_success());
    }

    #[test]
    fn test_invalidated_only_flips_stale() {
        let now = Utc::now();
        let fresh = QueryState::success(3, now);
        let stale = fresh.invalidated();

        assert!(stale.is_stale);
        assert_eq!(stale.data, fresh.data);
        assert_eq!(stale.last_updated, fresh.last_updated);
        assert!(stale.is_stale_at(now, Duration::from_secs(3600)));
    }

    #[test]
    fn test_serialize_camel_case() {
        let json = serde_json::to_value(QueryState::<i32>::idle()).unwrap();
        assert!(json.get("isLoading").is_some());
        assert!(json.get("lastUpdated").is_some());
    }
}
