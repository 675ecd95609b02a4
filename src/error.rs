//! Error types for the query cache
//!
//! Two families of failure exist. [`CacheError`] is caller misuse and is
//! returned before any fetch or mutation starts. [`QueryError`] is a failed
//! fetch or mutation; it never escapes as a panic and is carried inside the
//! published state snapshots instead.

use serde::Serialize;
use thiserror::Error;

// == Cache Error Enum ==
/// Misuse of the cache API, reported before any network call is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Query name is empty or too long
    #[error("Invalid query key: {0}")]
    InvalidKey(String),

    /// Query options failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An entry exists under the key but holds a different data type
    #[error("Type mismatch for cache key: {0}")]
    TypeMismatch(String),

    /// A fetch was needed but no Tokio runtime is running
    #[error("No Tokio runtime available to run the fetch")]
    NoRuntime,

    /// No authenticated identity is available for the operation
    #[error("User not authenticated")]
    Unauthenticated,

    /// An update was requested before any profile was loaded
    #[error("No profile data available")]
    NoProfile,
}

// == Query Error ==
/// Failure reported by a fetcher or a mutation operation.
///
/// Opaque to the cache: it carries a human-readable message and, when the
/// failure came from a transport, its status code.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct QueryError {
    /// Human-readable description
    pub message: String,
    /// Transport status code, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl QueryError {
    /// Creates an error with a message and no status.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Creates an error carrying a transport status code.
    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }
}

impl From<CacheError> for QueryError {
    fn from(err: CacheError) -> Self {
        Self::new(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::with_status("Service unavailable", 503);
        assert_eq!(err.to_string(), "Service unavailable");
        assert_eq!(err.status, Some(503));
    }

    #[test]
    fn test_query_error_serialize_skips_missing_status() {
        let json = serde_json::to_string(&QueryError::new("boom")).unwrap();
        assert_eq!(json, r#"{"message":"boom"}"#);
    }

    #[test]
    fn test_cache_error_into_query_error() {
        let err: QueryError = CacheError::Unauthenticated.into();
        assert_eq!(err.message, "User not authenticated");
        assert!(err.status.is_none());
    }
}
