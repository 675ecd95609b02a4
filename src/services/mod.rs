//! Services built on the query cache

pub mod profile;

pub use profile::{profile_key, AuthProvider, ProfileApi, ProfileError, ProfileService};
