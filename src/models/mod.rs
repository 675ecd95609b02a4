//! Data models used by the bundled services

pub mod profile;

// Re-export commonly used types
pub use profile::{Address, UpdateAddressRequest, UpdateProfileRequest, UserProfile};
