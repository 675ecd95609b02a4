//! Profile models
//!
//! Wire shapes of the user profile API (camelCase JSON).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Postal address attached to a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub line1: Option<String>,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A user profile as returned by the profile API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub address: Address,
}

/// Address part of an update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAddressRequest {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// Body of a profile update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
    pub address: UpdateAddressRequest,
}

impl UserProfile {
    /// The profile as it will look once `update` is accepted.
    ///
    /// Used for optimistic writes; the server response replaces it.
    pub fn with_update(&self, update: &UpdateProfileRequest, now: DateTime<Utc>) -> Self {
        Self {
            first_name: update.first_name.clone(),
            last_name: update.last_name.clone(),
            phone_number: update.phone_number.clone(),
            date_of_birth: update.date_of_birth,
            updated_at: now,
            address: Address {
                line1: Some(update.address.street.clone()),
                city: update.address.city.clone(),
                state: update.address.state.clone(),
                postal_code: update.address.zip_code.clone(),
                country: update.address.country.clone(),
                updated_at: Some(now),
                ..self.address.clone()
            },
            ..self.clone()
        }
    }
}
