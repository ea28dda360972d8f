use serde::{Deserialize, Serialize};

/// Current user's profile. Server-owned; the client replaces it wholesale on
/// every fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub id: i64,
    pub subscription_status: String,
    pub subscription_started_on: Option<String>,
    pub subscription_expires_on: Option<String>,
    pub created_at: String,
    pub name: Option<String>,
    pub is_individual: bool,
    pub subscription_id: Option<String>,
    pub number_of_allowed_members: i64,
    pub is_expired: bool,
    pub active_refresh_token: Option<String>,
    pub active_device_ip: Option<String>,
    pub is_verified: bool,
    pub otp: Option<String>,
    pub user: i64,
    pub attached_management_account: Option<i64>,
}

impl UserProfile {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "User",
        }
    }
}

/// PATCH body for the profile endpoint. Absent fields are left untouched upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateUserProfileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
}

impl UpdateUserProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.subscription_status.is_none()
    }
}
