//! Identity provider session types and auth state notifications.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The user object as the identity provider returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form metadata attached at signup (name, phone, student id, role).
    #[serde(default)]
    pub user_metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ProviderUser {
    /// Non-empty string metadata value for `key`.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// A persisted provider session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Expiry as unix seconds.
    pub expires_at: i64,
    pub user: ProviderUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// True when the session expires before `now + window`.
    pub fn expires_within(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at < (now + window).timestamp()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

/// Auth state change emitted by the identity client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum AuthEvent {
    SignedIn { user_id: String },
    SignedOut,
    TokenRefreshed { user_id: String },
}

impl std::fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthEvent::SignedIn { .. } => write!(f, "SIGNED_IN"),
            AuthEvent::SignedOut => write!(f, "SIGNED_OUT"),
            AuthEvent::TokenRefreshed { .. } => write!(f, "TOKEN_REFRESHED"),
        }
    }
}
