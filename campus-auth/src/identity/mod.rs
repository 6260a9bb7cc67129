//! Identity provider abstraction.
//!
//! The provider owns authentication, tokens and cryptography; this crate only
//! consumes the capability below. [`GoTrueClient`] is the HTTP implementation.

mod gotrue;

pub use gotrue::GoTrueClient;

use async_trait::async_trait;
use campus_auth_common::{AuthEvent, ProviderUser, Session};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::ProviderError;

/// Which sessions a sign-out revokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignOutScope {
    /// Only this client's session.
    Local,
    /// Every session of the user.
    Global,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Local => "local",
            SignOutScope::Global => "global",
        }
    }
}

/// Signup payload; `metadata` becomes the provider-side user metadata.
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Result of a signup. `session` is absent when the provider requires email
/// confirmation first.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: ProviderUser,
    pub session: Option<Session>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError>;

    async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, ProviderError>;

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), ProviderError>;

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError>;

    /// Currently persisted session, if any.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    async fn refresh_session(&self) -> Result<Session, ProviderError>;

    /// Auth state change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
