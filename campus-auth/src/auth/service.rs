//! The auth façade: login, signup, logout and password reset.

use std::sync::Arc;
use std::time::Duration;

use campus_auth_common::{LoginCredentials, ProfileRow, ProviderUser, Role, SignupCredentials, User};
use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;

use super::preferences::Preferences;
use crate::classify::{is_duplicate_registration, user_message};
use crate::config::{Config, SignupConfig};
use crate::error::{AuthError, ProviderError, Result};
use crate::health::{self, ConnectionCheck, ConnectionMonitor};
use crate::identity::{GoTrueClient, IdentityProvider, SignOutScope, SignUpRequest};
use crate::logging;
use crate::profiles::{PostgrestProfileStore, ProfileStore};
use crate::retry::{retry_transient, RetryPolicy};
use crate::storage::{KeyValueStore, LocalStore, MirroredStore, SessionStorage, SqliteStore};

/// Polling schedule while a provider-side trigger creates the profile row.
#[derive(Debug, Clone, Copy)]
struct SettlePolicy {
    attempts: u32,
    initial_delay: Duration,
}

impl From<&SignupConfig> for SettlePolicy {
    fn from(config: &SignupConfig) -> Self {
        Self {
            attempts: config.settle_attempts,
            initial_delay: Duration::from_millis(config.settle_initial_delay_ms),
        }
    }
}

/// Entry point for application code. Raw provider errors never leave it.
pub struct AuthService {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    session_storage: Arc<dyn SessionStorage>,
    preferences: Preferences,
    connection: Arc<ConnectionMonitor>,
    storage_key: String,
    reset_redirect_url: String,
    refresh_window: chrono::Duration,
    retry: RetryPolicy,
    settle: SettlePolicy,
}

impl AuthService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        session_storage: Arc<dyn SessionStorage>,
        preferences: Arc<dyn KeyValueStore>,
        config: &Config,
    ) -> Self {
        let connection = Arc::new(ConnectionMonitor::new(profiles.clone(), &config.connection));
        Self {
            identity,
            profiles,
            session_storage,
            preferences: Preferences::new(preferences),
            connection,
            storage_key: config.auth.storage_key.clone(),
            reset_redirect_url: config.auth.reset_redirect_url(),
            refresh_window: chrono::Duration::seconds(config.connection.refresh_window_secs),
            retry: RetryPolicy::from(&config.retry),
            settle: SettlePolicy::from(&config.signup),
        }
    }

    /// Wire up the HTTP adapters and the SQLite + local session storage.
    pub fn from_config(config: &Config) -> std::result::Result<Self, ProviderError> {
        let local: Arc<LocalStore> = match &config.storage.local_path {
            Some(path) => match LocalStore::open(path) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Local store unreadable, using memory");
                    Arc::new(LocalStore::in_memory())
                }
            },
            None => Arc::new(LocalStore::in_memory()),
        };
        let durable = Arc::new(SqliteStore::new(&config.storage.database_path));
        let session_storage = Arc::new(MirroredStore::new(durable, local.clone()));

        let identity = Arc::new(GoTrueClient::new(
            &config.provider,
            &config.auth.storage_key,
            session_storage.clone(),
        )?);
        let profiles = Arc::new(PostgrestProfileStore::new(
            &config.provider,
            &config.auth.storage_key,
            session_storage.clone(),
        )?);

        Ok(Self::new(identity, profiles, session_storage, local, config))
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<User> {
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return Err(AuthError::missing_fields(&missing));
        }

        let email = credentials.email.trim();

        // A stale token under the same key can collide with the new session.
        self.session_storage.remove_item(&self.storage_key).await;
        if let Err(e) = self.identity.sign_out(SignOutScope::Local).await {
            tracing::debug!(error = %e, "Pre-login sign out failed");
        }

        let session = retry_transient(self.retry, "sign_in", || {
            self.identity
                .sign_in_with_password(email, &credentials.password)
        })
        .await
        .map_err(|e| {
            tracing::error!(email, error = %e, "Sign in failed");
            AuthError::Provider(user_message(&e, "Failed to sign in"))
        })?;

        let user = self.reconcile_login_profile(&session.user, email).await?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(user)
    }

    async fn reconcile_login_profile(&self, auth_user: &ProviderUser, email: &str) -> Result<User> {
        let existing = self.profiles.find(&auth_user.id).await.map_err(|e| {
            tracing::error!(user_id = %auth_user.id, error = %e, "Profile lookup failed");
            AuthError::Profile(user_message(&e, "Failed to load user profile"))
        })?;

        let now = Utc::now();
        match existing {
            Some(row) => {
                if let Err(e) = self.profiles.touch_last_active(&row.id, now).await {
                    tracing::warn!(user_id = %row.id, error = %e, "Failed to update last active");
                }
                let mut user = User::from(row);
                user.last_active = now;
                Ok(user)
            }
            None => {
                let email = auth_user.email.as_deref().unwrap_or(email);
                let row = ProfileRow {
                    id: auth_user.id.clone(),
                    email: email.to_string(),
                    name: auth_user
                        .metadata_str("name")
                        .map(str::to_string)
                        .unwrap_or_else(|| email_local_part(email).to_string()),
                    role: auth_user.metadata_str("role").map(Role::parse).unwrap_or_default(),
                    created_at: now,
                    last_active: now,
                    phone: auth_user.metadata_str("phone").map(str::to_string),
                    student_id: auth_user.metadata_str("student_id").map(str::to_string),
                };

                let created = self.profiles.insert(&row).await.map_err(|e| {
                    tracing::error!(user_id = %row.id, error = %e, "Failed to create profile on login");
                    AuthError::Profile("Failed to create user profile".to_string())
                })?;
                tracing::info!(user_id = %created.id, "Created missing profile on login");
                Ok(User::from(created))
            }
        }
    }

    pub async fn signup(&self, credentials: &SignupCredentials) -> Result<User> {
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return Err(AuthError::missing_fields(&missing));
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("name".to_string(), json!(credentials.name.trim()));
        metadata.insert("phone".to_string(), json!(credentials.phone.trim()));
        metadata.insert("student_id".to_string(), json!(credentials.student_id.trim()));
        metadata.insert("role".to_string(), json!(Role::User.as_str()));

        let request = SignUpRequest {
            email: credentials.email.trim().to_string(),
            password: credentials.password.clone(),
            metadata,
        };

        let outcome = self.identity.sign_up(&request).await.map_err(|e| {
            tracing::error!(email = %request.email, error = %e, "Sign up failed");
            if is_duplicate_registration(&e) {
                AuthError::EmailAlreadyRegistered
            } else {
                AuthError::Provider(user_message(&e, "Failed to create account"))
            }
        })?;
        let user_id = outcome.user.id;

        let row = match self.await_profile(&user_id).await {
            Some(row) => row,
            None => self.create_signup_profile(&user_id, credentials).await?,
        };

        let mut user = User::from(row);
        user.phone = user.phone.or_else(|| Some(credentials.phone.trim().to_string()));
        user.student_id = user
            .student_id
            .or_else(|| Some(credentials.student_id.trim().to_string()));
        tracing::info!(user_id = %user.id, "User signed up");
        Ok(user)
    }

    /// Poll for the row a provider-side trigger may be creating.
    async fn await_profile(&self, user_id: &str) -> Option<ProfileRow> {
        let mut delay = self.settle.initial_delay;
        for attempt in 1..=self.settle.attempts {
            tokio::time::sleep(delay).await;
            match self.profiles.find(user_id).await {
                Ok(Some(row)) => return Some(row),
                Ok(None) => tracing::debug!(user_id, attempt, "Profile not created yet"),
                Err(e) => tracing::warn!(user_id, attempt, error = %e, "Profile lookup failed"),
            }
            delay *= 2;
        }
        None
    }

    async fn create_signup_profile(
        &self,
        user_id: &str,
        credentials: &SignupCredentials,
    ) -> Result<ProfileRow> {
        let now = Utc::now();
        let row = ProfileRow {
            id: user_id.to_string(),
            email: credentials.email.trim().to_string(),
            name: credentials.name.trim().to_string(),
            role: Role::User,
            created_at: now,
            last_active: now,
            phone: Some(credentials.phone.trim().to_string()),
            student_id: Some(credentials.student_id.trim().to_string()),
        };

        let err = match self.profiles.insert(&row).await {
            Ok(created) => return Ok(created),
            Err(e) => e,
        };

        // The trigger may have won the race after the last poll.
        if is_duplicate_registration(&err) {
            if let Ok(Some(existing)) = self.profiles.find(user_id).await {
                return Ok(existing);
            }
        }

        tracing::error!(user_id, error = %err, "Failed to create profile, rolling back sign up");
        if let Err(e) = self.identity.sign_out(SignOutScope::Global).await {
            tracing::warn!(user_id, error = %e, "Compensating sign out failed");
        }
        Err(AuthError::Profile("Failed to create user profile".to_string()))
    }

    /// Sign out this device only and forget the remembered email.
    pub async fn logout(&self) -> Result<()> {
        self.identity
            .sign_out(SignOutScope::Local)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Sign out failed");
                AuthError::SignOutFailed
            })?;

        self.preferences.clear().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to clear saved preferences");
            AuthError::SignOutFailed
        })?;

        tracing::info!("User logged out");
        Ok(())
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::missing_fields(&["email"]));
        }

        self.identity
            .reset_password_for_email(email, &self.reset_redirect_url)
            .await
            .map_err(|e| {
                tracing::error!(email, error = %e, "Password reset failed");
                AuthError::Provider(user_message(&e, "Failed to send reset email"))
            })
    }

    /// Profile of the signed-in user, if there is a session and a row.
    pub async fn current_user(&self) -> Result<Option<User>> {
        let session = self.identity.get_session().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read session");
            AuthError::Provider(user_message(&e, "Failed to load session"))
        })?;
        let Some(session) = session else {
            return Ok(None);
        };

        let row = self.profiles.find(&session.user.id).await.map_err(|e| {
            tracing::error!(user_id = %session.user.id, error = %e, "Profile lookup failed");
            AuthError::Profile(user_message(&e, "Failed to load user profile"))
        })?;
        Ok(row.map(User::from))
    }

    pub fn test_connection(&self) -> ConnectionCheck {
        self.connection.test_connection()
    }

    pub async fn check_and_refresh_auth(&self) -> bool {
        health::check_and_refresh_auth(self.identity.as_ref(), self.refresh_window).await
    }

    /// Log auth state changes in the background.
    pub fn watch_auth_events(&self) -> JoinHandle<()> {
        logging::spawn_auth_event_logger(self.identity.subscribe())
    }
}

fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}
