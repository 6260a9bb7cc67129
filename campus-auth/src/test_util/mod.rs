pub mod mock_identity;
pub mod mock_profiles;

pub use mock_identity::MockIdentityProvider;
pub use mock_profiles::MockProfileStore;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use campus_auth_common::{ProviderUser, Session};
use chrono::Utc;

use crate::config::{
    AuthConfig, Config, ConnectionConfig, LoggingConfig, ProviderConfig, RetryConfig,
    SignupConfig, StorageConfig,
};
use crate::storage::{KeyValueStore, StoreError};

pub fn test_config(provider_url: &str) -> Config {
    Config {
        provider: ProviderConfig {
            url: provider_url.to_string(),
            anon_key: "test-anon-key".to_string(),
            request_timeout_secs: 5,
        },
        auth: AuthConfig {
            site_url: "https://campus.test".to_string(),
            ..AuthConfig::default()
        },
        retry: RetryConfig::default(),
        signup: SignupConfig::default(),
        connection: ConnectionConfig::default(),
        storage: StorageConfig::default(),
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
    }
}

/// A backing store whose every operation fails, like a durable store that
/// cannot be opened.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("simulated outage".to_string()))
    }
}

/// Store that appends `name:op:key` to a shared log and keeps nothing.
pub struct RecordingStore {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
    pub fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self { name, log }
    }

    fn record(&self, op: &str, key: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.name, op, key));
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.record("get", key);
        Ok(None)
    }

    async fn set(&self, key: &str, _value: &str) -> Result<(), StoreError> {
        self.record("set", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.record("remove", key);
        Ok(())
    }
}

pub fn test_provider_user(id: &str, email: &str, metadata: serde_json::Value) -> ProviderUser {
    ProviderUser {
        id: id.to_string(),
        email: Some(email.to_string()),
        user_metadata: metadata.as_object().cloned().unwrap_or_default(),
        created_at: Some(Utc::now()),
    }
}

/// Session for `user` expiring `expires_in_secs` from now.
pub fn test_session(user: ProviderUser, expires_in_secs: i64) -> Session {
    Session {
        access_token: format!("access-{}", user.id),
        refresh_token: format!("refresh-{}", user.id),
        token_type: "bearer".to_string(),
        expires_in: expires_in_secs,
        expires_at: Utc::now().timestamp() + expires_in_secs,
        user,
    }
}
