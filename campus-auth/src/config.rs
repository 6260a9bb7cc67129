//! Configuration for the auth client.

use std::time::Duration;

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub signup: SignupConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Hosted backend endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Project base URL, e.g. `https://xyz.example.co`.
    pub url: String,
    /// Public (anon) API key sent as the `apikey` header.
    pub anon_key: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Key under which the identity client persists its session.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default = "default_site_url")]
    pub site_url: String,
    /// Route that handles password recovery links.
    #[serde(default = "default_reset_redirect_path")]
    pub reset_redirect_path: String,
}

impl AuthConfig {
    /// Absolute redirect URL placed in password reset emails.
    pub fn reset_redirect_url(&self) -> String {
        format!(
            "{}/{}",
            self.site_url.trim_end_matches('/'),
            self.reset_redirect_path.trim_start_matches('/')
        )
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            site_url: default_site_url(),
            reset_redirect_path: default_reset_redirect_path(),
        }
    }
}

/// Bounded retry for transient sign-in failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after attempt `n` is `n * base_delay_ms`.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// How long signup waits for the provider-side trigger to create the profile row.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupConfig {
    #[serde(default = "default_settle_attempts")]
    pub settle_attempts: u32,
    /// First poll delay; doubles on every further poll.
    #[serde(default = "default_settle_initial_delay_ms")]
    pub settle_initial_delay_ms: u64,
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            settle_attempts: default_settle_attempts(),
            settle_initial_delay_ms: default_settle_initial_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// How long a finished connection probe stays memoized.
    #[serde(default = "default_memo_ttl_ms")]
    pub memo_ttl_ms: u64,
    /// Sessions expiring within this window are refreshed proactively.
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: i64,
}

impl ConnectionConfig {
    pub fn memo_ttl(&self) -> Duration {
        Duration::from_millis(self.memo_ttl_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            memo_ttl_ms: default_memo_ttl_ms(),
            refresh_window_secs: default_refresh_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite file backing the durable session store.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// JSON file for the simple store. In-memory when unset.
    #[serde(default)]
    pub local_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            local_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_request_timeout() -> u64 {
    30
}
fn default_storage_key() -> String {
    "campus-auth-token".to_string()
}
fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_reset_redirect_path() -> String {
    "/reset-password".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_settle_attempts() -> u32 {
    3
}
fn default_settle_initial_delay_ms() -> u64 {
    250
}
fn default_memo_ttl_ms() -> u64 {
    2000
}
fn default_refresh_window_secs() -> i64 {
    300
}
fn default_database_path() -> String {
    "data/session.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (CAMPUS_AUTH__SECTION__KEY format)
    /// 2. campus-auth.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("campus-auth")
    }

    /// Same as [`Config::load`] with an explicit config file stem.
    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .set_default("provider.request_timeout_secs", default_request_timeout() as i64)?
            .set_default("auth.storage_key", default_storage_key())?
            .set_default("retry.max_attempts", default_max_attempts() as i64)?
            .set_default("retry.base_delay_ms", default_base_delay_ms() as i64)?
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix("CAMPUS_AUTH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
