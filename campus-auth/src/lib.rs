//! Client-side authentication for a hosted backend.
//!
//! [`AuthService`] wraps the identity provider with validation, bounded retry,
//! profile reconciliation and error normalization. Session tokens persist
//! through a [`MirroredStore`] (SQLite first, simple store as mirror).

pub mod auth;
pub mod classify;
pub mod config;
pub mod error;
pub mod health;
pub mod identity;
pub mod logging;
pub mod profiles;
pub mod retry;
pub mod storage;
pub mod test_util;

pub use auth::{AuthService, Preferences};
pub use classify::{classify, user_message, ErrorKind};
pub use config::Config;
pub use ::config::ConfigError;
pub use error::{AuthError, ProviderError};
pub use health::{check_and_refresh_auth, ConnectionCheck, ConnectionMonitor};
pub use identity::{GoTrueClient, IdentityProvider, SignOutScope, SignUpOutcome, SignUpRequest};
pub use profiles::{PostgrestProfileStore, ProfileStore};
pub use retry::{retry_transient, RetryPolicy};
pub use storage::{KeyValueStore, LocalStore, MirroredStore, SessionStorage, SqliteStore, StoreError};

pub use campus_auth_common::{
    AuthEvent, LoginCredentials, ProfileRow, ProviderUser, Role, Session, SignupCredentials, User,
};
