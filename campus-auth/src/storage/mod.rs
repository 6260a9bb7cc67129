//! Session token persistence.
//!
//! Two key-value strategies sit behind [`KeyValueStore`]: a durable SQLite
//! store and a simple synchronous map. [`MirroredStore`] combines them into
//! the infallible [`SessionStorage`] the identity client persists through.

mod local;
mod mirrored;
mod sqlite;

pub use local::LocalStore;
pub use mirrored::MirroredStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Transaction failed: {0}")]
    Transaction(String),
    #[error("IO error: {0}")]
    Io(String),
}

/// A fallible async key-value backing.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Storage handed to the identity client. Never fails: backing errors are
/// absorbed and reads degrade to `None`.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Option<String>;

    async fn set_item(&self, key: &str, value: &str);

    async fn remove_item(&self, key: &str);
}
