//! Primary store with a write-behind mirror and read fallback.

use std::sync::Arc;

use async_trait::async_trait;

use super::{KeyValueStore, SessionStorage};

/// Combines a durable primary with a simple fallback store.
///
/// Writes hit the primary first and the mirror only once the primary call has
/// finished, so the mirror is never ahead of the primary. Reads prefer the
/// primary and fall back on error or a missing key.
pub struct MirroredStore {
    primary: Arc<dyn KeyValueStore>,
    fallback: Arc<dyn KeyValueStore>,
}

impl MirroredStore {
    pub fn new(primary: Arc<dyn KeyValueStore>, fallback: Arc<dyn KeyValueStore>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl SessionStorage for MirroredStore {
    async fn get_item(&self, key: &str) -> Option<String> {
        match self.primary.get(key).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(store = self.primary.name(), key, error = %e, "Primary read failed, using fallback");
            }
        }

        match self.fallback.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(store = self.fallback.name(), key, error = %e, "Fallback read failed");
                None
            }
        }
    }

    async fn set_item(&self, key: &str, value: &str) {
        if let Err(e) = self.primary.set(key, value).await {
            tracing::debug!(store = self.primary.name(), key, error = %e, "Primary write failed, writing fallback only");
        }
        if let Err(e) = self.fallback.set(key, value).await {
            tracing::warn!(store = self.fallback.name(), key, error = %e, "Fallback write failed");
        }
    }

    async fn remove_item(&self, key: &str) {
        if let Err(e) = self.primary.remove(key).await {
            tracing::debug!(store = self.primary.name(), key, error = %e, "Primary delete failed, deleting fallback only");
        }
        if let Err(e) = self.fallback.remove(key).await {
            tracing::warn!(store = self.fallback.name(), key, error = %e, "Fallback delete failed");
        }
    }
}
