//! "Remember me" preferences kept in the simple store.

use std::sync::Arc;

use crate::storage::{KeyValueStore, StoreError};

pub const REMEMBER_ME_KEY: &str = "rememberMe";
pub const SAVED_EMAIL_KEY: &str = "savedEmail";

pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn remember(&self, email: &str) -> Result<(), StoreError> {
        self.store.set(REMEMBER_ME_KEY, "true").await?;
        self.store.set(SAVED_EMAIL_KEY, email.trim()).await
    }

    /// Saved email, only while "remember me" is on.
    pub async fn saved_email(&self) -> Option<String> {
        match self.store.get(REMEMBER_ME_KEY).await {
            Ok(Some(flag)) if flag == "true" => {}
            _ => return None,
        }
        self.store.get(SAVED_EMAIL_KEY).await.ok().flatten()
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(REMEMBER_ME_KEY).await?;
        self.store.remove(SAVED_EMAIL_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;

    #[tokio::test]
    async fn test_remember_and_clear() {
        let store = Arc::new(LocalStore::in_memory());
        let prefs = Preferences::new(store.clone());

        prefs.remember(" ana@uni.edu ").await.unwrap();
        assert_eq!(prefs.saved_email().await.as_deref(), Some("ana@uni.edu"));

        prefs.clear().await.unwrap();
        assert_eq!(prefs.saved_email().await, None);
        assert_eq!(store.get_sync(REMEMBER_ME_KEY), None);
    }

    #[tokio::test]
    async fn test_saved_email_requires_flag() {
        let store = Arc::new(LocalStore::in_memory());
        store.set_sync(SAVED_EMAIL_KEY, "ana@uni.edu").unwrap();

        assert_eq!(Preferences::new(store).saved_email().await, None);
    }
}
