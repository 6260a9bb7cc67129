//! Profile rows in the relational `users` table.

mod postgrest;

pub use postgrest::PostgrestProfileStore;

use async_trait::async_trait;
use campus_auth_common::ProfileRow;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Row for `user_id`; `Ok(None)` when the table has no such row.
    async fn find(&self, user_id: &str) -> Result<Option<ProfileRow>, ProviderError>;

    /// Insert a row and return it as stored.
    async fn insert(&self, row: &ProfileRow) -> Result<ProfileRow, ProviderError>;

    async fn touch_last_active(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ProviderError>;

    /// Lightweight round trip used for connectivity checks.
    async fn probe(&self) -> Result<(), ProviderError>;
}
