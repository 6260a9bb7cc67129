use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use campus_auth_common::ProfileRow;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::profiles::ProfileStore;

/// In-memory `users` table with injectable failures.
#[derive(Default)]
pub struct MockProfileStore {
    rows: Mutex<HashMap<String, ProfileRow>>,
    /// Row a server-side trigger "creates" once `find` has run this many times.
    trigger: Mutex<Option<(u32, ProfileRow)>>,
    find_error: Mutex<Option<ProviderError>>,
    insert_error: Mutex<Option<ProviderError>>,
    touch_error: Mutex<Option<ProviderError>>,
    probe_results: Mutex<VecDeque<Result<(), ProviderError>>>,
    pub find_calls: AtomicU32,
    pub insert_calls: AtomicU32,
    pub touch_calls: AtomicU32,
    pub probe_calls: AtomicU32,
}

impl MockProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, row: ProfileRow) {
        self.rows.lock().unwrap().insert(row.id.clone(), row);
    }

    pub fn row(&self, id: &str) -> Option<ProfileRow> {
        self.rows.lock().unwrap().get(id).cloned()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn create_on_find(&self, after_finds: u32, row: ProfileRow) {
        *self.trigger.lock().unwrap() = Some((after_finds, row));
    }

    pub fn fail_find(&self, err: ProviderError) {
        *self.find_error.lock().unwrap() = Some(err);
    }

    pub fn fail_insert(&self, err: ProviderError) {
        *self.insert_error.lock().unwrap() = Some(err);
    }

    pub fn fail_touch(&self, err: ProviderError) {
        *self.touch_error.lock().unwrap() = Some(err);
    }

    /// Queue probe outcomes; an empty queue means the probe succeeds.
    pub fn push_probe(&self, result: Result<(), ProviderError>) {
        self.probe_results.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn find(&self, user_id: &str) -> Result<Option<ProfileRow>, ProviderError> {
        let calls = self.find_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(err) = self.find_error.lock().unwrap().clone() {
            return Err(err);
        }

        let fired = {
            let mut trigger = self.trigger.lock().unwrap();
            match trigger.as_ref() {
                Some((after, _)) if calls >= *after => trigger.take().map(|(_, row)| row),
                _ => None,
            }
        };
        if let Some(row) = fired {
            self.put(row);
        }

        Ok(self.row(user_id))
    }

    async fn insert(&self, row: &ProfileRow) -> Result<ProfileRow, ProviderError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.insert_error.lock().unwrap().clone() {
            return Err(err);
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&row.id) {
            return Err(ProviderError::new(
                "duplicate key value violates unique constraint \"users_pkey\"",
            )
            .with_status(409)
            .with_code("23505"));
        }
        rows.insert(row.id.clone(), row.clone());
        Ok(row.clone())
    }

    async fn touch_last_active(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), ProviderError> {
        self.touch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.touch_error.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(row) = self.rows.lock().unwrap().get_mut(user_id) {
            row.last_active = at;
        }
        Ok(())
    }

    async fn probe(&self) -> Result<(), ProviderError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.probe_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}
