//! Simple synchronous key-value store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use super::{KeyValueStore, StoreError};

/// In-memory map, optionally mirrored to a JSON file on every mutation.
///
/// Also holds the user preferences (`rememberMe`, `savedEmail`).
pub struct LocalStore {
    entries: Mutex<HashMap<String, String>>,
    path: Option<PathBuf>,
    /// Serializes async file writes so the last snapshot written is the newest.
    write_lock: AsyncMutex<()>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            path: None,
            write_lock: AsyncMutex::new(()),
        }
    }

    /// Open a file-backed store, loading existing entries. A missing file
    /// starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => HashMap::new(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StoreError::Io(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
            write_lock: AsyncMutex::new(()),
        })
    }

    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn set_sync(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.lock();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    pub fn remove_sync(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_file(path, &snapshot(entries)?)
    }

    /// Write the current entries to disk on the blocking pool.
    async fn flush_async(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        let json = {
            let entries = self.lock();
            snapshot(&entries)?
        };
        tokio::task::spawn_blocking(move || write_file(&path, &json))
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
    }
}

fn snapshot(entries: &HashMap<String, String>) -> Result<String, StoreError> {
    serde_json::to_string(entries).map_err(|e| StoreError::Io(e.to_string()))
}

fn write_file(path: &Path, json: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
    }
    std::fs::write(path, json).map_err(|e| StoreError::Io(e.to_string()))
}

#[async_trait]
impl KeyValueStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_sync(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock().insert(key.to_string(), value.to_string());
        self.flush_async().await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let removed = self.lock().remove(key).is_some();
        if removed {
            self.flush_async().await?;
        }
        Ok(())
    }
}
