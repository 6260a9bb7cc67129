//! Durable key-value store on SQLite.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::{KeyValueStore, StoreError};

/// Single-table SQLite store. The connection is opened on first use and the
/// `keyval` table is created then if absent.
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `f` on the blocking pool against the (lazily opened) connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            if guard.is_none() {
                *guard = Some(open_database(&path)?);
            }
            let Some(conn) = guard.as_ref() else {
                return Err(StoreError::Unavailable("connection not open".to_string()));
            };
            f(conn).map_err(|e| StoreError::Transaction(e.to_string()))
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}

fn open_database(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    }

    let conn = Connection::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS keyval (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )
    .map_err(|e| StoreError::Unavailable(e.to_string()))?;

    tracing::debug!("Opened session database at {}", path.display());
    Ok(conn)
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT value FROM keyval WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO keyval (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .map(|_| ())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM keyval WHERE key = ?1", params![key])
                .map(|_| ())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_creates_database_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("session.db");
        let store = SqliteStore::new(&path);
        assert!(!path.exists());

        assert_eq!(store.get("missing").await.unwrap(), None);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("session.db"));

        store.set("token", "one").await.unwrap();
        store.set("token", "two").await.unwrap();
        assert_eq!(store.get("token").await.unwrap().as_deref(), Some("two"));

        store.remove("token").await.unwrap();
        assert_eq!(store.get("token").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.db");

        SqliteStore::new(&path).set("token", "abc").await.unwrap();
        let reopened = SqliteStore::new(&path);
        assert_eq!(reopened.get("token").await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_unopenable_path_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let store = SqliteStore::new(blocker.join("session.db"));
        assert!(matches!(
            store.set("k", "v").await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
