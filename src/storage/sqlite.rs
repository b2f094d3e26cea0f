//! SQLite-Backed Store
//!
//! Durable key-value store backed by an embedded SQLite database, with
//! binary payloads kept as flat files in the data directory.

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Persistent store backed by SQLite
pub struct SqliteStore {
    /// Database connection; rusqlite connections are not Sync, so access
    /// is serialized
    conn: Mutex<Connection>,
    /// Directory for binary payload files
    blob_dir: PathBuf,
}

impl SqliteStore {
    /// Create or open the store under `data_dir`
    pub fn open(data_dir: PathBuf, db_file: &str) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;

        let blob_dir = data_dir.join("blobs");
        std::fs::create_dir_all(&blob_dir)?;

        let db_path = data_dir.join(db_file);
        let conn = Connection::open(&db_path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                tag TEXT NOT NULL,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_kv_tag ON kv(tag);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            blob_dir,
        })
    }

    /// File path for the binary payload addressed by `key`
    fn blob_path(&self, key: &str) -> PathBuf {
        // Keys contain '/' separators; flatten them for the filesystem
        self.blob_dir.join(key.replace('/', "_"))
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let result: std::result::Result<String, _> = conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Storage(format!("Failed to get {}: {}", key, e))),
        }
    }

    async fn set(&self, key: &str, value: &str, tag: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO kv (key, value, tag) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = ?2,
                tag = ?3,
                updated_at = CURRENT_TIMESTAMP
            "#,
            params![key, value, tag],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    async fn delete_binary(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to remove payload {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn has_binary(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.blob_path(key)).await?)
    }

    async fn for_each_with_tag(
        &self,
        tag: &str,
        visit: &mut (dyn for<'a> FnMut(&'a str, &'a str) + Send),
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT key, value FROM kv WHERE tag = ?1")?;
        let rows = stmt.query_map(params![tag], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for result in rows {
            let (key, value) = result?;
            visit(&key, &value);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_set_get_delete() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().to_path_buf(), "test.db").unwrap();

        assert!(store.get("a/b").await.unwrap().is_none());

        store.set("a/b", "{\"x\":1}", "objects").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap().unwrap(), "{\"x\":1}");

        store.set("a/b", "{\"x\":2}", "objects").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap().unwrap(), "{\"x\":2}");

        store.delete("a/b").await.unwrap();
        assert!(store.get("a/b").await.unwrap().is_none());

        // Deleting an absent key is fine
        store.delete("a/b").await.unwrap();
    }

    #[tokio::test]
    async fn test_tag_scan() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().to_path_buf(), "test.db").unwrap();

        store.set("objects/doc/1", "one", "objects").await.unwrap();
        store.set("objects/doc/2", "two", "objects").await.unwrap();
        store
            .set("node_replays/b", "queue", "node_replays")
            .await
            .unwrap();

        let mut seen = Vec::new();
        store
            .for_each_with_tag("objects", &mut |key, value| {
                seen.push((key.to_string(), value.to_string()));
            })
            .await
            .unwrap();

        seen.sort();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "objects/doc/1");
        assert_eq!(seen[1].1, "two");
    }

    #[tokio::test]
    async fn test_binary_lifecycle() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(dir.path().to_path_buf(), "test.db").unwrap();

        assert!(!store.has_binary("objects/doc/1/data").await.unwrap());
        // Removing an absent payload is not an error
        store.delete_binary("objects/doc/1/data").await.unwrap();

        let blob = store.blob_path("objects/doc/1/data");
        tokio::fs::write(&blob, b"payload").await.unwrap();
        assert!(store.has_binary("objects/doc/1/data").await.unwrap());

        store.delete_binary("objects/doc/1/data").await.unwrap();
        assert!(!store.has_binary("objects/doc/1/data").await.unwrap());
    }
}
