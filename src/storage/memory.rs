//! In-Memory Store
//!
//! Non-durable store for embedding and tests. Same contract as the SQLite
//! backend, minus persistence across restarts.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::Result;

#[derive(Default)]
struct Inner {
    /// key -> (value, tag)
    entries: HashMap<String, (String, String)>,
    /// keys with a binary payload present
    binaries: HashSet<String>,
}

/// In-memory key-value store
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a binary payload as present (test hook for the payload
    /// transfer that happens out-of-band in production)
    pub async fn put_binary(&self, key: &str) {
        self.inner.write().await.binaries.insert(key.to_string());
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, tag: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .entries
            .insert(key.to_string(), (value.to_string(), tag.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.entries.remove(key);
        Ok(())
    }

    async fn delete_binary(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.binaries.remove(key);
        Ok(())
    }

    async fn has_binary(&self, key: &str) -> Result<bool> {
        Ok(self.inner.read().await.binaries.contains(key))
    }

    async fn for_each_with_tag(
        &self,
        tag: &str,
        visit: &mut (dyn for<'a> FnMut(&'a str, &'a str) + Send),
    ) -> Result<()> {
        let inner = self.inner.read().await;
        for (key, (value, entry_tag)) in inner.entries.iter() {
            if entry_tag == tag {
                visit(key, value);
            }
        }
        Ok(())
    }
}
