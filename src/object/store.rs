//! Object Store
//!
//! Keyed persistence for object metadata and payload bookkeeping, layered
//! on the abstract key-value store. Every operation is an atomic
//! read-modify-write against a single object key.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::{self, KeyValueStore, OBJECT_TAG};

use super::{Object, ObjectFilter, ObjectPatch};

/// Persistent object store
#[derive(Clone)]
pub struct ObjectStore {
    store: Arc<dyn KeyValueStore>,
}

impl ObjectStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn fetch(&self, object_type: &str, object_id: &str) -> Result<Option<Object>> {
        let path = storage::object_metadata_path(object_type, object_id);
        match self.store.get(&path).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn persist(&self, object: &Object) -> Result<()> {
        let path = storage::object_metadata_path(&object.object_type, &object.id);
        let raw = serde_json::to_string(object)?;
        self.store.set(&path, &raw, OBJECT_TAG).await
    }

    /// Fetch an object; absent objects are an error
    pub async fn get(&self, object_type: &str, object_id: &str) -> Result<Object> {
        self.fetch(object_type, object_id)
            .await?
            .ok_or_else(|| Error::ObjectNotFound {
                object_type: object_type.to_string(),
                object_id: object_id.to_string(),
            })
    }

    /// Persist a new object; an existing `(object_type, id)` is a conflict.
    /// The stored copy starts without a payload regardless of the input.
    pub async fn save(&self, object: &Object) -> Result<Object> {
        if self.fetch(&object.object_type, &object.id).await?.is_some() {
            return Err(Error::Conflict {
                object_type: object.object_type.clone(),
                object_id: object.id.clone(),
            });
        }

        let mut stored = object.clone();
        stored.has_data = false;
        self.persist(&stored).await?;
        Ok(stored)
    }

    /// Merge a patch into a stored object and persist the result
    pub async fn update(
        &self,
        object_type: &str,
        object_id: &str,
        patch: &ObjectPatch,
    ) -> Result<Object> {
        let current = self.get(object_type, object_id).await?;
        let updated = current.apply_patch(patch);
        self.persist(&updated).await?;
        Ok(updated)
    }

    /// Remove an object's metadata and payload. The payload is removed
    /// first so a failed payload removal never leaves the metadata gone
    /// while the payload lingers.
    pub async fn delete(&self, object_type: &str, object_id: &str) -> Result<()> {
        // Existence check keeps the NotFound contract
        self.get(object_type, object_id).await?;

        let data_path = storage::object_data_path(object_type, object_id);
        self.store.delete_binary(&data_path).await?;

        let metadata_path = storage::object_metadata_path(object_type, object_id);
        self.store.delete(&metadata_path).await
    }

    /// List all stored objects, optionally filtered
    pub async fn list_all(&self, filter: Option<&ObjectFilter>) -> Result<Vec<Object>> {
        let mut objects = Vec::new();

        self.store
            .for_each_with_tag(OBJECT_TAG, &mut |key, value| {
                match serde_json::from_str::<Object>(value) {
                    Ok(object) => objects.push(object),
                    Err(e) => {
                        tracing::warn!("Skipping undecodable object at {}: {}", key, e);
                    }
                }
            })
            .await?;

        if let Some(filter) = filter {
            objects.retain(|object| filter.matches(object));
        }

        Ok(objects)
    }
}
