//! Persistent Key-Value Storage
//!
//! Backing store contract for object metadata and replay queues. Values are
//! JSON strings keyed by storage path; every value carries a tag so that all
//! entries of one model can be scanned without touching the others. Binary
//! payloads are stored out-of-band and addressed by the same path scheme.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::Result;

/// Tag grouping all object metadata entries
pub const OBJECT_TAG: &str = "objects";

/// Tag grouping all per-node replay queue entries
pub const NODE_REPLAY_TAG: &str = "node_replays";

const NODE_REPLAY_PREFIX: &str = "node_replays/";

/// Storage path for an object's metadata
pub fn object_metadata_path(object_type: &str, object_id: &str) -> String {
    format!("objects/{}/{}/metadata", object_type, object_id)
}

/// Storage path for an object's binary payload
pub fn object_data_path(object_type: &str, object_id: &str) -> String {
    format!("objects/{}/{}/data", object_type, object_id)
}

/// Storage path for a node's replay queue
pub fn node_replay_path(node_id: &str) -> String {
    format!("{}{}", NODE_REPLAY_PREFIX, node_id)
}

/// Recover the node id from a replay queue storage path
pub fn node_id_from_replay_path(path: &str) -> &str {
    path.strip_prefix(NODE_REPLAY_PREFIX).unwrap_or(path)
}

/// Abstract persistent key-value store
///
/// Implementations must make each operation atomic with respect to a single
/// key; cross-key transactions are not part of the contract.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored at `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` at `key` under `tag`, replacing any previous value
    async fn set(&self, key: &str, value: &str, tag: &str) -> Result<()>;

    /// Remove the value at `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remove the binary payload addressed by `key`. Removing an absent
    /// payload is not an error; a failed removal must surface.
    async fn delete_binary(&self, key: &str) -> Result<()>;

    /// Check whether a binary payload exists at `key`
    async fn has_binary(&self, key: &str) -> Result<bool>;

    /// Visit every `(key, value)` pair stored under `tag`
    async fn for_each_with_tag(
        &self,
        tag: &str,
        visit: &mut (dyn for<'a> FnMut(&'a str, &'a str) + Send),
    ) -> Result<()>;
}
