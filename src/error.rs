//! Objectmesh Error Types

use thiserror::Error;

/// Result type alias for objectmesh operations
pub type Result<T> = std::result::Result<T, Error>;

/// Objectmesh error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Object store errors
    #[error("Object not found: {object_type}/{object_id}")]
    ObjectNotFound {
        object_type: String,
        object_id: String,
    },

    #[error("Object already exists: {object_type}/{object_id}")]
    Conflict {
        object_type: String,
        object_id: String,
    },

    #[error("Object is retiring: {object_type}/{object_id}")]
    ObjectRetiring {
        object_type: String,
        object_id: String,
    },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Replay queue errors
    #[error("Deletion already queued for {object_type}/{object_id} on node {node_id}")]
    DeletionPending {
        node_id: String,
        object_type: String,
        object_id: String,
    },

    // Remote peer errors
    #[error(transparent)]
    Remote(#[from] crate::remote::RemoteError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is a transient remote failure (retry-driven)
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Remote(remote) if remote.is_transient())
    }

    /// Check if this error should be surfaced synchronously to the caller
    /// rather than handled by the replay machinery
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::Conflict { .. }
                | Error::DeletionPending { .. }
                | Error::NodeNotFound(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(format!("SQLite error: {}", e))
    }
}
