//! External Collaborator Contracts
//!
//! Seams to everything the engine does not own: the remote peer RPC
//! surface, node identity, and the out-of-band payload transfer. The engine
//! decides *when* to call these; *how* they reach the wire is up to the
//! implementation.

pub mod http;

pub use http::HttpPeerClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Result;
use crate::object::Object;

/// Failure reported by a remote peer call
///
/// The status code drives transient/terminal classification: 5xx and 429
/// are retried through node backoff, everything else drops the request.
#[derive(Error, Debug, Clone)]
#[error("Remote request failed (status {status_code:?}): {message}")]
pub struct RemoteError {
    /// HTTP-like status code, when the peer responded at all
    pub status_code: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn with_status(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    /// Transport-level failure with no peer response
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self {
            status_code: None,
            message: message.into(),
        }
    }

    /// Whether the failure warrants a retry (5xx or 429). An unreachable
    /// peer counts as transient as well.
    pub fn is_transient(&self) -> bool {
        match self.status_code {
            Some(status) => status / 100 == 5 || status == 429,
            None => true,
        }
    }
}

/// Result alias for remote peer calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Abstract RPC capability toward a peer node
#[async_trait]
pub trait RemotePeerClient: Send + Sync {
    /// Announce a newly created object to a destination
    async fn create_object_in_cluster(&self, node_id: &str, object: &Object) -> RemoteResult<()>;

    /// Push origin-authored metadata to a destination
    async fn update_object_metadata_in_cluster(
        &self,
        node_id: &str,
        object: &Object,
    ) -> RemoteResult<()>;

    /// Signal a destination that new payload data is available
    async fn update_object_data_in_cluster(
        &self,
        node_id: &str,
        object: &Object,
    ) -> RemoteResult<()>;

    /// Instruct a destination to remove its copy
    async fn delete_object_in_cluster(&self, node_id: &str, object: &Object) -> RemoteResult<()>;

    /// Escalate an unacknowledged data delivery back to the origin
    async fn mark_receival_failed(
        &self,
        from_node_id: &str,
        to_node_id: &str,
        object: &Object,
    ) -> RemoteResult<()>;
}

/// Provides the identity of the local node
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_node_id(&self) -> Result<String>;
}

/// Fixed node identity
pub struct StaticIdentity {
    node_id: String,
}

impl StaticIdentity {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_node_id(&self) -> Result<String> {
        Ok(self.node_id.clone())
    }
}

/// Starts the out-of-band payload transfer from an origin node
#[async_trait]
pub trait DataSyncInitiator: Send + Sync {
    /// Pull the object's payload from its origin. Resolving the origin
    /// node to a reachable location is the implementation's concern.
    async fn pull(&self, object: &Object, origin_node_id: &str) -> RemoteResult<()>;
}

/// Resolves a node id to a reachable base URL (cluster discovery seam)
#[async_trait]
pub trait NodeResolver: Send + Sync {
    async fn resolve(&self, node_id: &str) -> RemoteResult<String>;
}

#[cfg(test)]
pub(crate) mod mock;
