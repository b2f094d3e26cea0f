//! Per-Node Replay State
//!
//! Types for the durable propagation queue kept per destination node:
//! pending requests with their fixed priority order, and the node-wide
//! retry/backoff state.

pub mod dispatcher;
pub mod queue;

pub use dispatcher::ReplayDispatcher;
pub use queue::ReplayQueue;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::object::ObjectKey;

/// Kind of propagation request queued toward a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestType {
    CreateObject,
    UpdateObjectMetadata,
    UpdateObjectData,
    DeleteObject,
    ReceivalFailed,
}

impl RequestType {
    /// Fixed execution priority: creation first, failure escalation last
    pub fn priority(&self) -> u8 {
        match self {
            RequestType::CreateObject => 0,
            RequestType::UpdateObjectMetadata => 1,
            RequestType::UpdateObjectData => 2,
            RequestType::DeleteObject => 3,
            RequestType::ReceivalFailed => 4,
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestType::CreateObject => write!(f, "CREATE_OBJECT"),
            RequestType::UpdateObjectMetadata => write!(f, "UPDATE_OBJECT_METADATA"),
            RequestType::UpdateObjectData => write!(f, "UPDATE_OBJECT_DATA"),
            RequestType::DeleteObject => write!(f, "DELETE_OBJECT"),
            RequestType::ReceivalFailed => write!(f, "RECEIVAL_FAILED"),
        }
    }
}

/// One queued propagation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub request_type: RequestType,
    pub object_id: String,
    pub object_type: String,
    /// Earliest time the request may be sent; absent means immediately
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_after: Option<DateTime<Utc>>,
}

impl PendingRequest {
    pub fn object_key(&self) -> ObjectKey {
        ObjectKey {
            object_type: self.object_type.clone(),
            object_id: self.object_id.clone(),
        }
    }

    pub fn matches_object(&self, key: &ObjectKey) -> bool {
        self.object_id == key.object_id && self.object_type == key.object_type
    }

    /// Whether the send window has opened
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.request_after {
            Some(after) => now >= after,
            None => true,
        }
    }
}

/// Node-wide retry/backoff bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Consecutive failed attempts since the last success
    pub retry_number: u32,
    /// Earliest time the node may be selected again
    pub retry_after: DateTime<Utc>,
    pub last_success_at: DateTime<Utc>,
}

impl RetryState {
    /// Fresh state: immediately selectable, success recorded now
    pub fn fresh() -> Self {
        Self {
            retry_number: 0,
            retry_after: DateTime::<Utc>::UNIX_EPOCH,
            last_success_at: Utc::now(),
        }
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Durable replay state of one destination node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeReplay {
    #[serde(default)]
    pub requests: Vec<PendingRequest>,
    #[serde(default)]
    pub retries: RetryState,
}

impl NodeReplay {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Whether the node may be drained: backoff window elapsed and retry
    /// count below the quarantine cap
    pub fn is_eligible(&self, now: DateTime<Utc>, max_retries: u32) -> bool {
        now >= self.retries.retry_after && self.retries.retry_number < max_retries
    }

    /// Stable sort of the request list by priority rank
    pub fn sort_requests(&mut self) {
        self.requests
            .sort_by_key(|request| request.request_type.priority());
    }
}
