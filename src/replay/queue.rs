//! Durable Replay Queue
//!
//! Per-node persistent queue of pending propagation requests. Enqueueing
//! applies the merge/supersede/collapse rules; the retry state implements
//! exponential backoff with a quarantine cap. Entries are created lazily on
//! first enqueue and removed once their request list empties.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::ReplayConfig;
use crate::error::{Error, Result};
use crate::object::ObjectKey;
use crate::storage::{self, KeyValueStore, NODE_REPLAY_TAG};

use super::{NodeReplay, PendingRequest, RequestType, RetryState};

/// Persistent per-node replay queue
#[derive(Clone)]
pub struct ReplayQueue {
    store: Arc<dyn KeyValueStore>,
    config: ReplayConfig,
}

impl ReplayQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, config: ReplayConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    async fn fetch(&self, node_id: &str) -> Result<NodeReplay> {
        let path = storage::node_replay_path(node_id);
        match self.store.get(&path).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(NodeReplay::default()),
        }
    }

    async fn persist(&self, node_id: &str, replay: &NodeReplay) -> Result<()> {
        let path = storage::node_replay_path(node_id);
        let raw = serde_json::to_string(replay)?;
        self.store.set(&path, &raw, NODE_REPLAY_TAG).await
    }

    async fn remove(&self, node_id: &str) -> Result<()> {
        self.store.delete(&storage::node_replay_path(node_id)).await
    }

    /// Queue a request toward `node_id`, applying the supersede and
    /// collapse rules:
    /// - a request of the same type for the same object replaces the
    ///   earlier one's send window;
    /// - a deletion queued while the creation is still unsent cancels every
    ///   pending request for that object (the peer never learned of it);
    /// - once a deletion is queued, no further request for that object may
    ///   be added.
    pub async fn enqueue(
        &self,
        node_id: &str,
        request_type: RequestType,
        object: &ObjectKey,
        request_after: Option<DateTime<Utc>>,
    ) -> Result<NodeReplay> {
        let mut replay = self.fetch(node_id).await?;

        let has_delete = replay.requests.iter().any(|r| {
            r.matches_object(object) && r.request_type == RequestType::DeleteObject
        });
        let has_create = replay.requests.iter().any(|r| {
            r.matches_object(object) && r.request_type == RequestType::CreateObject
        });
        let same_exists = replay
            .requests
            .iter()
            .any(|r| r.matches_object(object) && r.request_type == request_type);

        if has_delete {
            return Err(Error::DeletionPending {
                node_id: node_id.to_string(),
                object_type: object.object_type.clone(),
                object_id: object.object_id.clone(),
            });
        }

        if same_exists {
            for request in replay.requests.iter_mut() {
                if request.matches_object(object) && request.request_type == request_type {
                    request.request_after = request_after;
                }
            }
        } else if request_type == RequestType::DeleteObject && has_create {
            // Collapse: the peer never saw the object, drop everything
            replay.requests.retain(|r| !r.matches_object(object));
            tracing::debug!(
                "Collapsed unsent requests for {} on node {}",
                object,
                node_id
            );
        } else {
            replay.requests.push(PendingRequest {
                request_type,
                object_id: object.object_id.clone(),
                object_type: object.object_type.clone(),
                request_after,
            });
        }

        if replay.is_empty() {
            self.remove(node_id).await?;
        } else {
            self.persist(node_id, &replay).await?;
        }

        Ok(replay)
    }

    /// Remove a delivered (or dropped) request. An emptied node entry is
    /// removed entirely; otherwise the node's retry state is cleared unless
    /// the caller opts out (used when cancelling a non-terminal signal that
    /// must not mask unrelated node health).
    pub async fn dequeue(
        &self,
        node_id: &str,
        request_type: RequestType,
        object: &ObjectKey,
        reset_retry_state: bool,
    ) -> Result<()> {
        let mut replay = self.fetch(node_id).await?;

        replay
            .requests
            .retain(|r| !(r.matches_object(object) && r.request_type == request_type));

        if replay.is_empty() {
            return self.remove(node_id).await;
        }

        if reset_retry_state {
            replay.retries = RetryState::fresh();
        }
        self.persist(node_id, &replay).await
    }

    /// Record a failed delivery attempt: bumps the retry count and defers
    /// the node by `base_delay^retry_number` seconds.
    pub async fn mark_failed_attempt(&self, node_id: &str) -> Result<RetryState> {
        let mut replay = self.fetch(node_id).await?;

        let retry_number = replay.retries.retry_number + 1;
        // Saturate far past the quarantine cap instead of overflowing
        let delay_secs = i64::from(self.config.base_retry_delay_secs)
            .checked_pow(retry_number)
            .unwrap_or(1_000_000_000);

        replay.retries = RetryState {
            retry_number,
            retry_after: Utc::now() + Duration::seconds(delay_secs),
            last_success_at: replay.retries.last_success_at,
        };

        self.persist(node_id, &replay).await?;
        Ok(replay.retries)
    }

    /// Node ids whose backoff window has elapsed and whose retry count is
    /// below the quarantine cap
    pub async fn list_eligible_node_ids(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        let max_retries = self.config.max_retries;
        let mut node_ids = Vec::new();

        self.store
            .for_each_with_tag(NODE_REPLAY_TAG, &mut |key, value| {
                let node_id = storage::node_id_from_replay_path(key);
                match serde_json::from_str::<NodeReplay>(value) {
                    Ok(replay) => {
                        if replay.is_eligible(now, max_retries) {
                            node_ids.push(node_id.to_string());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Skipping undecodable replay entry for {}: {}", node_id, e);
                    }
                }
            })
            .await?;

        Ok(node_ids)
    }

    /// The node's queue, request list sorted by priority rank. With
    /// `check_eligibility`, a backed-off or quarantined node reads as
    /// empty.
    pub async fn get_queue_for_node(
        &self,
        node_id: &str,
        check_eligibility: bool,
    ) -> Result<NodeReplay> {
        let mut replay = self.fetch(node_id).await?;

        if check_eligibility && !replay.is_eligible(Utc::now(), self.config.max_retries) {
            return Ok(NodeReplay::default());
        }

        replay.sort_requests();
        Ok(replay)
    }
}
