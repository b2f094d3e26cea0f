//! Replay Dispatcher
//!
//! Traffic-driven scheduler that drains per-node replay queues. There is no
//! dedicated timer: ordinary engine operations piggyback an opportunistic
//! sweep through [`ReplayDispatcher::run_alongside`], and mutations trigger
//! a pass prioritized at the affected node. Each node is drained serially
//! in fixed priority order; drains for different nodes may run
//! concurrently, guarded by the active-drain registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use rand::seq::SliceRandom;

use crate::error::{Error, Result};
use crate::object::{Object, ObjectKey, ObjectPatch, ObjectStore, ServiceRole};
use crate::object::validate::DEFAULT_MIME_TYPE;
use crate::remote::{IdentityProvider, RemotePeerClient};

use super::{NodeReplay, PendingRequest, ReplayQueue, RequestType};

/// Outcome of executing one queued request
enum Attempt {
    /// Delivered; dequeue and continue
    Sent,
    /// Send window not yet open; leave queued and continue
    NotDue,
    /// Transient remote failure; back the node off and halt the pass
    Transient,
    /// Anything else; drop the request and continue
    Terminal,
}

/// Removes a node from the active-drain registry when the drain ends
struct DrainGuard<'a> {
    active: &'a DashMap<String, ()>,
    node_id: String,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.node_id);
    }
}

/// Drains pending per-node queues opportunistically
pub struct ReplayDispatcher {
    objects: ObjectStore,
    queue: ReplayQueue,
    peer: Arc<dyn RemotePeerClient>,
    identity: Arc<dyn IdentityProvider>,
    /// Registry of node ids with a drain in flight
    active: DashMap<String, ()>,
    /// Set while an opportunistic sweep is outstanding
    sweep_pending: AtomicBool,
}

impl ReplayDispatcher {
    pub fn new(
        objects: ObjectStore,
        queue: ReplayQueue,
        peer: Arc<dyn RemotePeerClient>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            objects,
            queue,
            peer,
            identity,
            active: DashMap::new(),
            sweep_pending: AtomicBool::new(false),
        })
    }

    pub fn queue(&self) -> &ReplayQueue {
        &self.queue
    }

    /// Record propagation intents toward `node_id` and run a pass
    /// prioritized at it. A self-addressed intent is resolved in-process
    /// with the same state transition and never queued. Replay failures are
    /// handled by the retry machinery, not surfaced here.
    pub async fn notify(
        &self,
        node_id: &str,
        request_types: &[RequestType],
        object: &Object,
    ) -> Result<()> {
        let current_node_id = self.identity.current_node_id().await?;

        if node_id == current_node_id {
            for request_type in request_types {
                match request_type {
                    RequestType::DeleteObject => {
                        self.mark_object_deleted(node_id, &object.key()).await?;
                    }
                    RequestType::UpdateObjectData => {
                        self.mark_object_received(node_id, &object.key()).await?;
                    }
                    _ => {}
                }
            }
            return Ok(());
        }

        let object_key = object.key();
        for request_type in request_types {
            let request_after = match request_type {
                RequestType::ReceivalFailed => Some(
                    Utc::now()
                        + Duration::seconds(i64::from(
                            self.queue.config().receival_failed_delay_secs,
                        )),
                ),
                _ => None,
            };

            self.queue
                .enqueue(node_id, *request_type, &object_key, request_after)
                .await?;
        }

        if let Err(e) = self.replay(Some(node_id), false).await {
            tracing::warn!("Prioritized replay pass for {} failed: {}", node_id, e);
        }
        Ok(())
    }

    /// One replay pass: drain the given node, or one uniformly random
    /// eligible node when none is given. A no-op when nothing is selectable.
    pub async fn trigger_replay(&self, priority_node_id: Option<&str>) -> Result<()> {
        self.replay(priority_node_id, false).await
    }

    /// Force a drain of a quarantined or backed-off node, bypassing
    /// eligibility. This is the manual recovery path for nodes beyond the
    /// retry cap.
    pub async fn retry_node(&self, node_id: &str) -> Result<()> {
        self.replay(Some(node_id), true).await
    }

    /// Wrap an operation so that exactly one opportunistic sweep is
    /// launched after it completes, if none is already outstanding.
    pub async fn run_alongside<F, T>(self: Arc<Self>, main: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let claimed = !self.sweep_pending.swap(true, Ordering::AcqRel);

        let result = main.await;

        if claimed {
            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = dispatcher.trigger_replay(None).await {
                    tracing::debug!("Opportunistic replay pass failed: {}", e);
                }
                dispatcher.sweep_pending.store(false, Ordering::Release);
            });
        }

        result
    }

    async fn replay(&self, priority_node_id: Option<&str>, force: bool) -> Result<()> {
        let (node_id, replay) = match priority_node_id {
            Some(node_id) => {
                let replay = self.queue.get_queue_for_node(node_id, !force).await?;
                (node_id.to_string(), replay)
            }
            None => match self.pick_random_node().await? {
                Some(selected) => selected,
                None => return Ok(()),
            },
        };

        if replay.is_empty() {
            return Ok(());
        }

        // At most one drain per node id at any time
        if self.active.insert(node_id.clone(), ()).is_some() {
            return Ok(());
        }
        let _guard = DrainGuard {
            active: &self.active,
            node_id: node_id.clone(),
        };

        self.drain(&node_id, replay).await
    }

    async fn pick_random_node(&self) -> Result<Option<(String, NodeReplay)>> {
        let eligible = self.queue.list_eligible_node_ids().await?;
        let selectable: Vec<String> = eligible
            .into_iter()
            .filter(|node_id| !self.active.contains_key(node_id))
            .collect();

        let node_id = match selectable.choose(&mut rand::thread_rng()) {
            Some(node_id) => node_id.clone(),
            None => return Ok(None),
        };

        let replay = self.queue.get_queue_for_node(&node_id, true).await?;
        Ok(Some((node_id, replay)))
    }

    /// Execute a node's requests serially in priority order. Stops at the
    /// first transient failure so causal ordering is preserved for the
    /// next pass.
    async fn drain(&self, node_id: &str, replay: NodeReplay) -> Result<()> {
        for request in &replay.requests {
            match self.execute(node_id, request).await? {
                Attempt::Sent => {
                    self.queue
                        .dequeue(node_id, request.request_type, &request.object_key(), true)
                        .await?;
                }
                Attempt::NotDue => {}
                Attempt::Transient => {
                    let retries = self.queue.mark_failed_attempt(node_id).await?;
                    tracing::warn!(
                        "Transient failure toward {}, attempt {}, deferred until {}",
                        node_id,
                        retries.retry_number,
                        retries.retry_after
                    );
                    break;
                }
                Attempt::Terminal => {
                    tracing::warn!(
                        "Dropping {} for {} on node {} after terminal failure",
                        request.request_type,
                        request.object_key(),
                        node_id
                    );
                    self.queue
                        .dequeue(node_id, request.request_type, &request.object_key(), true)
                        .await?;
                }
            }
        }

        Ok(())
    }

    async fn execute(&self, node_id: &str, request: &PendingRequest) -> Result<Attempt> {
        if !request.is_due(Utc::now()) {
            return Ok(Attempt::NotDue);
        }

        let object_key = request.object_key();
        let object = match self.load_for_send(&object_key, request.request_type).await {
            Ok(object) => object,
            Err(Error::ObjectNotFound { .. }) => {
                tracing::warn!(
                    "Object {} vanished locally; dropping queued {}",
                    object_key,
                    request.request_type
                );
                return Ok(Attempt::Terminal);
            }
            Err(e) => return Err(e),
        };

        let sent = match request.request_type {
            RequestType::CreateObject => {
                self.peer.create_object_in_cluster(node_id, &object).await
            }
            RequestType::UpdateObjectMetadata => {
                self.peer
                    .update_object_metadata_in_cluster(node_id, &object)
                    .await
            }
            RequestType::UpdateObjectData => {
                self.peer
                    .update_object_data_in_cluster(node_id, &object)
                    .await
            }
            RequestType::DeleteObject => self.peer.delete_object_in_cluster(node_id, &object).await,
            RequestType::ReceivalFailed => {
                let current_node_id = self.identity.current_node_id().await?;
                self.peer
                    .mark_receival_failed(&current_node_id, node_id, &object)
                    .await
            }
        };

        match sent {
            Ok(()) => {
                match request.request_type {
                    RequestType::UpdateObjectData => {
                        self.mark_object_received(node_id, &object_key).await?;
                    }
                    RequestType::DeleteObject => {
                        self.mark_object_deleted(node_id, &object_key).await?;
                    }
                    _ => {}
                }
                Ok(Attempt::Sent)
            }
            Err(remote) if remote.is_transient() => Ok(Attempt::Transient),
            Err(remote) => {
                tracing::debug!("Terminal remote failure: {}", remote);
                Ok(Attempt::Terminal)
            }
        }
    }

    /// Load the object to ship. A queued deletion may outlive the local
    /// copy, so it falls back to a minimal stub carrying just the key.
    async fn load_for_send(
        &self,
        object_key: &ObjectKey,
        request_type: RequestType,
    ) -> Result<Object> {
        match self
            .objects
            .get(&object_key.object_type, &object_key.object_id)
            .await
        {
            Ok(object) => Ok(object),
            Err(Error::ObjectNotFound { .. }) if request_type == RequestType::DeleteObject => {
                let current_node_id = self.identity.current_node_id().await?;
                let now = Utc::now();
                Ok(Object {
                    id: object_key.object_id.clone(),
                    object_type: object_key.object_type.clone(),
                    version: None,
                    mime_type: DEFAULT_MIME_TYPE.to_string(),
                    labels: Default::default(),
                    attributes: Default::default(),
                    has_data: false,
                    origin_id: current_node_id,
                    service_role: ServiceRole::Origin,
                    destinations: Vec::new(),
                    deletion_requested_at: Some(now),
                    created_at: now,
                    updated_at: now,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Record that `node_id` has received the payload (origin-side
    /// delivery bookkeeping)
    pub(crate) async fn mark_object_received(
        &self,
        node_id: &str,
        object_key: &ObjectKey,
    ) -> Result<()> {
        let object = match self
            .objects
            .get(&object_key.object_type, &object_key.object_id)
            .await
        {
            Ok(object) => object,
            // Nothing left to annotate
            Err(Error::ObjectNotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut destinations = object.destinations.clone();
        for destination in destinations.iter_mut() {
            if destination.node_id == node_id {
                destination.received_at = Some(Utc::now());
            }
        }

        let patch = ObjectPatch {
            destinations: Some(destinations),
            ..Default::default()
        };
        self.objects
            .update(&object_key.object_type, &object_key.object_id, &patch)
            .await?;
        Ok(())
    }

    /// Record that `node_id` has removed its copy; once every destination
    /// has, the origin copy is deleted too.
    pub(crate) async fn mark_object_deleted(
        &self,
        node_id: &str,
        object_key: &ObjectKey,
    ) -> Result<()> {
        let object = match self
            .objects
            .get(&object_key.object_type, &object_key.object_id)
            .await
        {
            Ok(object) => object,
            // Already gone locally, nothing left to track
            Err(Error::ObjectNotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut destinations = object.destinations.clone();
        for destination in destinations.iter_mut() {
            if destination.node_id == node_id {
                destination.deleted_at = Some(Utc::now());
            }
        }

        let all_deleted = destinations.iter().all(|d| d.deleted_at.is_some());

        let patch = ObjectPatch {
            destinations: Some(destinations),
            ..Default::default()
        };
        self.objects
            .update(&object_key.object_type, &object_key.object_id, &patch)
            .await?;

        if all_deleted {
            tracing::info!(
                "All destinations of {} confirmed removal, deleting origin copy",
                object_key
            );
            self.objects
                .delete(&object_key.object_type, &object_key.object_id)
                .await?;
        }

        Ok(())
    }
}
