//! Replication Engine Facade
//!
//! Origin-side entry points for object lifecycle operations. Every
//! operation persists locally first, records propagation intents for the
//! replay machinery, and piggybacks an opportunistic replay sweep; callers
//! see success as soon as the local write lands.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::cluster::ClusterApplier;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::object::validate::{self, DEFAULT_MIME_TYPE};
use crate::object::{
    NewObject, Object, ObjectFilter, ObjectPatch, ObjectStore, ServiceRole,
};
use crate::remote::{DataSyncInitiator, IdentityProvider, RemotePeerClient};
use crate::replay::{ReplayDispatcher, ReplayQueue, RequestType};
use crate::replication::Propagator;
use crate::storage::{self, KeyValueStore};

/// Cluster object replication engine
///
/// Owns the object store, the replay queue, and the dispatcher; exposes
/// the origin-side API and, via [`ReplicationEngine::cluster`], the inbound
/// peer-facing operations.
pub struct ReplicationEngine {
    objects: ObjectStore,
    dispatcher: Arc<ReplayDispatcher>,
    propagator: Propagator,
    cluster: ClusterApplier,
    identity: Arc<dyn IdentityProvider>,
}

impl ReplicationEngine {
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn KeyValueStore>,
        peer: Arc<dyn RemotePeerClient>,
        identity: Arc<dyn IdentityProvider>,
        data_sync: Arc<dyn DataSyncInitiator>,
    ) -> Self {
        let objects = ObjectStore::new(Arc::clone(&store));
        let queue = ReplayQueue::new(store, config.replay.clone());
        let dispatcher = ReplayDispatcher::new(
            objects.clone(),
            queue,
            peer,
            Arc::clone(&identity),
        );
        let propagator = Propagator::new(Arc::clone(&dispatcher));
        let cluster = ClusterApplier::new(objects.clone(), Arc::clone(&dispatcher), data_sync);

        Self {
            objects,
            dispatcher,
            propagator,
            cluster,
            identity,
        }
    }

    /// Inbound peer-facing operations
    pub fn cluster(&self) -> &ClusterApplier {
        &self.cluster
    }

    /// Direct access to the object store
    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    /// The replay dispatcher, for wrapping operations outside the engine
    /// in an opportunistic sweep
    pub fn dispatcher(&self) -> &Arc<ReplayDispatcher> {
        &self.dispatcher
    }

    /// Run one replay pass by hand (for schedulers and tests)
    pub async fn trigger_replay(&self, priority_node_id: Option<&str>) -> Result<()> {
        self.dispatcher.trigger_replay(priority_node_id).await
    }

    /// Force a drain of a quarantined node
    pub async fn retry_node(&self, node_id: &str) -> Result<()> {
        self.dispatcher.retry_node(node_id).await
    }

    /// Fetch an object, rejecting copies that are being retired
    async fn get_active(&self, object_type: &str, object_id: &str) -> Result<Object> {
        let object = self.objects.get(object_type, object_id).await?;
        if object.is_retiring() {
            return Err(Error::ObjectRetiring {
                object_type: object_type.to_string(),
                object_id: object_id.to_string(),
            });
        }
        Ok(object)
    }

    /// Create an object at this node as its origin and propagate it to
    /// every destination.
    pub async fn create_object(&self, new: NewObject) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                let current_node_id = self.identity.current_node_id().await?;

                let labels = match &new.labels {
                    Some(labels) => validate::validate_labels(labels)?,
                    None => Default::default(),
                };
                let attributes = match &new.attributes {
                    Some(attributes) => validate::validate_attributes(attributes)?,
                    None => Default::default(),
                };
                if let Some(version) = &new.version {
                    validate::validate_version(version)?;
                }
                if let Some(mime_type) = &new.mime_type {
                    validate::validate_mime_type(mime_type)?;
                }
                if new.destinations.iter().any(|d| d.node_id.is_empty()) {
                    return Err(Error::Validation(
                        "every destination must include a node_id".to_string(),
                    ));
                }

                let now = Utc::now();
                let object = Object {
                    id: new.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
                    object_type: new.object_type.clone(),
                    version: new.version.clone(),
                    mime_type: new
                        .mime_type
                        .clone()
                        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
                    labels,
                    attributes,
                    has_data: false,
                    origin_id: new.origin_id.clone().unwrap_or(current_node_id),
                    service_role: ServiceRole::Origin,
                    destinations: new.destinations.clone(),
                    deletion_requested_at: None,
                    created_at: now,
                    updated_at: now,
                };

                let stored = self.objects.save(&object).await?;
                tracing::info!(
                    "Created {} with {} destination(s)",
                    stored.key(),
                    stored.destinations.len()
                );

                self.propagator.notify_created(&stored).await;
                Ok(stored)
            })
            .await
    }

    /// Fetch one object
    pub async fn get_object(&self, object_type: &str, object_id: &str) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(self.objects.get(object_type, object_id))
            .await
    }

    /// List stored objects, optionally filtered
    pub async fn list_objects(&self, filter: Option<&ObjectFilter>) -> Result<Vec<Object>> {
        self.dispatcher
            .clone()
            .run_alongside(self.objects.list_all(filter))
            .await
    }

    /// Mutate origin-authored metadata and propagate the change. Only the
    /// origin copy accepts these mutations.
    pub async fn update_object(
        &self,
        object_type: &str,
        object_id: &str,
        patch: &ObjectPatch,
    ) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                let current_node_id = self.identity.current_node_id().await?;
                let original = self.get_active(object_type, object_id).await?;

                if original.service_role != ServiceRole::Origin
                    || original.origin_id != current_node_id
                {
                    return Err(Error::Validation(
                        "metadata updates can only be made at the origin node".to_string(),
                    ));
                }

                if patch.has_data.is_some() || patch.deletion_requested_at.is_some() {
                    return Err(Error::Validation(
                        "patch contains engine-managed fields".to_string(),
                    ));
                }
                if patch.origin_only_fields().is_empty() {
                    return Err(Error::Validation(
                        "no property is requested to be updated".to_string(),
                    ));
                }
                let patch = validate::validate_patch(patch)?;

                let updated = self.objects.update(object_type, object_id, &patch).await?;
                self.propagator
                    .notify_metadata_updated(&original, &updated, &patch)
                    .await;

                Ok(updated)
            })
            .await
    }

    /// Record that the binary payload has been written locally.
    ///
    /// At the origin this announces new data to every destination; at a
    /// destination it acknowledges the pull and cancels the pending
    /// receival-failed escalation toward the origin (without resetting the
    /// origin's retry window, which tracks unrelated traffic).
    pub async fn update_object_data(&self, object_type: &str, object_id: &str) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                let object = self.get_active(object_type, object_id).await?;

                let patch = ObjectPatch {
                    has_data: Some(true),
                    ..Default::default()
                };
                let updated = self.objects.update(object_type, object_id, &patch).await?;

                match object.service_role {
                    ServiceRole::Destination => {
                        self.dispatcher
                            .queue()
                            .dequeue(
                                &object.origin_id,
                                RequestType::ReceivalFailed,
                                &object.key(),
                                false,
                            )
                            .await?;
                        tracing::debug!(
                            "Payload for {} arrived, cancelled escalation toward {}",
                            updated.key(),
                            object.origin_id
                        );
                    }
                    ServiceRole::Origin => {
                        self.propagator.notify_data_updated(&updated).await;
                    }
                }

                Ok(updated)
            })
            .await
    }

    /// Location and MIME type of an object's payload, for the external
    /// transfer collaborator
    pub async fn object_data_location(
        &self,
        object_type: &str,
        object_id: &str,
    ) -> Result<(String, String)> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                let object = self.get_active(object_type, object_id).await?;
                Ok((
                    storage::object_data_path(object_type, object_id),
                    object.mime_type,
                ))
            })
            .await
    }

    /// Request deletion at the origin: removal is propagated to every
    /// destination first and the origin copy goes away once all of them
    /// confirm. With no destinations the local copy is removed right away.
    pub async fn delete_object(&self, object_type: &str, object_id: &str) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                let current_node_id = self.identity.current_node_id().await?;
                let original = self.get_active(object_type, object_id).await?;

                if original.service_role != ServiceRole::Origin
                    || original.origin_id != current_node_id
                {
                    return Err(Error::Validation(
                        "objects can only be deleted at their origin".to_string(),
                    ));
                }

                let patch = ObjectPatch {
                    deletion_requested_at: Some(Utc::now()),
                    ..Default::default()
                };
                let retiring = self.objects.update(object_type, object_id, &patch).await?;

                if retiring.destinations.is_empty() {
                    self.objects.delete(object_type, object_id).await?;
                    tracing::info!("Deleted {} (no destinations to notify)", retiring.key());
                } else {
                    self.propagator.notify_removed(&retiring).await;
                }

                Ok(retiring)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterUpdateRequest;
    use crate::object::Destination;
    use crate::remote::mock::{RecordingDataSync, RecordingPeerClient};
    use crate::remote::{RemoteError, RemoteResult, StaticIdentity};
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    struct Fixture {
        engine: ReplicationEngine,
        peer: Arc<RecordingPeerClient>,
    }

    fn fixture(node_id: &str) -> Fixture {
        let config = EngineConfig {
            node: crate::config::NodeConfig {
                id: node_id.to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let peer = Arc::new(RecordingPeerClient::new());
        let engine = ReplicationEngine::new(
            &config,
            Arc::new(MemoryStore::new()),
            peer.clone(),
            Arc::new(StaticIdentity::new(node_id)),
            Arc::new(RecordingDataSync::new()),
        );

        Fixture { engine, peer }
    }

    fn new_object(id: &str, destinations: &[&str]) -> NewObject {
        NewObject {
            id: Some(id.to_string()),
            object_type: "doc".to_string(),
            version: Some("1".to_string()),
            mime_type: None,
            labels: None,
            attributes: None,
            origin_id: None,
            destinations: destinations.iter().map(|id| Destination::new(*id)).collect(),
        }
    }

    /// Seed the store directly, bypassing propagation
    async fn seed(f: &Fixture, id: &str, destinations: Vec<Destination>) -> Object {
        let now = Utc::now();
        let object = Object {
            id: id.to_string(),
            object_type: "doc".to_string(),
            version: Some("1".to_string()),
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            labels: Map::new(),
            attributes: Map::new(),
            has_data: false,
            origin_id: "node-a".to_string(),
            service_role: ServiceRole::Origin,
            destinations,
            deletion_requested_at: None,
            created_at: now,
            updated_at: now,
        };
        f.engine.objects.save(&object).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let f = fixture("node-a");

        let created = f
            .engine
            .create_object(new_object("o1", &["node-b"]))
            .await
            .unwrap();
        assert!(!created.has_data);
        assert_eq!(created.service_role, ServiceRole::Origin);
        assert_eq!(created.origin_id, "node-a");
        assert_eq!(created.mime_type, DEFAULT_MIME_TYPE);

        let fetched = f.engine.get_object("doc", "o1").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_duplicate_create_conflicts() {
        let f = fixture("node-a");
        f.engine
            .create_object(new_object("o1", &[]))
            .await
            .unwrap();

        assert!(matches!(
            f.engine
                .create_object(new_object("o1", &[]))
                .await
                .unwrap_err(),
            Error::Conflict { .. }
        ));
    }

    #[tokio::test]
    async fn test_create_queues_toward_unreachable_destination() {
        let f = fixture("node-a");
        f.peer.fail_node("node-b", 503);

        f.engine
            .create_object(new_object("o1", &["node-b"]))
            .await
            .unwrap();

        let queue = f.engine.dispatcher.queue();
        let replay = queue.get_queue_for_node("node-b", false).await.unwrap();
        assert_eq!(replay.requests.len(), 1);
        assert_eq!(replay.requests[0].request_type, RequestType::CreateObject);
        assert_eq!(replay.requests[0].object_id, "o1");
        assert_eq!(replay.requests[0].object_type, "doc");

        // Peer recovers; a forced drain empties the queue and resets the
        // failure streak
        f.peer.heal_node("node-b");
        f.engine.retry_node("node-b").await.unwrap();

        let replay = queue.get_queue_for_node("node-b", false).await.unwrap();
        assert!(replay.is_empty());
        assert_eq!(replay.retries.retry_number, 0);
    }

    #[tokio::test]
    async fn test_version_bump_queues_metadata_update() {
        let f = fixture("node-a");
        f.peer.fail_node("node-b", 503);

        let mut delivered = Destination::new("node-b");
        delivered.received_at = Some(Utc::now());
        seed(&f, "o1", vec![delivered]).await;

        let patch = ObjectPatch {
            version: Some("2".to_string()),
            ..Default::default()
        };
        f.engine.update_object("doc", "o1", &patch).await.unwrap();

        let queue = f.engine.dispatcher.queue();
        let replay = queue.get_queue_for_node("node-b", false).await.unwrap();
        assert_eq!(replay.requests.len(), 1);
        assert_eq!(
            replay.requests[0].request_type,
            RequestType::UpdateObjectMetadata
        );
    }

    #[tokio::test]
    async fn test_labels_only_update_queues_nothing() {
        let f = fixture("node-a");
        seed(&f, "o1", vec![Destination::new("node-b")]).await;

        let labels: Map<_, _> = [("env".to_string(), serde_json::json!("prod"))]
            .into_iter()
            .collect();
        let patch = ObjectPatch {
            labels: Some(labels),
            ..Default::default()
        };
        let updated = f.engine.update_object("doc", "o1", &patch).await.unwrap();
        assert_eq!(updated.labels.len(), 1);

        assert!(f.peer.calls().is_empty());
        let queue = f.engine.dispatcher.queue();
        let replay = queue.get_queue_for_node("node-b", false).await.unwrap();
        assert!(replay.is_empty());
    }

    #[tokio::test]
    async fn test_update_rejected_off_origin() {
        let f = fixture("node-b");
        let mut copy = seed(&f, "o1", vec![]).await;
        copy.service_role = ServiceRole::Destination;
        // Rewrite the seeded copy as a destination replica
        f.engine.objects.delete("doc", "o1").await.unwrap();
        f.engine.objects.save(&copy).await.unwrap();

        let patch = ObjectPatch {
            version: Some("2".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.engine
                .update_object("doc", "o1", &patch)
                .await
                .unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_update_rejects_empty_and_managed_patches() {
        let f = fixture("node-a");
        seed(&f, "o1", vec![]).await;

        assert!(matches!(
            f.engine
                .update_object("doc", "o1", &ObjectPatch::default())
                .await
                .unwrap_err(),
            Error::Validation(_)
        ));

        let managed = ObjectPatch {
            has_data: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            f.engine
                .update_object("doc", "o1", &managed)
                .await
                .unwrap_err(),
            Error::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_data_update_at_origin_marks_destinations_received() {
        let f = fixture("node-a");
        seed(&f, "o1", vec![Destination::new("node-b")]).await;

        let updated = f.engine.update_object_data("doc", "o1").await.unwrap();
        assert!(updated.has_data);

        assert_eq!(f.peer.ops_for("node-b"), vec!["update_data"]);
        let stored = f.engine.get_object("doc", "o1").await.unwrap();
        assert!(stored.destination("node-b").unwrap().received_at.is_some());
    }

    #[tokio::test]
    async fn test_data_arrival_at_destination_cancels_escalation() {
        let f = fixture("node-b");
        let mut copy = seed(&f, "o1", vec![Destination::new("node-b")]).await;
        copy.service_role = ServiceRole::Destination;
        f.engine.objects.delete("doc", "o1").await.unwrap();
        f.engine.objects.save(&copy).await.unwrap();

        // Pending escalation toward the origin, as left by a data-updated
        // signal that has not been acknowledged yet
        let queue = f.engine.dispatcher.queue();
        queue
            .enqueue(
                "node-a",
                RequestType::ReceivalFailed,
                &copy.key(),
                Some(Utc::now() + chrono::Duration::seconds(300)),
            )
            .await
            .unwrap();

        let updated = f.engine.update_object_data("doc", "o1").await.unwrap();
        assert!(updated.has_data);

        let replay = queue.get_queue_for_node("node-a", false).await.unwrap();
        assert!(replay.is_empty());
    }

    #[tokio::test]
    async fn test_delete_propagates_and_retires_origin_copy() {
        let f = fixture("node-a");
        seed(&f, "o1", vec![Destination::new("node-b")]).await;

        let retiring = f.engine.delete_object("doc", "o1").await.unwrap();
        assert!(retiring.is_retiring());

        // Healthy peer: removal delivered, every destination confirmed,
        // origin copy gone
        assert_eq!(f.peer.ops_for("node-b"), vec!["delete"]);
        assert!(matches!(
            f.engine.get_object("doc", "o1").await.unwrap_err(),
            Error::ObjectNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_delete_without_destinations_is_immediate() {
        let f = fixture("node-a");
        seed(&f, "o1", vec![]).await;

        f.engine.delete_object("doc", "o1").await.unwrap();

        assert!(f.peer.calls().is_empty());
        assert!(matches!(
            f.engine.get_object("doc", "o1").await.unwrap_err(),
            Error::ObjectNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_retiring_object_rejects_further_mutation() {
        let f = fixture("node-a");
        seed(&f, "o1", vec![Destination::new("node-b")]).await;
        f.peer.fail_node("node-b", 503);

        f.engine.delete_object("doc", "o1").await.unwrap();

        // Removal is still pending toward node-b, the copy lingers retiring
        let patch = ObjectPatch {
            version: Some("2".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.engine
                .update_object("doc", "o1", &patch)
                .await
                .unwrap_err(),
            Error::ObjectRetiring { .. }
        ));
    }

    #[tokio::test]
    async fn test_data_location_reports_path_and_mime() {
        let f = fixture("node-a");
        seed(&f, "o1", vec![]).await;

        let (path, mime_type) = f.engine.object_data_location("doc", "o1").await.unwrap();
        assert_eq!(path, storage::object_data_path("doc", "o1"));
        assert_eq!(mime_type, DEFAULT_MIME_TYPE);
    }

    // ---- two-node integration across a loopback peer transport ----

    /// Routes peer calls straight into the target engine's cluster
    /// operations, standing in for the HTTP transport.
    #[derive(Default)]
    struct BridgePeerClient {
        engines: RwLock<HashMap<String, Arc<ReplicationEngine>>>,
    }

    impl BridgePeerClient {
        async fn register(&self, node_id: &str, engine: Arc<ReplicationEngine>) {
            self.engines
                .write()
                .await
                .insert(node_id.to_string(), engine);
        }

        async fn target(&self, node_id: &str) -> RemoteResult<Arc<ReplicationEngine>> {
            self.engines
                .read()
                .await
                .get(node_id)
                .cloned()
                .ok_or_else(|| RemoteError::unreachable(format!("unknown node {}", node_id)))
        }

        fn to_remote(e: Error) -> RemoteError {
            match e {
                Error::Conflict { .. } => RemoteError::with_status(409, e.to_string()),
                Error::ObjectNotFound { .. } => RemoteError::with_status(404, e.to_string()),
                Error::Validation(_) | Error::DeletionPending { .. } => {
                    RemoteError::with_status(400, e.to_string())
                }
                _ => RemoteError::with_status(500, e.to_string()),
            }
        }
    }

    #[async_trait]
    impl RemotePeerClient for BridgePeerClient {
        async fn create_object_in_cluster(
            &self,
            node_id: &str,
            object: &Object,
        ) -> RemoteResult<()> {
            let engine = self.target(node_id).await?;
            engine
                .cluster()
                .create_in_cluster(object)
                .await
                .map(|_| ())
                .map_err(Self::to_remote)
        }

        async fn update_object_metadata_in_cluster(
            &self,
            node_id: &str,
            object: &Object,
        ) -> RemoteResult<()> {
            let engine = self.target(node_id).await?;
            let request = ClusterUpdateRequest {
                version: object.version.clone(),
                mime_type: Some(object.mime_type.clone()),
                labels: Some(object.labels.clone()),
                attributes: Some(object.attributes.clone()),
                destinations: Some(object.destinations.clone()),
                ..Default::default()
            };
            engine
                .cluster()
                .update_in_cluster(&object.object_type, &object.id, &request)
                .await
                .map(|_| ())
                .map_err(Self::to_remote)
        }

        async fn update_object_data_in_cluster(
            &self,
            node_id: &str,
            object: &Object,
        ) -> RemoteResult<()> {
            let engine = self.target(node_id).await?;
            let request = ClusterUpdateRequest {
                is_data_updated: Some(true),
                ..Default::default()
            };
            engine
                .cluster()
                .update_in_cluster(&object.object_type, &object.id, &request)
                .await
                .map(|_| ())
                .map_err(Self::to_remote)
        }

        async fn delete_object_in_cluster(
            &self,
            node_id: &str,
            object: &Object,
        ) -> RemoteResult<()> {
            let engine = self.target(node_id).await?;
            engine
                .cluster()
                .delete_in_cluster(&object.object_type, &object.id)
                .await
                .map(|_| ())
                .map_err(Self::to_remote)
        }

        async fn mark_receival_failed(
            &self,
            from_node_id: &str,
            to_node_id: &str,
            object: &Object,
        ) -> RemoteResult<()> {
            let engine = self.target(to_node_id).await?;
            let request = ClusterUpdateRequest {
                receival_failed_by: Some(from_node_id.to_string()),
                ..Default::default()
            };
            engine
                .cluster()
                .update_in_cluster(&object.object_type, &object.id, &request)
                .await
                .map(|_| ())
                .map_err(Self::to_remote)
        }
    }

    fn bridged_engine(node_id: &str, bridge: Arc<BridgePeerClient>) -> Arc<ReplicationEngine> {
        let config = EngineConfig {
            node: crate::config::NodeConfig {
                id: node_id.to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        Arc::new(ReplicationEngine::new(
            &config,
            Arc::new(MemoryStore::new()),
            bridge,
            Arc::new(StaticIdentity::new(node_id)),
            Arc::new(RecordingDataSync::new()),
        ))
    }

    #[tokio::test]
    async fn test_two_node_lifecycle() {
        let bridge = Arc::new(BridgePeerClient::default());
        let node_a = bridged_engine("node-a", bridge.clone());
        let node_b = bridged_engine("node-b", bridge.clone());
        bridge.register("node-a", node_a.clone()).await;
        bridge.register("node-b", node_b.clone()).await;

        // Create at the origin replicates to the destination
        node_a
            .create_object(new_object("o1", &["node-b"]))
            .await
            .unwrap();
        let copy = node_b.get_object("doc", "o1").await.unwrap();
        assert_eq!(copy.service_role, ServiceRole::Destination);
        assert_eq!(copy.origin_id, "node-a");

        // A version bump reaches the destination copy
        let patch = ObjectPatch {
            version: Some("2".to_string()),
            ..Default::default()
        };
        node_a.update_object("doc", "o1", &patch).await.unwrap();
        let copy = node_b.get_object("doc", "o1").await.unwrap();
        assert_eq!(copy.version.as_deref(), Some("2"));

        // New payload data: the origin marks the destination received and
        // the destination schedules its grace-window escalation
        node_a.update_object_data("doc", "o1").await.unwrap();
        let origin_copy = node_a.get_object("doc", "o1").await.unwrap();
        assert!(origin_copy
            .destination("node-b")
            .unwrap()
            .received_at
            .is_some());
        let escalation = node_b
            .dispatcher
            .queue()
            .get_queue_for_node("node-a", false)
            .await
            .unwrap();
        assert_eq!(escalation.requests.len(), 1);
        assert_eq!(
            escalation.requests[0].request_type,
            RequestType::ReceivalFailed
        );

        // The pull completes at the destination: escalation cancelled
        node_b.update_object_data("doc", "o1").await.unwrap();
        let escalation = node_b
            .dispatcher
            .queue()
            .get_queue_for_node("node-a", false)
            .await
            .unwrap();
        assert!(escalation.is_empty());

        // Deletion retires both copies
        node_a.delete_object("doc", "o1").await.unwrap();
        assert!(matches!(
            node_b.get_object("doc", "o1").await.unwrap_err(),
            Error::ObjectNotFound { .. }
        ));
        assert!(matches!(
            node_a.get_object("doc", "o1").await.unwrap_err(),
            Error::ObjectNotFound { .. }
        ));
    }
}
