//! Inbound Cluster Operations
//!
//! Applies replication requests arriving from peers: object creation at a
//! destination, the classified cluster updates, and destination-side
//! removal. Every operation piggybacks an opportunistic replay sweep.

pub mod update;

pub use update::{ClusterUpdate, ClusterUpdateRequest};

use std::sync::Arc;

use crate::error::Result;
use crate::object::validate;
use crate::object::{Object, ObjectPatch, ObjectStore, ServiceRole};
use crate::remote::DataSyncInitiator;
use crate::replay::{ReplayDispatcher, RequestType};
use crate::replication::Propagator;

/// Applies inbound replication requests at this node
#[derive(Clone)]
pub struct ClusterApplier {
    objects: ObjectStore,
    dispatcher: Arc<ReplayDispatcher>,
    propagator: Propagator,
    data_sync: Arc<dyn DataSyncInitiator>,
}

impl ClusterApplier {
    pub fn new(
        objects: ObjectStore,
        dispatcher: Arc<ReplayDispatcher>,
        data_sync: Arc<dyn DataSyncInitiator>,
    ) -> Self {
        let propagator = Propagator::new(Arc::clone(&dispatcher));
        Self {
            objects,
            dispatcher,
            propagator,
            data_sync,
        }
    }

    /// Store a replicated object on this node as a destination copy
    pub async fn create_in_cluster(&self, object: &Object) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                let mut copy = object.clone();
                copy.service_role = ServiceRole::Destination;

                let stored = self.objects.save(&copy).await?;
                tracing::info!(
                    "Stored destination copy of {} from origin {}",
                    stored.key(),
                    stored.origin_id
                );
                Ok(stored)
            })
            .await
    }

    /// Apply a classified cluster update to the local copy
    pub async fn update_in_cluster(
        &self,
        object_type: &str,
        object_id: &str,
        request: &ClusterUpdateRequest,
    ) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                // Reject malformed payloads before touching anything
                let intent = request.classify()?;

                let object = self.objects.get(object_type, object_id).await?;
                intent.authorize(object.service_role)?;

                match intent {
                    ClusterUpdate::ReceivalFailed { failed_by } => {
                        self.apply_receival_failed(&object, &failed_by).await
                    }
                    ClusterUpdate::DataUpdated => self.apply_data_updated(&object).await,
                    ClusterUpdate::MetadataUpdated(patch) => {
                        self.apply_metadata_updated(&object, &patch).await
                    }
                }
            })
            .await
    }

    /// Remove the local destination copy, returning what was removed
    pub async fn delete_in_cluster(&self, object_type: &str, object_id: &str) -> Result<Object> {
        self.dispatcher
            .clone()
            .run_alongside(async {
                let object = self.objects.get(object_type, object_id).await?;
                self.objects.delete(object_type, object_id).await?;
                tracing::info!("Removed destination copy of {}", object.key());
                Ok(object)
            })
            .await
    }

    /// A destination reported an unacknowledged delivery: clear its
    /// acknowledgement and queue a fresh data push toward it.
    async fn apply_receival_failed(&self, object: &Object, failed_by: &str) -> Result<Object> {
        let cleared = update::clear_receival(&object.destinations, failed_by)?;

        let patch = ObjectPatch {
            destinations: Some(cleared),
            ..Default::default()
        };
        let updated = self
            .objects
            .update(&object.object_type, &object.id, &patch)
            .await?;

        tracing::info!(
            "Receival failed for {} at {}, scheduling retransmission",
            updated.key(),
            failed_by
        );
        self.dispatcher
            .notify(failed_by, &[RequestType::UpdateObjectData], &updated)
            .await?;

        Ok(updated)
    }

    /// The origin announced new payload data: schedule the delayed
    /// receival-failed escalation and start the out-of-band pull.
    async fn apply_data_updated(&self, object: &Object) -> Result<Object> {
        self.dispatcher
            .notify(&object.origin_id, &[RequestType::ReceivalFailed], object)
            .await?;

        // The pull is best-effort: if it never completes, the escalation
        // just queued makes the origin retransmit after the grace window.
        if let Err(e) = self.data_sync.pull(object, &object.origin_id).await {
            tracing::warn!(
                "Payload pull for {} from {} did not start: {}",
                object.key(),
                object.origin_id,
                e
            );
        }

        Ok(object.clone())
    }

    /// Origin-authored metadata arrived. At a destination copy it is
    /// applied verbatim; at the origin itself it is a fresh mutation and
    /// re-diffs the destination list.
    async fn apply_metadata_updated(&self, object: &Object, patch: &ObjectPatch) -> Result<Object> {
        let patch = validate::validate_patch(patch)?;

        let updated = self
            .objects
            .update(&object.object_type, &object.id, &patch)
            .await?;

        if object.service_role == ServiceRole::Origin {
            self.propagator
                .notify_metadata_updated(object, &updated, &patch)
                .await;
        }

        Ok(updated)
    }
}
