//! Propagation
//!
//! Walks a destination diff and records the per-peer intents with the
//! replay dispatcher. Propagation is best-effort from the mutating caller's
//! perspective: per-peer failures are logged and handled by the retry
//! machinery, never surfaced upward.

use std::sync::Arc;

use futures::future::join_all;

use crate::object::{Object, ObjectPatch};
use crate::replay::{ReplayDispatcher, RequestType};

use super::DestinationDiff;

/// Emits propagation intents for origin-side object mutations
#[derive(Clone)]
pub struct Propagator {
    dispatcher: Arc<ReplayDispatcher>,
}

impl Propagator {
    pub fn new(dispatcher: Arc<ReplayDispatcher>) -> Self {
        Self { dispatcher }
    }

    async fn send_all(&self, node_ids: &[String], request_type: RequestType, object: &Object) {
        let notifications = node_ids.iter().map(|node_id| {
            let dispatcher = Arc::clone(&self.dispatcher);
            async move {
                if let Err(e) = dispatcher.notify(node_id, &[request_type], object).await {
                    tracing::warn!(
                        "Failed to record {} for {} toward {}: {}",
                        request_type,
                        object.key(),
                        node_id,
                        e
                    );
                }
            }
        });

        join_all(notifications).await;
    }

    /// A new object: every destination needs a create
    pub async fn notify_created(&self, object: &Object) {
        let diff = DestinationDiff::compute(&[], &object.destinations, false);
        self.send_all(&diff.to_create, RequestType::CreateObject, object)
            .await;
    }

    /// A metadata mutation: diff the previous destination list against the
    /// patched one and emit creates, metadata re-pushes, and removals.
    pub async fn notify_metadata_updated(
        &self,
        original: &Object,
        updated: &Object,
        patch: &ObjectPatch,
    ) {
        let new_destinations = patch
            .destinations
            .as_deref()
            .unwrap_or(&original.destinations);

        let diff = DestinationDiff::compute(
            &original.destinations,
            new_destinations,
            patch.includes_version_change(),
        );
        if diff.is_empty() {
            return;
        }

        self.send_all(&diff.to_create, RequestType::CreateObject, updated)
            .await;
        self.send_all(&diff.to_update, RequestType::UpdateObjectMetadata, updated)
            .await;
        self.send_all(&diff.to_remove, RequestType::DeleteObject, updated)
            .await;
    }

    /// New payload data at the origin: every destination gets the signal
    pub async fn notify_data_updated(&self, object: &Object) {
        let node_ids: Vec<String> = object
            .destinations
            .iter()
            .map(|d| d.node_id.clone())
            .collect();
        self.send_all(&node_ids, RequestType::UpdateObjectData, object)
            .await;
    }

    /// Deletion requested at the origin: every destination must drop its copy
    pub async fn notify_removed(&self, object: &Object) {
        let diff = DestinationDiff::compute(&object.destinations, &[], false);
        self.send_all(&diff.to_remove, RequestType::DeleteObject, object)
            .await;
    }
}
