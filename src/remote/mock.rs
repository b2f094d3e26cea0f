//! Test doubles for the collaborator traits

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{DataSyncInitiator, RemoteError, RemotePeerClient, RemoteResult};
use crate::object::Object;

/// One observed peer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PeerCall {
    pub node_id: String,
    pub op: &'static str,
    pub object_id: String,
}

/// Records every peer call; individual nodes can be programmed to fail
/// with a given status code.
#[derive(Default)]
pub(crate) struct RecordingPeerClient {
    calls: Mutex<Vec<PeerCall>>,
    failures: Mutex<HashMap<String, u16>>,
}

impl RecordingPeerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_node(&self, node_id: &str, status_code: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(node_id.to_string(), status_code);
    }

    pub fn heal_node(&self, node_id: &str) {
        self.failures.lock().unwrap().remove(node_id);
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops_for(&self, node_id: &str) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|c| c.node_id == node_id)
            .map(|c| c.op)
            .collect()
    }

    fn record(&self, node_id: &str, op: &'static str, object: &Object) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(PeerCall {
            node_id: node_id.to_string(),
            op,
            object_id: object.id.clone(),
        });

        match self.failures.lock().unwrap().get(node_id) {
            Some(status) => Err(RemoteError::with_status(*status, "programmed failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemotePeerClient for RecordingPeerClient {
    async fn create_object_in_cluster(&self, node_id: &str, object: &Object) -> RemoteResult<()> {
        self.record(node_id, "create", object)
    }

    async fn update_object_metadata_in_cluster(
        &self,
        node_id: &str,
        object: &Object,
    ) -> RemoteResult<()> {
        self.record(node_id, "update_metadata", object)
    }

    async fn update_object_data_in_cluster(
        &self,
        node_id: &str,
        object: &Object,
    ) -> RemoteResult<()> {
        self.record(node_id, "update_data", object)
    }

    async fn delete_object_in_cluster(&self, node_id: &str, object: &Object) -> RemoteResult<()> {
        self.record(node_id, "delete", object)
    }

    async fn mark_receival_failed(
        &self,
        _from_node_id: &str,
        to_node_id: &str,
        object: &Object,
    ) -> RemoteResult<()> {
        self.record(to_node_id, "receival_failed", object)
    }
}

/// Records payload pull requests
#[derive(Default)]
pub(crate) struct RecordingDataSync {
    pulls: Mutex<Vec<(String, String)>>,
}

impl RecordingDataSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observed `(object_id, origin_node_id)` pairs
    pub fn pulls(&self) -> Vec<(String, String)> {
        self.pulls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSyncInitiator for RecordingDataSync {
    async fn pull(&self, object: &Object, origin_node_id: &str) -> RemoteResult<()> {
        self.pulls
            .lock()
            .unwrap()
            .push((object.id.clone(), origin_node_id.to_string()));
        Ok(())
    }
}
