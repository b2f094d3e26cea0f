//! Cluster Update Classification
//!
//! An inbound replication request carries a bag of optional fields. Exactly
//! one update category must be present; mixed or empty payloads are
//! rejected before any mutation. Role authorization is enforced against the
//! stored copy when the update is applied.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::object::{Destination, ObjectPatch, ServiceRole};

/// Raw inbound cluster update payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destinations: Option<Vec<Destination>>,
    /// Origin signal that new payload data is available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_data_updated: Option<bool>,
    /// Destination node reporting an unacknowledged delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receival_failed_by: Option<String>,
}

/// Classified update intent
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterUpdate {
    /// Origin-authored metadata fields
    MetadataUpdated(ObjectPatch),
    /// Payload data has a new version at the origin
    DataUpdated,
    /// A destination failed to acknowledge data receipt in time
    ReceivalFailed { failed_by: String },
}

impl ClusterUpdateRequest {
    fn has_metadata_fields(&self) -> bool {
        self.version.is_some()
            || self.mime_type.is_some()
            || self.labels.is_some()
            || self.attributes.is_some()
            || self.destinations.is_some()
    }

    /// Classify the payload into exactly one update intent
    pub fn classify(&self) -> Result<ClusterUpdate> {
        let metadata = self.has_metadata_fields();
        let data_updated = self.is_data_updated.unwrap_or(false);
        let receival_failed = self.receival_failed_by.is_some();

        let categories = usize::from(metadata) + usize::from(data_updated) + usize::from(receival_failed);

        match categories {
            0 => Err(Error::Validation(
                "no property is requested to be updated".to_string(),
            )),
            1 => {
                if let Some(failed_by) = &self.receival_failed_by {
                    Ok(ClusterUpdate::ReceivalFailed {
                        failed_by: failed_by.clone(),
                    })
                } else if data_updated {
                    Ok(ClusterUpdate::DataUpdated)
                } else {
                    Ok(ClusterUpdate::MetadataUpdated(ObjectPatch {
                        version: self.version.clone(),
                        mime_type: self.mime_type.clone(),
                        labels: self.labels.clone(),
                        attributes: self.attributes.clone(),
                        destinations: self.destinations.clone(),
                        ..Default::default()
                    }))
                }
            }
            _ => Err(Error::Validation(
                "update payload mixes fields from more than one update category".to_string(),
            )),
        }
    }
}

impl ClusterUpdate {
    /// Check the local copy's role against the intent. Metadata flows to
    /// both roles: at the origin it is an authoritative mutation, at a
    /// destination it is the origin's authority being applied.
    pub fn authorize(&self, role: ServiceRole) -> Result<()> {
        match self {
            ClusterUpdate::ReceivalFailed { .. } if role != ServiceRole::Origin => {
                Err(Error::Validation(
                    "receival_failed_by update can only be made at the origin".to_string(),
                ))
            }
            ClusterUpdate::DataUpdated if role != ServiceRole::Destination => {
                Err(Error::Validation(
                    "is_data_updated update can only be made at a destination".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Clear the acknowledgement of the named destination, signalling that
/// retransmission is needed. The destination must be known.
pub fn clear_receival(
    destinations: &[Destination],
    failed_by: &str,
) -> Result<Vec<Destination>> {
    let mut found = false;
    let cleared: Vec<Destination> = destinations
        .iter()
        .map(|destination| {
            let mut updated = destination.clone();
            if updated.node_id == failed_by {
                found = true;
                updated.received_at = None;
            }
            updated
        })
        .collect();

    if !found {
        return Err(Error::Validation(format!(
            "node in receival_failed_by cannot be found in destinations: {}",
            failed_by
        )));
    }

    Ok(cleared)
}
