//! Replicated Object Model
//!
//! Defines the versioned object: metadata, optional binary payload marker,
//! the origin/destination role split, and the per-destination delivery
//! tracking kept by the origin copy.

pub mod store;
pub mod validate;

pub use store::ObjectStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role a node plays for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceRole {
    /// The node that accepted the original creation; sole authority for
    /// metadata and the destination list
    Origin,
    /// A node the object is replicated to
    Destination,
}

impl std::fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceRole::Origin => write!(f, "ORIGIN"),
            ServiceRole::Destination => write!(f, "DESTINATION"),
        }
    }
}

/// Delivery state of one destination, tracked by the origin copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Destination node identifier
    pub node_id: String,
    /// When the destination acknowledged payload receipt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    /// When the destination confirmed removal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Destination {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            received_at: None,
            deleted_at: None,
        }
    }
}

/// Composite key of an object: `(object_type, id)` is unique and immutable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub object_type: String,
    pub object_id: String,
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.object_type, self.object_id)
    }
}

/// A versioned replicated object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    /// Object identifier, unique within its type
    pub id: String,
    /// Object type, the other half of the key
    pub object_type: String,
    /// Client-assigned version marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Payload MIME type
    pub mime_type: String,
    /// Flat user labels
    #[serde(default)]
    pub labels: Map<String, Value>,
    /// Flat user attributes
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Whether a binary payload is present locally
    #[serde(default)]
    pub has_data: bool,
    /// Node the object was created on
    pub origin_id: String,
    /// This node's role for the object
    pub service_role: ServiceRole,
    /// Destination delivery tracking; meaningful on the origin copy only
    #[serde(default)]
    pub destinations: Vec<Destination>,
    /// Set once deletion has been requested at the origin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Object {
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            object_type: self.object_type.clone(),
            object_id: self.id.clone(),
        }
    }

    pub fn destination(&self, node_id: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.node_id == node_id)
    }

    /// Whether deletion has been requested and the object is being retired
    pub fn is_retiring(&self) -> bool {
        self.deletion_requested_at.is_some()
    }

    /// Apply a patch, returning the merged object with `updated_at`
    /// refreshed. Field-level authorization is the caller's concern.
    pub fn apply_patch(&self, patch: &ObjectPatch) -> Object {
        let mut updated = self.clone();

        if let Some(version) = &patch.version {
            updated.version = Some(version.clone());
        }
        if let Some(mime_type) = &patch.mime_type {
            updated.mime_type = mime_type.clone();
        }
        if let Some(labels) = &patch.labels {
            updated.labels = labels.clone();
        }
        if let Some(attributes) = &patch.attributes {
            updated.attributes = attributes.clone();
        }
        if let Some(destinations) = &patch.destinations {
            updated.destinations = destinations.clone();
        }
        if let Some(has_data) = patch.has_data {
            updated.has_data = has_data;
        }
        if let Some(at) = patch.deletion_requested_at {
            updated.deletion_requested_at = Some(at);
        }

        updated.updated_at = Utc::now();
        updated
    }
}

/// A partial update against a stored object
///
/// Only fields present in the patch are merged. Origin-authored fields are
/// enumerable through [`ObjectPatch::origin_only_fields`], which is what the
/// role-based authorization checks act on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatch {
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_data: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_requested_at: Option<DateTime<Utc>>,
}

impl ObjectPatch {
    pub fn is_empty(&self) -> bool {
        self.origin_only_fields().is_empty()
            && self.has_data.is_none()
            && self.deletion_requested_at.is_none()
    }

    /// Names of the set fields that only an origin may mutate
    pub fn origin_only_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.version.is_some() {
            fields.push("version");
        }
        if self.mime_type.is_some() {
            fields.push("mime_type");
        }
        if self.labels.is_some() {
            fields.push("labels");
        }
        if self.attributes.is_some() {
            fields.push("attributes");
        }
        if self.destinations.is_some() {
            fields.push("destinations");
        }
        fields
    }

    /// Whether the patch carries a version change (re-push trigger)
    pub fn includes_version_change(&self) -> bool {
        self.version.is_some()
    }
}

/// Request to create a new object at its origin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewObject {
    /// Object id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    /// Origin node; defaults to the current node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

/// Optional predicate for object listing
#[derive(Debug, Clone, Default)]
pub struct ObjectFilter {
    /// Keep only objects of this type
    pub object_type: Option<String>,
    /// Keep only objects with this node in their destination list
    pub destination_node_id: Option<String>,
}

impl ObjectFilter {
    pub fn matches(&self, object: &Object) -> bool {
        if let Some(object_type) = &self.object_type {
            if &object.object_type != object_type {
                return false;
            }
        }
        if let Some(node_id) = &self.destination_node_id {
            if object.destination(node_id).is_none() {
                return false;
            }
        }
        true
    }
}
