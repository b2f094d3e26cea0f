//! Object Validation
//!
//! Field-level validation limits for user-supplied metadata.

use serde_json::{Map, Value};

use super::{Destination, ObjectPatch};
use crate::error::{Error, Result};

/// Payload MIME type assumed when the client does not provide one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MAX_LABELS: usize = 10;
const MAX_ATTRIBUTES: usize = 10;
const MAX_TOTAL_LABELS_LEN: usize = 500;
const MAX_TOTAL_ATTRIBUTES_LEN: usize = 500;

/// Validate and normalize a labels/attributes map: null and empty values
/// are dropped, nested structures are rejected, and entry-count and total
/// serialized-size limits apply.
pub fn validate_scalar_map(
    unformatted: &Map<String, Value>,
    kind: &str,
    max_entries: usize,
    max_len: usize,
) -> Result<Map<String, Value>> {
    let formatted: Map<String, Value> = unformatted
        .iter()
        .filter(|(_, value)| !value.is_null() && *value != &Value::String(String::new()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if formatted.len() > max_entries {
        return Err(Error::Validation(format!(
            "value of '{}' cannot have more than {} properties, current: {}",
            kind,
            max_entries,
            formatted.len()
        )));
    }

    let serialized_len = serde_json::to_string(&formatted)?.len();
    if serialized_len > max_len {
        return Err(Error::Validation(format!(
            "value of '{}' cannot have serialized length of more than {}, current: {}",
            kind, max_len, serialized_len
        )));
    }

    for (key, value) in formatted.iter() {
        if value.is_object() || value.is_array() {
            return Err(Error::Validation(format!(
                "value of '{}' cannot contain nested structures, incorrect value at '{}'",
                kind, key
            )));
        }
    }

    Ok(formatted)
}

pub fn validate_labels(labels: &Map<String, Value>) -> Result<Map<String, Value>> {
    validate_scalar_map(labels, "labels", MAX_LABELS, MAX_TOTAL_LABELS_LEN)
}

pub fn validate_attributes(attributes: &Map<String, Value>) -> Result<Map<String, Value>> {
    validate_scalar_map(
        attributes,
        "attributes",
        MAX_ATTRIBUTES,
        MAX_TOTAL_ATTRIBUTES_LEN,
    )
}

pub fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(Error::Validation(
            "version cannot be an empty string".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_mime_type(mime_type: &str) -> Result<()> {
    if mime_type.is_empty() {
        return Err(Error::Validation(
            "mime_type cannot be an empty string".to_string(),
        ));
    }
    Ok(())
}

/// A destination list must name at least one node and every entry must
/// carry a node id.
pub fn validate_destinations(destinations: &[Destination]) -> Result<()> {
    if destinations.is_empty() {
        return Err(Error::Validation(
            "minimum number of destinations is 1".to_string(),
        ));
    }
    if destinations.iter().any(|d| d.node_id.is_empty()) {
        return Err(Error::Validation(
            "every destination must include a node_id".to_string(),
        ));
    }
    Ok(())
}

/// Validate every present field of a patch and return the normalized copy
pub fn validate_patch(patch: &ObjectPatch) -> Result<ObjectPatch> {
    let mut normalized = patch.clone();

    if let Some(version) = &normalized.version {
        validate_version(version)?;
    }
    if let Some(mime_type) = &normalized.mime_type {
        validate_mime_type(mime_type)?;
    }
    if let Some(labels) = &normalized.labels {
        normalized.labels = Some(validate_labels(labels)?);
    }
    if let Some(attributes) = &normalized.attributes {
        normalized.attributes = Some(validate_attributes(attributes)?);
    }
    if let Some(destinations) = &normalized.destinations {
        validate_destinations(destinations)?;
    }

    Ok(normalized)
}
