//! Destination Diff
//!
//! Set difference between an object's previous and new destination lists.

use crate::object::Destination;

/// Per-peer intents derived from a destination-list change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationDiff {
    /// Peers that have never seen the object
    pub to_create: Vec<String>,
    /// Peers that already hold it and need the new metadata
    pub to_update: Vec<String>,
    /// Peers that must drop their copy
    pub to_remove: Vec<String>,
}

impl DestinationDiff {
    /// Compute the diff between `old` and `new` destination lists.
    ///
    /// Peers only in `new` are created; peers only in `old` are removed;
    /// peers in both are re-pushed only when the mutation carried a version
    /// change — a destination-set-only change does not re-send metadata.
    ///
    /// Creation is the special case `old = []`, removal is `new = []`, and
    /// a mutation without a destination delta passes `new = old`.
    pub fn compute(old: &[Destination], new: &[Destination], version_changed: bool) -> Self {
        let mut diff = DestinationDiff::default();

        for dest in new {
            if !old.iter().any(|d| d.node_id == dest.node_id) {
                diff.to_create.push(dest.node_id.clone());
            }
        }

        for dest in old {
            let in_new = new.iter().any(|d| d.node_id == dest.node_id);
            if in_new {
                if version_changed {
                    diff.to_update.push(dest.node_id.clone());
                }
            } else {
                diff.to_remove.push(dest.node_id.clone());
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_remove.is_empty()
    }
}
