//! Origin-Side Replication
//!
//! Turns object mutations at the origin into per-peer propagation intents:
//! the destination diff decides which peers need a create, a metadata
//! re-push, or a removal, and the propagator records those intents with the
//! replay dispatcher.

mod diff;
mod propagate;

pub use diff::DestinationDiff;
pub use propagate::Propagator;
