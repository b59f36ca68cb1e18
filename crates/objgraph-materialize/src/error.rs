//! Materialization errors.

use thiserror::Error;

use objgraph_core::graph::node::{NodeId, TypeTag};
use objgraph_core::model::ModelError;
use objgraph_core::value::ValueError;

/// Errors that abort a materialization call. Every object instantiated
/// before the failure is released.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("root node {0} not in graph")]
    MissingRoot(NodeId),

    #[error("node {node_id} ({tag}): invalid payload: {reason}")]
    InvalidPayload {
        node_id: NodeId,
        tag: TypeTag,
        reason: String,
    },

    #[error("node {node_id}: cannot resolve record type {module_name}.{type_name}")]
    UnresolvableType {
        node_id: NodeId,
        module_name: String,
        type_name: String,
    },

    #[error("node {node_id} ({tag}): construction failed: {source}")]
    ConstructionFailed {
        node_id: NodeId,
        tag: TypeTag,
        #[source]
        source: ModelError,
    },

    #[error("node {node_id}: invalid procedure blob: {source}")]
    InvalidProcedure {
        node_id: NodeId,
        #[source]
        source: ValueError,
    },

    #[error("{kind} count {count} exceeds limit {limit}")]
    ThresholdExceeded {
        kind: &'static str,
        count: usize,
        limit: usize,
    },
}
