//! Core data structures for objgraph: the node/pointer graph model, the chunk
//! store, value trees, the host object-model adapter contract, and the graph
//! builder.
//!
//! Encoding starts here: [`builder::serialize`] walks a host object graph
//! through an [`model::Inspect`] adapter and produces a [`graph::Graph`] that
//! the wire codec can persist.

pub mod builder;
pub mod chunk;
pub mod graph;
pub mod hash;
pub mod model;
pub mod value;

pub use builder::{serialize, BuildError, GraphBuilder, DEFAULT_MAX_DEPTH};
pub use chunk::{Chunk, ChunkError, ChunkId, ChunkStore, CHUNK_SIZE};
pub use graph::node::{Node, NodeId, NodeMetadata, TypeTag};
pub use graph::pointer::{PointerInfo, Slot};
pub use graph::{Graph, GraphError};
pub use model::{
    Construct, FunctionShell, FunctionView, HostModel, Inspect, ModelError, ObjectView,
    ProcedureView,
};
pub use value::{ValueError, ValueTree};
