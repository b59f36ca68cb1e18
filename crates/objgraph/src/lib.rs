//! Cyclic object-graph serializer.
//!
//! Encodes an arbitrary host object graph (cycles and shared references
//! included) into a compressed, self-verifying blob and rebuilds an
//! equivalent graph from it. The host object model is reached only through
//! the [`Inspect`] and [`Construct`] adapter traits.
//!
//! ```text
//! encode: host objects --Inspect--> Graph --wire--> bytes
//! decode: bytes --wire--> Graph --Construct--> host objects
//! ```
//!
//! The stages live in their own crates and their entry points are
//! re-exported here:
//! `objgraph-core` (graph model, builder, value trees), `objgraph-wire`
//! (binary format) and `objgraph-materialize` (two-phase rebuild).

mod codec;
mod config;
mod error;

pub use codec::{decode, encode, load, save, Decoded};
pub use config::CodecConfig;
pub use error::Error;

pub use objgraph_core::{
    serialize, BuildError, Construct, Graph, GraphBuilder, HostModel, Inspect, ModelError,
    ObjectView, DEFAULT_MAX_DEPTH,
};
pub use objgraph_materialize::{
    deserialize, MaterializeError, MaterializeReport, ResolveIssue, ResolvePolicy,
};
pub use objgraph_wire::{ChecksumPolicy, IntegrityReport, WireError};

