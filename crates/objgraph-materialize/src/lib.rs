//! Graph materialization for objgraph.
//!
//! Turns a decoded [`Graph`](objgraph_core::Graph) back into host objects
//! through a [`Construct`](objgraph_core::Construct) adapter, in two passes:
//!
//! 1. **Instantiate**: every non-Reference node becomes a shell object built
//!    only from its own payload and metadata.
//! 2. **Resolve**: every pointer is written back into its owner's slot, with
//!    Reference nodes followed to their targets.
//!
//! Resolution is best-effort: unresolved edges and failed writes are recorded
//! in a [`MaterializeReport`] and only abort the call past the thresholds of
//! a [`ResolvePolicy`].

pub mod error;
pub mod instantiate;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod resolve;

pub use error::MaterializeError;
pub use instantiate::{instantiate_all, Shells};
pub use pipeline::{deserialize, Materialized};
pub use policy::ResolvePolicy;
pub use report::{MaterializeReport, ResolveIssue};
pub use resolve::resolve_pointers;
