//! Materialization orchestrator: instantiate -> resolve -> report.

use tracing::debug;

use objgraph_core::graph::Graph;
use objgraph_core::model::Construct;

use crate::error::MaterializeError;
use crate::instantiate::{instantiate_all, Shells};
use crate::policy::ResolvePolicy;
use crate::report::MaterializeReport;
use crate::resolve::resolve_pointers;

/// Output of a successful materialization.
#[derive(Debug)]
pub struct Materialized<H> {
    /// The object standing for the graph's root node.
    pub root: H,
    pub report: MaterializeReport,
}

/// Rebuild the host object graph described by `graph`.
///
/// On any fatal error every object created so far is released through
/// [`Construct::release`] before the error is returned.
pub fn deserialize<M: Construct>(
    model: &mut M,
    graph: &Graph,
    policy: &ResolvePolicy,
) -> Result<Materialized<M::Handle>, MaterializeError> {
    let root_id = graph.root_id();
    if !graph.contains_node(root_id) {
        return Err(MaterializeError::MissingRoot(root_id));
    }

    // Pass 1: shells
    let mut shells = Shells::new();
    if let Err(e) = instantiate_all(model, graph, &mut shells) {
        shells.release_all(model);
        return Err(e);
    }

    let Some(root) = shells.get(root_id) else {
        shells.release_all(model);
        return Err(MaterializeError::MissingRoot(root_id));
    };

    let mut report = MaterializeReport {
        nodes_instantiated: shells.len(),
        references: shells.reference_count(),
        skipped_defaults: shells.skipped_defaults().to_vec(),
        ..Default::default()
    };

    // Pass 2: write-back
    if let Err(e) = resolve_pointers(model, graph, &mut shells, policy, &mut report) {
        shells.release_all(model);
        return Err(e);
    }

    debug!(
        objects = report.nodes_instantiated,
        references = report.references,
        resolved = report.pointers_resolved,
        issues = report.issues.len(),
        "materialized object graph"
    );

    Ok(Materialized { root, report })
}
