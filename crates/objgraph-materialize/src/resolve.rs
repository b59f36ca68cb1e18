//! Resolution pass: write every pointer back into its owner's slot.
//!
//! Pointers are processed in graph-wide order. Both endpoints are looked up
//! through Reference nodes. Mapping entries arrive as a `key:<k>` pointer
//! followed by a `val:<k>` pointer; pending keys are queued per owner and
//! logical key so repeated display strings still pair in order.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use objgraph_core::graph::node::{NodeId, TypeTag};
use objgraph_core::graph::pointer::{PointerInfo, Slot};
use objgraph_core::graph::Graph;
use objgraph_core::model::{Construct, ModelError};

use crate::error::MaterializeError;
use crate::instantiate::Shells;
use crate::policy::ResolvePolicy;
use crate::report::{MaterializeReport, ResolveIssue};

/// Resolve every pointer of `graph` against `shells`, recording skipped
/// pointers in `report`. Fails only when `policy` is exceeded. Objects
/// created here (fallback dict keys) are tracked in `shells`.
pub fn resolve_pointers<M: Construct>(
    model: &mut M,
    graph: &Graph,
    shells: &mut Shells<M::Handle>,
    policy: &ResolvePolicy,
    report: &mut MaterializeReport,
) -> Result<(), MaterializeError> {
    let mut pending_keys: HashMap<(NodeId, String), VecDeque<M::Handle>> = HashMap::new();

    for pointer in graph.pointers() {
        let owner_id = shells.resolve_id(pointer.from_node_id);
        let owner = owner_id.and_then(|id| shells.get(id));
        let target = shells.get(pointer.to_node_id);

        let (Some(owner_id), Some(owner), Some(target)) = (owner_id, owner, target) else {
            warn!(
                from = pointer.from_node_id,
                to = pointer.to_node_id,
                field = %pointer.field_name,
                "skipping unresolved pointer"
            );
            report.issues.push(ResolveIssue::UnresolvedReference {
                from_node: pointer.from_node_id,
                to_node: pointer.to_node_id,
                field: pointer.field_name.clone(),
            });
            policy.enforce(report)?;
            continue;
        };

        let tag = graph
            .get_node(owner_id)
            .map(|n| n.tag)
            .unwrap_or(TypeTag::Custom);

        let outcome = match tag {
            TypeTag::List => match pointer.slot() {
                Slot::Index(i) => Write::Done(model.set_item(owner, i, target)),
                _ => Write::Malformed,
            },
            TypeTag::Tuple => match pointer.slot() {
                Slot::Index(i) => {
                    let len = shells.shell_len(owner_id).unwrap_or(0);
                    if i >= len {
                        Write::Done(Err(ModelError::IndexOutOfRange { index: i, len }))
                    } else {
                        Write::Done(model.set_item(owner, i, target))
                    }
                }
                _ => Write::Malformed,
            },
            TypeTag::Dict => match pointer.slot() {
                Slot::Key(k) => {
                    pending_keys
                        .entry((owner_id, k))
                        .or_default()
                        .push_back(target);
                    Write::Deferred
                }
                Slot::Value(k) => {
                    let queued = pending_keys
                        .get_mut(&(owner_id, k.clone()))
                        .and_then(VecDeque::pop_front);
                    let key = match queued {
                        Some(key) => Ok(key),
                        None => model.new_str(&k).map(|key| shells.track(key)),
                    };
                    Write::Done(key.and_then(|key| model.insert_entry(owner, key, target)))
                }
                _ => Write::Malformed,
            },
            TypeTag::Set => match pointer.slot() {
                Slot::Index(_) => Write::Done(model.add_member(owner, target)),
                _ => Write::Malformed,
            },
            TypeTag::Function => match pointer.slot() {
                Slot::Closure(i) if i < shells.closure_slots(owner_id) => {
                    Write::Done(model.set_closure_cell(owner, i, target))
                }
                Slot::Closure(_) => Write::Malformed,
                _ => Write::Done(model.set_attribute(owner, &pointer.field_name, target)),
            },
            _ => Write::Done(model.set_attribute(owner, &pointer.field_name, target)),
        };

        match outcome {
            Write::Done(Ok(())) => report.pointers_resolved += 1,
            Write::Deferred => {}
            Write::Done(Err(e)) => {
                record_failure(report, pointer, e);
                policy.enforce(report)?;
            }
            Write::Malformed => {
                warn!(
                    from = pointer.from_node_id,
                    owner = %tag,
                    field = %pointer.field_name,
                    "malformed slot"
                );
                report.issues.push(ResolveIssue::MalformedSlot {
                    from_node: pointer.from_node_id,
                    owner: tag,
                    field: pointer.field_name.clone(),
                });
                policy.enforce(report)?;
            }
        }
    }

    Ok(())
}

enum Write {
    Done(Result<(), ModelError>),
    /// Key pointers wait for their value pointer.
    Deferred,
    Malformed,
}

fn record_failure(report: &mut MaterializeReport, pointer: &PointerInfo, error: ModelError) {
    warn!(
        from = pointer.from_node_id,
        to = pointer.to_node_id,
        field = %pointer.field_name,
        error = %error,
        "write-back failed"
    );
    report.issues.push(ResolveIssue::WriteFailed {
        from_node: pointer.from_node_id,
        to_node: pointer.to_node_id,
        field: pointer.field_name.clone(),
        reason: error.to_string(),
    });
}
