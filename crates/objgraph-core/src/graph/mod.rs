//! The serialized object graph: nodes, pointers, and the graph container.
//!
//! Nodes are stored in insertion order (the builder inserts children before
//! their owners) with an id index for lookup. Pointers live twice: in the
//! owning node and in the graph-wide ordered list that drives resolution.

pub mod node;
pub mod pointer;

use std::collections::HashMap;

use thiserror::Error;

use self::node::{Node, NodeId};
use self::pointer::PointerInfo;

/// Errors that can occur during graph construction or validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("dangling pointer: node {from} -[{field}]-> node {to}")]
    DanglingPointer {
        from: NodeId,
        to: NodeId,
        field: String,
    },

    #[error("root node {0} not in graph")]
    MissingRoot(NodeId),
}

/// Container for one serialized object graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    root_id: NodeId,
    nodes: Vec<Node>,
    all_pointers: Vec<PointerInfo>,
    /// Index: node id -> position in `nodes`
    index: HashMap<NodeId, usize>,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_id(&self) -> NodeId {
        self.root_id
    }

    pub fn set_root(&mut self, id: NodeId) {
        self.root_id = id;
    }

    /// The root node, if present.
    pub fn root(&self) -> Option<&Node> {
        self.get_node(self.root_id)
    }

    /// Insert a node. Pointers the node already owns are appended to the
    /// graph-wide list in their existing order.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        let id = node.id;
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.all_pointers.extend(node.pointers.iter().cloned());
        self.index.insert(id, self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    /// Append a pointer to the graph-wide list, and to its owner when the
    /// owner is present. Dangling endpoints are tolerated here and reported by
    /// [`Graph::validate`].
    pub fn add_pointer(&mut self, pointer: PointerInfo) {
        if let Some(owner) = self.get_node_mut(pointer.from_node_id) {
            owner.pointers.push(pointer.clone());
        }
        self.all_pointers.push(pointer);
    }

    /// Look up a node by ID.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// Look up a node by ID (mutable).
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    /// Re-derive every node's `pointers` from the graph-wide list.
    pub fn rebuild_node_pointers(&mut self) {
        for node in &mut self.nodes {
            node.pointers.clear();
        }
        for pointer in &self.all_pointers {
            if let Some(&i) = self.index.get(&pointer.from_node_id) {
                self.nodes[i].pointers.push(pointer.clone());
            }
        }
    }

    /// Check structural invariants: the root exists and every pointer
    /// endpoint names a node in the graph.
    pub fn validate(&self) -> Result<(), Vec<GraphError>> {
        let mut errors = Vec::new();
        if !self.contains_node(self.root_id) {
            errors.push(GraphError::MissingRoot(self.root_id));
        }
        for p in &self.all_pointers {
            if !self.contains_node(p.from_node_id) || !self.contains_node(p.to_node_id) {
                errors.push(GraphError::DanglingPointer {
                    from: p.from_node_id,
                    to: p.to_node_id,
                    field: p.field_name.clone(),
                });
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of pointers in the graph-wide list.
    pub fn pointer_count(&self) -> usize {
        self.all_pointers.len()
    }

    /// Number of chunks across all nodes.
    pub fn chunk_count(&self) -> usize {
        self.nodes.iter().map(|n| n.chunks.len()).sum()
    }

    /// Iterate over nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Iterate over the graph-wide pointer list in order.
    pub fn pointers(&self) -> impl Iterator<Item = &PointerInfo> {
        self.all_pointers.iter()
    }

    /// The graph-wide pointer list.
    pub fn all_pointers(&self) -> &[PointerInfo] {
        &self.all_pointers
    }
}
