//! Graph construction: walks a host object graph and emits nodes and pointers.
//!
//! The walk is a depth-first traversal keyed on object identity. The first
//! visit of an object allocates its node id and records it before descending,
//! so any later visit (a cycle back-edge or a shared reference) produces a
//! small `Reference` node naming the original instead of re-descending.
//! Nodes are inserted in post-order: every child precedes its owner.

use std::collections::HashMap;

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use thiserror::Error;
use tracing::debug;

use crate::chunk::ChunkStore;
use crate::graph::node::{Node, NodeId, TypeTag};
use crate::graph::pointer::{PointerInfo, Slot};
use crate::graph::{Graph, GraphError};
use crate::model::{FunctionView, Inspect, ModelError, ObjectView};
use crate::value::{encode_value, kwdefaults_to_blob, KeywordDefault, ValueError};

/// Default bound on nesting depth. The root is at depth 0.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Errors that abort graph construction. No partial graph is returned.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("maximum nesting depth {limit} exceeded")]
    DepthExceeded { limit: usize },

    #[error("cannot serialize objects of type {type_name}")]
    UnsupportedType { type_name: String },

    #[error("object model error: {0}")]
    Model(#[from] ModelError),

    #[error("value tree error: {0}")]
    Value(#[from] ValueError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

/// Serialize `root` with default settings.
pub fn serialize<M: Inspect>(model: &M, root: M::Handle) -> Result<Graph, BuildError> {
    GraphBuilder::new().build(model, root)
}

/// Configurable entry point for graph construction.
///
/// The builder itself holds only settings; each [`GraphBuilder::build`] call
/// starts from fresh id counters and an empty visited map.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    max_depth: usize,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the nesting bound.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Walk the graph reachable from `root`.
    pub fn build<M: Inspect>(&self, model: &M, root: M::Handle) -> Result<Graph, BuildError> {
        let mut session = Session {
            model,
            max_depth: self.max_depth,
            visited: HashMap::new(),
            next_id: 0,
            chunks: ChunkStore::new(),
            graph: Graph::new(),
        };
        let root_id = session.visit(root, 0)?;
        let mut graph = session.graph;
        graph.set_root(root_id);
        debug!(
            nodes = graph.node_count(),
            pointers = graph.pointer_count(),
            chunks = graph.chunk_count(),
            "built object graph"
        );
        Ok(graph)
    }
}

/// Per-call walk state.
struct Session<'m, M: Inspect> {
    model: &'m M,
    max_depth: usize,
    visited: HashMap<M::Handle, NodeId>,
    next_id: NodeId,
    chunks: ChunkStore,
    graph: Graph,
}

impl<M: Inspect> Session<'_, M> {
    fn alloc_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn visit(&mut self, handle: M::Handle, depth: usize) -> Result<NodeId, BuildError> {
        if depth > self.max_depth {
            return Err(BuildError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        if let Some(&target) = self.visited.get(&handle) {
            let id = self.alloc_id();
            let node = Node::new(id, TypeTag::Reference)
                .with_chunks(self.chunks.create_chunks(&target.to_le_bytes()));
            return Ok(self.graph.add_node(node)?);
        }

        let id = self.alloc_id();
        self.visited.insert(handle, id);

        let node = match self.model.inspect(handle)? {
            ObjectView::None => Node::new(id, TypeTag::None).with_type_name("NoneType"),
            ObjectView::Bool(v) => self.scalar(id, TypeTag::Bool, "bool", &[u8::from(v)]),
            ObjectView::Int(v) => self.int_node(id, &v),
            ObjectView::Float(v) => {
                self.scalar(id, TypeTag::Float, "float", &v.to_bits().to_le_bytes())
            }
            ObjectView::Str(s) => {
                let mut node = self.scalar(id, TypeTag::String, "str", s.as_bytes());
                node.meta.total_size = s.len();
                node
            }
            ObjectView::Bytes { type_name, data } => {
                let mut node = self.scalar(id, TypeTag::Bytes, &type_name, &data);
                node.meta.total_size = data.len();
                node
            }
            ObjectView::List(items) => self.sequence(id, TypeTag::List, "list", items, depth)?,
            ObjectView::Tuple(items) => self.sequence(id, TypeTag::Tuple, "tuple", items, depth)?,
            ObjectView::Set(items) => self.sequence(id, TypeTag::Set, "set", items, depth)?,
            ObjectView::Dict(entries) => self.mapping(id, entries, depth)?,
            ObjectView::Function(f) => self.function(id, f, depth)?,
            ObjectView::Procedure(p) => {
                let mut node = Node::new(id, TypeTag::Custom).with_type_name("code");
                node.meta.module_name = "builtins".into();
                node.meta.name = p.name;
                node
            }
            ObjectView::Module { name } => {
                let mut node = Node::new(id, TypeTag::Module).with_type_name("module");
                node.meta.module_name = name;
                node
            }
            ObjectView::Record {
                type_name,
                module_name,
                attributes,
            } => {
                let mut node = Node::new(id, TypeTag::Custom).with_type_name(type_name);
                node.meta.module_name = module_name;
                if let Some(attributes) = attributes {
                    node.meta.has_attributes = true;
                    self.attributes(&mut node, attributes, depth)?;
                }
                node
            }
            ObjectView::OsHandle { type_name } => {
                return Err(BuildError::UnsupportedType { type_name });
            }
        };

        Ok(self.graph.add_node(node)?)
    }

    fn scalar(&mut self, id: NodeId, tag: TypeTag, type_name: &str, payload: &[u8]) -> Node {
        Node::new(id, tag)
            .with_type_name(type_name)
            .with_chunks(self.chunks.create_chunks(payload))
    }

    /// Integers that fit in i64 take the 8-byte fast path; larger ones are
    /// stored as minimal little-endian two's-complement bytes.
    fn int_node(&mut self, id: NodeId, value: &BigInt) -> Node {
        match value.to_i64() {
            Some(small) => self.scalar(id, TypeTag::Int, "int", &small.to_le_bytes()),
            None => {
                let digits = value.to_signed_bytes_le();
                let mut node = self.scalar(id, TypeTag::Int, "int", &digits);
                node.meta.is_bigint = true;
                node.meta.bigint_num_digits = digits.len();
                node
            }
        }
    }

    fn sequence(
        &mut self,
        id: NodeId,
        tag: TypeTag,
        type_name: &str,
        items: Vec<M::Handle>,
        depth: usize,
    ) -> Result<Node, BuildError> {
        let mut node = Node::new(id, tag).with_type_name(type_name);
        node.meta.total_size = items.len();
        for (i, item) in items.into_iter().enumerate() {
            let child = self.visit(item, depth + 1)?;
            node.pointers.push(PointerInfo::new(id, child, &Slot::Index(i)));
        }
        Ok(node)
    }

    /// Each entry contributes a key pointer then a value pointer, linked by
    /// the key's display string.
    fn mapping(
        &mut self,
        id: NodeId,
        entries: Vec<(M::Handle, M::Handle)>,
        depth: usize,
    ) -> Result<Node, BuildError> {
        let mut node = Node::new(id, TypeTag::Dict).with_type_name("dict");
        node.meta.total_size = entries.len();
        for (key, value) in entries {
            let label = self.model.display(key);
            let key_id = self.visit(key, depth + 1)?;
            let value_id = self.visit(value, depth + 1)?;
            node.pointers.push(PointerInfo::new(id, key_id, &Slot::Key(label.clone())));
            node.pointers.push(PointerInfo::new(id, value_id, &Slot::Value(label.clone())));
            node.meta.attr_node_ids.insert(label.clone(), value_id);
            node.meta.attr_names.push(label);
        }
        Ok(node)
    }

    fn function(
        &mut self,
        id: NodeId,
        f: FunctionView<M::Handle>,
        depth: usize,
    ) -> Result<Node, BuildError> {
        let mut node = Node::new(id, TypeTag::Function).with_type_name("function");
        node.meta.name = f.name;
        node.meta.func_code = encode_value(self.model, f.procedure)?.to_blob()?;

        for (i, cell) in f.closure.into_iter().enumerate() {
            if let Some(cell) = cell {
                let child = self.visit(cell, depth + 1)?;
                node.pointers.push(PointerInfo::new(id, child, &Slot::Closure(i)));
            }
        }

        if let Some(defaults) = f.defaults {
            node.meta.func_defaults = encode_value(self.model, defaults)?.to_blob()?;
        }
        if !f.kwdefaults.is_empty() {
            let kwdefaults = f
                .kwdefaults
                .into_iter()
                .map(|(name, h)| {
                    Ok(KeywordDefault {
                        name,
                        value: encode_value(self.model, h)?,
                    })
                })
                .collect::<Result<Vec<_>, ValueError>>()?;
            node.meta.func_kwdefaults = kwdefaults_to_blob(&kwdefaults)?;
        }

        if !f.attributes.is_empty() {
            node.meta.has_attributes = true;
            self.attributes(&mut node, f.attributes, depth)?;
        }
        Ok(node)
    }

    fn attributes(
        &mut self,
        node: &mut Node,
        attributes: Vec<(String, M::Handle)>,
        depth: usize,
    ) -> Result<(), BuildError> {
        for (name, value) in attributes {
            let child = self.visit(value, depth + 1)?;
            node.pointers.push(PointerInfo::new(node.id, child, &Slot::Attribute(name.clone())));
            node.meta.attr_node_ids.insert(name.clone(), child);
            node.meta.attr_names.push(name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HostModel;

    /// Minimal inspect-only model: a vector of views addressed by index.
    struct Fixture {
        objects: Vec<ObjectView<usize>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                objects: Vec::new(),
            }
        }

        fn add(&mut self, view: ObjectView<usize>) -> usize {
            self.objects.push(view);
            self.objects.len() - 1
        }

        fn set(&mut self, handle: usize, view: ObjectView<usize>) {
            self.objects[handle] = view;
        }
    }

    impl HostModel for Fixture {
        type Handle = usize;
        type TypeRef = ();
    }

    impl Inspect for Fixture {
        fn inspect(&self, handle: usize) -> Result<ObjectView<usize>, ModelError> {
            self.objects
                .get(handle)
                .cloned()
                .ok_or_else(|| ModelError::UnknownHandle(handle.to_string()))
        }

        fn display(&self, handle: usize) -> String {
            match &self.objects[handle] {
                ObjectView::Str(s) => s.clone(),
                ObjectView::Int(i) => i.to_string(),
                other => other.kind_name().to_string(),
            }
        }

        fn repr(&self, handle: usize) -> String {
            format!("<object {handle}>")
        }
    }

    fn nested(fixture: &mut Fixture, layers: usize) -> usize {
        let mut inner = fixture.add(ObjectView::Int(BigInt::from(1)));
        for _ in 0..layers {
            inner = fixture.add(ObjectView::List(vec![inner]));
        }
        inner
    }

    #[test]
    fn scalar_int_fast_path() {
        let mut fx = Fixture::new();
        let h = fx.add(ObjectView::Int(BigInt::from(-2)));
        let graph = serialize(&fx, h).unwrap();

        assert_eq!(graph.node_count(), 1);
        let node = graph.root().unwrap();
        assert_eq!(node.tag, TypeTag::Int);
        assert_eq!(node.payload(), (-2i64).to_le_bytes());
        assert!(!node.meta.is_bigint);
    }

    #[test]
    fn big_int_uses_signed_bytes() {
        let mut fx = Fixture::new();
        let big: BigInt = BigInt::from(i64::MAX) + 1;
        let h = fx.add(ObjectView::Int(big.clone()));
        let graph = serialize(&fx, h).unwrap();

        let node = graph.root().unwrap();
        assert!(node.meta.is_bigint);
        assert_eq!(node.meta.bigint_num_digits, 9);
        assert_eq!(BigInt::from_signed_bytes_le(&node.payload()), big);
    }

    #[test]
    fn self_cycle_emits_one_reference() {
        let mut fx = Fixture::new();
        let list = fx.add(ObjectView::None);
        fx.set(list, ObjectView::List(vec![list]));
        let graph = serialize(&fx, list).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.root_id(), 0);
        let reference = graph.get_node(1).unwrap();
        assert_eq!(reference.tag, TypeTag::Reference);
        assert_eq!(reference.reference_target(), Some(0));

        let p = &graph.all_pointers()[0];
        assert_eq!((p.from_node_id, p.to_node_id), (0, 1));
        assert_eq!(p.field_name, "0");
    }

    #[test]
    fn post_order_insertion() {
        let mut fx = Fixture::new();
        let a = fx.add(ObjectView::Int(BigInt::from(1)));
        let b = fx.add(ObjectView::Int(BigInt::from(2)));
        let root = fx.add(ObjectView::Tuple(vec![a, b]));
        let graph = serialize(&fx, root).unwrap();

        let order: Vec<NodeId> = graph.nodes().map(|n| n.id).collect();
        assert_eq!(order, [1, 2, 0]);
    }

    #[test]
    fn shared_reference_visited_once() {
        let mut fx = Fixture::new();
        let shared = fx.add(ObjectView::List(vec![]));
        let root = fx.add(ObjectView::List(vec![shared, shared]));
        let graph = serialize(&fx, root).unwrap();

        let tags: Vec<TypeTag> = graph.nodes().map(|n| n.tag).collect();
        assert_eq!(tags, [TypeTag::List, TypeTag::Reference, TypeTag::List]);
        assert_eq!(graph.get_node(2).unwrap().reference_target(), Some(1));
    }

    #[test]
    fn mapping_pairs_keys_and_values() {
        let mut fx = Fixture::new();
        let ka = fx.add(ObjectView::Str("a".into()));
        let va = fx.add(ObjectView::Int(BigInt::from(1)));
        let kb = fx.add(ObjectView::Str("b".into()));
        let vb = fx.add(ObjectView::Int(BigInt::from(2)));
        let root = fx.add(ObjectView::Dict(vec![(ka, va), (kb, vb)]));
        let graph = serialize(&fx, root).unwrap();

        let fields: Vec<&str> = graph.pointers().map(|p| p.field_name.as_str()).collect();
        assert_eq!(fields, ["key:a", "val:a", "key:b", "val:b"]);
        let root = graph.root().unwrap();
        assert_eq!(root.meta.attr_names, ["a", "b"]);
        assert_eq!(root.meta.total_size, 2);
    }

    #[test]
    fn depth_bound() {
        let mut fx = Fixture::new();
        let ok = nested(&mut fx, 100);
        assert!(serialize(&fx, ok).is_ok());

        let too_deep = nested(&mut fx, 101);
        assert!(matches!(
            serialize(&fx, too_deep),
            Err(BuildError::DepthExceeded { limit: 100 })
        ));
    }

    #[test]
    fn custom_depth_bound() {
        let mut fx = Fixture::new();
        let root = nested(&mut fx, 3);
        let builder = GraphBuilder::new().with_max_depth(2);
        assert!(matches!(
            builder.build(&fx, root),
            Err(BuildError::DepthExceeded { limit: 2 })
        ));
    }

    #[test]
    fn os_handle_rejected() {
        let mut fx = Fixture::new();
        let file = fx.add(ObjectView::OsHandle {
            type_name: "TextIOWrapper".into(),
        });
        let root = fx.add(ObjectView::List(vec![file]));
        match serialize(&fx, root) {
            Err(BuildError::UnsupportedType { type_name }) => {
                assert_eq!(type_name, "TextIOWrapper")
            }
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }

    #[test]
    fn record_without_attribute_table_has_no_pointers() {
        let mut fx = Fixture::new();
        let root = fx.add(ObjectView::Record {
            type_name: "Slotted".into(),
            module_name: "app".into(),
            attributes: None,
        });
        let graph = serialize(&fx, root).unwrap();
        let node = graph.root().unwrap();
        assert_eq!(node.tag, TypeTag::Custom);
        assert!(!node.meta.has_attributes);
        assert_eq!(graph.pointer_count(), 0);
    }

    #[test]
    fn record_attributes_become_pointers() {
        let mut fx = Fixture::new();
        let v = fx.add(ObjectView::Str("hi".into()));
        let root = fx.add(ObjectView::Record {
            type_name: "Point".into(),
            module_name: "geo".into(),
            attributes: Some(vec![("label".into(), v)]),
        });
        let graph = serialize(&fx, root).unwrap();
        let node = graph.root().unwrap();
        assert!(node.meta.has_attributes);
        assert_eq!(node.meta.module_name, "geo");
        assert_eq!(node.meta.attr_node_ids.get("label"), Some(&1));
        assert_eq!(node.pointers[0].slot(), Slot::Attribute("label".into()));
    }

    #[test]
    fn function_closure_and_blobs() {
        use crate::model::ProcedureView;
        use crate::value::{kwdefaults_from_blob, ValueTree};

        let mut fx = Fixture::new();
        let code = fx.add(ObjectView::Procedure(ProcedureView {
            body: vec![1, 2, 3],
            constants: vec![],
            names: vec![],
            local_names: vec![],
            free_names: vec!["x".into(), "y".into()],
            cell_names: vec![],
            arg_count: 0,
            posonly_arg_count: 0,
            kwonly_arg_count: 1,
            local_count: 0,
            stack_size: 1,
            flags: 0,
            first_line: 1,
            name: "inner".into(),
            file_name: "m.py".into(),
        }));
        let cell = fx.add(ObjectView::Int(BigInt::from(9)));
        let one = fx.add(ObjectView::Int(BigInt::from(1)));
        let defaults = fx.add(ObjectView::Tuple(vec![one]));
        let f = fx.add(ObjectView::Function(FunctionView {
            name: "inner".into(),
            procedure: code,
            closure: vec![None, Some(cell)],
            defaults: Some(defaults),
            kwdefaults: vec![("k".into(), one)],
            attributes: vec![],
        }));

        let graph = serialize(&fx, f).unwrap();
        let node = graph.root().unwrap();
        assert_eq!(node.tag, TypeTag::Function);
        assert_eq!(node.meta.name, "inner");
        assert_eq!(node.pointers.len(), 1);
        assert_eq!(node.pointers[0].field_name, "closure:1");

        match ValueTree::from_blob(&node.meta.func_code).unwrap() {
            ValueTree::Procedure(p) => assert_eq!(p.body, [1, 2, 3]),
            other => panic!("expected procedure, got {other:?}"),
        }
        assert_eq!(
            ValueTree::from_blob(&node.meta.func_defaults).unwrap(),
            ValueTree::Tuple {
                items: vec![ValueTree::Int { value: 1 }]
            }
        );
        let kw = kwdefaults_from_blob(&node.meta.func_kwdefaults).unwrap();
        assert_eq!(kw[0].name, "k");
    }
}
