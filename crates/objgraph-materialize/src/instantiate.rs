//! Instantiation pass: one shell object per non-Reference node.
//!
//! Each node is built from its own payload and metadata only. Containers come
//! out empty (dict, set) or placeholder-filled (list, tuple), callables come
//! out with an empty environment, and records come out without attributes.
//! The resolution pass fills them in.

use std::collections::HashMap;

use num_bigint::BigInt;
use tracing::warn;

use objgraph_core::graph::node::{Node, NodeId, TypeTag};
use objgraph_core::graph::Graph;
use objgraph_core::model::{Construct, FunctionShell, ModelError};
use objgraph_core::value::{decode_value_into, kwdefaults_from_blob, ValueError, ValueTree};

use crate::error::MaterializeError;

/// Objects created by the instantiation pass, keyed by node id.
#[derive(Debug)]
pub struct Shells<H> {
    objects: HashMap<NodeId, H>,
    /// Every handle created, in creation order.
    created: Vec<H>,
    /// Pre-sized length of list and tuple shells.
    lengths: HashMap<NodeId, usize>,
    /// Reference node -> target node.
    references: HashMap<NodeId, NodeId>,
    /// Closure cells a callable's procedure declares.
    closure_slots: HashMap<NodeId, usize>,
    skipped_defaults: Vec<NodeId>,
}

impl<H: Copy> Default for Shells<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Copy> Shells<H> {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            created: Vec::new(),
            lengths: HashMap::new(),
            references: HashMap::new(),
            closure_slots: HashMap::new(),
            skipped_defaults: Vec::new(),
        }
    }

    /// Follow Reference nodes from `id` to the node that owns an object.
    pub fn resolve_id(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        for _ in 0..=self.references.len() {
            if self.objects.contains_key(&current) {
                return Some(current);
            }
            current = *self.references.get(&current)?;
        }
        None
    }

    /// The object standing for node `id`, following references.
    pub fn get(&self, id: NodeId) -> Option<H> {
        self.resolve_id(id)
            .and_then(|real| self.objects.get(&real).copied())
    }

    /// Length a list or tuple shell was created with.
    pub fn shell_len(&self, id: NodeId) -> Option<usize> {
        self.lengths.get(&id).copied()
    }

    /// Number of node objects created.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Number of closure cells the callable at `id` declares; 0 if `id` is
    /// not a callable.
    pub fn closure_slots(&self, id: NodeId) -> usize {
        self.closure_slots.get(&id).copied().unwrap_or(0)
    }

    /// Callables whose defaults were dropped.
    pub fn skipped_defaults(&self) -> &[NodeId] {
        &self.skipped_defaults
    }

    /// Release every created object, newest first.
    pub fn release_all<M: Construct<Handle = H>>(self, model: &mut M) {
        for handle in self.created.into_iter().rev() {
            model.release(handle);
        }
    }

    /// Record an object this decode created so an abort can release it.
    pub(crate) fn track(&mut self, handle: H) -> H {
        self.created.push(handle);
        handle
    }
}

/// Create a shell for every node of `graph`. Stops at the first failure,
/// leaving what was created so far in `shells` for the caller to release.
pub fn instantiate_all<M: Construct>(
    model: &mut M,
    graph: &Graph,
    shells: &mut Shells<M::Handle>,
) -> Result<(), MaterializeError> {
    for node in graph.nodes() {
        if node.tag == TypeTag::Reference {
            let target = node
                .reference_target()
                .ok_or_else(|| invalid(node, "reference payload is not 4 bytes"))?;
            shells.references.insert(node.id, target);
            continue;
        }
        let handle = instantiate_node(model, node, shells)?;
        // modules are looked up, not created
        if node.tag != TypeTag::Module {
            shells.track(handle);
        }
        shells.objects.insert(node.id, handle);
    }
    Ok(())
}

fn instantiate_node<M: Construct>(
    model: &mut M,
    node: &Node,
    shells: &mut Shells<M::Handle>,
) -> Result<M::Handle, MaterializeError> {
    let meta = &node.meta;
    let built = match node.tag {
        TypeTag::None => model.new_none(),
        TypeTag::Bool => {
            let [b] = fixed::<1>(node)?;
            model.new_bool(b != 0)
        }
        TypeTag::Int => {
            let value = if meta.is_bigint {
                let digits = node.payload();
                if digits.is_empty() {
                    return Err(invalid(node, "empty big integer payload"));
                }
                BigInt::from_signed_bytes_le(&digits)
            } else {
                BigInt::from(i64::from_le_bytes(fixed::<8>(node)?))
            };
            model.new_int(value)
        }
        TypeTag::Float => {
            let bits = u64::from_le_bytes(fixed::<8>(node)?);
            model.new_float(f64::from_bits(bits))
        }
        TypeTag::String => {
            let text = String::from_utf8(node.payload())
                .map_err(|e| invalid(node, &format!("string is not UTF-8: {e}")))?;
            model.new_str(&text)
        }
        TypeTag::Bytes => {
            let flavour = if meta.type_name.is_empty() {
                "bytes"
            } else {
                meta.type_name.as_str()
            };
            model.new_bytes(flavour, node.payload())
        }
        TypeTag::List | TypeTag::Tuple => {
            let len = node.pointers.len();
            shells.lengths.insert(node.id, len);
            if node.tag == TypeTag::List {
                model.new_list(len)
            } else {
                model.new_tuple(len)
            }
        }
        TypeTag::Dict => model.new_dict(),
        TypeTag::Set => model.new_set(),
        TypeTag::Function => return function(model, node, shells),
        TypeTag::Module => model.import_module(&meta.module_name),
        TypeTag::Custom => {
            if meta.type_name.is_empty() {
                return Err(MaterializeError::UnresolvableType {
                    node_id: node.id,
                    module_name: meta.module_name.clone(),
                    type_name: String::new(),
                });
            }
            match model.resolve_type(&meta.module_name, &meta.type_name) {
                Some(ty) => model.new_record_shell(&ty),
                None => model.new_attribute_bag(&meta.type_name, &meta.module_name),
            }
        }
        TypeTag::Reference => return Err(invalid(node, "reference nodes have no object")),
    };
    built.map_err(|source| construction(node, source))
}

fn function<M: Construct>(
    model: &mut M,
    node: &Node,
    shells: &mut Shells<M::Handle>,
) -> Result<M::Handle, MaterializeError> {
    let meta = &node.meta;
    let invalid_procedure = |source| MaterializeError::InvalidProcedure {
        node_id: node.id,
        source,
    };
    let tree = ValueTree::from_blob(&meta.func_code).map_err(invalid_procedure)?;
    let free_slots = match &tree {
        ValueTree::Procedure(p) => p.free_names.len(),
        _ => 0,
    };
    let mut created = Vec::new();
    let procedure = decode_value_into(model, &tree, &mut created);
    shells.created.append(&mut created);
    let procedure = procedure.map_err(invalid_procedure)?;
    shells.closure_slots.insert(node.id, free_slots);

    let mut skipped = false;

    let defaults = if meta.func_defaults.is_empty() {
        None
    } else {
        let decoded = ValueTree::from_blob(&meta.func_defaults)
            .and_then(|t| decode_value_into(model, &t, &mut created));
        match decoded {
            Ok(handle) => {
                shells.created.append(&mut created);
                Some(handle)
            }
            Err(e) => {
                warn!(node_id = node.id, error = %e, "skipping undecodable defaults");
                discard(model, &mut created);
                skipped = true;
                None
            }
        }
    };

    let kwdefaults = if meta.func_kwdefaults.is_empty() {
        Vec::new()
    } else {
        match decode_kwdefaults(model, &meta.func_kwdefaults, &mut created) {
            Ok(pairs) => {
                shells.created.append(&mut created);
                pairs
            }
            Err(e) => {
                warn!(node_id = node.id, error = %e, "skipping undecodable keyword defaults");
                discard(model, &mut created);
                skipped = true;
                Vec::new()
            }
        }
    };

    if skipped {
        shells.skipped_defaults.push(node.id);
    }

    model
        .new_function(FunctionShell {
            name: meta.name.clone(),
            procedure,
            defaults,
            kwdefaults,
        })
        .map_err(|source| construction(node, source))
}

fn decode_kwdefaults<M: Construct>(
    model: &mut M,
    blob: &str,
    created: &mut Vec<M::Handle>,
) -> Result<Vec<(String, M::Handle)>, ValueError> {
    kwdefaults_from_blob(blob)?
        .into_iter()
        .map(|kd| Ok((kd.name, decode_value_into(model, &kd.value, created)?)))
        .collect()
}

/// Release the partial result of a skipped decode, newest first.
fn discard<M: Construct>(model: &mut M, created: &mut Vec<M::Handle>) {
    while let Some(handle) = created.pop() {
        model.release(handle);
    }
}

fn fixed<const N: usize>(node: &Node) -> Result<[u8; N], MaterializeError> {
    let payload = node.payload();
    payload
        .as_slice()
        .try_into()
        .map_err(|_| invalid(node, &format!("expected {N} bytes, found {}", payload.len())))
}

fn invalid(node: &Node, reason: &str) -> MaterializeError {
    MaterializeError::InvalidPayload {
        node_id: node.id,
        tag: node.tag,
        reason: reason.to_string(),
    }
}

fn construction(node: &Node, source: ModelError) -> MaterializeError {
    MaterializeError::ConstructionFailed {
        node_id: node.id,
        tag: node.tag,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objgraph_core::chunk::ChunkStore;
    use objgraph_heap::{Heap, Object};

    fn scalar(store: &mut ChunkStore, id: NodeId, tag: TypeTag, payload: &[u8]) -> Node {
        Node::new(id, tag).with_chunks(store.create_chunks(payload))
    }

    #[test]
    fn scalars_from_payload() {
        let mut store = ChunkStore::new();
        let mut g = Graph::new();
        g.add_node(scalar(&mut store, 0, TypeTag::Int, &(-5i64).to_le_bytes()))
            .unwrap();
        g.add_node(scalar(&mut store, 1, TypeTag::Float, &2.5f64.to_bits().to_le_bytes()))
            .unwrap();
        g.add_node(scalar(&mut store, 2, TypeTag::String, "ü".as_bytes()))
            .unwrap();
        g.add_node(scalar(&mut store, 3, TypeTag::Bool, &[1])).unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        instantiate_all(&mut heap, &g, &mut shells).unwrap();

        assert_eq!(shells.len(), 4);
        assert_eq!(&heap[shells.get(0).unwrap()], &Object::Int(BigInt::from(-5)));
        assert_eq!(&heap[shells.get(1).unwrap()], &Object::Float(2.5));
        assert_eq!(&heap[shells.get(2).unwrap()], &Object::Str("ü".into()));
        assert_eq!(&heap[shells.get(3).unwrap()], &Object::Bool(true));
    }

    #[test]
    fn big_integer_from_signed_bytes() {
        let mut store = ChunkStore::new();
        let big: BigInt = BigInt::from(-1) << 100;
        let mut node = scalar(&mut store, 0, TypeTag::Int, &big.to_signed_bytes_le());
        node.meta.is_bigint = true;
        let mut g = Graph::new();
        g.add_node(node).unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        instantiate_all(&mut heap, &g, &mut shells).unwrap();
        assert_eq!(&heap[shells.get(0).unwrap()], &Object::Int(big));
    }

    #[test]
    fn references_follow_to_target() {
        let mut store = ChunkStore::new();
        let mut g = Graph::new();
        g.add_node(Node::new(0, TypeTag::List)).unwrap();
        g.add_node(scalar(&mut store, 1, TypeTag::Reference, &0u32.to_le_bytes()))
            .unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        instantiate_all(&mut heap, &g, &mut shells).unwrap();

        assert_eq!(shells.len(), 1);
        assert_eq!(shells.reference_count(), 1);
        assert_eq!(shells.resolve_id(1), Some(0));
        assert_eq!(shells.get(1), shells.get(0));
        assert_eq!(shells.get(5), None);
    }

    #[test]
    fn truncated_int_payload_rejected() {
        let mut store = ChunkStore::new();
        let mut g = Graph::new();
        g.add_node(scalar(&mut store, 0, TypeTag::Int, &[1, 2, 3]))
            .unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        let err = instantiate_all(&mut heap, &g, &mut shells).unwrap_err();
        assert!(matches!(
            err,
            MaterializeError::InvalidPayload {
                node_id: 0,
                tag: TypeTag::Int,
                ..
            }
        ));
    }

    #[test]
    fn unknown_record_type_becomes_attribute_bag() {
        let mut g = Graph::new();
        let mut node = Node::new(0, TypeTag::Custom).with_type_name("Ghost");
        node.meta.module_name = "nowhere".into();
        node.meta.has_attributes = true;
        g.add_node(node).unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        instantiate_all(&mut heap, &g, &mut shells).unwrap();
        assert!(matches!(
            &heap[shells.get(0).unwrap()],
            Object::Namespace { type_name, .. } if type_name == "Ghost"
        ));
    }

    #[test]
    fn missing_module_fails_construction() {
        let mut g = Graph::new();
        let mut node = Node::new(0, TypeTag::Module);
        node.meta.module_name = "not_registered".into();
        g.add_node(node).unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        let err = instantiate_all(&mut heap, &g, &mut shells).unwrap_err();
        assert!(matches!(
            err,
            MaterializeError::ConstructionFailed {
                source: ModelError::ModuleNotFound(_),
                ..
            }
        ));
    }

    #[test]
    fn sequence_shells_are_presized() {
        use objgraph_core::graph::pointer::{PointerInfo, Slot};

        let mut g = Graph::new();
        g.add_node(Node::new(1, TypeTag::None)).unwrap();
        let mut tuple = Node::new(0, TypeTag::Tuple);
        tuple.pointers.push(PointerInfo::new(0, 1, &Slot::Index(0)));
        tuple.pointers.push(PointerInfo::new(0, 1, &Slot::Index(1)));
        g.add_node(tuple).unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        instantiate_all(&mut heap, &g, &mut shells).unwrap();
        assert_eq!(shells.shell_len(0), Some(2));
        match &heap[shells.get(0).unwrap()] {
            Object::Tuple(items) => assert_eq!(items.len(), 2),
            other => panic!("expected tuple, got {other:?}"),
        }
    }

    #[test]
    fn bad_defaults_are_skipped() {
        use objgraph_core::value::ProcedureDescriptor;

        let code = ValueTree::Procedure(Box::new(ProcedureDescriptor {
            body: vec![],
            constants: vec![],
            names: vec![],
            local_names: vec![],
            free_names: vec![],
            cell_names: vec![],
            arg_count: 0,
            posonly_arg_count: 0,
            kwonly_arg_count: 0,
            local_count: 0,
            stack_size: 0,
            flags: 0,
            first_line: 1,
            name: "f".into(),
            file_name: "m.py".into(),
        }));
        let mut node = Node::new(0, TypeTag::Function).with_type_name("function");
        node.meta.name = "f".into();
        node.meta.func_code = code.to_blob().unwrap();
        node.meta.func_defaults = "not base64 !!".into();
        let mut g = Graph::new();
        g.add_node(node).unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        instantiate_all(&mut heap, &g, &mut shells).unwrap();
        assert_eq!(shells.skipped_defaults(), [0]);
        match &heap[shells.get(0).unwrap()] {
            Object::Function(f) => {
                assert_eq!(f.name, "f");
                assert!(f.defaults.is_none());
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn bad_procedure_blob_is_fatal() {
        let mut node = Node::new(0, TypeTag::Function);
        node.meta.func_code = "%%%".into();
        let mut g = Graph::new();
        g.add_node(node).unwrap();

        let mut heap = Heap::new();
        let mut shells = Shells::new();
        assert!(matches!(
            instantiate_all(&mut heap, &g, &mut shells),
            Err(MaterializeError::InvalidProcedure { node_id: 0, .. })
        ));
    }
}
