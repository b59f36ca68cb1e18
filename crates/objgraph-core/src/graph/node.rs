//! Node types and the Node struct.
//!
//! A node is one serialized vertex of the object graph: a type tag, the
//! chunks holding its scalar payload, the pointers it owns, and metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::pointer::PointerInfo;
use crate::chunk::{reassemble, Chunk};

/// Graph-wide node identifier, assigned in first-visit order.
pub type NodeId = u32;

/// The shape of the host object a node stands for.
///
/// Discriminants are the stable wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeTag {
    None = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Bytes = 4,
    String = 5,
    List = 6,
    Tuple = 7,
    Dict = 8,
    Set = 9,
    Function = 11,
    Module = 13,
    Custom = 99,
    Reference = 100,
}

impl TypeTag {
    /// Every tag, in wire-code order.
    pub const ALL: [TypeTag; 14] = [
        TypeTag::None,
        TypeTag::Bool,
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Bytes,
        TypeTag::String,
        TypeTag::List,
        TypeTag::Tuple,
        TypeTag::Dict,
        TypeTag::Set,
        TypeTag::Function,
        TypeTag::Module,
        TypeTag::Custom,
        TypeTag::Reference,
    ];

    /// The wire code of this tag.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look a tag up by wire code.
    pub fn from_code(code: u8) -> Option<TypeTag> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Tags whose payload lives in chunks.
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            TypeTag::None
                | TypeTag::Bool
                | TypeTag::Int
                | TypeTag::Float
                | TypeTag::Bytes
                | TypeTag::String
        )
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::None => "None",
            TypeTag::Bool => "Bool",
            TypeTag::Int => "Int",
            TypeTag::Float => "Float",
            TypeTag::Bytes => "Bytes",
            TypeTag::String => "String",
            TypeTag::List => "List",
            TypeTag::Tuple => "Tuple",
            TypeTag::Dict => "Dict",
            TypeTag::Set => "Set",
            TypeTag::Function => "Function",
            TypeTag::Module => "Module",
            TypeTag::Custom => "Custom",
            TypeTag::Reference => "Reference",
        };
        f.write_str(name)
    }
}

/// Per-node descriptive data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetadata {
    /// Host type name (`int`, `bytearray`, a record's class name, ...).
    pub type_name: String,
    /// Defining module of a record's type, or a module node's qualified name.
    pub module_name: String,
    /// Declared name of a callable.
    pub name: String,
    /// Element count for collections, byte length for strings.
    pub total_size: usize,
    /// The host object exposed a named attribute table.
    pub has_attributes: bool,
    /// Attribute (or mapping key) names in walk order.
    pub attr_names: Vec<String>,
    /// Attribute (or mapping key) name to value node id.
    pub attr_node_ids: BTreeMap<String, NodeId>,
    pub is_bigint: bool,
    /// Byte length of a big integer's two's-complement form.
    pub bigint_num_digits: usize,
    /// Base64 value-tree blob of a callable's procedure.
    pub func_code: String,
    /// Base64 value-tree blob of a callable's positional defaults.
    pub func_defaults: String,
    /// Base64 blob of a callable's keyword-only defaults.
    pub func_kwdefaults: String,
}

/// A node in the serialized object graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub tag: TypeTag,
    pub chunks: Vec<Chunk>,
    /// Edges owned by this node. Mirrors the matching entries of the graph's
    /// flat pointer list.
    pub pointers: Vec<PointerInfo>,
    pub meta: NodeMetadata,
}

impl Node {
    /// Create an empty node.
    pub fn new(id: NodeId, tag: TypeTag) -> Self {
        Self {
            id,
            tag,
            chunks: Vec::new(),
            pointers: Vec::new(),
            meta: NodeMetadata::default(),
        }
    }

    /// Attach payload chunks.
    pub fn with_chunks(mut self, chunks: Vec<Chunk>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Set the host type name.
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.meta.type_name = type_name.into();
        self
    }

    /// The node's scalar payload: its chunks concatenated in chunk-id order.
    pub fn payload(&self) -> Vec<u8> {
        reassemble(&self.chunks)
    }

    /// Total payload length without reassembling.
    pub fn payload_len(&self) -> usize {
        self.chunks.iter().map(|c| c.raw.len()).sum()
    }

    /// Target node id carried by a Reference node.
    pub fn reference_target(&self) -> Option<NodeId> {
        if self.tag != TypeTag::Reference {
            return None;
        }
        let payload = self.payload();
        let bytes: [u8; 4] = payload.as_slice().try_into().ok()?;
        Some(NodeId::from_le_bytes(bytes))
    }
}
