//! Pointer edges and the slot naming convention.
//!
//! A pointer says "owner node `from_node_id` holds node `to_node_id` in slot
//! `field_name`". The slot kind is encoded in the field name:
//!
//! | Field name     | Slot                                  |
//! |----------------|---------------------------------------|
//! | `3`            | sequence / set element at index 3     |
//! | `key:<k>`      | mapping key for logical key `k`       |
//! | `val:<k>`      | mapping value for logical key `k`     |
//! | `closure:<i>`  | callable free-variable cell `i`       |
//! | anything else  | named attribute                       |

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use crate::chunk::ChunkId;

/// Width of a host pointer, used for the informational `offset` of sequence
/// slots.
pub const POINTER_WIDTH: usize = 8;

const KEY_PREFIX: &str = "key:";
const VALUE_PREFIX: &str = "val:";
const CLOSURE_PREFIX: &str = "closure:";

/// A directed, slot-labelled edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerInfo {
    pub from_node_id: NodeId,
    pub from_chunk_id: ChunkId,
    pub offset: usize,
    pub to_node_id: NodeId,
    pub field_name: String,
}

impl PointerInfo {
    /// Create a pointer for the given slot.
    pub fn new(from: NodeId, to: NodeId, slot: &Slot) -> Self {
        let offset = match slot {
            Slot::Index(i) => i * POINTER_WIDTH,
            _ => 0,
        };
        Self {
            from_node_id: from,
            from_chunk_id: 0,
            offset,
            to_node_id: to,
            field_name: slot.to_string(),
        }
    }

    /// Parse this pointer's field name.
    pub fn slot(&self) -> Slot {
        Slot::parse(&self.field_name)
    }
}

impl fmt::Display for PointerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pointer({} -[{}]-> {})",
            self.from_node_id, self.field_name, self.to_node_id
        )
    }
}

/// The logical slot a pointer writes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Index(usize),
    Key(String),
    Value(String),
    Closure(usize),
    Attribute(String),
}

impl Slot {
    /// Classify a field name. Never fails: names that match no convention are
    /// attributes.
    pub fn parse(field: &str) -> Slot {
        if !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = field.parse() {
                return Slot::Index(index);
            }
        }
        if let Some(key) = field.strip_prefix(KEY_PREFIX) {
            return Slot::Key(key.to_string());
        }
        if let Some(key) = field.strip_prefix(VALUE_PREFIX) {
            return Slot::Value(key.to_string());
        }
        if let Some(index) = field.strip_prefix(CLOSURE_PREFIX) {
            if let Ok(index) = index.parse() {
                return Slot::Closure(index);
            }
        }
        Slot::Attribute(field.to_string())
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Index(i) => write!(f, "{i}"),
            Slot::Key(k) => write!(f, "{KEY_PREFIX}{k}"),
            Slot::Value(k) => write!(f, "{VALUE_PREFIX}{k}"),
            Slot::Closure(i) => write!(f, "{CLOSURE_PREFIX}{i}"),
            Slot::Attribute(name) => f.write_str(name),
        }
    }
}
