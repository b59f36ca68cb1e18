//! An arena-backed reference host object model.
//!
//! [`Heap`] stores objects in a slot vector addressed by [`ObjRef`] handles and
//! implements both halves of the adapter contract
//! ([`Inspect`](objgraph_core::Inspect) and
//! [`Construct`](objgraph_core::Construct)), so it can be encoded from and
//! decoded into. It also carries the class and module registries that record
//! and module nodes resolve against, structural comparison
//! ([`Heap::equivalent`]), and JSON import/export for command-line use.

mod equivalence;
mod json;
mod model;

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

use num_bigint::BigInt;

use objgraph_core::model::{ModelError, ProcedureView};

pub use json::ImportError;

/// Handle to an object in a [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(u32);

impl ObjRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassRef(u32);

/// A registered record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub module_name: String,
    pub name: String,
    /// Instances carry a named-attribute table.
    pub has_attributes: bool,
}

/// A callable object.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub procedure: ObjRef,
    pub closure: Vec<Option<ObjRef>>,
    pub defaults: Option<ObjRef>,
    pub kwdefaults: Vec<(String, ObjRef)>,
    pub attributes: Vec<(String, ObjRef)>,
}

/// One heap object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(String),
    Bytes { flavour: String, data: Vec<u8> },
    List(Vec<ObjRef>),
    Tuple(Vec<ObjRef>),
    /// Entries in insertion order; keys are unique under scalar-key equality.
    Dict(Vec<(ObjRef, ObjRef)>),
    Set(Vec<ObjRef>),
    Function(Function),
    Procedure(ProcedureView<ObjRef>),
    Module(String),
    /// Instance of a registered class.
    Record {
        class: ClassRef,
        attributes: Option<Vec<(String, ObjRef)>>,
    },
    /// Generic attribute bag standing in for an unregistered type.
    Namespace {
        type_name: String,
        module_name: String,
        attributes: Vec<(String, ObjRef)>,
    },
    /// An open OS file. Inspects as an OS handle.
    File { name: String },
}

impl Object {
    /// Short kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Object::None => "NoneType",
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Str(_) => "str",
            Object::Bytes { .. } => "bytes",
            Object::List(_) => "list",
            Object::Tuple(_) => "tuple",
            Object::Dict(_) => "dict",
            Object::Set(_) => "set",
            Object::Function(_) => "function",
            Object::Procedure(_) => "code",
            Object::Module(_) => "module",
            Object::Record { .. } => "record",
            Object::Namespace { .. } => "namespace",
            Object::File { .. } => "file",
        }
    }
}

/// The arena.
#[derive(Debug, Clone)]
pub struct Heap {
    /// `None` marks a released slot.
    slots: Vec<Option<Object>>,
    /// Shared `None` object; also the placeholder in fresh sequences.
    none: ObjRef,
    classes: Vec<ClassInfo>,
    class_index: HashMap<(String, String), ClassRef>,
    modules: HashMap<String, ObjRef>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<ObjRef> for Heap {
    type Output = Object;

    /// Panics if `r` was released or belongs to another heap.
    fn index(&self, r: ObjRef) -> &Object {
        match self.get(r) {
            Some(obj) => obj,
            None => panic!("dangling object handle {r}"),
        }
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: vec![Some(Object::None)],
            none: ObjRef(0),
            classes: Vec::new(),
            class_index: HashMap::new(),
            modules: HashMap::new(),
        }
    }

    /// Store an object and return its handle.
    pub fn alloc(&mut self, obj: Object) -> ObjRef {
        let r = ObjRef(self.slots.len() as u32);
        self.slots.push(Some(obj));
        r
    }

    pub fn get(&self, r: ObjRef) -> Option<&Object> {
        self.slots.get(r.index()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, r: ObjRef) -> Result<&mut Object, ModelError> {
        self.slots
            .get_mut(r.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| ModelError::UnknownHandle(r.to_string()))
    }

    pub(crate) fn lookup(&self, r: ObjRef) -> Result<&Object, ModelError> {
        self.get(r)
            .ok_or_else(|| ModelError::UnknownHandle(r.to_string()))
    }

    /// Number of live objects, the shared `None` included.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Drop an object. The shared `None` is never released.
    pub fn free(&mut self, r: ObjRef) {
        if r == self.none {
            return;
        }
        if let Some(slot) = self.slots.get_mut(r.index()) {
            *slot = None;
        }
    }

    // -- Constructors --

    pub fn none(&self) -> ObjRef {
        self.none
    }

    pub fn bool(&mut self, value: bool) -> ObjRef {
        self.alloc(Object::Bool(value))
    }

    pub fn int(&mut self, value: impl Into<BigInt>) -> ObjRef {
        self.alloc(Object::Int(value.into()))
    }

    pub fn float(&mut self, value: f64) -> ObjRef {
        self.alloc(Object::Float(value))
    }

    pub fn str(&mut self, value: &str) -> ObjRef {
        self.alloc(Object::Str(value.to_string()))
    }

    pub fn bytes(&mut self, data: &[u8]) -> ObjRef {
        self.bytes_with_flavour("bytes", data)
    }

    pub fn bytes_with_flavour(&mut self, flavour: &str, data: &[u8]) -> ObjRef {
        self.alloc(Object::Bytes {
            flavour: flavour.to_string(),
            data: data.to_vec(),
        })
    }

    pub fn list(&mut self, items: Vec<ObjRef>) -> ObjRef {
        self.alloc(Object::List(items))
    }

    pub fn tuple(&mut self, items: Vec<ObjRef>) -> ObjRef {
        self.alloc(Object::Tuple(items))
    }

    /// A dict from entries in order. Later duplicates of a key are kept as
    /// given; use [`Construct::insert_entry`](objgraph_core::Construct) for
    /// de-duplicating inserts.
    pub fn dict(&mut self, entries: Vec<(ObjRef, ObjRef)>) -> ObjRef {
        self.alloc(Object::Dict(entries))
    }

    pub fn set(&mut self, members: Vec<ObjRef>) -> ObjRef {
        self.alloc(Object::Set(members))
    }

    pub fn procedure(&mut self, procedure: ProcedureView<ObjRef>) -> ObjRef {
        self.alloc(Object::Procedure(procedure))
    }

    pub fn function(&mut self, function: Function) -> ObjRef {
        self.alloc(Object::Function(function))
    }

    pub fn file(&mut self, name: &str) -> ObjRef {
        self.alloc(Object::File {
            name: name.to_string(),
        })
    }

    pub fn namespace(
        &mut self,
        type_name: &str,
        module_name: &str,
        attributes: Vec<(String, ObjRef)>,
    ) -> ObjRef {
        self.alloc(Object::Namespace {
            type_name: type_name.to_string(),
            module_name: module_name.to_string(),
            attributes,
        })
    }

    // -- Registries --

    /// Register (or look up) a class. Re-registering returns the existing
    /// handle unchanged.
    pub fn register_class(
        &mut self,
        module_name: &str,
        name: &str,
        has_attributes: bool,
    ) -> ClassRef {
        let key = (module_name.to_string(), name.to_string());
        if let Some(&existing) = self.class_index.get(&key) {
            return existing;
        }
        let class = ClassRef(self.classes.len() as u32);
        self.classes.push(ClassInfo {
            module_name: module_name.to_string(),
            name: name.to_string(),
            has_attributes,
        });
        self.class_index.insert(key, class);
        class
    }

    pub fn class(&self, class: ClassRef) -> Option<&ClassInfo> {
        self.classes.get(class.0 as usize)
    }

    pub fn find_class(&self, module_name: &str, name: &str) -> Option<ClassRef> {
        self.class_index
            .get(&(module_name.to_string(), name.to_string()))
            .copied()
    }

    /// Create an instance of `class`. `attributes` is ignored for classes
    /// without an attribute table.
    pub fn instance(&mut self, class: ClassRef, attributes: Vec<(String, ObjRef)>) -> ObjRef {
        let has_attributes = self.class(class).is_some_and(|c| c.has_attributes);
        self.alloc(Object::Record {
            class,
            attributes: has_attributes.then_some(attributes),
        })
    }

    /// Register (or look up) a module object by qualified name.
    pub fn register_module(&mut self, name: &str) -> ObjRef {
        if let Some(&existing) = self.modules.get(name) {
            return existing;
        }
        let r = self.alloc(Object::Module(name.to_string()));
        self.modules.insert(name.to_string(), r);
        r
    }

    // -- Mutation and access --

    /// Append to a list.
    pub fn push(&mut self, list: ObjRef, item: ObjRef) -> Result<(), ModelError> {
        match self.get_mut(list)? {
            Object::List(items) => {
                items.push(item);
                Ok(())
            }
            other => Err(ModelError::WrongKind {
                expected: "list".into(),
                found: other.kind_name().into(),
            }),
        }
    }

    /// Read a named attribute of a record, namespace or function.
    pub fn attribute(&self, obj: ObjRef, name: &str) -> Option<ObjRef> {
        let attributes = match self.get(obj)? {
            Object::Record {
                attributes: Some(attributes),
                ..
            }
            | Object::Namespace { attributes, .. } => attributes,
            Object::Function(f) => &f.attributes,
            _ => return None,
        };
        attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}
