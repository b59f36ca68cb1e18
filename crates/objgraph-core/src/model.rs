//! Host object-model adapter contract.
//!
//! The codec never touches host objects directly. It classifies them through
//! [`Inspect`] while building a graph and creates or mutates them through
//! [`Construct`] while materializing one. Handles are opaque identities: two
//! handles compare equal exactly when they name the same host object.

use std::fmt;
use std::hash::Hash;

use num_bigint::BigInt;
use thiserror::Error;

/// Errors reported by a host model.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown object handle: {0}")]
    UnknownHandle(String),

    #[error("expected {expected}, found {found}")]
    WrongKind { expected: String, found: String },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unhashable {0} used as key or member")]
    Unhashable(String),

    #[error("cannot set attribute {name} on {type_name}")]
    ReadOnlyAttribute { name: String, type_name: String },

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Identity types shared by both halves of the adapter.
pub trait HostModel {
    /// Opaque object identity.
    type Handle: Copy + Eq + Hash + fmt::Debug;
    /// A resolved record type, as returned by [`Construct::resolve_type`].
    type TypeRef;
}

/// Classification and contents of one host object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectView<H> {
    None,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(String),
    /// Binary buffer; `type_name` names the host flavour (`bytes`,
    /// `bytearray`, ...).
    Bytes {
        type_name: String,
        data: Vec<u8>,
    },
    List(Vec<H>),
    Tuple(Vec<H>),
    Set(Vec<H>),
    /// Mapping entries in iteration order.
    Dict(Vec<(H, H)>),
    Function(FunctionView<H>),
    Procedure(ProcedureView<H>),
    Module {
        name: String,
    },
    /// Any other object. `attributes` is `None` when the object exposes no
    /// named-attribute table.
    Record {
        type_name: String,
        module_name: String,
        attributes: Option<Vec<(String, H)>>,
    },
    /// Objects bound to OS resources (open files, sockets). Never serializable.
    OsHandle {
        type_name: String,
    },
}

impl<H> ObjectView<H> {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &str {
        match self {
            ObjectView::None => "None",
            ObjectView::Bool(_) => "bool",
            ObjectView::Int(_) => "int",
            ObjectView::Float(_) => "float",
            ObjectView::Str(_) => "str",
            ObjectView::Bytes { type_name, .. } => type_name,
            ObjectView::List(_) => "list",
            ObjectView::Tuple(_) => "tuple",
            ObjectView::Set(_) => "set",
            ObjectView::Dict(_) => "dict",
            ObjectView::Function(_) => "function",
            ObjectView::Procedure(_) => "code",
            ObjectView::Module { .. } => "module",
            ObjectView::Record { type_name, .. } => type_name,
            ObjectView::OsHandle { type_name } => type_name,
        }
    }
}

/// A callable as seen by the builder.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionView<H> {
    pub name: String,
    /// The compiled body; usually inspects as [`ObjectView::Procedure`].
    pub procedure: H,
    /// Free-variable cells. `None` marks an empty cell.
    pub closure: Vec<Option<H>>,
    /// Positional defaults tuple.
    pub defaults: Option<H>,
    /// Keyword-only defaults in declaration order.
    pub kwdefaults: Vec<(String, H)>,
    /// Extra attributes stored on the callable.
    pub attributes: Vec<(String, H)>,
}

/// A compiled procedure body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureView<H> {
    pub body: Vec<u8>,
    pub constants: Vec<H>,
    pub names: Vec<String>,
    pub local_names: Vec<String>,
    pub free_names: Vec<String>,
    pub cell_names: Vec<String>,
    pub arg_count: u32,
    pub posonly_arg_count: u32,
    pub kwonly_arg_count: u32,
    pub local_count: u32,
    pub stack_size: u32,
    pub flags: u32,
    pub first_line: u32,
    pub name: String,
    pub file_name: String,
}

/// Everything needed to create a callable before its closure is known.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionShell<H> {
    pub name: String,
    pub procedure: H,
    pub defaults: Option<H>,
    pub kwdefaults: Vec<(String, H)>,
}

/// Read access to host objects.
pub trait Inspect: HostModel {
    /// Classify an object and expose its contents.
    fn inspect(&self, handle: Self::Handle) -> Result<ObjectView<Self::Handle>, ModelError>;

    /// Human display string; used as the logical key of mapping entries.
    fn display(&self, handle: Self::Handle) -> String;

    /// Debug representation; used for lossy value-tree fallbacks.
    fn repr(&self, handle: Self::Handle) -> String;
}

/// Object creation and write-back.
///
/// `new_list` and `new_tuple` return containers pre-filled with a
/// placeholder so that [`Construct::set_item`] can fill any index in any
/// order.
pub trait Construct: HostModel {
    fn new_none(&mut self) -> Result<Self::Handle, ModelError>;
    fn new_bool(&mut self, value: bool) -> Result<Self::Handle, ModelError>;
    fn new_int(&mut self, value: BigInt) -> Result<Self::Handle, ModelError>;
    fn new_float(&mut self, value: f64) -> Result<Self::Handle, ModelError>;
    fn new_str(&mut self, value: &str) -> Result<Self::Handle, ModelError>;
    fn new_bytes(&mut self, type_name: &str, data: Vec<u8>) -> Result<Self::Handle, ModelError>;
    fn new_list(&mut self, len: usize) -> Result<Self::Handle, ModelError>;
    fn new_tuple(&mut self, len: usize) -> Result<Self::Handle, ModelError>;
    fn new_dict(&mut self) -> Result<Self::Handle, ModelError>;
    fn new_set(&mut self) -> Result<Self::Handle, ModelError>;
    fn new_procedure(
        &mut self,
        procedure: ProcedureView<Self::Handle>,
    ) -> Result<Self::Handle, ModelError>;
    /// Create a callable with an empty environment.
    fn new_function(
        &mut self,
        shell: FunctionShell<Self::Handle>,
    ) -> Result<Self::Handle, ModelError>;

    /// Look a module up by qualified name.
    fn import_module(&mut self, name: &str) -> Result<Self::Handle, ModelError>;
    /// Find a record type by defining module and name.
    fn resolve_type(&self, module_name: &str, type_name: &str) -> Option<Self::TypeRef>;
    /// Allocate an instance of `ty` without running its initializer.
    fn new_record_shell(&mut self, ty: &Self::TypeRef) -> Result<Self::Handle, ModelError>;
    /// Generic attribute container used when a record type cannot be resolved.
    fn new_attribute_bag(
        &mut self,
        type_name: &str,
        module_name: &str,
    ) -> Result<Self::Handle, ModelError>;

    fn set_item(
        &mut self,
        container: Self::Handle,
        index: usize,
        value: Self::Handle,
    ) -> Result<(), ModelError>;
    fn insert_entry(
        &mut self,
        map: Self::Handle,
        key: Self::Handle,
        value: Self::Handle,
    ) -> Result<(), ModelError>;
    fn add_member(&mut self, set: Self::Handle, member: Self::Handle) -> Result<(), ModelError>;
    /// Store a closure cell, growing the closure if `index` is past its end.
    fn set_closure_cell(
        &mut self,
        function: Self::Handle,
        index: usize,
        value: Self::Handle,
    ) -> Result<(), ModelError>;
    fn set_attribute(
        &mut self,
        object: Self::Handle,
        name: &str,
        value: Self::Handle,
    ) -> Result<(), ModelError>;

    /// Drop the codec's reference to an object. Called for every instantiated
    /// object when materialization aborts.
    fn release(&mut self, _handle: Self::Handle) {}
}
