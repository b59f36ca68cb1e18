//! Adapter implementation: the heap as an object model the codec can walk
//! and rebuild into.

use num_bigint::BigInt;

use objgraph_core::model::{
    Construct, FunctionShell, FunctionView, HostModel, Inspect, ModelError, ObjectView,
    ProcedureView,
};

use crate::{ClassRef, Function, Heap, ObjRef, Object};

/// Recursion limit for `repr` and key comparison.
const MAX_RENDER_DEPTH: usize = 32;

impl HostModel for Heap {
    type Handle = ObjRef;
    type TypeRef = ClassRef;
}

impl Inspect for Heap {
    fn inspect(&self, handle: ObjRef) -> Result<ObjectView<ObjRef>, ModelError> {
        let view = match self.lookup(handle)? {
            Object::None => ObjectView::None,
            Object::Bool(b) => ObjectView::Bool(*b),
            Object::Int(i) => ObjectView::Int(i.clone()),
            Object::Float(x) => ObjectView::Float(*x),
            Object::Str(s) => ObjectView::Str(s.clone()),
            Object::Bytes { flavour, data } => ObjectView::Bytes {
                type_name: flavour.clone(),
                data: data.clone(),
            },
            Object::List(items) => ObjectView::List(items.clone()),
            Object::Tuple(items) => ObjectView::Tuple(items.clone()),
            Object::Set(items) => ObjectView::Set(items.clone()),
            Object::Dict(entries) => ObjectView::Dict(entries.clone()),
            Object::Function(f) => ObjectView::Function(FunctionView {
                name: f.name.clone(),
                procedure: f.procedure,
                closure: f.closure.clone(),
                defaults: f.defaults,
                kwdefaults: f.kwdefaults.clone(),
                attributes: f.attributes.clone(),
            }),
            Object::Procedure(p) => ObjectView::Procedure(p.clone()),
            Object::Module(name) => ObjectView::Module { name: name.clone() },
            Object::Record { class, attributes } => {
                let info = self
                    .class(*class)
                    .ok_or_else(|| ModelError::Other(format!("unregistered class on {handle}")))?;
                ObjectView::Record {
                    type_name: info.name.clone(),
                    module_name: info.module_name.clone(),
                    attributes: attributes.clone(),
                }
            }
            Object::Namespace {
                type_name,
                module_name,
                attributes,
            } => ObjectView::Record {
                type_name: type_name.clone(),
                module_name: module_name.clone(),
                attributes: Some(attributes.clone()),
            },
            Object::File { .. } => ObjectView::OsHandle {
                type_name: "TextIOWrapper".into(),
            },
        };
        Ok(view)
    }

    fn display(&self, handle: ObjRef) -> String {
        match self.get(handle) {
            Some(Object::Str(s)) => s.clone(),
            _ => self.repr(handle),
        }
    }

    fn repr(&self, handle: ObjRef) -> String {
        let mut out = String::new();
        self.render(handle, &mut Vec::new(), &mut out);
        out
    }
}

impl Construct for Heap {
    fn new_none(&mut self) -> Result<ObjRef, ModelError> {
        Ok(self.none())
    }

    fn new_bool(&mut self, value: bool) -> Result<ObjRef, ModelError> {
        Ok(self.bool(value))
    }

    fn new_int(&mut self, value: BigInt) -> Result<ObjRef, ModelError> {
        Ok(self.int(value))
    }

    fn new_float(&mut self, value: f64) -> Result<ObjRef, ModelError> {
        Ok(self.float(value))
    }

    fn new_str(&mut self, value: &str) -> Result<ObjRef, ModelError> {
        Ok(self.str(value))
    }

    fn new_bytes(&mut self, type_name: &str, data: Vec<u8>) -> Result<ObjRef, ModelError> {
        Ok(self.alloc(Object::Bytes {
            flavour: type_name.to_string(),
            data,
        }))
    }

    fn new_list(&mut self, len: usize) -> Result<ObjRef, ModelError> {
        let none = self.none();
        Ok(self.list(vec![none; len]))
    }

    fn new_tuple(&mut self, len: usize) -> Result<ObjRef, ModelError> {
        let none = self.none();
        Ok(self.tuple(vec![none; len]))
    }

    fn new_dict(&mut self) -> Result<ObjRef, ModelError> {
        Ok(self.dict(Vec::new()))
    }

    fn new_set(&mut self) -> Result<ObjRef, ModelError> {
        Ok(self.set(Vec::new()))
    }

    fn new_procedure(&mut self, procedure: ProcedureView<ObjRef>) -> Result<ObjRef, ModelError> {
        Ok(self.procedure(procedure))
    }

    fn new_function(&mut self, shell: FunctionShell<ObjRef>) -> Result<ObjRef, ModelError> {
        match self.lookup(shell.procedure)? {
            Object::Procedure(_) => {}
            other => {
                return Err(ModelError::WrongKind {
                    expected: "code".into(),
                    found: other.kind_name().into(),
                })
            }
        }
        Ok(self.function(Function {
            name: shell.name,
            procedure: shell.procedure,
            closure: Vec::new(),
            defaults: shell.defaults,
            kwdefaults: shell.kwdefaults,
            attributes: Vec::new(),
        }))
    }

    fn import_module(&mut self, name: &str) -> Result<ObjRef, ModelError> {
        self.modules
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::ModuleNotFound(name.to_string()))
    }

    fn resolve_type(&self, module_name: &str, type_name: &str) -> Option<ClassRef> {
        self.find_class(module_name, type_name)
    }

    fn new_record_shell(&mut self, ty: &ClassRef) -> Result<ObjRef, ModelError> {
        if self.class(*ty).is_none() {
            return Err(ModelError::Other(format!("unregistered class {ty:?}")));
        }
        Ok(self.instance(*ty, Vec::new()))
    }

    fn new_attribute_bag(
        &mut self,
        type_name: &str,
        module_name: &str,
    ) -> Result<ObjRef, ModelError> {
        Ok(self.namespace(type_name, module_name, Vec::new()))
    }

    fn set_item(
        &mut self,
        container: ObjRef,
        index: usize,
        value: ObjRef,
    ) -> Result<(), ModelError> {
        match self.get_mut(container)? {
            Object::List(items) | Object::Tuple(items) => {
                let len = items.len();
                let slot = items
                    .get_mut(index)
                    .ok_or(ModelError::IndexOutOfRange { index, len })?;
                *slot = value;
                Ok(())
            }
            other => Err(wrong_kind("list or tuple", other)),
        }
    }

    fn insert_entry(&mut self, map: ObjRef, key: ObjRef, value: ObjRef) -> Result<(), ModelError> {
        self.check_hashable(key)?;
        let existing = match self.lookup(map)? {
            Object::Dict(entries) => entries
                .iter()
                .position(|(k, _)| self.keys_equal(*k, key, 0)),
            other => return Err(wrong_kind("dict", other)),
        };
        if let Object::Dict(entries) = self.get_mut(map)? {
            match existing {
                Some(i) => entries[i].1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(())
    }

    fn add_member(&mut self, set: ObjRef, member: ObjRef) -> Result<(), ModelError> {
        self.check_hashable(member)?;
        let present = match self.lookup(set)? {
            Object::Set(members) => members.iter().any(|m| self.keys_equal(*m, member, 0)),
            other => return Err(wrong_kind("set", other)),
        };
        if !present {
            if let Object::Set(members) = self.get_mut(set)? {
                members.push(member);
            }
        }
        Ok(())
    }

    fn set_closure_cell(
        &mut self,
        function: ObjRef,
        index: usize,
        value: ObjRef,
    ) -> Result<(), ModelError> {
        match self.get_mut(function)? {
            Object::Function(f) => {
                if f.closure.len() <= index {
                    let len = index.checked_add(1).ok_or(ModelError::IndexOutOfRange {
                        index,
                        len: f.closure.len(),
                    })?;
                    f.closure.resize(len, None);
                }
                f.closure[index] = Some(value);
                Ok(())
            }
            other => Err(wrong_kind("function", other)),
        }
    }

    fn set_attribute(
        &mut self,
        object: ObjRef,
        name: &str,
        value: ObjRef,
    ) -> Result<(), ModelError> {
        let type_name = self.type_name_of(object)?;
        let attributes = match self.get_mut(object)? {
            Object::Record {
                attributes: Some(attributes),
                ..
            }
            | Object::Namespace { attributes, .. } => attributes,
            Object::Function(f) => &mut f.attributes,
            _ => {
                return Err(ModelError::ReadOnlyAttribute {
                    name: name.to_string(),
                    type_name,
                })
            }
        };
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => attributes.push((name.to_string(), value)),
        }
        Ok(())
    }

    fn release(&mut self, handle: ObjRef) {
        self.free(handle);
    }
}

fn wrong_kind(expected: &str, found: &Object) -> ModelError {
    ModelError::WrongKind {
        expected: expected.to_string(),
        found: found.kind_name().to_string(),
    }
}

impl Heap {
    fn type_name_of(&self, r: ObjRef) -> Result<String, ModelError> {
        Ok(match self.lookup(r)? {
            Object::Record { class, .. } => self
                .class(*class)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| "record".into()),
            Object::Namespace { type_name, .. } => type_name.clone(),
            Object::Bytes { flavour, .. } => flavour.clone(),
            other => other.kind_name().to_string(),
        })
    }

    fn check_hashable(&self, r: ObjRef) -> Result<(), ModelError> {
        match self.lookup(r)? {
            Object::List(_) | Object::Dict(_) | Object::Set(_) => {
                Err(ModelError::Unhashable(self.type_name_of(r)?))
            }
            Object::Bytes { flavour, .. } if flavour == "bytearray" => {
                Err(ModelError::Unhashable(flavour.clone()))
            }
            Object::Tuple(items) => items.iter().try_for_each(|i| self.check_hashable(*i)),
            _ => Ok(()),
        }
    }

    /// Key equality: scalars by value, tuples element-wise, everything else
    /// by identity.
    fn keys_equal(&self, a: ObjRef, b: ObjRef, depth: usize) -> bool {
        if a == b {
            return true;
        }
        if depth > MAX_RENDER_DEPTH {
            return false;
        }
        match (self.get(a), self.get(b)) {
            (Some(Object::None), Some(Object::None)) => true,
            (Some(Object::Bool(x)), Some(Object::Bool(y))) => x == y,
            (Some(Object::Int(x)), Some(Object::Int(y))) => x == y,
            (Some(Object::Float(x)), Some(Object::Float(y))) => x == y,
            (Some(Object::Str(x)), Some(Object::Str(y))) => x == y,
            (
                Some(Object::Bytes { flavour: fx, data: x }),
                Some(Object::Bytes { flavour: fy, data: y }),
            ) => fx == fy && x == y,
            (Some(Object::Tuple(xs)), Some(Object::Tuple(ys))) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys)
                        .all(|(x, y)| self.keys_equal(*x, *y, depth + 1))
            }
            _ => false,
        }
    }

    fn render(&self, r: ObjRef, path: &mut Vec<ObjRef>, out: &mut String) {
        let Some(obj) = self.get(r) else {
            out.push_str("<released>");
            return;
        };
        let container = matches!(
            obj,
            Object::List(_) | Object::Tuple(_) | Object::Dict(_) | Object::Set(_)
        );
        if container && (path.contains(&r) || path.len() >= MAX_RENDER_DEPTH) {
            out.push_str(match obj {
                Object::List(_) => "[...]",
                Object::Tuple(_) => "(...)",
                _ => "{...}",
            });
            return;
        }

        match obj {
            Object::None => out.push_str("None"),
            Object::Bool(true) => out.push_str("True"),
            Object::Bool(false) => out.push_str("False"),
            Object::Int(i) => out.push_str(&i.to_string()),
            Object::Float(x) => out.push_str(&float_repr(*x)),
            Object::Str(s) => out.push_str(&str_repr(s)),
            Object::Bytes { flavour, data } => {
                if flavour == "bytes" {
                    out.push_str(&bytes_repr(data));
                } else {
                    out.push_str(&format!("{flavour}({})", bytes_repr(data)));
                }
            }
            Object::List(items) => self.render_seq(r, items, "[", "]", false, path, out),
            Object::Tuple(items) => {
                self.render_seq(r, items, "(", ")", items.len() == 1, path, out)
            }
            Object::Set(items) if items.is_empty() => out.push_str("set()"),
            Object::Set(items) => self.render_seq(r, items, "{", "}", false, path, out),
            Object::Dict(entries) => {
                path.push(r);
                out.push('{');
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(*k, path, out);
                    out.push_str(": ");
                    self.render(*v, path, out);
                }
                out.push('}');
                path.pop();
            }
            Object::Function(f) => out.push_str(&format!("<function {}>", f.name)),
            Object::Procedure(p) => {
                out.push_str(&format!("<code object {}, file \"{}\">", p.name, p.file_name))
            }
            Object::Module(name) => out.push_str(&format!("<module '{name}'>")),
            Object::Record { class, .. } => match self.class(*class) {
                Some(info) => out.push_str(&format!("<{}.{} object>", info.module_name, info.name)),
                None => out.push_str("<record>"),
            },
            Object::Namespace {
                type_name,
                module_name,
                ..
            } => out.push_str(&format!("<{module_name}.{type_name} object>")),
            Object::File { name } => {
                out.push_str(&format!("<_io.TextIOWrapper name={}>", str_repr(name)))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_seq(
        &self,
        r: ObjRef,
        items: &[ObjRef],
        open: &str,
        close: &str,
        trailing_comma: bool,
        path: &mut Vec<ObjRef>,
        out: &mut String,
    ) {
        path.push(r);
        out.push_str(open);
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render(*item, path, out);
        }
        if trailing_comma {
            out.push(',');
        }
        out.push_str(close);
        path.pop();
    }
}

fn float_repr(x: f64) -> String {
    if x.is_nan() {
        "nan".into()
    } else if x.is_infinite() {
        let text = if x > 0.0 { "inf" } else { "-inf" };
        text.into()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn str_repr(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn bytes_repr(data: &[u8]) -> String {
    let mut out = String::from("b'");
    for &b in data {
        match b {
            b'\'' => out.push_str("\\'"),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\x{b:02x}")),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repr_follows_host_conventions() {
        let mut heap = Heap::new();
        let one = heap.int(1);
        let t = heap.tuple(vec![one]);
        let s = heap.str("it's");
        let f = heap.float(2.0);
        let yes = heap.bool(true);
        let b = heap.bytes(b"a\x00");
        let n = heap.none();
        let list = heap.list(vec![t, s, f, yes, b, n]);
        assert_eq!(
            heap.repr(list),
            r"[(1,), 'it\'s', 2.0, True, b'a\x00', None]"
        );
        assert_eq!(heap.display(s), "it's");
    }

    #[test]
    fn repr_of_cycle_terminates() {
        let mut heap = Heap::new();
        let list = heap.list(vec![]);
        heap.push(list, list).unwrap();
        assert_eq!(heap.repr(list), "[[...]]");
    }

    #[test]
    fn empty_set_and_dict_repr() {
        let mut heap = Heap::new();
        let s = heap.set(vec![]);
        let d = heap.dict(vec![]);
        assert_eq!(heap.repr(s), "set()");
        assert_eq!(heap.repr(d), "{}");
    }

    #[test]
    fn insert_entry_replaces_equal_key() {
        let mut heap = Heap::new();
        let d = heap.new_dict().unwrap();
        let k1 = heap.str("a");
        let k2 = heap.str("a");
        let v1 = heap.int(1);
        let v2 = heap.int(2);
        heap.insert_entry(d, k1, v1).unwrap();
        heap.insert_entry(d, k2, v2).unwrap();
        assert_eq!(heap[d], Object::Dict(vec![(k1, v2)]));
    }

    #[test]
    fn unhashable_keys_rejected() {
        let mut heap = Heap::new();
        let d = heap.new_dict().unwrap();
        let key = heap.list(vec![]);
        let v = heap.none();
        assert!(matches!(
            heap.insert_entry(d, key, v),
            Err(ModelError::Unhashable(_))
        ));

        let s = heap.new_set().unwrap();
        let ba = heap.bytes_with_flavour("bytearray", b"x");
        assert!(matches!(heap.add_member(s, ba), Err(ModelError::Unhashable(_))));
    }

    #[test]
    fn set_members_deduplicated() {
        let mut heap = Heap::new();
        let s = heap.new_set().unwrap();
        let a = heap.int(3);
        let b = heap.int(3);
        heap.add_member(s, a).unwrap();
        heap.add_member(s, b).unwrap();
        assert_eq!(heap[s], Object::Set(vec![a]));
    }

    #[test]
    fn closure_cells_grow_and_keep_existing() {
        let mut heap = Heap::new();
        let code = heap.procedure(sample_procedure());
        let f = heap
            .new_function(FunctionShell {
                name: "f".into(),
                procedure: code,
                defaults: None,
                kwdefaults: vec![],
            })
            .unwrap();
        let a = heap.int(1);
        let b = heap.int(2);
        heap.set_closure_cell(f, 2, b).unwrap();
        heap.set_closure_cell(f, 0, a).unwrap();
        match &heap[f] {
            Object::Function(func) => assert_eq!(func.closure, vec![Some(a), None, Some(b)]),
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn closure_index_overflow_is_an_error() {
        let mut heap = Heap::new();
        let code = heap.procedure(sample_procedure());
        let f = heap
            .new_function(FunctionShell {
                name: "f".into(),
                procedure: code,
                defaults: None,
                kwdefaults: vec![],
            })
            .unwrap();
        let a = heap.int(1);
        assert_eq!(
            heap.set_closure_cell(f, usize::MAX, a),
            Err(ModelError::IndexOutOfRange {
                index: usize::MAX,
                len: 0
            })
        );
    }

    #[test]
    fn slotted_record_rejects_attributes() {
        let mut heap = Heap::new();
        let class = heap.register_class("app", "Frozen", false);
        let rec = heap.new_record_shell(&class).unwrap();
        let v = heap.none();
        assert!(matches!(
            heap.set_attribute(rec, "x", v),
            Err(ModelError::ReadOnlyAttribute { type_name, .. }) if type_name == "Frozen"
        ));
    }

    #[test]
    fn set_item_bounds_checked() {
        let mut heap = Heap::new();
        let t = heap.new_tuple(1).unwrap();
        let v = heap.int(0);
        assert_eq!(
            heap.set_item(t, 1, v),
            Err(ModelError::IndexOutOfRange { index: 1, len: 1 })
        );
    }

    #[test]
    fn file_inspects_as_os_handle() {
        let mut heap = Heap::new();
        let f = heap.file("log.txt");
        assert_eq!(
            heap.inspect(f).unwrap(),
            ObjectView::OsHandle {
                type_name: "TextIOWrapper".into()
            }
        );
    }

    #[test]
    fn released_handle_is_unknown() {
        let mut heap = Heap::new();
        let s = heap.str("x");
        heap.release(s);
        assert!(matches!(heap.inspect(s), Err(ModelError::UnknownHandle(_))));
    }

    fn sample_procedure() -> ProcedureView<ObjRef> {
        ProcedureView {
            body: vec![0x97, 0x00],
            constants: vec![],
            names: vec![],
            local_names: vec!["x".into()],
            free_names: vec![],
            cell_names: vec![],
            arg_count: 1,
            posonly_arg_count: 0,
            kwonly_arg_count: 0,
            local_count: 1,
            stack_size: 1,
            flags: 3,
            first_line: 1,
            name: "f".into(),
            file_name: "demo.py".into(),
        }
    }
}
