//! Structural comparison of object graphs across two heaps.
//!
//! Two graphs are equivalent when a bijection between their objects maps
//! each object onto one of the same kind and contents, with children mapped
//! consistently. Cycles and shared references therefore have to line up, not
//! just the printed shape. `None` is compared by value since every heap owns a
//! single shared instance. Floats compare bit-exactly (any NaN matches any
//! NaN). Set members and dict entries match regardless of order.
//!
//! Callable procedures and defaults travel as detached value trees, so they
//! are compared by shape in a fresh scope without identity constraints.

use std::collections::HashMap;

use crate::{Heap, ObjRef, Object};

impl Heap {
    /// True if the graph rooted at `a` in `self` matches the graph rooted at
    /// `b` in `other`.
    pub fn equivalent(&self, a: ObjRef, other: &Heap, b: ObjRef) -> bool {
        Matcher::new(self, other).same(a, b)
    }
}

#[derive(Clone)]
struct Matcher<'h> {
    left: &'h Heap,
    right: &'h Heap,
    forward: HashMap<ObjRef, ObjRef>,
    backward: HashMap<ObjRef, ObjRef>,
}

/// A record-like object seen uniformly: registered instances and attribute
/// bags with the same names compare alike.
struct RecordParts<'o> {
    module_name: &'o str,
    type_name: &'o str,
    attributes: Option<&'o [(String, ObjRef)]>,
}

fn record_parts<'o>(heap: &'o Heap, obj: &'o Object) -> Option<RecordParts<'o>> {
    match obj {
        Object::Record { class, attributes } => {
            let info = heap.class(*class)?;
            Some(RecordParts {
                module_name: &info.module_name,
                type_name: &info.name,
                attributes: attributes.as_deref(),
            })
        }
        Object::Namespace {
            type_name,
            module_name,
            attributes,
        } => Some(RecordParts {
            module_name,
            type_name,
            attributes: Some(attributes),
        }),
        _ => None,
    }
}

impl<'h> Matcher<'h> {
    fn new(left: &'h Heap, right: &'h Heap) -> Self {
        Self {
            left,
            right,
            forward: HashMap::new(),
            backward: HashMap::new(),
        }
    }

    fn same(&mut self, a: ObjRef, b: ObjRef) -> bool {
        let (left, right) = (self.left, self.right);
        let (Some(x), Some(y)) = (left.get(a), right.get(b)) else {
            return false;
        };
        if matches!((x, y), (Object::None, Object::None)) {
            return true;
        }

        match (self.forward.get(&a), self.backward.get(&b)) {
            (Some(&fb), Some(&ba)) => return fb == b && ba == a,
            (None, None) => {}
            _ => return false,
        }
        self.forward.insert(a, b);
        self.backward.insert(b, a);

        match (x, y) {
            (Object::Bool(p), Object::Bool(q)) => p == q,
            (Object::Int(p), Object::Int(q)) => p == q,
            (Object::Float(p), Object::Float(q)) => {
                (p.is_nan() && q.is_nan()) || p.to_bits() == q.to_bits()
            }
            (Object::Str(p), Object::Str(q)) => p == q,
            (
                Object::Bytes { flavour: fp, data: p },
                Object::Bytes { flavour: fq, data: q },
            ) => fp == fq && p == q,
            (Object::List(p), Object::List(q)) | (Object::Tuple(p), Object::Tuple(q)) => {
                self.same_seq(p, q)
            }
            (Object::Set(p), Object::Set(q)) => self.same_unordered(p, q),
            (Object::Dict(p), Object::Dict(q)) => self.same_entries(p, q),
            (Object::Module(p), Object::Module(q)) => p == q,
            (Object::File { name: p }, Object::File { name: q }) => p == q,
            (Object::Procedure(p), Object::Procedure(q)) => {
                p.body == q.body
                    && p.names == q.names
                    && p.local_names == q.local_names
                    && p.free_names == q.free_names
                    && p.cell_names == q.cell_names
                    && p.arg_count == q.arg_count
                    && p.posonly_arg_count == q.posonly_arg_count
                    && p.kwonly_arg_count == q.kwonly_arg_count
                    && p.local_count == q.local_count
                    && p.stack_size == q.stack_size
                    && p.flags == q.flags
                    && p.first_line == q.first_line
                    && p.name == q.name
                    && p.file_name == q.file_name
                    && self.detached_seq(&p.constants, &q.constants)
            }
            (Object::Function(p), Object::Function(q)) => {
                p.name == q.name
                    && self.detached(p.procedure, q.procedure)
                    && match (p.defaults, q.defaults) {
                        (Some(dp), Some(dq)) => self.detached(dp, dq),
                        (None, None) => true,
                        _ => false,
                    }
                    && p.kwdefaults.len() == q.kwdefaults.len()
                    && p.kwdefaults
                        .iter()
                        .zip(&q.kwdefaults)
                        .all(|((np, vp), (nq, vq))| np == nq && self.detached(*vp, *vq))
                    && p.closure.len() == q.closure.len()
                    && p.closure.iter().zip(&q.closure).all(|pair| match pair {
                        (Some(cp), Some(cq)) => self.same(*cp, *cq),
                        (None, None) => true,
                        _ => false,
                    })
                    && self.same_attributes(&p.attributes, &q.attributes)
            }
            _ => match (record_parts(left, x), record_parts(right, y)) {
                (Some(p), Some(q)) => {
                    p.module_name == q.module_name
                        && p.type_name == q.type_name
                        && match (p.attributes, q.attributes) {
                            (Some(ap), Some(aq)) => self.same_attributes(ap, aq),
                            (None, None) => true,
                            _ => false,
                        }
                }
                _ => false,
            },
        }
    }

    fn same_seq(&mut self, p: &[ObjRef], q: &[ObjRef]) -> bool {
        p.len() == q.len() && p.iter().zip(q).all(|(a, b)| self.same(*a, *b))
    }

    /// Attribute tables match by name, regardless of order.
    fn same_attributes(&mut self, p: &[(String, ObjRef)], q: &[(String, ObjRef)]) -> bool {
        p.len() == q.len()
            && p.iter().all(|(name, a)| {
                q.iter()
                    .find(|(n, _)| n == name)
                    .is_some_and(|(_, b)| self.same(*a, *b))
            })
    }

    fn same_unordered(&mut self, p: &[ObjRef], q: &[ObjRef]) -> bool {
        if p.len() != q.len() {
            return false;
        }
        let mut used = vec![false; q.len()];
        'members: for a in p {
            for (j, b) in q.iter().enumerate() {
                if used[j] {
                    continue;
                }
                let mut trial = self.clone();
                if trial.same(*a, *b) {
                    *self = trial;
                    used[j] = true;
                    continue 'members;
                }
            }
            return false;
        }
        true
    }

    fn same_entries(&mut self, p: &[(ObjRef, ObjRef)], q: &[(ObjRef, ObjRef)]) -> bool {
        if p.len() != q.len() {
            return false;
        }
        let mut used = vec![false; q.len()];
        'entries: for (ka, va) in p {
            for (j, (kb, vb)) in q.iter().enumerate() {
                if used[j] {
                    continue;
                }
                let mut trial = self.clone();
                if trial.same(*ka, *kb) && trial.same(*va, *vb) {
                    *self = trial;
                    used[j] = true;
                    continue 'entries;
                }
            }
            return false;
        }
        true
    }

    fn detached(&self, a: ObjRef, b: ObjRef) -> bool {
        Matcher::new(self.left, self.right).same(a, b)
    }

    fn detached_seq(&self, p: &[ObjRef], q: &[ObjRef]) -> bool {
        p.len() == q.len() && p.iter().zip(q).all(|(a, b)| self.detached(*a, *b))
    }
}

#[cfg(test)]
mod tests {
    use crate::{Heap, Object};

    #[test]
    fn scalars_by_value() {
        let mut a = Heap::new();
        let mut b = Heap::new();
        let x = a.int(7);
        let y = b.int(7);
        let z = b.int(8);
        assert!(a.equivalent(x, &b, y));
        assert!(!a.equivalent(x, &b, z));
    }

    #[test]
    fn floats_bit_exact() {
        let mut a = Heap::new();
        let mut b = Heap::new();
        let pz = a.float(0.0);
        let nz = b.float(-0.0);
        assert!(!a.equivalent(pz, &b, nz));
        let n1 = a.float(f64::NAN);
        let n2 = b.float(f64::NAN);
        assert!(a.equivalent(n1, &b, n2));
    }

    #[test]
    fn cycles_must_line_up() {
        let mut a = Heap::new();
        let la = a.list(vec![]);
        a.push(la, la).unwrap();

        let mut b = Heap::new();
        let lb = b.list(vec![]);
        b.push(lb, lb).unwrap();
        assert!(a.equivalent(la, &b, lb));

        // [[x]] where the inner list is a distinct object with the same shape
        let mut c = Heap::new();
        let inner = c.list(vec![]);
        let outer = c.list(vec![inner]);
        c.push(inner, outer).unwrap();
        assert!(!a.equivalent(la, &c, outer));
    }

    #[test]
    fn shared_references_must_line_up() {
        let mut a = Heap::new();
        let shared = a.list(vec![]);
        let ra = a.list(vec![shared, shared]);

        let mut b = Heap::new();
        let x = b.list(vec![]);
        let y = b.list(vec![]);
        let rb = b.list(vec![x, y]);
        assert!(!a.equivalent(ra, &b, rb));
        assert!(a.equivalent(ra, &a, ra));
    }

    #[test]
    fn sets_and_dicts_ignore_order() {
        let mut a = Heap::new();
        let one = a.int(1);
        let two = a.int(2);
        let sa = a.set(vec![one, two]);
        let k = a.str("k");
        let da = a.dict(vec![(k, sa)]);

        let mut b = Heap::new();
        let two_b = b.int(2);
        let one_b = b.int(1);
        let sb = b.set(vec![two_b, one_b]);
        let kb = b.str("k");
        let db = b.dict(vec![(kb, sb)]);
        assert!(a.equivalent(da, &b, db));
    }

    #[test]
    fn namespace_matches_record_with_same_names() {
        let mut a = Heap::new();
        let class = a.register_class("geo", "Point", true);
        let x = a.int(1);
        let ra = a.instance(class, vec![("x".into(), x)]);

        let mut b = Heap::new();
        let xb = b.int(1);
        let rb = b.namespace("Point", "geo", vec![("x".into(), xb)]);
        assert!(a.equivalent(ra, &b, rb));
        assert!(matches!(b[rb], Object::Namespace { .. }));
    }

    #[test]
    fn kinds_must_match() {
        let mut a = Heap::new();
        let mut b = Heap::new();
        let t = a.tuple(vec![]);
        let l = b.list(vec![]);
        assert!(!a.equivalent(t, &b, l));
    }
}
