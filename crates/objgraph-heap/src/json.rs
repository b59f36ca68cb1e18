//! JSON import and export.
//!
//! Plain JSON maps onto the heap directly: null, booleans, numbers, strings,
//! arrays (lists) and objects (dicts with string keys). Kinds JSON cannot
//! express are written as single-tag objects:
//!
//! ```text
//! {"$tuple": [..]}                 {"$set": [..]}
//! {"$int": "123456789012345678901234567890"}
//! {"$float": "nan" | "inf" | "-inf"}
//! {"$bytes": "<base64>", "flavour": "bytearray"}
//! {"$dict": [[key, value], ..]}    non-string or `$`-prefixed keys
//! {"$record": {"module": "geo", "type": "Point", "attributes": {..} | null}}
//! {"$module": "os.path"}           {"$file": "log.txt"}
//! ```
//!
//! Export additionally writes `{"$cycle": n}` for a back-edge to the
//! ancestor `n` levels up, and `{"$function": ..}` / `{"$code": ..}` for
//! callables; those three are not accepted on import.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::{Heap, ObjRef, Object};

/// Nesting limit for import.
const MAX_IMPORT_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unknown tag {0}")]
    UnknownTag(String),

    #[error("malformed {tag}: {reason}")]
    Malformed { tag: &'static str, reason: String },

    #[error("document nested deeper than {0} levels")]
    TooDeep(usize),
}

fn malformed(tag: &'static str, reason: impl Into<String>) -> ImportError {
    ImportError::Malformed {
        tag,
        reason: reason.into(),
    }
}

impl Heap {
    /// Build objects from a JSON document and return the root.
    pub fn from_json(&mut self, value: &Value) -> Result<ObjRef, ImportError> {
        self.import_at(value, 0)
    }

    fn import_at(&mut self, value: &Value, depth: usize) -> Result<ObjRef, ImportError> {
        if depth > MAX_IMPORT_DEPTH {
            return Err(ImportError::TooDeep(MAX_IMPORT_DEPTH));
        }
        Ok(match value {
            Value::Null => self.none(),
            Value::Bool(b) => self.bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    self.int(i)
                } else if let Some(u) = n.as_u64() {
                    self.int(u)
                } else {
                    self.float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => self.str(s),
            Value::Array(items) => {
                let items = self.import_all(items, depth)?;
                self.list(items)
            }
            Value::Object(map) => match map.keys().find(|k| k.starts_with('$')) {
                Some(tag) => self.import_tagged(tag, map, depth)?,
                None => {
                    let mut entries = Vec::with_capacity(map.len());
                    for (k, v) in map {
                        let key = self.str(k);
                        entries.push((key, self.import_at(v, depth + 1)?));
                    }
                    self.dict(entries)
                }
            },
        })
    }

    fn import_all(&mut self, items: &[Value], depth: usize) -> Result<Vec<ObjRef>, ImportError> {
        items.iter().map(|v| self.import_at(v, depth + 1)).collect()
    }

    fn import_tagged(
        &mut self,
        tag: &str,
        map: &Map<String, Value>,
        depth: usize,
    ) -> Result<ObjRef, ImportError> {
        let body = &map[tag];
        match tag {
            "$tuple" => {
                let items = body.as_array().ok_or_else(|| malformed("$tuple", "expected array"))?;
                let items = self.import_all(items, depth)?;
                Ok(self.tuple(items))
            }
            "$set" => {
                let items = body.as_array().ok_or_else(|| malformed("$set", "expected array"))?;
                let items = self.import_all(items, depth)?;
                Ok(self.set(items))
            }
            "$int" => {
                let text = body.as_str().ok_or_else(|| malformed("$int", "expected string"))?;
                let value: BigInt = text
                    .parse()
                    .map_err(|e| malformed("$int", format!("{text:?}: {e}")))?;
                Ok(self.int(value))
            }
            "$float" => {
                let value = match body {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => match s.as_str() {
                        "nan" | "NaN" => Some(f64::NAN),
                        "inf" => Some(f64::INFINITY),
                        "-inf" => Some(f64::NEG_INFINITY),
                        other => other.parse().ok(),
                    },
                    _ => None,
                }
                .ok_or_else(|| malformed("$float", format!("{body}")))?;
                Ok(self.float(value))
            }
            "$bytes" => {
                let text = body.as_str().ok_or_else(|| malformed("$bytes", "expected string"))?;
                let data = BASE64_STANDARD
                    .decode(text)
                    .map_err(|e| malformed("$bytes", e.to_string()))?;
                let flavour = map
                    .get("flavour")
                    .and_then(Value::as_str)
                    .unwrap_or("bytes");
                Ok(self.bytes_with_flavour(flavour, &data))
            }
            "$dict" => {
                let pairs = body.as_array().ok_or_else(|| malformed("$dict", "expected array"))?;
                let mut entries = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    let [k, v] = pair.as_array().map(Vec::as_slice).unwrap_or_default() else {
                        return Err(malformed("$dict", "entries must be [key, value]"));
                    };
                    let key = self.import_at(k, depth + 1)?;
                    let value = self.import_at(v, depth + 1)?;
                    entries.push((key, value));
                }
                Ok(self.dict(entries))
            }
            "$record" => {
                let module = body
                    .get("module")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("$record", "missing module"))?;
                let type_name = body
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| malformed("$record", "missing type"))?;
                let attributes = match body.get("attributes") {
                    None | Some(Value::Null) => None,
                    Some(Value::Object(attrs)) => {
                        let mut out = Vec::with_capacity(attrs.len());
                        for (name, v) in attrs {
                            out.push((name.clone(), self.import_at(v, depth + 1)?));
                        }
                        Some(out)
                    }
                    Some(_) => return Err(malformed("$record", "attributes must be an object")),
                };
                let class = self.register_class(module, type_name, attributes.is_some());
                Ok(self.instance(class, attributes.unwrap_or_default()))
            }
            "$module" => {
                let name = body.as_str().ok_or_else(|| malformed("$module", "expected string"))?;
                Ok(self.register_module(name))
            }
            "$file" => {
                let name = body.as_str().ok_or_else(|| malformed("$file", "expected string"))?;
                Ok(self.file(name))
            }
            other => Err(ImportError::UnknownTag(other.to_string())),
        }
    }

    /// Render the graph rooted at `root` as JSON.
    pub fn to_json(&self, root: ObjRef) -> Value {
        self.export(root, &mut Vec::new())
    }

    fn export(&self, r: ObjRef, path: &mut Vec<ObjRef>) -> Value {
        if let Some(pos) = path.iter().rposition(|p| *p == r) {
            return json!({ "$cycle": path.len() - pos });
        }
        let Some(obj) = self.get(r) else {
            return Value::Null;
        };

        path.push(r);
        let value = match obj {
            Object::None => Value::Null,
            Object::Bool(b) => Value::Bool(*b),
            Object::Int(i) => match i.to_i64() {
                Some(small) => json!(small),
                None => json!({ "$int": i.to_string() }),
            },
            Object::Float(x) if x.is_finite() => json!(x),
            Object::Float(x) => {
                let text = if x.is_nan() {
                    "nan"
                } else if *x > 0.0 {
                    "inf"
                } else {
                    "-inf"
                };
                json!({ "$float": text })
            }
            Object::Str(s) => Value::String(s.clone()),
            Object::Bytes { flavour, data } => {
                let mut map = Map::new();
                map.insert("$bytes".into(), Value::String(BASE64_STANDARD.encode(data)));
                if flavour != "bytes" {
                    map.insert("flavour".into(), Value::String(flavour.clone()));
                }
                Value::Object(map)
            }
            Object::List(items) => Value::Array(self.export_all(items, path)),
            Object::Tuple(items) => json!({ "$tuple": self.export_all(items, path) }),
            Object::Set(items) => json!({ "$set": self.export_all(items, path) }),
            Object::Dict(entries) => self.export_dict(entries, path),
            Object::Function(f) => json!({
                "$function": {
                    "name": f.name,
                    "closure": f
                        .closure
                        .iter()
                        .map(|c| c.map_or(Value::Null, |c| self.export(c, path)))
                        .collect::<Vec<_>>(),
                    "attributes": self.export_attributes(&f.attributes, path),
                }
            }),
            Object::Procedure(p) => json!({ "$code": { "name": p.name, "file": p.file_name } }),
            Object::Module(name) => json!({ "$module": name }),
            Object::Record { class, attributes } => {
                let (module, type_name) = self
                    .class(*class)
                    .map(|c| (c.module_name.as_str(), c.name.as_str()))
                    .unwrap_or(("", ""));
                let attributes = match attributes {
                    Some(attrs) => self.export_attributes(attrs, path),
                    None => Value::Null,
                };
                json!({
                    "$record": { "module": module, "type": type_name, "attributes": attributes }
                })
            }
            Object::Namespace {
                type_name,
                module_name,
                attributes,
            } => json!({
                "$record": {
                    "module": module_name,
                    "type": type_name,
                    "attributes": self.export_attributes(attributes, path),
                }
            }),
            Object::File { name } => json!({ "$file": name }),
        };
        path.pop();
        value
    }

    fn export_all(&self, items: &[ObjRef], path: &mut Vec<ObjRef>) -> Vec<Value> {
        items.iter().map(|i| self.export(*i, path)).collect()
    }

    fn export_attributes(&self, attributes: &[(String, ObjRef)], path: &mut Vec<ObjRef>) -> Value {
        let mut map = Map::new();
        for (name, v) in attributes {
            map.insert(name.clone(), self.export(*v, path));
        }
        Value::Object(map)
    }

    fn export_dict(&self, entries: &[(ObjRef, ObjRef)], path: &mut Vec<ObjRef>) -> Value {
        let plain_keys = entries.iter().all(|(k, _)| {
            matches!(self.get(*k), Some(Object::Str(s)) if !s.starts_with('$'))
        });
        if plain_keys {
            let mut map = Map::new();
            for (k, v) in entries {
                if let Some(Object::Str(key)) = self.get(*k) {
                    map.insert(key.clone(), self.export(*v, path));
                }
            }
            Value::Object(map)
        } else {
            let pairs = entries
                .iter()
                .map(|(k, v)| json!([self.export(*k, path), self.export(*v, path)]))
                .collect();
            json!({ "$dict": Value::Array(pairs) })
        }
    }
}
