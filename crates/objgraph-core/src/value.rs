//! Value trees: a self-describing nested encoding for callable bodies and
//! default-argument tuples.
//!
//! Values that the graph does not model as nodes (procedure bodies, their
//! constant pools, defaults) are flattened into a JSON-shaped tree with a
//! `type` discriminator and stored as base64 blobs in node metadata.
//! Anything the tree cannot express is kept as its `repr` string.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Construct, Inspect, ModelError, ObjectView, ProcedureView};

/// Nesting bound for value trees. Deeper values collapse to `repr`.
///
/// Each tuple or procedure level costs two JSON levels and the keyword
/// default wrapper adds two more, so the deepest blob written stays well
/// under serde_json's parse limit of 127 nested levels.
pub const MAX_VALUE_DEPTH: usize = 48;

/// Errors from value-tree encoding and decoding.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("value tree JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("value tree base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("object model error: {0}")]
    Model(#[from] ModelError),
}

/// A tagged nested value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ValueTree {
    None,
    Bool {
        value: bool,
    },
    Int {
        value: i64,
    },
    Float {
        #[serde(with = "float_text")]
        value: f64,
    },
    Str {
        value: String,
    },
    Bytes {
        #[serde(with = "base64_text")]
        value: Vec<u8>,
    },
    Tuple {
        items: Vec<ValueTree>,
    },
    Procedure(Box<ProcedureDescriptor>),
    Repr {
        value: String,
    },
}

/// Serialized form of a [`ProcedureView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureDescriptor {
    #[serde(with = "base64_text")]
    pub body: Vec<u8>,
    pub constants: Vec<ValueTree>,
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

/// One keyword-only default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDefault {
    pub name: String,
    pub value: ValueTree,
}

impl ValueTree {
    /// Base64 of the tree's JSON text.
    pub fn to_blob(&self) -> Result<String, ValueError> {
        Ok(BASE64_STANDARD.encode(serde_json::to_vec(self)?))
    }

    /// Inverse of [`ValueTree::to_blob`].
    pub fn from_blob(blob: &str) -> Result<ValueTree, ValueError> {
        let json = BASE64_STANDARD.decode(blob.as_bytes())?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Whether decoding this tree loses information.
    pub fn is_lossy(&self) -> bool {
        match self {
            ValueTree::Repr { .. } => true,
            ValueTree::Tuple { items } => items.iter().any(ValueTree::is_lossy),
            ValueTree::Procedure(p) => p.constants.iter().any(ValueTree::is_lossy),
            _ => false,
        }
    }
}

/// Blob-encode keyword defaults as an ordered `{name, value}` list.
pub fn kwdefaults_to_blob(defaults: &[KeywordDefault]) -> Result<String, ValueError> {
    Ok(BASE64_STANDARD.encode(serde_json::to_vec(defaults)?))
}

/// Inverse of [`kwdefaults_to_blob`].
pub fn kwdefaults_from_blob(blob: &str) -> Result<Vec<KeywordDefault>, ValueError> {
    let json = BASE64_STANDARD.decode(blob.as_bytes())?;
    Ok(serde_json::from_slice(&json)?)
}

/// Encode a host object as a value tree.
///
/// Integers outside the i64 range, tuples nested past [`MAX_VALUE_DEPTH`] and
/// any shape other than scalars, tuples and procedures become `repr`.
pub fn encode_value<M: Inspect>(model: &M, handle: M::Handle) -> Result<ValueTree, ValueError> {
    encode_at(model, handle, 0)
}

fn encode_at<M: Inspect>(
    model: &M,
    handle: M::Handle,
    depth: usize,
) -> Result<ValueTree, ValueError> {
    let repr = || ValueTree::Repr {
        value: model.repr(handle),
    };
    if depth > MAX_VALUE_DEPTH {
        return Ok(repr());
    }
    let tree = match model.inspect(handle)? {
        ObjectView::None => ValueTree::None,
        ObjectView::Bool(value) => ValueTree::Bool { value },
        ObjectView::Int(big) => match big.to_i64() {
            Some(value) => ValueTree::Int { value },
            None => repr(),
        },
        ObjectView::Float(value) => ValueTree::Float { value },
        ObjectView::Str(value) => ValueTree::Str { value },
        ObjectView::Bytes { data, .. } => ValueTree::Bytes { value: data },
        ObjectView::Tuple(items) => ValueTree::Tuple {
            items: items
                .into_iter()
                .map(|item| encode_at(model, item, depth + 1))
                .collect::<Result<_, _>>()?,
        },
        ObjectView::Procedure(p) => {
            let constants = p
                .constants
                .into_iter()
                .map(|c| encode_at(model, c, depth + 1))
                .collect::<Result<_, _>>()?;
            ValueTree::Procedure(Box::new(ProcedureDescriptor {
                body: p.body,
                constants,
                names: p.names,
                local_names: p.local_names,
                free_names: p.free_names,
                cell_names: p.cell_names,
                arg_count: p.arg_count,
                posonly_arg_count: p.posonly_arg_count,
                kwonly_arg_count: p.kwonly_arg_count,
                local_count: p.local_count,
                stack_size: p.stack_size,
                flags: p.flags,
                first_line: p.first_line,
                name: p.name,
                file_name: p.file_name,
            }))
        }
        _ => repr(),
    };
    Ok(tree)
}

/// Construct a host object from a value tree. `repr` decodes to a string.
pub fn decode_value<M: Construct>(
    model: &mut M,
    tree: &ValueTree,
) -> Result<M::Handle, ValueError> {
    decode_value_into(model, tree, &mut Vec::new())
}

/// Like [`decode_value`], also pushing every object it creates onto
/// `created`, oldest first. On error `created` still lists the objects made
/// before the failure.
pub fn decode_value_into<M: Construct>(
    model: &mut M,
    tree: &ValueTree,
    created: &mut Vec<M::Handle>,
) -> Result<M::Handle, ValueError> {
    let handle = match tree {
        ValueTree::None => model.new_none()?,
        ValueTree::Bool { value } => model.new_bool(*value)?,
        ValueTree::Int { value } => model.new_int(BigInt::from(*value))?,
        ValueTree::Float { value } => model.new_float(*value)?,
        ValueTree::Str { value } | ValueTree::Repr { value } => model.new_str(value)?,
        ValueTree::Bytes { value } => model.new_bytes("bytes", value.clone())?,
        ValueTree::Tuple { items } => {
            let tuple = model.new_tuple(items.len())?;
            created.push(tuple);
            for (i, item) in items.iter().enumerate() {
                let h = decode_value_into(model, item, created)?;
                model.set_item(tuple, i, h)?;
            }
            return Ok(tuple);
        }
        ValueTree::Procedure(p) => {
            let constants = p
                .constants
                .iter()
                .map(|c| decode_value_into(model, c, created))
                .collect::<Result<_, _>>()?;
            model.new_procedure(ProcedureView {
                body: p.body.clone(),
                constants,
                names: p.names.clone(),
                local_names: p.local_names.clone(),
                free_names: p.free_names.clone(),
                cell_names: p.cell_names.clone(),
                arg_count: p.arg_count,
                posonly_arg_count: p.posonly_arg_count,
                kwonly_arg_count: p.kwonly_arg_count,
                local_count: p.local_count,
                stack_size: p.stack_size,
                flags: p.flags,
                first_line: p.first_line,
                name: p.name.clone(),
                file_name: p.file_name.clone(),
            })?
        }
    };
    created.push(handle);
    Ok(handle)
}

/// Floats as JSON numbers, with non-finite values spelled as strings.
mod float_text {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FloatRepr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            s.serialize_str("NaN")
        } else if *value == f64::INFINITY {
            s.serialize_str("inf")
        } else if *value == f64::NEG_INFINITY {
            s.serialize_str("-inf")
        } else {
            s.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match FloatRepr::deserialize(d)? {
            FloatRepr::Number(v) => Ok(v),
            FloatRepr::Text(t) => match t.as_str() {
                "NaN" | "nan" => Ok(f64::NAN),
                "inf" | "Infinity" => Ok(f64::INFINITY),
                "-inf" | "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!(
                    "invalid float literal: {other}"
                ))),
            },
        }
    }
}

/// Byte strings as standard base64 text.
mod base64_text {
    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        BASE64_STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(tree: &ValueTree) -> ValueTree {
        ValueTree::from_blob(&tree.to_blob().unwrap()).unwrap()
    }

    fn descriptor(constants: Vec<ValueTree>) -> ProcedureDescriptor {
        ProcedureDescriptor {
            body: vec![0x64, 0x00, 0x53, 0x00],
            constants,
            names: vec!["print".into()],
            local_names: vec!["x".into()],
            free_names: vec!["y".into()],
            cell_names: vec![],
            arg_count: 1,
            posonly_arg_count: 0,
            kwonly_arg_count: 0,
            local_count: 1,
            stack_size: 2,
            flags: 0x13,
            first_line: 10,
            name: "f".into(),
            file_name: "mod.py".into(),
        }
    }

    fn nested(levels: usize, leaf: ValueTree) -> ValueTree {
        (0..levels).fold(leaf, |inner, _| ValueTree::Tuple { items: vec![inner] })
    }

    #[test]
    fn scalars_round_trip() {
        for tree in [
            ValueTree::None,
            ValueTree::Bool { value: true },
            ValueTree::Int { value: i64::MIN },
            ValueTree::Str {
                value: "héllo".into(),
            },
            ValueTree::Bytes {
                value: vec![0, 255, 10],
            },
            ValueTree::Repr {
                value: "<object>".into(),
            },
        ] {
            assert_eq!(round_trip(&tree), tree);
        }
    }

    #[test]
    fn floats_round_trip_bit_exact() {
        for v in [
            0.0,
            -0.0,
            1.5,
            f64::MIN_POSITIVE,
            f64::MAX,
            0.1 + 0.2,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
        ] {
            let back = round_trip(&ValueTree::Float { value: v });
            match back {
                ValueTree::Float { value } => assert_eq!(value.to_bits(), v.to_bits()),
                other => panic!("expected float, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_finite_written_as_strings() {
        let json = serde_json::to_string(&ValueTree::Float {
            value: f64::NEG_INFINITY,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"float","value":"-inf"}"#);
    }

    #[test]
    fn tagged_json_shape() {
        let tree = ValueTree::Tuple {
            items: vec![ValueTree::Int { value: 1 }, ValueTree::None],
        };
        let json: serde_json::Value = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["type"], "tuple");
        assert_eq!(json["items"][0]["type"], "int");
        assert_eq!(json["items"][1]["type"], "none");
    }

    #[test]
    fn procedure_round_trip() {
        let tree = ValueTree::Procedure(Box::new(descriptor(vec![
            ValueTree::None,
            ValueTree::Int { value: 3 },
        ])));
        let json: serde_json::Value = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["type"], "procedure");
        assert_eq!(json["body"], "ZABTAA==");
        assert_eq!(round_trip(&tree), tree);
    }

    #[test]
    fn deepest_encodable_trees_read_back() {
        // tuples at depths 0..=MAX_VALUE_DEPTH, then the collapsed leaf
        let leaf = ValueTree::Repr {
            value: "(1,)".into(),
        };
        let deepest = nested(MAX_VALUE_DEPTH + 1, leaf.clone());
        assert_eq!(round_trip(&deepest), deepest);

        let constants = ValueTree::Procedure(Box::new(descriptor(vec![nested(
            MAX_VALUE_DEPTH,
            leaf,
        )])));
        assert_eq!(round_trip(&constants), constants);

        let kwdefaults = vec![KeywordDefault {
            name: "deep".into(),
            value: deepest,
        }];
        let back = kwdefaults_from_blob(&kwdefaults_to_blob(&kwdefaults).unwrap()).unwrap();
        assert_eq!(back, kwdefaults);
    }

    #[test]
    fn kwdefaults_keep_order() {
        let defaults = vec![
            KeywordDefault {
                name: "z".into(),
                value: ValueTree::Int { value: 1 },
            },
            KeywordDefault {
                name: "a".into(),
                value: ValueTree::Str { value: "x".into() },
            },
        ];
        let back = kwdefaults_from_blob(&kwdefaults_to_blob(&defaults).unwrap()).unwrap();
        assert_eq!(back, defaults);
    }

    #[test]
    fn invalid_blob_rejected() {
        assert!(matches!(
            ValueTree::from_blob("%%%"),
            Err(ValueError::Base64(_))
        ));
        let not_json = BASE64_STANDARD.encode(b"{nope");
        assert!(matches!(
            ValueTree::from_blob(&not_json),
            Err(ValueError::Json(_))
        ));
    }

    #[test]
    fn lossy_detection() {
        let tree = ValueTree::Tuple {
            items: vec![ValueTree::Repr { value: "x".into() }],
        };
        assert!(tree.is_lossy());
        assert!(!ValueTree::None.is_lossy());
    }
}
