//! Property tests: scalar and flat-container round trips.

use num_bigint::BigInt;
use proptest::prelude::*;

use objgraph::{decode, encode, CodecConfig};
use objgraph_heap::{Heap, ObjRef};

#[derive(Debug, Clone)]
enum Scalar {
    None,
    Bool(bool),
    Int(i64),
    Big(Vec<u8>),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        Just(Scalar::None),
        any::<bool>().prop_map(Scalar::Bool),
        any::<i64>().prop_map(Scalar::Int),
        prop::collection::vec(any::<u8>(), 9..24).prop_map(Scalar::Big),
        any::<f64>().prop_map(Scalar::Float),
        ".*".prop_map(Scalar::Str),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Scalar::Bytes),
    ]
}

fn alloc(heap: &mut Heap, value: &Scalar) -> ObjRef {
    match value {
        Scalar::None => heap.none(),
        Scalar::Bool(b) => heap.bool(*b),
        Scalar::Int(i) => heap.int(*i),
        Scalar::Big(bytes) => heap.int(BigInt::from_signed_bytes_le(bytes)),
        Scalar::Float(x) => heap.float(*x),
        Scalar::Str(s) => heap.str(s),
        Scalar::Bytes(b) => heap.bytes(b),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scalar_round_trip(value in scalar()) {
        let mut src = Heap::new();
        let root = alloc(&mut src, &value);
        let bytes = encode(&src, root, &CodecConfig::strict()).unwrap();

        let mut dst = Heap::new();
        let decoded = decode(&mut dst, &bytes, &CodecConfig::strict()).unwrap();
        prop_assert!(src.equivalent(root, &dst, decoded.root));
    }

    #[test]
    fn list_of_scalars_round_trip(values in prop::collection::vec(scalar(), 0..16)) {
        let mut src = Heap::new();
        let items: Vec<ObjRef> = values.iter().map(|v| alloc(&mut src, v)).collect();
        let root = src.list(items);
        let bytes = encode(&src, root, &CodecConfig::strict()).unwrap();

        let mut dst = Heap::new();
        let decoded = decode(&mut dst, &bytes, &CodecConfig::strict()).unwrap();
        prop_assert!(decoded.is_clean());
        prop_assert!(src.equivalent(root, &dst, decoded.root));
    }
}
