//! File persistence: the saved file is the blob, byte for byte.

use std::fs;

use objgraph::{encode, load, save, CodecConfig, Error};
use objgraph_heap::Heap;

#[test]
fn save_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.ogr");

    let mut src = Heap::new();
    let name = src.str("config");
    let items = src.list(vec![]);
    let root = src.dict(vec![(name, items)]);
    src.push(items, root).unwrap();

    let config = CodecConfig::default();
    save(&src, root, &path, &config).unwrap();
    assert_eq!(fs::read(&path).unwrap(), encode(&src, root, &config).unwrap());

    let mut dst = Heap::new();
    let decoded = load(&mut dst, &path, &config).unwrap();
    assert!(decoded.is_clean());
    assert!(src.equivalent(root, &dst, decoded.root));
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.ogr");

    let mut heap = Heap::new();
    match load(&mut heap, &path, &CodecConfig::default()) {
        Err(Error::Io { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected I/O error, got {other:?}"),
    }
}

#[test]
fn failed_encode_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.ogr");

    let mut heap = Heap::new();
    let f = heap.file("handle.txt");
    assert!(save(&heap, f, &path, &CodecConfig::default()).is_err());
    assert!(!path.exists());
}
