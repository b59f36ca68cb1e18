//! `objgraph inspect`: header, node table, pointers and chunks.

use std::path::Path;

use anyhow::Result;

use objgraph_core::Node;
use objgraph_wire::{ChecksumPolicy, OgrFlags};

use crate::commands::read_blob;

pub fn run(input: &Path, show_pointers: bool, show_chunks: bool) -> Result<()> {
    let decoded = read_blob(input, ChecksumPolicy::Lenient)?;
    let graph = &decoded.graph;

    println!("--- {} ---", input.display());
    println!("  Version:  {}", decoded.version);
    println!("  Flags:    {}", describe_flags(decoded.flags));
    println!("  Root:     {}", graph.root_id());
    println!("  Nodes:    {}", graph.node_count());
    println!("  Pointers: {}", graph.pointer_count());
    println!("  Chunks:   {}", graph.chunk_count());

    println!();
    println!("{:>6}  {:<10} {:<24} {:>8}  {:>6}", "ID", "TAG", "TYPE", "BYTES", "EDGES");
    for node in graph.nodes() {
        println!(
            "{:>6}  {:<10} {:<24} {:>8}  {:>6}",
            node.id,
            node.tag.to_string(),
            qualified_type(node),
            node.payload_len(),
            node.pointers.len()
        );
    }

    if show_pointers {
        println!();
        println!("Pointers:");
        for p in graph.pointers() {
            println!("  {} -[{}]-> {}", p.from_node_id, p.field_name, p.to_node_id);
        }
    }

    if show_chunks {
        println!();
        println!("Chunks:");
        for node in graph.nodes() {
            for chunk in &node.chunks {
                let status = if !chunk.has_checksum() {
                    "unchecked"
                } else if chunk.verify() {
                    "ok"
                } else {
                    "MISMATCH"
                };
                println!(
                    "  #{:<5} node {:<5} {:>8} bytes  {}  {}",
                    chunk.id,
                    node.id,
                    chunk.len(),
                    short_checksum(&chunk.checksum),
                    status
                );
            }
        }
    }

    Ok(())
}

fn describe_flags(flags: OgrFlags) -> String {
    let names: Vec<&str> = [
        (OgrFlags::COMPRESSED, "compressed"),
        (OgrFlags::HAS_CALLABLES, "callables"),
        (OgrFlags::HAS_BIGINTS, "bigints"),
    ]
    .into_iter()
    .filter(|(bit, _)| flags.has(*bit))
    .map(|(_, name)| name)
    .collect();
    if names.is_empty() {
        "none".into()
    } else {
        names.join(", ")
    }
}

fn qualified_type(node: &Node) -> String {
    let meta = &node.meta;
    match (meta.module_name.is_empty(), meta.type_name.is_empty()) {
        (false, false) => format!("{}.{}", meta.module_name, meta.type_name),
        (false, true) => meta.module_name.clone(),
        _ => meta.type_name.clone(),
    }
}

fn short_checksum(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_listed_by_name() {
        let mut flags = OgrFlags::NONE;
        assert_eq!(describe_flags(flags), "none");
        flags.set(OgrFlags::COMPRESSED);
        flags.set(OgrFlags::HAS_BIGINTS);
        assert_eq!(describe_flags(flags), "compressed, bigints");
    }

    #[test]
    fn checksum_shortened() {
        assert_eq!(short_checksum("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_checksum(""), "");
    }

    #[test]
    fn inspect_encoded_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.json");
        let blob = dir.path().join("doc.ogr");
        std::fs::write(&input, r#"[1, "two", {"three": 3}]"#).unwrap();
        crate::commands::encode::run(&input, &blob, &objgraph::CodecConfig::default()).unwrap();

        run(&blob, true, true).unwrap();
    }
}
