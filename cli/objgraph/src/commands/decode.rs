//! `objgraph decode`: .ogr blob to JSON on stdout.

use std::path::Path;

use anyhow::{Context, Result};

use objgraph::CodecConfig;
use objgraph_core::{Graph, TypeTag};
use objgraph_heap::Heap;

use crate::commands::read_blob;

pub fn run(input: &Path, pretty: bool, config: &CodecConfig) -> Result<()> {
    let value = decode_to_json(input, config)?;
    let text = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    println!("{text}");
    Ok(())
}

/// Decode into a fresh heap and export the root as JSON.
pub fn decode_to_json(input: &Path, config: &CodecConfig) -> Result<serde_json::Value> {
    let decoded = read_blob(input, config.checksum)?;
    for mismatch in &decoded.report.mismatches {
        eprintln!("warning: chunk {} checksum mismatch", mismatch.chunk_id);
    }

    let mut heap = Heap::new();
    register_modules(&mut heap, &decoded.graph);
    let materialized = objgraph::deserialize(&mut heap, &decoded.graph, &config.resolve)
        .with_context(|| format!("materializing {}", input.display()))?;
    for issue in &materialized.report.issues {
        eprintln!("warning: {issue}");
    }

    Ok(heap.to_json(materialized.root))
}

/// The CLI heap has no real modules; every module the blob names is made
/// importable by name.
fn register_modules(heap: &mut Heap, graph: &Graph) {
    for node in graph.nodes().filter(|n| n.tag == TypeTag::Module) {
        heap.register_module(&node.meta.module_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn encode_then_decode() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("doc.json");
        let blob = dir.path().join("doc.ogr");
        let doc = json!({
            "name": "ünïcode",
            "values": [1, 2.5, null, {"$int": "340282366920938463463374607431768211456"}],
            "path": {"$module": "os.path"},
            "pt": {"$record": {"module": "geo", "type": "Point", "attributes": {"x": 1}}}
        });
        fs::write(&input, doc.to_string()).unwrap();

        crate::commands::encode::run(&input, &blob, &CodecConfig::default()).unwrap();
        let value = decode_to_json(&blob, &CodecConfig::strict()).unwrap();
        assert_eq!(value, doc);
    }
}
