//! `objgraph encode`: JSON document to .ogr blob.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use objgraph::CodecConfig;
use objgraph_heap::Heap;

pub fn run(input: &Path, output: &Path, config: &CodecConfig) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let document: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", input.display()))?;

    let mut heap = Heap::new();
    let root = heap
        .from_json(&document)
        .with_context(|| format!("importing {}", input.display()))?;

    let bytes = objgraph::encode(&heap, root, config).context("encoding object graph")?;
    fs::write(output, &bytes).with_context(|| format!("writing {}", output.display()))?;

    println!(
        "Encoded {} -> {} ({} bytes)",
        input.display(),
        output.display(),
        bytes.len()
    );
    Ok(())
}
