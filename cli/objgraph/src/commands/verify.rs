//! `objgraph verify`: per-chunk checksums and graph structure.

use std::path::Path;

use anyhow::{bail, Result};

use objgraph_wire::ChecksumPolicy;

use crate::commands::read_blob;

/// Exits non-zero on any checksum mismatch, missing chunk or structural
/// defect.
pub fn run(input: &Path) -> Result<()> {
    let decoded = read_blob(input, ChecksumPolicy::Lenient)?;
    let report = &decoded.report;

    println!("Verification of {}:", input.display());
    println!("  Chunks checked: {}", report.chunks_checked);
    println!("  Unchecked:      {}", report.unchecked);
    println!("  Mismatches:     {}", report.mismatches.len());
    for m in &report.mismatches {
        println!("    chunk {}: expected {}, found {}", m.chunk_id, m.expected, m.actual);
    }
    println!("  Missing chunks: {}", report.missing_chunks.len());
    for m in &report.missing_chunks {
        println!("    node {} names chunk {}", m.node_id, m.chunk_id);
    }

    let structural = match decoded.graph.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors,
    };
    println!("  Graph defects:  {}", structural.len());
    for e in &structural {
        println!("    {e}");
    }

    if !report.is_clean() || !structural.is_empty() {
        bail!(
            "verification failed: {} mismatch(es), {} missing chunk(s), {} graph defect(s)",
            report.mismatches.len(),
            report.missing_chunks.len(),
            structural.len()
        );
    }
    println!("OK");
    Ok(())
}
