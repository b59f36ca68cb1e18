//! CLI command implementations.

pub mod decode;
pub mod encode;
pub mod inspect;
pub mod verify;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use objgraph_wire::{ChecksumPolicy, DecodedGraph, OgrFile};

/// Read and parse an .ogr file without materializing it.
pub(crate) fn read_blob(path: &Path, policy: ChecksumPolicy) -> Result<DecodedGraph> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    OgrFile::from_bytes(&bytes, policy).with_context(|| format!("parsing {}", path.display()))
}
