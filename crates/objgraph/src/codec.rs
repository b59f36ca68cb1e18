//! End-to-end encode and decode.

use std::fs;
use std::path::Path;

use tracing::debug;

use objgraph_core::{Construct, GraphBuilder, Inspect};
use objgraph_materialize::{deserialize, MaterializeReport};
use objgraph_wire::IntegrityReport;

use crate::config::CodecConfig;
use crate::error::Error;

/// A rebuilt object graph and the findings of the load.
#[derive(Debug)]
pub struct Decoded<H> {
    pub root: H,
    /// Chunk checksum verification.
    pub integrity: IntegrityReport,
    /// Pointer write-back outcome.
    pub report: MaterializeReport,
}

impl<H> Decoded<H> {
    /// True if every chunk verified and every pointer was written back.
    pub fn is_clean(&self) -> bool {
        self.integrity.is_clean() && self.report.is_clean()
    }
}

/// Encode the graph reachable from `root` into a blob.
pub fn encode<M: Inspect>(
    model: &M,
    root: M::Handle,
    config: &CodecConfig,
) -> Result<Vec<u8>, Error> {
    let graph = GraphBuilder::new()
        .with_max_depth(config.max_depth)
        .build(model, root)?;
    let bytes = objgraph_wire::encode(graph, &config.wire())?;
    Ok(bytes)
}

/// Rebuild an object graph from a blob.
pub fn decode<M: Construct>(
    model: &mut M,
    bytes: &[u8],
    config: &CodecConfig,
) -> Result<Decoded<M::Handle>, Error> {
    let decoded = objgraph_wire::from_bytes(bytes, &config.wire())?;
    let materialized = deserialize(model, &decoded.graph, &config.resolve)?;
    Ok(Decoded {
        root: materialized.root,
        integrity: decoded.report,
        report: materialized.report,
    })
}

/// Encode to a file. The file holds the blob verbatim.
pub fn save<M: Inspect>(
    model: &M,
    root: M::Handle,
    path: impl AsRef<Path>,
    config: &CodecConfig,
) -> Result<(), Error> {
    let path = path.as_ref();
    let bytes = encode(model, root, config)?;
    fs::write(path, &bytes).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "saved object graph");
    Ok(())
}

/// Decode from a file written by [`save`].
pub fn load<M: Construct>(
    model: &mut M,
    path: impl AsRef<Path>,
    config: &CodecConfig,
) -> Result<Decoded<M::Handle>, Error> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(model, &bytes, config)
}
