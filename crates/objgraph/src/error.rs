//! Error types for the codec facade.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use objgraph_core::BuildError;
use objgraph_materialize::MaterializeError;
use objgraph_wire::WireError;

/// Any failure of an encode, decode, save or load call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("encode failed: {0}")]
    Build(#[from] BuildError),

    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    #[error("decode failed: {0}")]
    Materialize(#[from] MaterializeError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
