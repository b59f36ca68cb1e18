//! Binary wire format (.ogr) for objgraph graphs.
//!
//! Handles writing a [`Graph`](objgraph_core::Graph) as a compressed,
//! self-describing blob and reading it back with per-chunk integrity checks.
//!
//! ## File Layout
//!
//! ```text
//! OGR File Layout:
//! ┌──────────────────────────────┐
//! │ Magic: 0x4F475200 ("OGR\0") │  4 bytes
//! │ Version: major.minor.patch   │  3 bytes
//! │ Flags                        │  1 byte
//! ├──────────────────────────────┤
//! │ Header                       │
//! │   node_count: u64            │
//! │   pointer_count: u64         │
//! │   chunk_count: u64           │
//! │   payload_length: u64        │
//! ├──────────────────────────────┤
//! │ zstd(JSON envelope)          │
//! │   root_id, nodes, chunks,    │
//! │   pointers                   │
//! └──────────────────────────────┘
//! ```
//!
//! Integrity is per chunk: every chunk in the envelope carries the SHA-256 of
//! its bytes. Mismatches are recorded in an [`IntegrityReport`] or rejected,
//! depending on the [`ChecksumPolicy`].

mod compress;
mod envelope;
mod format;

pub use compress::{compress, decompress, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_DECODED_SIZE};
pub use envelope::{
    ChecksumMismatch, ChecksumPolicy, ChunkRecord, Envelope, IntegrityReport, MissingChunk,
    NodeRecord, PointerRecord,
};
pub use format::{
    encode, from_bytes, to_bytes, DecodedGraph, OgrFile, OgrFlags, OgrVersion, WireConfig,
    WireError, HEADER_SIZE, MAGIC,
};
