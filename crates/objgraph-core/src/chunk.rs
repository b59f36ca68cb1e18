//! Chunk store: fixed-size, checksummed slices of a node's scalar payload.
//!
//! Payloads are cut into [`CHUNK_SIZE`] pieces. Each chunk keeps its raw
//! bytes, a base64 text form for the JSON envelope, and the SHA-256 hex digest
//! of the raw bytes. Chunk ids come from a counter shared by one encode
//! session, so they are unique across the whole graph.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::hash::sha256_hex;

/// Maximum number of payload bytes per chunk (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Graph-wide chunk identifier.
pub type ChunkId = u32;

/// Errors raised while rebuilding a chunk from its encoded form.
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk {id}: invalid base64 payload: {source}")]
    InvalidEncoding {
        id: ChunkId,
        #[source]
        source: base64::DecodeError,
    },
}

/// One checksummed slice of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub raw: Vec<u8>,
    /// Standard base64 of `raw`.
    pub encoded: String,
    /// SHA-256 of `raw`, lowercase hex. Empty for legacy payloads.
    pub checksum: String,
    pub original_size: usize,
}

impl Chunk {
    /// Build a chunk from raw bytes, computing its text form and checksum.
    pub fn new(id: ChunkId, raw: Vec<u8>) -> Self {
        let encoded = BASE64_STANDARD.encode(&raw);
        let checksum = sha256_hex(&raw);
        let original_size = raw.len();
        Self {
            id,
            raw,
            encoded,
            checksum,
            original_size,
        }
    }

    /// Rebuild a chunk from its envelope fields.
    ///
    /// The stored checksum is kept as-is; call [`Chunk::verify`] to compare it
    /// against the decoded bytes.
    pub fn from_encoded(
        id: ChunkId,
        encoded: String,
        checksum: String,
        original_size: usize,
    ) -> Result<Self, ChunkError> {
        let raw = BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(|source| ChunkError::InvalidEncoding { id, source })?;
        Ok(Self {
            id,
            raw,
            encoded,
            checksum,
            original_size,
        })
    }

    /// Whether a checksum was stored for this chunk.
    pub fn has_checksum(&self) -> bool {
        !self.checksum.is_empty()
    }

    /// The checksum of the bytes actually held.
    pub fn computed_checksum(&self) -> String {
        sha256_hex(&self.raw)
    }

    /// Recompute the checksum and compare it with the stored one.
    pub fn verify(&self) -> bool {
        self.computed_checksum() == self.checksum
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

/// Session-scoped chunk id allocator.
#[derive(Debug, Default)]
pub struct ChunkStore {
    next_id: ChunkId,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Split `data` into [`CHUNK_SIZE`] chunks, in order, consuming one id per
    /// chunk. Empty input yields no chunks and consumes no ids.
    pub fn create_chunks(&mut self, data: &[u8]) -> Vec<Chunk> {
        data.chunks(CHUNK_SIZE)
            .map(|piece| {
                let id = self.next_id;
                self.next_id += 1;
                Chunk::new(id, piece.to_vec())
            })
            .collect()
    }

    /// The id the next chunk will receive.
    pub fn next_id(&self) -> ChunkId {
        self.next_id
    }
}

/// Concatenate chunk payloads in chunk-id order.
pub fn reassemble(chunks: &[Chunk]) -> Vec<u8> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.id);
    let total = ordered.iter().map(|c| c.raw.len()).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in ordered {
        out.extend_from_slice(&chunk.raw);
    }
    out
}
