//! OGR binary format implementation.
//!
//! The format uses a fixed-size header with magic bytes, version, and flags,
//! followed by the zstd-compressed JSON envelope. Integrity is checked per
//! chunk inside the envelope rather than over the whole file, so a damaged
//! payload chunk is reported without blocking reconstruction.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use objgraph_core::chunk::{ChunkError, ChunkId};
use objgraph_core::graph::node::{NodeId, TypeTag};
use objgraph_core::graph::{Graph, GraphError};

use crate::compress::{compress, decompress, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_DECODED_SIZE};
use crate::envelope::{ChecksumPolicy, Envelope, IntegrityReport};

/// Magic bytes identifying an OGR file: "OGR\0"
pub const MAGIC: [u8; 4] = [0x4F, 0x47, 0x52, 0x00];

/// Size of the fixed header (magic + version + flags + counts + payload length).
/// 4 (magic) + 3 (version) + 1 (flags) + 8*4 (counts + payload_len) = 40 bytes
pub const HEADER_SIZE: usize = 40;

/// Errors that can occur while reading or writing OGR data.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid magic bytes: expected OGR\\0")]
    InvalidMagic,

    #[error("data too small to be a valid OGR blob")]
    FileTooSmall,

    #[error("unsupported format version {major}.{minor}.{patch}")]
    UnsupportedVersion { major: u8, minor: u8, patch: u8 },

    #[error("header {field} is {header} but payload holds {actual}")]
    HeaderMismatch {
        field: &'static str,
        header: u64,
        actual: u64,
    },

    #[error("compression failed: {0}")]
    Compression(#[source] io::Error),

    #[error("decompression failed: {0}")]
    Decompression(#[source] io::Error),

    #[error("payload inflates past {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("envelope error: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("node {node_id}: unknown type code {code}")]
    UnknownTypeTag { node_id: NodeId, code: u8 },

    #[error("invalid chunk: {0}")]
    InvalidChunk(#[from] ChunkError),

    #[error("duplicate chunk id: {0}")]
    DuplicateChunk(ChunkId),

    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("node {node_id} names unknown chunk {chunk_id}")]
    MissingChunk { node_id: NodeId, chunk_id: ChunkId },

    #[error("invalid node metadata: {0}")]
    InvalidMetadata(String),

    #[error("chunk {chunk_id}: checksum mismatch")]
    ChecksumMismatch { chunk_id: ChunkId },

    #[error("graph error: {0}")]
    Graph(GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// OGR format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OgrVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl OgrVersion {
    /// The current format version.
    pub const CURRENT: OgrVersion = OgrVersion {
        major: 1,
        minor: 0,
        patch: 0,
    };

    /// Same major version, and no newer minor than this implementation.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major && self.minor <= Self::CURRENT.minor
    }
}

impl std::fmt::Display for OgrVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// OGR format flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OgrFlags {
    bits: u8,
}

impl OgrFlags {
    /// No flags set.
    pub const NONE: OgrFlags = OgrFlags { bits: 0 };

    /// Payload is zstd-compressed.
    pub const COMPRESSED: u8 = 0x01;

    /// Graph contains callables with procedure blobs.
    pub const HAS_CALLABLES: u8 = 0x02;

    /// Graph contains integers outside the i64 range.
    pub const HAS_BIGINTS: u8 = 0x04;

    pub fn new(bits: u8) -> Self {
        Self { bits }
    }

    pub fn has(&self, flag: u8) -> bool {
        self.bits & flag != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.bits |= flag;
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }
}

/// Read/write settings for the wire codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    pub checksum: ChecksumPolicy,
    /// zstd level used when writing.
    pub compression_level: i32,
    /// Largest decompressed envelope accepted when reading.
    pub max_decoded_size: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            checksum: ChecksumPolicy::Lenient,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_decoded_size: DEFAULT_MAX_DECODED_SIZE,
        }
    }
}

/// A graph read back from the wire, with the integrity findings of the load.
#[derive(Debug)]
pub struct DecodedGraph {
    pub version: OgrVersion,
    pub flags: OgrFlags,
    pub graph: Graph,
    pub report: IntegrityReport,
}

/// An OGR blob: header metadata + graph.
#[derive(Debug)]
pub struct OgrFile {
    /// Format version.
    pub version: OgrVersion,
    /// Format flags.
    pub flags: OgrFlags,
    /// The graph data.
    pub graph: Graph,
}

impl OgrFile {
    /// Wrap a graph, deriving flags from its contents.
    pub fn new(graph: Graph) -> Self {
        let mut flags = OgrFlags::NONE;
        flags.set(OgrFlags::COMPRESSED);
        if graph.nodes().any(|n| n.tag == TypeTag::Function) {
            flags.set(OgrFlags::HAS_CALLABLES);
        }
        if graph.nodes().any(|n| n.meta.is_bigint) {
            flags.set(OgrFlags::HAS_BIGINTS);
        }
        Self {
            version: OgrVersion::CURRENT,
            flags,
            graph,
        }
    }

    /// Serialize to a writer in OGR binary format.
    pub fn write_to<W: Write>(&self, writer: &mut W, level: i32) -> Result<(), WireError> {
        let envelope = Envelope::from_graph(&self.graph);
        let json = serde_json::to_vec(&envelope)?;
        let json_len = json.len();
        let payload = if self.flags.has(OgrFlags::COMPRESSED) {
            compress(&json, level)?
        } else {
            json
        };

        let node_count = self.graph.node_count() as u64;
        let pointer_count = self.graph.pointer_count() as u64;
        let chunk_count = self.graph.chunk_count() as u64;
        let payload_len = payload.len() as u64;

        writer.write_all(&MAGIC)?;
        writer.write_all(&[self.version.major, self.version.minor, self.version.patch])?;
        writer.write_all(&[self.flags.bits()])?;
        for val in [node_count, pointer_count, chunk_count, payload_len] {
            writer.write_all(&val.to_le_bytes())?;
        }
        writer.write_all(&payload)?;

        debug!(
            nodes = node_count,
            pointers = pointer_count,
            chunks = chunk_count,
            json_bytes = json_len,
            payload_bytes = payload_len,
            "wrote ogr blob"
        );
        Ok(())
    }

    /// Serialize to a byte vector.
    pub fn to_bytes(&self, level: i32) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, level)?;
        Ok(buf)
    }

    /// Deserialize from a reader.
    pub fn read_from<R: Read>(
        reader: &mut R,
        policy: ChecksumPolicy,
    ) -> Result<DecodedGraph, WireError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_bytes(&data, policy)
    }

    /// Deserialize from a byte slice with the default size limit.
    pub fn from_bytes(data: &[u8], policy: ChecksumPolicy) -> Result<DecodedGraph, WireError> {
        let config = WireConfig {
            checksum: policy,
            ..WireConfig::default()
        };
        Self::decode(data, &config)
    }

    /// Deserialize from a byte slice under `config`.
    pub fn decode(data: &[u8], config: &WireConfig) -> Result<DecodedGraph, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::FileTooSmall);
        }

        // Verify magic
        if data[0..4] != MAGIC {
            return Err(WireError::InvalidMagic);
        }

        let version = OgrVersion {
            major: data[4],
            minor: data[5],
            patch: data[6],
        };
        if !version.is_compatible() {
            return Err(WireError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
                patch: version.patch,
            });
        }

        let flags = OgrFlags::new(data[7]);

        let node_count = read_u64(data, 8);
        let pointer_count = read_u64(data, 16);
        let chunk_count = read_u64(data, 24);
        let payload_len = read_u64(data, 32);

        let payload_end = usize::try_from(payload_len)
            .ok()
            .and_then(|len| HEADER_SIZE.checked_add(len))
            .ok_or(WireError::FileTooSmall)?;
        if data.len() < payload_end {
            return Err(WireError::FileTooSmall);
        }

        let payload = &data[HEADER_SIZE..payload_end];
        let json = if flags.has(OgrFlags::COMPRESSED) {
            decompress(payload, config.max_decoded_size)?
        } else {
            payload.to_vec()
        };
        let envelope: Envelope = serde_json::from_slice(&json)?;

        check_count("node_count", node_count, envelope.nodes.len())?;
        check_count("pointer_count", pointer_count, envelope.pointers.len())?;
        check_count("chunk_count", chunk_count, envelope.chunks.len())?;

        let (graph, report) = envelope.into_graph(config.checksum)?;
        debug!(
            nodes = graph.node_count(),
            pointers = graph.pointer_count(),
            mismatches = report.mismatches.len(),
            "read ogr blob"
        );

        Ok(DecodedGraph {
            version,
            flags,
            graph,
            report,
        })
    }
}

/// Encode a graph with the default compression level.
pub fn to_bytes(graph: &Graph) -> Result<Vec<u8>, WireError> {
    encode(graph.clone(), &WireConfig::default())
}

/// Encode a graph, consuming it, under the given configuration.
pub fn encode(graph: Graph, config: &WireConfig) -> Result<Vec<u8>, WireError> {
    OgrFile::new(graph).to_bytes(config.compression_level)
}

/// Decode a blob under the given configuration.
pub fn from_bytes(data: &[u8], config: &WireConfig) -> Result<DecodedGraph, WireError> {
    OgrFile::decode(data, config)
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn check_count(field: &'static str, header: u64, actual: usize) -> Result<(), WireError> {
    let actual = actual as u64;
    if header != actual {
        return Err(WireError::HeaderMismatch {
            field,
            header,
            actual,
        });
    }
    Ok(())
}
