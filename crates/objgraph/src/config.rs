//! Codec configuration.

use serde::{Deserialize, Serialize};

use objgraph_core::DEFAULT_MAX_DEPTH;
use objgraph_materialize::ResolvePolicy;
use objgraph_wire::{
    ChecksumPolicy, WireConfig, DEFAULT_COMPRESSION_LEVEL, DEFAULT_MAX_DECODED_SIZE,
};

/// Settings for one encode or decode call.
///
/// Deserializes from a table with every key optional:
///
/// ```toml
/// max_depth = 100
/// checksum = "strict"
/// compression_level = 3
/// max_decoded_size = 1073741824
///
/// [resolve]
/// max_unresolved = 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Deepest nesting level the builder descends to (root at 0).
    pub max_depth: usize,
    pub checksum: ChecksumPolicy,
    pub resolve: ResolvePolicy,
    /// zstd level used when writing.
    pub compression_level: i32,
    /// Largest decompressed envelope accepted when reading.
    pub max_decoded_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self::lenient()
    }
}

impl CodecConfig {
    /// Record checksum mismatches and skip unresolvable edges.
    pub fn lenient() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            checksum: ChecksumPolicy::Lenient,
            resolve: ResolvePolicy::lenient(),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_decoded_size: DEFAULT_MAX_DECODED_SIZE,
        }
    }

    /// Fail on any checksum mismatch or resolution issue.
    pub fn strict() -> Self {
        Self {
            checksum: ChecksumPolicy::Strict,
            resolve: ResolvePolicy::strict(),
            ..Self::lenient()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub(crate) fn wire(&self) -> WireConfig {
        WireConfig {
            checksum: self.checksum,
            compression_level: self.compression_level,
            max_decoded_size: self.max_decoded_size,
        }
    }
}
