//! zstd framing for the envelope payload.

use std::io::Read;

use crate::format::WireError;

/// zstd level used when none is configured.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Largest envelope a frame may inflate to unless configured otherwise.
pub const DEFAULT_MAX_DECODED_SIZE: usize = 1 << 30;

/// Compress `raw` into a single zstd frame.
pub fn compress(raw: &[u8], level: i32) -> Result<Vec<u8>, WireError> {
    zstd::encode_all(raw, level).map_err(WireError::Compression)
}

/// Decompress a zstd frame, failing once the output passes `limit` bytes.
pub fn decompress(payload: &[u8], limit: usize) -> Result<Vec<u8>, WireError> {
    let decoder = zstd::Decoder::new(payload).map_err(WireError::Decompression)?;
    let mut raw = Vec::new();
    decoder
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut raw)
        .map_err(WireError::Decompression)?;
    if raw.len() > limit {
        return Err(WireError::PayloadTooLarge { limit });
    }
    Ok(raw)
}
