//! Compression transform used by the container envelope.
//!
//! The envelope treats compression as an opaque `bytes -> bytes` function.
//! The on-disk format only ever carries raw LZ4 *block* data: no LZ4 frame
//! header and no embedded size, because the envelope stores the uncompressed
//! length itself.  [`Lz4Codec`] is therefore the only codec the format knows;
//! the [`Codec`] trait exists so callers (and tests) can substitute the
//! transform without touching the envelope.

use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Decompression error: {0}")]
    Decompression(String),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec {
    /// Human-readable name, for diagnostics only.
    fn name(&self) -> &'static str;
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
    /// `uncompressed_len` is the size recorded in the envelope header.
    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>, CodecError>;
}

// ── Built-in codec ───────────────────────────────────────────────────────────

/// Raw LZ4 block compression.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn name(&self) -> &'static str { "lz4-block" }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(lz4_flex::block::compress(data))
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>, CodecError> {
        lz4_flex::block::decompress(data, uncompressed_len)
            .map_err(|e| CodecError::Decompression(e.to_string()))
    }
}
