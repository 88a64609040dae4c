//! Container envelope: the outer wrapper around the raw block stream.
//!
//! ```text
//! "*LZ4*"            5 bytes, magic
//! uncompressed_len   u32 LE
//! payload            raw LZ4 block data, to end of file
//! ```
//!
//! Despite the magic this is not an LZ4 frame; the length prefix is what lets
//! the block decompressor size its output.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;
use tracing::debug;

use crate::codec::{Codec, CodecError};

pub const MAGIC: &[u8; 5] = b"*LZ4*";
/// Magic plus the length field.
pub const HEADER_SIZE: usize = 9;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Bad magic {found:02X?}, expected b\"*LZ4*\"")]
    BadMagic { found: Vec<u8> },
    #[error("Stored length {stored} does not match decompressed size {actual}")]
    LengthMismatch { stored: u32, actual: usize },
    #[error("Raw payload of {0} bytes does not fit the u32 length field")]
    PayloadTooLarge(usize),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub uncompressed_len: u32,
    /// Compressed payload, exactly as stored on disk.
    pub payload:          Vec<u8>,
}

impl Envelope {
    /// Compress a raw block stream into an envelope.
    pub fn seal(raw: &[u8], codec: &dyn Codec) -> Result<Self, EnvelopeError> {
        let uncompressed_len = u32::try_from(raw.len())
            .map_err(|_| EnvelopeError::PayloadTooLarge(raw.len()))?;
        let payload = codec.compress(raw)?;
        debug!(codec = codec.name(), raw = raw.len(), packed = payload.len(), "sealed envelope");
        Ok(Self { uncompressed_len, payload })
    }

    /// Decompress the payload.  With `verify_length` the decompressed size
    /// must equal the stored length.
    pub fn open(&self, codec: &dyn Codec, verify_length: bool) -> Result<Vec<u8>, EnvelopeError> {
        let raw = codec.decompress(&self.payload, self.uncompressed_len as usize)?;
        if verify_length && raw.len() != self.uncompressed_len as usize {
            return Err(EnvelopeError::LengthMismatch {
                stored: self.uncompressed_len,
                actual: raw.len(),
            });
        }
        debug!(codec = codec.name(), packed = self.payload.len(), raw = raw.len(), "opened envelope");
        Ok(raw)
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_len)?;
        writer.write_all(&self.payload)?;
        Ok(())
    }

    /// Reads the header and the rest of the stream as payload.  The magic is
    /// checked before anything else is read.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, EnvelopeError> {
        let mut magic = [0u8; 5];
        let got = read_up_to(&mut reader, &mut magic)?;
        if got != magic.len() || &magic != MAGIC {
            return Err(EnvelopeError::BadMagic { found: magic[..got].to_vec() });
        }
        let uncompressed_len = reader.read_u32::<LittleEndian>()?;
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        Ok(Self { uncompressed_len, payload })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.uncompressed_len.to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Envelope `raw` with `codec` and return the complete file image.
pub fn encode(raw: &[u8], codec: &dyn Codec) -> Result<Vec<u8>, EnvelopeError> {
    Ok(Envelope::seal(raw, codec)?.to_bytes())
}

/// Parse a complete file image and return the raw block stream.
pub fn decode(bytes: &[u8], codec: &dyn Codec, verify_length: bool) -> Result<Vec<u8>, EnvelopeError> {
    Envelope::read(bytes)?.open(codec, verify_length)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
