//! Reader and writer for the `*LZ4*` tagged-chunk model (`xmodel_bin`) and
//! animation (`xanim_bin`) formats.
//!
//! A file is an [`envelope`] around one LZ4-compressed stream of [`block`]s.
//! Each block is identified by a 16-bit [`tag`]; [`decode`] routes blocks into
//! the [`asset`] graph and [`encode`] emits them back in canonical order.

pub mod asset;
pub mod block;
pub mod codec;
pub mod decode;
pub mod encode;
pub mod envelope;
pub mod file;
pub mod tag;

/// Version written into model streams.
pub const MODEL_VERSION: i16 = 7;
/// Version written into animation streams.
pub const ANIM_VERSION: i16 = 3;

pub use asset::{Anim, Asset, AssetType, Model};
pub use codec::{Codec, CodecError, Lz4Codec};
pub use decode::{decode_anim, decode_model, scan_blocks, BlockRecord, BlockScan, DecodeError};
pub use encode::{encode_anim, encode_model, EncodeError, EncodeOptions};
pub use envelope::{Envelope, EnvelopeError};
pub use file::{DecodeOptions, XBinError};
pub use tag::Tag;
