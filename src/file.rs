//! Whole-file API: envelope plus block stream in one call.
//!
//! ```no_run
//! use xbin::file::{read_model_file, write_model_file};
//! use xbin::EncodeOptions;
//!
//! let model = read_model_file("viewmodel.xmodel_bin")?;
//! write_model_file("copy.xmodel_bin", &model, &EncodeOptions::default())?;
//! # Ok::<(), xbin::XBinError>(())
//! ```

use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::asset::{Anim, Asset, AssetType, Model};
use crate::codec::Lz4Codec;
use crate::decode::{self, DecodeError};
use crate::encode::{self, EncodeError, EncodeOptions};
use crate::envelope::{self, EnvelopeError};

#[derive(Error, Debug)]
pub enum XBinError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, XBinError>;

// ── DecodeOptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Fail on a marker of any other asset type.
    pub expected:      Option<AssetType>,
    /// Require the decompressed size to equal the stored length.
    pub verify_length: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { expected: None, verify_length: true }
    }
}

impl DecodeOptions {
    pub fn expecting(asset_type: AssetType) -> Self {
        Self { expected: Some(asset_type), ..Self::default() }
    }
}

// ── In-memory images ─────────────────────────────────────────────────────────

/// Decompressed block stream of a file image.
pub fn open_stream(bytes: &[u8], verify_length: bool) -> Result<Vec<u8>> {
    Ok(envelope::decode(bytes, &Lz4Codec, verify_length)?)
}

pub fn read_asset(bytes: &[u8], options: &DecodeOptions) -> Result<Asset> {
    let raw = open_stream(bytes, options.verify_length)?;
    Ok(decode::decode(&raw, options.expected)?)
}

pub fn read_model(bytes: &[u8]) -> Result<Model> {
    let raw = open_stream(bytes, true)?;
    Ok(decode::decode_model(&raw)?)
}

pub fn read_anim(bytes: &[u8]) -> Result<Anim> {
    let raw = open_stream(bytes, true)?;
    Ok(decode::decode_anim(&raw)?)
}

pub fn write_model(model: &Model, options: &EncodeOptions) -> Result<Vec<u8>> {
    let raw = encode::encode_model(model, options)?;
    Ok(envelope::encode(&raw, &Lz4Codec)?)
}

pub fn write_anim(anim: &Anim) -> Result<Vec<u8>> {
    let raw = encode::encode_anim(anim)?;
    Ok(envelope::encode(&raw, &Lz4Codec)?)
}

pub fn write_asset(asset: &Asset, options: &EncodeOptions) -> Result<Vec<u8>> {
    match asset {
        Asset::Model(model) => write_model(model, options),
        Asset::Anim(anim)   => write_anim(anim),
    }
}

// ── Paths ────────────────────────────────────────────────────────────────────

pub fn read_asset_file<P: AsRef<Path>>(path: P, options: &DecodeOptions) -> Result<Asset> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    debug!(path = %path.display(), bytes = bytes.len(), "read file");
    read_asset(&bytes, options)
}

pub fn read_model_file<P: AsRef<Path>>(path: P) -> Result<Model> {
    let asset = read_asset_file(path, &DecodeOptions::expecting(AssetType::Model))?;
    asset.into_model().ok_or(XBinError::Decode(DecodeError::MissingAssetMarker))
}

pub fn read_anim_file<P: AsRef<Path>>(path: P) -> Result<Anim> {
    let asset = read_asset_file(path, &DecodeOptions::expecting(AssetType::Anim))?;
    asset.into_anim().ok_or(XBinError::Decode(DecodeError::MissingAssetMarker))
}

pub fn write_asset_file<P: AsRef<Path>>(path: P, asset: &Asset, options: &EncodeOptions) -> Result<()> {
    let path = path.as_ref();
    let bytes = write_asset(asset, options)?;
    std::fs::write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

pub fn write_model_file<P: AsRef<Path>>(path: P, model: &Model, options: &EncodeOptions) -> Result<()> {
    let bytes = write_model(model, options)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn write_anim_file<P: AsRef<Path>>(path: P, anim: &Anim) -> Result<()> {
    let bytes = write_anim(anim)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

// ── JSON ─────────────────────────────────────────────────────────────────────

pub fn asset_to_json(asset: &Asset) -> Result<String> {
    Ok(serde_json::to_string_pretty(asset)?)
}

pub fn asset_from_json(json: &str) -> Result<Asset> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Bone;

    #[test]
    fn model_image_roundtrip() {
        let mut model = Model::default();
        model.bones.push(Bone::new("tag_origin", -1));
        let bytes = write_model(&model, &EncodeOptions::default()).unwrap();
        assert_eq!(&bytes[..5], b"*LZ4*");
        assert_eq!(read_model(&bytes).unwrap(), model);
    }

    #[test]
    fn wrong_type_through_the_file_api() {
        let bytes = write_anim(&Anim::default()).unwrap();
        assert!(matches!(
            read_model(&bytes),
            Err(XBinError::Decode(DecodeError::AssetTypeMismatch { .. }))
        ));
        let asset = read_asset(&bytes, &DecodeOptions::default()).unwrap();
        assert_eq!(asset.asset_type(), AssetType::Anim);
    }

    #[test]
    fn json_keeps_the_asset_type() {
        let asset = Asset::Anim(Anim::default());
        let json = asset_to_json(&asset).unwrap();
        assert!(json.contains("\"type\": \"anim\""));
        assert_eq!(asset_from_json(&json).unwrap(), asset);
    }
}
