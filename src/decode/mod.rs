//! Block-stream decoder.
//!
//! One forward pass over the decompressed stream.  Each block is read by the
//! handler its tag dispatches to; handlers route property blocks through the
//! [`DecodeContext`] into a [`Partial`] asset, which is checked and assembled
//! once the stream ends.

pub mod context;
mod handlers;
pub mod partial;

use std::io::{self, Cursor};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::asset::{Anim, Asset, AssetType, Model};
use crate::block::ReadBlockExt;
use crate::tag::{Applicability, Tag};
use crate::{ANIM_VERSION, MODEL_VERSION};

pub use context::{ActiveEntity, DecodeContext, FrameRef};
pub use partial::Partial;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unknown tag 0x{tag:04X} at offset {offset}")]
    UnknownTag { tag: u16, offset: u64 },
    #[error("Block '{name}' at offset {offset} is not implemented")]
    UnimplementedBlock { name: &'static str, offset: u64 },
    #[error("Expected a {expected} asset, found a {found} marker at offset {offset}")]
    AssetTypeMismatch { expected: AssetType, found: AssetType, offset: u64 },
    #[error("'{tag}' at offset {offset}: {reason}")]
    StructuralViolation { tag: &'static str, offset: u64, reason: String },
    #[error("'{tag}' at offset {offset}: {what} index {index} out of range for {len} slots")]
    IndexOutOfRange { tag: &'static str, offset: u64, what: &'static str, index: i64, len: usize },
    #[error("No data was decoded for {what} {index}")]
    MissingSlot { what: &'static str, index: usize },
    #[error("Stream has no model or animation marker")]
    MissingAssetMarker,
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),
    #[error("'{tag}' at offset {offset} runs past the end of the stream")]
    Truncated { tag: &'static str, offset: u64 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Decode a raw (decompressed) block stream.  With `expected` set, a marker
/// of the other type fails immediately.
pub fn decode(raw: &[u8], expected: Option<AssetType>) -> Result<Asset, DecodeError> {
    let mut ctx = DecodeContext::new(expected);
    let mut partial = Partial::default();
    run(raw, &mut ctx, &mut partial, |_, _| {})?;

    let asset_type = ctx.asset_type.ok_or(DecodeError::MissingAssetMarker)?;
    check_version(asset_type, partial.version);
    let asset = match asset_type {
        AssetType::Model => Asset::Model(partial.finish_model()?),
        AssetType::Anim  => Asset::Anim(partial.finish_anim()?),
    };
    debug!(asset = %asset_type, bytes = raw.len(), "decoded stream");
    Ok(asset)
}

pub fn decode_model(raw: &[u8]) -> Result<Model, DecodeError> {
    decode(raw, Some(AssetType::Model))?
        .into_model()
        .ok_or(DecodeError::MissingAssetMarker)
}

pub fn decode_anim(raw: &[u8]) -> Result<Anim, DecodeError> {
    decode(raw, Some(AssetType::Anim))?
        .into_anim()
        .ok_or(DecodeError::MissingAssetMarker)
}

/// One block as seen by [`scan_blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub offset: u64,
    pub tag:    Tag,
}

#[derive(Debug)]
pub struct BlockScan {
    /// Every block whose tag resolved, in stream order.
    pub blocks:     Vec<BlockRecord>,
    pub asset_type: Option<AssetType>,
    /// First error hit, if the stream did not decode cleanly.
    pub error:      Option<DecodeError>,
}

/// Walk the stream and list its blocks.  Stops at the first error but keeps
/// everything read up to that point.
pub fn scan_blocks(raw: &[u8]) -> BlockScan {
    let mut ctx = DecodeContext::new(None);
    let mut partial = Partial::default();
    let mut blocks = Vec::new();
    let error = run(raw, &mut ctx, &mut partial, |offset, tag| {
        blocks.push(BlockRecord { offset, tag })
    })
    .err();
    BlockScan { blocks, asset_type: ctx.asset_type, error }
}

fn run<F>(raw: &[u8], ctx: &mut DecodeContext, partial: &mut Partial, mut on_block: F) -> Result<(), DecodeError>
where
    F: FnMut(u64, Tag),
{
    let end = raw.len() as u64;
    let mut cursor = Cursor::new(raw);
    loop {
        let offset = cursor.position();
        if offset >= end {
            return Ok(());
        }
        let id = cursor
            .read_tag()
            .map_err(|_| DecodeError::Truncated { tag: "block tag", offset })?;
        let tag = Tag::from_u16(id).ok_or(DecodeError::UnknownTag { tag: id, offset })?;

        ctx.begin_block(tag, offset);
        on_block(offset, tag);
        trace!(offset, block = %tag, "block");

        if !tag.is_supported() {
            return Err(DecodeError::UnimplementedBlock { name: tag.name(), offset });
        }
        check_applicability(ctx, tag);

        handlers::dispatch(tag, &mut cursor, ctx, partial).map_err(|e| match e {
            DecodeError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                DecodeError::Truncated { tag: tag.name(), offset }
            }
            other => other,
        })?;
    }
}

fn check_applicability(ctx: &DecodeContext, tag: Tag) {
    let mismatch = matches!(
        (ctx.asset_type, tag.applies_to()),
        (Some(AssetType::Model), Applicability::Anim) | (Some(AssetType::Anim), Applicability::Model)
    );
    if mismatch {
        if let Some(asset_type) = ctx.asset_type {
            warn!(block = tag.name(), offset = ctx.offset, asset = %asset_type, "block does not belong to this asset type");
        }
    }
}

fn check_version(asset_type: AssetType, version: Option<i16>) {
    let known = match asset_type {
        AssetType::Model => MODEL_VERSION,
        AssetType::Anim  => ANIM_VERSION,
    };
    match version {
        Some(v) if v != known => warn!(asset = %asset_type, version = v, expected = known, "unexpected format version"),
        None => warn!(asset = %asset_type, "stream has no version block"),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::WriteBlockExt;

    fn model_header() -> Vec<u8> {
        let mut b = Vec::new();
        b.write_marker_block(Tag::Model.id()).unwrap();
        b.write_int16_block(Tag::Version.id(), MODEL_VERSION).unwrap();
        b
    }

    fn anim_header() -> Vec<u8> {
        let mut b = Vec::new();
        b.write_marker_block(Tag::Anim.id()).unwrap();
        b.write_int16_block(Tag::Version.id(), ANIM_VERSION).unwrap();
        b
    }

    /// Three vertices, one face, one object, no bones or materials.
    fn triangle_model(extra_corner: bool) -> Vec<u8> {
        let mut b = model_header();
        b.write_uint16_block(Tag::VertexCount.id(), 3).unwrap();
        for i in 0..3u16 {
            b.write_uint16_block(Tag::VertexIndex.id(), i).unwrap();
            b.write_vec3_block(Tag::Offset.id(), [i as f32, 0.0, 0.0]).unwrap();
        }
        b.write_int32_block(Tag::FaceCount.id(), 1).unwrap();
        b.write_triangle_block(Tag::TriangleInfo.id(), 0, 0).unwrap();
        let corners: &[u16] = if extra_corner { &[0, 1, 2, 0] } else { &[2, 1, 0] };
        for &v in corners {
            b.write_uint16_block(Tag::VertexIndex.id(), v).unwrap();
            b.write_short_vec3_block(Tag::Normal.id(), [0.0, 0.0, 1.0]).unwrap();
            b.write_color_block(Tag::Color.id(), [1.0, 0.0, v as f32, 1.0]).unwrap();
            b.write_uv_block(Tag::Uv.id(), 1, [v as f32 * 0.25, 0.5]).unwrap();
        }
        b.write_int16_block(Tag::ObjectCount.id(), 1).unwrap();
        b.write_object_info_block(Tag::ObjectInfo.id(), 0, "tri").unwrap();
        b.write_int16_block(Tag::MaterialCount.id(), 0).unwrap();
        b
    }

    #[test]
    fn vertex_index_inside_a_face_adds_a_corner() {
        let model = decode_model(&triangle_model(false)).unwrap();
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.vertices[2].offset, [2.0, 0.0, 0.0]);
        assert_eq!(mesh.faces.len(), 1);
        assert_eq!(mesh.faces[0].corners.map(|c| c.vertex), [2, 1, 0]);
        for (corner, v) in mesh.faces[0].corners.iter().zip([2.0f32, 1.0, 0.0]) {
            assert_eq!(corner.normal, [0.0, 0.0, 1.0]);
            // 2.0 saturates to full intensity
            assert_eq!(corner.color, [1.0, 0.0, v.min(1.0), 1.0]);
            assert_eq!(corner.uv, [v * 0.25, 0.5]);
        }
    }

    #[test]
    fn fourth_corner_is_rejected() {
        let err = decode_model(&triangle_model(true)).unwrap_err();
        assert!(matches!(err, DecodeError::StructuralViolation { tag: "Vert info block marker", .. }), "{err}");
    }

    #[test]
    fn property_without_index_is_rejected() {
        let mut b = model_header();
        let offset = b.len() as u64;
        b.write_vec3_block(Tag::Offset.id(), [1.0, 2.0, 3.0]).unwrap();
        match decode_model(&b).unwrap_err() {
            DecodeError::StructuralViolation { offset: at, .. } => assert_eq!(at, offset),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn cosmetic_bones_are_the_tail() {
        let mut b = model_header();
        b.write_int16_block(Tag::BoneCount.id(), 10).unwrap();
        b.write_int32_block(Tag::CosmeticCount.id(), 3).unwrap();
        for i in 0..10 {
            b.write_bone_info_block(Tag::BoneInfo.id(), i, i - 1, &format!("j_{i}")).unwrap();
        }
        b.write_int16_block(Tag::ObjectCount.id(), 0).unwrap();
        b.write_int16_block(Tag::MaterialCount.id(), 0).unwrap();

        let model = decode_model(&b).unwrap();
        let cosmetic: Vec<usize> = model
            .bones
            .iter()
            .enumerate()
            .filter(|(_, bone)| bone.cosmetic)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(cosmetic, [7, 8, 9]);
        assert_eq!(model.bones[0].parent, -1);
    }

    #[test]
    fn notetrack_part_indices_leave_the_last_frame_alone() {
        let mut b = anim_header();
        b.write_int16_block(Tag::PartCount.id(), 1).unwrap();
        b.write_object_info_block(Tag::PartInfo.id(), 0, "tag_origin").unwrap();
        b.write_int16_block(Tag::Framerate.id(), 30).unwrap();
        b.write_int32_block(Tag::FrameCount.id(), 1).unwrap();
        b.write_int32_block(Tag::FrameIndex.id(), 0).unwrap();
        b.write_int16_block(Tag::PartIndex.id(), 0).unwrap();
        b.write_vec3_block(Tag::Offset.id(), [1.0, 2.0, 3.0]).unwrap();

        b.write_int16_block(Tag::NotetrackSection.id(), 0).unwrap();
        b.write_int16_block(Tag::TrackCount.id(), 1).unwrap();
        b.write_int16_block(Tag::PartIndex.id(), 0).unwrap();
        b.write_vec3_block(Tag::Offset.id(), [9.0, 9.0, 9.0]).unwrap();
        b.write_int16_block(Tag::KeyCount.id(), 1).unwrap();
        b.write_note_frame_block(Tag::NoteFrame.id(), 0, "start").unwrap();

        let anim = decode_anim(&b).unwrap();
        assert_eq!(anim.frames.len(), 1);
        assert_eq!(anim.frames[0].parts[0].offset, [1.0, 2.0, 3.0]);
        assert_eq!(anim.notes.len(), 1);
        assert_eq!(anim.notes[0].string, "start");
        assert_eq!(anim.framerate, 30.0);
    }

    #[test]
    fn asset_type_mismatch_at_the_marker() {
        let b = anim_header();
        match decode_model(&b).unwrap_err() {
            DecodeError::AssetTypeMismatch { expected, found, offset } => {
                assert_eq!((expected, found, offset), (AssetType::Model, AssetType::Anim, 0));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn unknown_and_unimplemented_tags_report_their_offset() {
        let mut b = model_header();
        b.extend_from_slice(&[0xFF, 0xFF]);
        assert!(matches!(decode(&b, None), Err(DecodeError::UnknownTag { tag: 0xFFFF, offset: 8 })));

        let mut b = model_header();
        b.write_marker_block(Tag::Quaternion.id()).unwrap();
        assert!(matches!(
            decode(&b, None),
            Err(DecodeError::UnimplementedBlock { name: "QUATERNION", offset: 8 })
        ));
    }

    #[test]
    fn index_out_of_range() {
        let mut b = model_header();
        b.write_int16_block(Tag::ObjectCount.id(), 1).unwrap();
        b.write_object_info_block(Tag::ObjectInfo.id(), 4, "far").unwrap();
        assert!(matches!(
            decode_model(&b),
            Err(DecodeError::IndexOutOfRange { what: "object", index: 4, len: 1, .. })
        ));
    }

    #[test]
    fn unfilled_slots_are_reported() {
        let mut b = model_header();
        b.write_int16_block(Tag::ObjectCount.id(), 2).unwrap();
        b.write_object_info_block(Tag::ObjectInfo.id(), 0, "only").unwrap();
        assert!(matches!(decode_model(&b), Err(DecodeError::MissingSlot { what: "mesh", index: 1 })));
    }

    #[test]
    fn huge_vertex_count_is_rejected_before_allocating() {
        let mut b = model_header();
        let offset = b.len() as u64;
        b.write_int32_block(Tag::VertexCount32.id(), i32::MAX).unwrap();
        b.write_int32_block(Tag::VertexIndex32.id(), 0).unwrap();
        match decode_model(&b).unwrap_err() {
            DecodeError::StructuralViolation { tag, offset: at, .. } => {
                assert_eq!((tag, at), (Tag::VertexCount32.name(), offset));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn vertex_count32_that_fits_is_accepted() {
        let mut b = model_header();
        b.write_int32_block(Tag::VertexCount32.id(), 1).unwrap();
        b.write_int32_block(Tag::VertexIndex32.id(), 0).unwrap();
        b.write_vec3_block(Tag::Offset.id(), [1.0, 2.0, 3.0]).unwrap();
        b.write_int16_block(Tag::ObjectCount.id(), 0).unwrap();
        b.write_int16_block(Tag::MaterialCount.id(), 0).unwrap();
        assert!(decode_model(&b).is_ok());
    }

    #[test]
    fn huge_face_count_is_only_a_hint() {
        let mut b = model_header();
        b.write_int32_block(Tag::FaceCount.id(), i32::MAX).unwrap();
        b.write_int16_block(Tag::ObjectCount.id(), 0).unwrap();
        b.write_int16_block(Tag::MaterialCount.id(), 0).unwrap();
        let model = decode_model(&b).unwrap();
        assert!(model.meshes.is_empty());
    }

    #[test]
    fn huge_frame_count_is_only_a_hint() {
        let mut b = anim_header();
        b.write_int16_block(Tag::PartCount.id(), 0).unwrap();
        b.write_int16_block(Tag::Framerate.id(), 30).unwrap();
        b.write_int32_block(Tag::FrameCount.id(), i32::MAX).unwrap();
        b.write_int32_block(Tag::FrameIndex.id(), 0).unwrap();
        let anim = decode_anim(&b).unwrap();
        assert_eq!(anim.frames.len(), 1);
    }

    #[test]
    fn empty_stream_has_no_marker() {
        assert!(matches!(decode(&[], None), Err(DecodeError::MissingAssetMarker)));
    }

    #[test]
    fn truncation() {
        let mut b = model_header();
        b.push(0x12);
        assert!(matches!(decode(&b, None), Err(DecodeError::Truncated { offset: 8, .. })));

        let mut b = model_header();
        b.write_vec3_block(Tag::Offset.id(), [0.0; 3]).unwrap();
        b.truncate(b.len() - 3);
        // the offset block fails on length before routing is considered
        assert!(matches!(
            decode(&b, None),
            Err(DecodeError::Truncated { tag: "Vert / Bone offset block", offset: 8 })
        ));
    }

    #[test]
    fn scan_lists_blocks_in_order() {
        let mut b = model_header();
        b.extend_from_slice(&[0xFF, 0xFF]);
        let scan = scan_blocks(&b);
        assert_eq!(
            scan.blocks,
            [
                BlockRecord { offset: 0, tag: Tag::Model },
                BlockRecord { offset: 4, tag: Tag::Version },
            ]
        );
        assert_eq!(scan.asset_type, Some(AssetType::Model));
        assert!(matches!(scan.error, Some(DecodeError::UnknownTag { .. })));
    }
}
