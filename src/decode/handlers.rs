//! One handler per tag.
//!
//! Every handler reads its whole payload first, then routes it.  Payload
//! errors therefore surface as truncation even when the routing would also
//! have failed.

use std::io::Cursor;

use crate::asset::{AssetType, Bone, FaceVertex, ImageRefs, Material, Note, Vertex, Weight};
use crate::block::ReadBlockExt;
use crate::tag::Tag;

use super::context::{ActiveEntity, DecodeContext, FrameRef};
use super::partial::{BoneSlot, PartSlot, Partial, PartialFace, PartialFrame};
use super::DecodeError;

type Reader<'a> = Cursor<&'a [u8]>;
type Result<T = ()> = std::result::Result<T, DecodeError>;

/// Smallest blocks that can carry one vertex, face and frame.  Wire counts are
/// checked against these before anything is allocated.
const VERTEX_INDEX32_BLOCK: usize = 8;
const TRIANGLE_BLOCK: usize = 4;
const FRAME_INDEX_BLOCK: usize = 8;

/// Bytes left in the stream after the current position.
fn remaining(r: &Reader<'_>) -> usize {
    r.get_ref().len().saturating_sub(r.position() as usize)
}

pub(super) fn dispatch(tag: Tag, r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    match tag {
        Tag::Comment          => p.comment = Some(r.read_comment_block()?),
        Tag::Model            => marker(r, ctx, AssetType::Model)?,
        Tag::Anim             => marker(r, ctx, AssetType::Anim)?,
        Tag::Version          => p.version = Some(r.read_int16_block()?),

        Tag::BoneCount        => bone_count(r, ctx, p)?,
        Tag::CosmeticCount    => p.cosmetic_count = r.read_int32_block()?,
        Tag::BoneInfo         => bone_info(r, ctx, p)?,
        Tag::BoneIndex        => bone_index(r, ctx, p)?,
        Tag::Offset           => offset(r, ctx, p)?,
        Tag::BoneScale        => bone_scale(r, ctx, p)?,
        Tag::MatrixX | Tag::MatrixY | Tag::MatrixZ => matrix_row(r, ctx, p)?,

        Tag::VertexCount      => {
            let n = r.read_uint16_block()?;
            p.vertices = vec![None; n as usize];
        }
        Tag::VertexCount32    => vertex_count32(r, ctx, p)?,
        Tag::VertexIndex      => {
            let index = r.read_uint16_block()?;
            vertex_index(ctx, p, index.into())?;
        }
        Tag::VertexIndex32    => {
            let index = r.read_int32_block()?;
            vertex_index(ctx, p, index.into())?;
        }
        Tag::WeightCount      => weight_count(r, ctx, p)?,
        Tag::Weight           => weight(r, ctx, p)?,

        Tag::FaceCount        => face_count(r, ctx, p)?,
        Tag::TriangleInfo     => {
            let (mesh, material) = r.read_triangle_block()?;
            new_face(ctx, p, mesh, material);
        }
        Tag::TriangleInfo16   => {
            let (mesh, material) = r.read_triangle16_block()?;
            new_face(ctx, p, mesh, material);
        }
        Tag::Normal           => {
            let normal = r.read_short_vec3_block()?;
            face_vertex(ctx, p)?.normal = normal;
        }
        Tag::Color            => color(r, ctx, p)?,
        Tag::Uv               => {
            let uv = r.read_uv_block()?;
            face_vertex(ctx, p)?.uv = uv;
        }

        Tag::ObjectCount      => {
            let n = r.read_int16_block()?;
            p.meshes = vec![None; ctx.count("object", n.into())?];
        }
        Tag::ObjectInfo       => {
            let (index, name) = r.read_object_info_block()?;
            let i = ctx.slot("object", index.into(), p.meshes.len())?;
            p.meshes[i] = Some(name);
        }

        Tag::MaterialCount    => {
            let n = r.read_int16_block()?;
            p.materials = vec![None; ctx.count("material", n.into())?];
        }
        Tag::MaterialInfo     => material_info(r, ctx, p)?,
        Tag::Transparency     => {
            let v = r.read_vec4_block()?;
            material(ctx, p)?.transparency = v;
        }
        Tag::AmbientColor     => {
            let v = r.read_vec4_block()?;
            material(ctx, p)?.ambient_color = v;
        }
        Tag::Incandescence    => {
            let v = r.read_vec4_block()?;
            material(ctx, p)?.incandescence = v;
        }
        Tag::Coeffs           => {
            let v = r.read_vec2_block()?;
            material(ctx, p)?.coeffs = v;
        }
        Tag::Glow             => {
            let v = r.read_vec2_block()?;
            material(ctx, p)?.glow = v;
        }
        Tag::Refractive       => {
            let v = r.read_vec2_block()?;
            material(ctx, p)?.refractive = v;
        }
        Tag::SpecularColor    => {
            let v = r.read_vec4_block()?;
            material(ctx, p)?.specular_color = v;
        }
        Tag::ReflectiveColor  => {
            let v = r.read_vec4_block()?;
            material(ctx, p)?.reflective_color = v;
        }
        Tag::Reflective       => {
            let v = r.read_vec2_block()?;
            material(ctx, p)?.reflective = v;
        }
        Tag::Blinn            => {
            let v = r.read_vec2_block()?;
            material(ctx, p)?.blinn = v;
        }
        Tag::Phong            => {
            let v = r.read_float_block()?;
            material(ctx, p)?.phong = v;
        }

        Tag::PartCount        => {
            let n = r.read_int16_block()?;
            p.parts = vec![None; ctx.count("part", n.into())?];
        }
        Tag::PartInfo         => {
            let (index, name) = r.read_object_info_block()?;
            let i = ctx.slot("part", index.into(), p.parts.len())?;
            p.parts[i] = Some(name);
        }
        Tag::PartIndex        => part_index(r, ctx, p)?,
        Tag::Framerate        => p.framerate = Some(r.read_int16_block()?),
        Tag::FrameCount       => {
            let n = r.read_int32_block()?;
            let n = ctx.count("frame", n.into())?;
            // only a hint; a lying count must not drive the allocation
            p.frames.reserve(n.min(remaining(r) / FRAME_INDEX_BLOCK));
        }
        Tag::FrameIndex       => {
            let frame = r.read_int32_block()?;
            p.frames.push(PartialFrame::new(frame, p.parts.len()));
            ctx.active_frame = Some(FrameRef::Frame(p.frames.len() - 1));
            ctx.active_face = None;
        }

        Tag::NotetrackSection => {
            r.read_int16_block()?;
            p.dummy_frame = PartialFrame::new(0, p.parts.len());
            ctx.active_frame = Some(FrameRef::Dummy);
        }
        Tag::TrackCount | Tag::KeyCount | Tag::Notetrack => {
            r.read_int16_block()?;
        }
        Tag::NoteFrame        => {
            let (frame, string) = r.read_note_frame_block()?;
            p.notes.push(Note { frame, string });
        }

        Tag::FirstFrame
        | Tag::SBoneCount
        | Tag::SWeightCount
        | Tag::Quaternion
        | Tag::IkPitchLayerCount
        | Tag::IkPitchLayer
        | Tag::Rotation
        | Tag::Extra => {
            return Err(DecodeError::UnimplementedBlock { name: tag.name(), offset: ctx.offset });
        }
    }
    Ok(())
}

fn marker(r: &mut Reader<'_>, ctx: &mut DecodeContext, found: AssetType) -> Result {
    r.read_int16_block()?;
    ctx.set_asset_type(found)
}

// ── bones ────────────────────────────────────────────────────────────────────

fn bone_count(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let n = r.read_int16_block()?;
    p.bones = vec![None; ctx.count("bone", n.into())?];
    Ok(())
}

fn bone_info(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let (index, parent, name) = r.read_bone_info_block()?;
    let i = ctx.slot("bone", index.into(), p.bones.len())?;
    p.bones[i] = Some(BoneSlot { bone: Bone::new(name, parent), rows: Vec::new() });
    Ok(())
}

fn bone_index(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let index = r.read_int16_block()?;
    let i = ctx.slot("bone", index.into(), p.bones.len())?;
    let slot = p.bones[i]
        .as_mut()
        .ok_or_else(|| ctx.violation(format!("bone {i} selected before its info block")))?;
    slot.rows.clear();
    ctx.active_entity = ActiveEntity::Bone(i);
    Ok(())
}

fn bone<'a>(ctx: &DecodeContext, p: &'a mut Partial, i: usize) -> Result<&'a mut BoneSlot> {
    p.bones
        .get_mut(i)
        .and_then(Option::as_mut)
        .ok_or_else(|| ctx.violation(format!("bone {i} is no longer declared")))
}

fn offset(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let v = r.read_vec3_block()?;
    match ctx.active_entity {
        ActiveEntity::Bone(i)   => bone(ctx, p, i)?.bone.offset = v,
        ActiveEntity::Vertex(i) => vertex(ctx, p, i)?.offset = v,
        ActiveEntity::FramePart { frame, part } => frame_part(ctx, p, frame, part)?.offset = v,
        _ => return Err(ctx.wrong_target("a bone, vertex or frame part")),
    }
    Ok(())
}

fn bone_scale(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let v = r.read_vec3_block()?;
    match ctx.active_entity {
        ActiveEntity::Bone(i) => bone(ctx, p, i)?.bone.scale = v,
        _ => return Err(ctx.wrong_target("a bone")),
    }
    Ok(())
}

fn matrix_row(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let row = r.read_short_vec3_block()?;
    let rows = match ctx.active_entity {
        ActiveEntity::Bone(i) => &mut bone(ctx, p, i)?.rows,
        ActiveEntity::FramePart { frame, part } => &mut frame_part(ctx, p, frame, part)?.rows,
        _ => return Err(ctx.wrong_target("a bone or frame part")),
    };
    if rows.len() == 3 {
        return Err(ctx.violation("more than three matrix rows"));
    }
    rows.push(row);
    Ok(())
}

// ── vertices and faces ───────────────────────────────────────────────────────

/// Every declared slot must be filled by an index block, so a count the rest
/// of the stream cannot hold is rejected up front.
fn vertex_count32(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let n = r.read_int32_block()?;
    let n = ctx.count("vertex", n.into())?;
    let left = remaining(r);
    if n > left / VERTEX_INDEX32_BLOCK {
        return Err(ctx.violation(format!("{n} vertices cannot fit in the {left} bytes left")));
    }
    p.vertices = vec![None; n];
    Ok(())
}

/// Outside a face this selects a new vertex; inside one it adds a corner.
fn vertex_index(ctx: &mut DecodeContext, p: &mut Partial, index: i64) -> Result {
    let i = ctx.slot("vertex", index, p.vertices.len())?;
    match ctx.active_face {
        None => {
            p.vertices[i] = Some(Vertex::default());
            ctx.active_entity = ActiveEntity::Vertex(i);
        }
        Some(face) => {
            let corners = &mut p.faces[face].corners;
            if corners.len() == 3 {
                return Err(ctx.violation(format!("face {face} already has three corners")));
            }
            // the slot bound keeps the index within u32
            corners.push(FaceVertex::new(i as u32));
            ctx.active_entity = ActiveEntity::FaceVertex { face, corner: corners.len() - 1 };
        }
    }
    Ok(())
}

fn vertex<'a>(ctx: &DecodeContext, p: &'a mut Partial, i: usize) -> Result<&'a mut Vertex> {
    p.vertices
        .get_mut(i)
        .and_then(Option::as_mut)
        .ok_or_else(|| ctx.violation(format!("vertex {i} is no longer declared")))
}

fn weight_count(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let n = r.read_int16_block()?;
    let n = ctx.count("weight", n.into())?;
    match ctx.active_entity {
        ActiveEntity::Vertex(i) => {
            let weights = &mut vertex(ctx, p, i)?.weights;
            weights.clear();
            weights.reserve(n);
        }
        _ => return Err(ctx.wrong_target("a vertex")),
    }
    Ok(())
}

fn weight(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let (bone, weight) = r.read_weight_block()?;
    match ctx.active_entity {
        ActiveEntity::Vertex(i) => vertex(ctx, p, i)?.weights.push(Weight { bone, weight }),
        _ => return Err(ctx.wrong_target("a vertex")),
    }
    Ok(())
}

fn face_count(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let n = r.read_int32_block()?;
    let n = ctx.count("face", n.into())?;
    p.faces = Vec::with_capacity(n.min(remaining(r) / TRIANGLE_BLOCK));
    ctx.active_face = None;
    if matches!(ctx.active_entity, ActiveEntity::FaceVertex { .. }) {
        ctx.active_entity = ActiveEntity::None;
    }
    Ok(())
}

/// Opens a face; the active entity is left alone until a corner arrives.
fn new_face(ctx: &mut DecodeContext, p: &mut Partial, mesh_id: u16, material_id: u16) {
    p.faces.push(PartialFace { mesh_id, material_id, corners: Vec::with_capacity(3) });
    ctx.active_face = Some(p.faces.len() - 1);
}

fn face_vertex<'a>(ctx: &DecodeContext, p: &'a mut Partial) -> Result<&'a mut FaceVertex> {
    match ctx.active_entity {
        ActiveEntity::FaceVertex { face, corner } => p
            .faces
            .get_mut(face)
            .and_then(|f| f.corners.get_mut(corner))
            .ok_or_else(|| ctx.violation(format!("face {face} corner {corner} is gone"))),
        _ => Err(ctx.wrong_target("a face vertex")),
    }
}

fn color(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let rgba = r.read_color_block()?;
    match ctx.active_entity {
        ActiveEntity::Material(_) => material(ctx, p)?.color = rgba,
        _ => face_vertex(ctx, p)
            .map_err(|_| ctx.wrong_target("a face vertex or material"))?
            .color = rgba,
    }
    Ok(())
}

// ── materials ────────────────────────────────────────────────────────────────

fn material_info(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let (index, name, kind, images) = r.read_material_info_block()?;
    let i = ctx.slot("material", index.into(), p.materials.len())?;
    p.materials[i] = Some(Material::new(name, kind, ImageRefs::from_wire(&images)));
    ctx.active_entity = ActiveEntity::Material(i);
    Ok(())
}

fn material<'a>(ctx: &DecodeContext, p: &'a mut Partial) -> Result<&'a mut Material> {
    match ctx.active_entity {
        ActiveEntity::Material(i) => p
            .materials
            .get_mut(i)
            .and_then(Option::as_mut)
            .ok_or_else(|| ctx.violation(format!("material {i} is no longer declared"))),
        _ => Err(ctx.wrong_target("a material")),
    }
}

// ── animation ────────────────────────────────────────────────────────────────

fn frame_mut<'a>(p: &'a mut Partial, frame: FrameRef) -> Option<&'a mut PartialFrame> {
    match frame {
        FrameRef::Frame(i) => p.frames.get_mut(i),
        FrameRef::Dummy    => Some(&mut p.dummy_frame),
    }
}

fn part_index(r: &mut Reader<'_>, ctx: &mut DecodeContext, p: &mut Partial) -> Result {
    let index = r.read_int16_block()?;
    let frame = ctx
        .active_frame
        .ok_or_else(|| ctx.violation("part index outside of a frame"))?;
    let parts = &mut frame_mut(p, frame)
        .ok_or_else(|| ctx.violation("active frame is gone"))?
        .parts;
    let part = ctx.slot("part", index.into(), parts.len())?;
    parts[part] = Some(PartSlot::default());
    ctx.active_entity = ActiveEntity::FramePart { frame, part };
    Ok(())
}

fn frame_part<'a>(
    ctx:   &DecodeContext,
    p:     &'a mut Partial,
    frame: FrameRef,
    part:  usize,
) -> Result<&'a mut PartSlot> {
    frame_mut(p, frame)
        .and_then(|f| f.parts.get_mut(part))
        .and_then(Option::as_mut)
        .ok_or_else(|| ctx.violation(format!("frame part {part} is gone")))
}
