//! Block-stream encoder.
//!
//! Emits the raw (uncompressed) stream in the fixed section order readers
//! expect.  Meshes are flattened into one global vertex list; each mesh's
//! vertices start where the previous mesh's ended.

use std::io;

use thiserror::Error;
use tracing::{debug, trace};

use crate::asset::{Anim, Material, Model};
use crate::block::WriteBlockExt;
use crate::tag::Tag;
use crate::{ANIM_VERSION, MODEL_VERSION};

/// Vertex counts above this switch every vertex block to the 32-bit family.
pub const MAX_VERTEX16: usize = 0xFFFF;
/// Mesh and material ids above this need the 16-bit triangle block.
pub const MAX_TRIANGLE8_ID: u16 = 0xFF;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Too many {what}: {count} (format limit {max})")]
    CountOverflow { what: &'static str, count: usize, max: usize },
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── EncodeOptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Write every image slot into the material image string.  When off only
    /// the color map path is written.
    pub extended_features: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { extended_features: true }
    }
}

/// Fit `count` into a wire field whose largest value is `max`.
fn fit<T: TryFrom<usize>>(what: &'static str, count: usize, max: usize) -> Result<T, EncodeError> {
    T::try_from(count).map_err(|_| EncodeError::CountOverflow { what, count, max })
}

fn i16_count(what: &'static str, count: usize) -> Result<i16, EncodeError> {
    fit(what, count, i16::MAX as usize)
}

fn i32_count(what: &'static str, count: usize) -> Result<i32, EncodeError> {
    fit(what, count, i32::MAX as usize)
}

// ── Model ────────────────────────────────────────────────────────────────────

/// Vertex index blocks of the size family chosen for the whole model.
#[derive(Debug, Clone, Copy)]
enum VertexWidth {
    Narrow,
    Wide,
}

impl VertexWidth {
    fn for_count(count: usize) -> Self {
        if count > MAX_VERTEX16 { VertexWidth::Wide } else { VertexWidth::Narrow }
    }

    fn write_count(self, out: &mut Vec<u8>, count: usize) -> Result<(), EncodeError> {
        match self {
            VertexWidth::Narrow => out.write_uint16_block(Tag::VertexCount.id(), fit("vertices", count, u16::MAX as usize)?)?,
            VertexWidth::Wide   => out.write_int32_block(Tag::VertexCount32.id(), i32_count("vertices", count)?)?,
        }
        Ok(())
    }

    /// `index` is already bounded by the count written with [`write_count`].
    fn write_index(self, out: &mut Vec<u8>, index: usize) -> io::Result<()> {
        match self {
            VertexWidth::Narrow => out.write_uint16_block(Tag::VertexIndex.id(), index as u16),
            VertexWidth::Wide   => out.write_int32_block(Tag::VertexIndex32.id(), index as i32),
        }
    }
}

pub fn encode_model(model: &Model, options: &EncodeOptions) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    if let Some(comment) = &model.comment {
        out.write_comment_block(Tag::Comment.id(), comment)?;
    }
    out.write_marker_block(Tag::Model.id())?;
    out.write_int16_block(Tag::Version.id(), MODEL_VERSION)?;

    write_bones(&mut out, model)?;
    let object_count = i16_count("objects", model.meshes.len())?;
    let material_count = i16_count("materials", model.materials.len())?;

    // global start of each mesh's vertices
    let mut bases = Vec::with_capacity(model.meshes.len());
    let mut vertex_count = 0usize;
    for mesh in &model.meshes {
        bases.push(vertex_count);
        vertex_count += mesh.vertices.len();
    }
    let width = VertexWidth::for_count(vertex_count);
    write_vertices(&mut out, model, width, vertex_count)?;
    write_faces(&mut out, model, width, &bases)?;

    trace!(count = model.meshes.len(), "objects");
    out.write_int16_block(Tag::ObjectCount.id(), object_count)?;
    for (i, mesh) in model.meshes.iter().enumerate() {
        out.write_object_info_block(Tag::ObjectInfo.id(), i as i16, &mesh.name)?;
    }

    trace!(count = model.materials.len(), "materials");
    out.write_int16_block(Tag::MaterialCount.id(), material_count)?;
    for (i, material) in model.materials.iter().enumerate() {
        write_material(&mut out, i as i16, material, options)?;
    }

    debug!(
        bones = model.bones.len(),
        vertices = vertex_count,
        faces = model.face_count(),
        bytes = out.len(),
        "encoded model"
    );
    Ok(out)
}

fn write_bones(out: &mut Vec<u8>, model: &Model) -> Result<(), EncodeError> {
    trace!(count = model.bones.len(), "bones");
    let bone_count = i16_count("bones", model.bones.len())?;
    out.write_int16_block(Tag::BoneCount.id(), bone_count)?;

    // cosmetic bones are identified by position, so they have to be the tail
    let cosmetic = model.cosmetic_count();
    if model.bones.iter().rev().take(cosmetic).any(|b| !b.cosmetic) {
        return Err(EncodeError::InvalidAsset(
            "cosmetic bones must come after all regular bones".to_string(),
        ));
    }
    if cosmetic > 0 {
        out.write_int32_block(Tag::CosmeticCount.id(), cosmetic as i32)?;
    }

    for (i, bone) in model.bones.iter().enumerate() {
        out.write_bone_info_block(Tag::BoneInfo.id(), i as i32, bone.parent, &bone.name)?;
    }
    for (i, bone) in model.bones.iter().enumerate() {
        out.write_int16_block(Tag::BoneIndex.id(), i as i16)?;
        out.write_vec3_block(Tag::Offset.id(), bone.offset)?;
        out.write_vec3_block(Tag::BoneScale.id(), bone.scale)?;
        out.write_matrix_block(Tag::MATRIX_ROWS, &bone.matrix)?;
    }
    Ok(())
}

fn write_vertices(
    out:   &mut Vec<u8>,
    model: &Model,
    width: VertexWidth,
    count: usize,
) -> Result<(), EncodeError> {
    trace!(count, wide = matches!(width, VertexWidth::Wide), "vertices");
    width.write_count(out, count)?;
    let vertices = model.meshes.iter().flat_map(|m| &m.vertices);
    for (index, vertex) in vertices.enumerate() {
        width.write_index(out, index)?;
        out.write_vec3_block(Tag::Offset.id(), vertex.offset)?;
        out.write_int16_block(Tag::WeightCount.id(), i16_count("vertex weights", vertex.weights.len())?)?;
        for w in &vertex.weights {
            out.write_weight_block(Tag::Weight.id(), w.bone, w.weight)?;
        }
    }
    Ok(())
}

fn write_faces(
    out:   &mut Vec<u8>,
    model: &Model,
    width: VertexWidth,
    bases: &[usize],
) -> Result<(), EncodeError> {
    let face_count = model.face_count();
    trace!(count = face_count, "faces");
    out.write_int32_block(Tag::FaceCount.id(), i32_count("faces", face_count)?)?;

    for (mesh_index, mesh) in model.meshes.iter().enumerate() {
        // bounded by the object count
        let mesh_id = mesh_index as u16;
        for face in &mesh.faces {
            if mesh_id > MAX_TRIANGLE8_ID || face.material_id > MAX_TRIANGLE8_ID {
                out.write_triangle16_block(Tag::TriangleInfo16.id(), mesh_id, face.material_id)?;
            } else {
                out.write_triangle_block(Tag::TriangleInfo.id(), mesh_id as u8, face.material_id as u8)?;
            }
            for corner in &face.corners {
                let local = corner.vertex as usize;
                if local >= mesh.vertices.len() {
                    return Err(EncodeError::InvalidAsset(format!(
                        "object '{}' face references vertex {local} of {}",
                        mesh.name,
                        mesh.vertices.len()
                    )));
                }
                width.write_index(out, bases[mesh_index] + local)?;
                out.write_short_vec3_block(Tag::Normal.id(), corner.normal)?;
                out.write_color_block(Tag::Color.id(), corner.color)?;
                out.write_uv_block(Tag::Uv.id(), 1, corner.uv)?;
            }
        }
    }
    Ok(())
}

fn write_material(
    out:      &mut Vec<u8>,
    index:    i16,
    m:        &Material,
    options:  &EncodeOptions,
) -> io::Result<()> {
    let images = m.images.to_wire(options.extended_features);
    out.write_material_info_block(Tag::MaterialInfo.id(), index, [&m.name, &m.kind, &images])?;
    out.write_color_block(Tag::Color.id(), m.color)?;
    out.write_vec4_block(Tag::Transparency.id(), m.transparency)?;
    out.write_vec4_block(Tag::AmbientColor.id(), m.ambient_color)?;
    out.write_vec4_block(Tag::Incandescence.id(), m.incandescence)?;
    out.write_vec2_block(Tag::Coeffs.id(), m.coeffs)?;
    out.write_vec2_block(Tag::Glow.id(), m.glow)?;
    out.write_vec2_block(Tag::Refractive.id(), m.refractive)?;
    out.write_vec4_block(Tag::SpecularColor.id(), m.specular_color)?;
    out.write_vec4_block(Tag::ReflectiveColor.id(), m.reflective_color)?;
    out.write_vec2_block(Tag::Reflective.id(), m.reflective)?;
    out.write_vec2_block(Tag::Blinn.id(), m.blinn)?;
    out.write_float_block(Tag::Phong.id(), m.phong)
}

// ── Anim ─────────────────────────────────────────────────────────────────────

pub fn encode_anim(anim: &Anim) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::new();
    if let Some(comment) = &anim.comment {
        out.write_comment_block(Tag::Comment.id(), comment)?;
    }
    out.write_marker_block(Tag::Anim.id())?;
    out.write_int16_block(Tag::Version.id(), ANIM_VERSION)?;

    trace!(count = anim.parts.len(), "parts");
    out.write_int16_block(Tag::PartCount.id(), i16_count("parts", anim.parts.len())?)?;
    for (i, name) in anim.parts.iter().enumerate() {
        out.write_object_info_block(Tag::PartInfo.id(), i as i16, name)?;
    }

    // whole frames per second; saturates like every other fixed-width field
    out.write_int16_block(Tag::Framerate.id(), anim.framerate.round() as i16)?;

    trace!(count = anim.frames.len(), "frames");
    out.write_int32_block(Tag::FrameCount.id(), i32_count("frames", anim.frames.len())?)?;
    for frame in &anim.frames {
        if frame.parts.len() != anim.parts.len() {
            return Err(EncodeError::InvalidAsset(format!(
                "frame {} has {} parts, animation has {}",
                frame.frame,
                frame.parts.len(),
                anim.parts.len()
            )));
        }
        out.write_int32_block(Tag::FrameIndex.id(), frame.frame)?;
        for (i, part) in frame.parts.iter().enumerate() {
            out.write_int16_block(Tag::PartIndex.id(), i as i16)?;
            out.write_vec3_block(Tag::Offset.id(), part.offset)?;
            out.write_matrix_block(Tag::MATRIX_ROWS, &part.matrix)?;
        }
    }

    trace!(count = anim.notes.len(), "notes");
    out.write_int16_block(Tag::KeyCount.id(), i16_count("notes", anim.notes.len())?)?;
    for note in &anim.notes {
        out.write_note_frame_block(Tag::NoteFrame.id(), note.frame, &note.string)?;
    }

    debug!(parts = anim.parts.len(), frames = anim.frames.len(), bytes = out.len(), "encoded anim");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{Bone, Face, FaceVertex, Mesh, Vertex};
    use crate::decode::scan_blocks;

    fn grid_model(vertex_count: usize) -> Model {
        let mut mesh = Mesh::new("grid");
        mesh.vertices = vec![Vertex::default(); vertex_count];
        let last = vertex_count as u32 - 1;
        mesh.faces.push(Face {
            mesh_id:     0,
            material_id: 0,
            corners:     [FaceVertex::new(0), FaceVertex::new(1), FaceVertex::new(last)],
        });
        Model { meshes: vec![mesh], ..Model::default() }
    }

    fn tags_of(raw: &[u8]) -> Vec<Tag> {
        let scan = scan_blocks(raw);
        assert!(scan.error.is_none(), "{:?}", scan.error);
        scan.blocks.into_iter().map(|b| b.tag).collect()
    }

    #[test]
    fn large_models_use_32_bit_vertex_blocks() {
        let raw = encode_model(&grid_model(70_000), &EncodeOptions::default()).unwrap();
        let tags = tags_of(&raw);
        assert!(tags.contains(&Tag::VertexCount32));
        assert!(tags.contains(&Tag::VertexIndex32));
        assert!(!tags.contains(&Tag::VertexCount));
        assert!(!tags.contains(&Tag::VertexIndex));
    }

    #[test]
    fn small_models_use_16_bit_vertex_blocks() {
        let raw = encode_model(&grid_model(100), &EncodeOptions::default()).unwrap();
        let tags = tags_of(&raw);
        assert!(tags.contains(&Tag::VertexCount));
        assert!(tags.contains(&Tag::VertexIndex));
        assert!(!tags.contains(&Tag::VertexCount32));
        assert!(!tags.contains(&Tag::VertexIndex32));
    }

    #[test]
    fn high_material_ids_use_the_wide_triangle_block() {
        let mut model = grid_model(3);
        model.meshes[0].faces[0].material_id = 300;
        let tags = tags_of(&encode_model(&model, &EncodeOptions::default()).unwrap());
        assert!(tags.contains(&Tag::TriangleInfo16));
        assert!(!tags.contains(&Tag::TriangleInfo));
    }

    #[test]
    fn model_section_order() {
        let mut model = grid_model(3);
        model.comment = Some("exported".into());
        model.bones.push(Bone::new("tag_origin", -1));
        model.materials.push(Material::new("mtl", "lambert", Default::default()));
        let tags = tags_of(&encode_model(&model, &EncodeOptions::default()).unwrap());
        assert_eq!(
            &tags[..8],
            [
                Tag::Comment,
                Tag::Model,
                Tag::Version,
                Tag::BoneCount,
                Tag::BoneInfo,
                Tag::BoneIndex,
                Tag::Offset,
                Tag::BoneScale,
            ]
        );
        let info = tags.iter().position(|t| *t == Tag::MaterialInfo).unwrap();
        assert_eq!(tags[info + 1], Tag::Color);
        assert_eq!(tags.last(), Some(&Tag::Phong));
    }

    #[test]
    fn too_many_bones() {
        let model = Model {
            bones: vec![Bone::new("b", -1); 40_000],
            ..Model::default()
        };
        match encode_model(&model, &EncodeOptions::default()).unwrap_err() {
            EncodeError::CountOverflow { what, count, max } => {
                assert_eq!((what, count, max), ("bones", 40_000, i16::MAX as usize));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn cosmetic_bones_must_be_last() {
        let mut model = Model::default();
        model.bones = vec![Bone::new("a", -1), Bone::new("b", 0)];
        model.bones[0].cosmetic = true;
        assert!(matches!(
            encode_model(&model, &EncodeOptions::default()),
            Err(EncodeError::InvalidAsset(_))
        ));
    }

    #[test]
    fn frame_part_count_must_match() {
        let mut anim = Anim::default();
        anim.parts = vec!["tag_origin".into()];
        anim.frames.push(crate::asset::Frame { frame: 0, parts: Vec::new() });
        assert!(matches!(encode_anim(&anim), Err(EncodeError::InvalidAsset(_))));
    }
}
