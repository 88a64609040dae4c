//! Asset under construction.
//!
//! Count blocks size slot arrays up front; index and info blocks fill them
//! out of order.  Assembly checks that every declared slot was filled and
//! turns the flat model layout (one global vertex list, faces tagged with a
//! mesh id) back into per-mesh vertex and face lists.

use std::collections::HashMap;
use std::ops::Range;

use tracing::{debug, warn};

use crate::asset::{
    Anim, Bone, Face, FramePart, FaceVertex, Frame, Material, Matrix3, Mesh, Model, Note, Vertex,
    IDENTITY,
};

use super::DecodeError;

#[derive(Debug, Clone)]
pub struct BoneSlot {
    pub bone: Bone,
    /// Matrix rows seen since the last bone index block.
    pub rows: Vec<[f32; 3]>,
}

#[derive(Debug, Clone)]
pub struct PartialFace {
    pub mesh_id:     u16,
    pub material_id: u16,
    /// Corners with *global* vertex indices.
    pub corners:     Vec<FaceVertex>,
}

#[derive(Debug, Clone, Default)]
pub struct PartSlot {
    pub offset: [f32; 3],
    pub rows:   Vec<[f32; 3]>,
}

#[derive(Debug, Clone, Default)]
pub struct PartialFrame {
    pub frame: i32,
    pub parts: Vec<Option<PartSlot>>,
}

impl PartialFrame {
    pub fn new(frame: i32, part_count: usize) -> Self {
        Self { frame, parts: vec![None; part_count] }
    }
}

#[derive(Debug, Default)]
pub struct Partial {
    pub comment:        Option<String>,
    pub version:        Option<i16>,

    // model
    pub bones:          Vec<Option<BoneSlot>>,
    pub cosmetic_count: i32,
    pub vertices:       Vec<Option<Vertex>>,
    pub faces:          Vec<PartialFace>,
    pub meshes:         Vec<Option<String>>,
    pub materials:      Vec<Option<Material>>,

    // anim
    pub framerate:      Option<i16>,
    pub parts:          Vec<Option<String>>,
    pub frames:         Vec<PartialFrame>,
    pub dummy_frame:    PartialFrame,
    pub notes:          Vec<Note>,
}

impl Partial {
    pub fn finish_model(self) -> Result<Model, DecodeError> {
        let bone_count = self.bones.len();
        let cosmetic = usize::try_from(self.cosmetic_count)
            .ok()
            .filter(|&n| n <= bone_count)
            .ok_or_else(|| {
                DecodeError::InvalidAsset(format!(
                    "{} cosmetic bones declared for {bone_count} bones",
                    self.cosmetic_count
                ))
            })?;
        // cosmetic bones are always the last ones
        let first_cosmetic = bone_count - cosmetic;

        let bones = filled(self.bones, "bone")?
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                let mut bone = slot.bone;
                bone.matrix = matrix_from_rows(slot.rows, || format!("bone {i}"))?;
                bone.cosmetic = i >= first_cosmetic;
                Ok(bone)
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let vertices = filled(self.vertices, "vertex")?;
        let names = filled(self.meshes, "mesh")?;
        let materials = filled(self.materials, "material")?;

        let faces = self
            .faces
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                let corners: [FaceVertex; 3] = f.corners.try_into().map_err(|c: Vec<FaceVertex>| {
                    DecodeError::InvalidAsset(format!("face {i} has {} corners, expected 3", c.len()))
                })?;
                Ok(Face { mesh_id: f.mesh_id, material_id: f.material_id, corners })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let meshes = split_meshes(names, vertices, faces)?;
        debug!(
            bones = bones.len(),
            meshes = meshes.len(),
            materials = materials.len(),
            "assembled model"
        );
        Ok(Model { comment: self.comment, bones, meshes, materials })
    }

    pub fn finish_anim(self) -> Result<Anim, DecodeError> {
        let parts = filled(self.parts, "part")?;
        let frames = self
            .frames
            .into_iter()
            .map(|f| {
                let frame = f.frame;
                let parts = f
                    .parts
                    .into_iter()
                    .enumerate()
                    .map(|(i, slot)| {
                        let slot = slot.ok_or_else(|| {
                            DecodeError::InvalidAsset(format!("frame {frame} has no data for part {i}"))
                        })?;
                        let matrix = matrix_from_rows(slot.rows, || format!("frame {frame} part {i}"))?;
                        Ok(FramePart { offset: slot.offset, matrix })
                    })
                    .collect::<Result<Vec<_>, DecodeError>>()?;
                Ok(Frame { frame, parts })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        let framerate = self.framerate.map_or(Anim::default().framerate, f32::from);
        debug!(parts = parts.len(), frames = frames.len(), notes = self.notes.len(), "assembled anim");
        Ok(Anim { comment: self.comment, framerate, parts, frames, notes: self.notes })
    }
}

/// Unwrap every slot or report the first empty one.
fn filled<T>(slots: Vec<Option<T>>, what: &'static str) -> Result<Vec<T>, DecodeError> {
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or(DecodeError::MissingSlot { what, index }))
        .collect()
}

/// No rows keeps the identity; otherwise exactly three are required.
fn matrix_from_rows<F>(rows: Vec<[f32; 3]>, owner: F) -> Result<Matrix3, DecodeError>
where
    F: FnOnce() -> String,
{
    match rows.as_slice() {
        []           => Ok(IDENTITY),
        [x, y, z]    => Ok([*x, *y, *z]),
        _            => Err(DecodeError::InvalidAsset(format!(
            "{} has {} matrix rows, expected 3",
            owner(),
            rows.len()
        ))),
    }
}

// ── Mesh splitting ───────────────────────────────────────────────────────────

/// Distribute the global vertex list over the meshes and make face corners
/// mesh-local.
fn split_meshes(
    names:    Vec<String>,
    vertices: Vec<Vertex>,
    faces:    Vec<Face>,
) -> Result<Vec<Mesh>, DecodeError> {
    let mesh_count = names.len();
    if mesh_count == 0 && !(vertices.is_empty() && faces.is_empty()) {
        return Err(DecodeError::InvalidAsset(
            "geometry present but no objects declared".to_string(),
        ));
    }
    for (i, face) in faces.iter().enumerate() {
        if face.mesh_id as usize >= mesh_count {
            return Err(DecodeError::InvalidAsset(format!(
                "face {i} names object {} of {mesh_count}",
                face.mesh_id
            )));
        }
        if let Some(c) = face.corners.iter().find(|c| c.vertex as usize >= vertices.len()) {
            return Err(DecodeError::InvalidAsset(format!(
                "face {i} references vertex {} of {}",
                c.vertex,
                vertices.len()
            )));
        }
    }

    let mut meshes: Vec<Mesh> = names.into_iter().map(Mesh::new).collect();

    match contiguous_ranges(mesh_count, vertices.len(), &faces) {
        Some(ranges) => {
            let mut rest = vertices.into_iter();
            for (mesh, range) in meshes.iter_mut().zip(&ranges) {
                mesh.vertices = rest.by_ref().take(range.len()).collect();
            }
            for mut face in faces {
                let mesh = face.mesh_id as usize;
                let base = ranges[mesh].start as u32;
                for c in &mut face.corners {
                    c.vertex -= base;
                }
                meshes[mesh].faces.push(face);
            }
        }
        None => {
            warn!("object vertex ranges overlap; splitting vertices by first use");
            let mut local: Vec<HashMap<u32, u32>> = vec![HashMap::new(); mesh_count];
            for mut face in faces {
                let m = face.mesh_id as usize;
                let mesh = &mut meshes[m];
                for c in &mut face.corners {
                    let global = c.vertex;
                    c.vertex = *local[m].entry(global).or_insert_with(|| {
                        mesh.vertices.push(vertices[global as usize].clone());
                        (mesh.vertices.len() - 1) as u32
                    });
                }
                mesh.faces.push(face);
            }
        }
    }
    Ok(meshes)
}

/// Mesh `i` owns `[start_i, start_{i+1})`, where `start_i` is the lowest
/// vertex its faces use (0 for the first mesh).  A mesh without faces gets an
/// empty range.  `None` if the faces do not fit that layout.
fn contiguous_ranges(mesh_count: usize, vertex_count: usize, faces: &[Face]) -> Option<Vec<Range<usize>>> {
    if mesh_count == 0 {
        return Some(Vec::new());
    }
    let mut used: Vec<Option<Range<usize>>> = vec![None; mesh_count];
    for face in faces {
        for c in &face.corners {
            let v = c.vertex as usize;
            let r = used[face.mesh_id as usize].get_or_insert(v..v + 1);
            r.start = r.start.min(v);
            r.end = r.end.max(v + 1);
        }
    }

    let mut starts = vec![vertex_count; mesh_count + 1];
    for i in (1..mesh_count).rev() {
        starts[i] = used[i].as_ref().map_or(starts[i + 1], |r| r.start);
    }
    starts[0] = 0;

    let mut ranges = Vec::with_capacity(mesh_count);
    for i in 0..mesh_count {
        let range = starts[i]..starts[i + 1];
        if range.start > range.end {
            return None;
        }
        if let Some(u) = &used[i] {
            if u.start < range.start || u.end > range.end {
                return None;
            }
        }
        ranges.push(range);
    }
    Some(ranges)
}
