use serde::{Deserialize, Serialize};

use super::{Matrix3, IDENTITY};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment:   Option<String>,
    pub bones:     Vec<Bone>,
    pub meshes:    Vec<Mesh>,
    pub materials: Vec<Material>,
}

impl Model {
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(|m| m.vertices.len()).sum()
    }

    pub fn face_count(&self) -> usize {
        self.meshes.iter().map(|m| m.faces.len()).sum()
    }

    pub fn cosmetic_count(&self) -> usize {
        self.bones.iter().filter(|b| b.cosmetic).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name:     String,
    /// Index of the parent bone, `-1` for a root.
    pub parent:   i32,
    #[serde(default)]
    pub cosmetic: bool,
    pub offset:   [f32; 3],
    pub scale:    [f32; 3],
    pub matrix:   Matrix3,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: i32) -> Self {
        Self {
            name:     name.into(),
            parent,
            cosmetic: false,
            offset:   [0.0; 3],
            scale:    [1.0; 3],
            matrix:   IDENTITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub name:     String,
    pub vertices: Vec<Vertex>,
    pub faces:    Vec<Face>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub offset:  [f32; 3],
    pub weights: Vec<Weight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub bone:   u16,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub mesh_id:     u16,
    pub material_id: u16,
    pub corners:     [FaceVertex; 3],
}

/// One corner of a face.  `vertex` indexes the owning mesh's vertex list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceVertex {
    pub vertex: u32,
    pub normal: [f32; 3],
    pub color:  [f32; 4],
    pub uv:     [f32; 2],
}

impl FaceVertex {
    pub fn new(vertex: u32) -> Self {
        Self {
            vertex,
            normal: [0.0; 3],
            color:  [1.0; 4],
            uv:     [0.0; 2],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name:             String,
    /// Shader type, e.g. `"lambert"`.
    pub kind:             String,
    pub images:           ImageRefs,
    pub color:            [f32; 4],
    pub transparency:     [f32; 4],
    pub ambient_color:    [f32; 4],
    pub incandescence:    [f32; 4],
    pub coeffs:           [f32; 2],
    pub glow:             [f32; 2],
    pub refractive:       [f32; 2],
    pub specular_color:   [f32; 4],
    pub reflective_color: [f32; 4],
    pub reflective:       [f32; 2],
    pub blinn:            [f32; 2],
    pub phong:            f32,
}

impl Material {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, images: ImageRefs) -> Self {
        Self {
            name:             name.into(),
            kind:             kind.into(),
            images,
            color:            [1.0, 1.0, 1.0, 1.0],
            transparency:     [0.0, 0.0, 0.0, 1.0],
            ambient_color:    [0.0, 0.0, 0.0, 1.0],
            incandescence:    [0.0, 0.0, 0.0, 1.0],
            coeffs:           [0.8, 0.0],
            glow:             [0.0, 0.0],
            refractive:       [6.0, 1.0],
            specular_color:   [-1.0, -1.0, -1.0, 1.0],
            reflective_color: [-1.0, -1.0, -1.0, 1.0],
            reflective:       [-1.0, -1.0],
            blinn:            [-1.0, -1.0],
            phong:            -1.0,
        }
    }
}

// ── Image references ─────────────────────────────────────────────────────────

/// Image maps of a material as ordered `(slot, path)` pairs.
///
/// On the wire this is one string of space-separated `slot:path` tokens.  A
/// token without a slot prefix is the color map.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRefs(pub Vec<(String, String)>);

impl ImageRefs {
    pub const COLOR: &'static str = "color";

    pub fn color(path: impl Into<String>) -> Self {
        Self(vec![(Self::COLOR.to_owned(), path.into())])
    }

    pub fn get(&self, slot: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == slot).map(|(_, v)| v.as_str())
    }

    /// Wire form.  Without extended features only the color path is written.
    pub fn to_wire(&self, extended_features: bool) -> String {
        if !extended_features {
            return self.get(Self::COLOR).unwrap_or_default().to_owned();
        }
        self.0
            .iter()
            .map(|(slot, path)| format!("{slot}:{path}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn from_wire(s: &str) -> Self {
        Self(s.split_whitespace().map(split_token).collect())
    }
}

/// `slot:path`, or a bare path for the color slot.  A one-letter prefix is a
/// drive letter, not a slot.
fn split_token(token: &str) -> (String, String) {
    match token.split_once(':') {
        Some((slot, path))
            if slot.len() > 1 && slot.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            (slot.to_owned(), path.to_owned())
        }
        _ => (ImageRefs::COLOR.to_owned(), token.to_owned()),
    }
}
