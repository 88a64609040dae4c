//! In-memory asset graph.
//!
//! Plain data: the codec reads and writes these fields, nothing here knows
//! about blocks or tags.  Everything is serde-serializable so the CLI can
//! round-trip assets through JSON.

pub mod anim;
pub mod model;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use anim::{Anim, Frame, FramePart, Note};
pub use model::{Bone, Face, FaceVertex, ImageRefs, Material, Mesh, Model, Vertex, Weight};

/// 3×3 rotation, row-major.
pub type Matrix3 = [[f32; 3]; 3];

pub const IDENTITY: Matrix3 = [
    [1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, 0.0, 1.0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Model,
    Anim,
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetType::Model => "MODEL",
            AssetType::Anim  => "ANIM",
        })
    }
}

/// A decoded file of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Asset {
    Model(Model),
    Anim(Anim),
}

impl Asset {
    pub fn asset_type(&self) -> AssetType {
        match self {
            Asset::Model(_) => AssetType::Model,
            Asset::Anim(_)  => AssetType::Anim,
        }
    }

    pub fn into_model(self) -> Option<Model> {
        match self {
            Asset::Model(m) => Some(m),
            Asset::Anim(_)  => None,
        }
    }

    pub fn into_anim(self) -> Option<Anim> {
        match self {
            Asset::Anim(a)  => Some(a),
            Asset::Model(_) => None,
        }
    }
}
