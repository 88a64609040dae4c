use serde::{Deserialize, Serialize};

use super::{Matrix3, IDENTITY};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment:   Option<String>,
    /// Stored on the wire as a whole number of frames per second.
    pub framerate: f32,
    /// Part (bone) names, in part-index order.
    pub parts:     Vec<String>,
    pub frames:    Vec<Frame>,
    pub notes:     Vec<Note>,
}

impl Default for Anim {
    fn default() -> Self {
        Self {
            comment:   None,
            framerate: 30.0,
            parts:     Vec::new(),
            frames:    Vec::new(),
            notes:     Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame: i32,
    /// One entry per part, same order as [`Anim::parts`].
    pub parts: Vec<FramePart>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramePart {
    pub offset: [f32; 3],
    pub matrix: Matrix3,
}

impl Default for FramePart {
    fn default() -> Self {
        Self { offset: [0.0; 3], matrix: IDENTITY }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub frame:  i32,
    pub string: String,
}
