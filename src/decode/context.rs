//! Decode-time routing state.
//!
//! The wire format has no parent pointers: a property block belongs to
//! whatever the most recent index block selected.  [`DecodeContext`] is that
//! selection, held as slot indices into the partial asset rather than as
//! references, and handed explicitly to every handler.

use crate::asset::AssetType;
use crate::tag::Tag;

use super::DecodeError;

/// Which frame part-index blocks write into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRef {
    /// Index into the decoded frame list.
    Frame(usize),
    /// Throwaway frame installed by a notetrack section so part indices in
    /// note tracks never touch the last real frame.
    Dummy,
}

/// The entity property blocks currently write into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveEntity {
    #[default]
    None,
    Bone(usize),
    /// Global vertex slot.
    Vertex(usize),
    FaceVertex { face: usize, corner: usize },
    Material(usize),
    FramePart { frame: FrameRef, part: usize },
}

impl ActiveEntity {
    pub fn describe(&self) -> &'static str {
        match self {
            ActiveEntity::None              => "nothing",
            ActiveEntity::Bone(_)           => "a bone",
            ActiveEntity::Vertex(_)         => "a vertex",
            ActiveEntity::FaceVertex { .. } => "a face vertex",
            ActiveEntity::Material(_)       => "a material",
            ActiveEntity::FramePart { .. }  => "a frame part",
        }
    }
}

#[derive(Debug)]
pub struct DecodeContext {
    /// Asset type the caller asked for, if any.
    pub expected:      Option<AssetType>,
    /// `None` until a marker block is seen.
    pub asset_type:    Option<AssetType>,
    pub active_entity: ActiveEntity,
    pub active_face:   Option<usize>,
    pub active_frame:  Option<FrameRef>,

    /// Block being decoded, for error reporting.
    pub tag:           Option<Tag>,
    pub offset:        u64,
}

impl DecodeContext {
    pub fn new(expected: Option<AssetType>) -> Self {
        Self {
            expected,
            asset_type:    None,
            active_entity: ActiveEntity::None,
            active_face:   None,
            active_frame:  None,
            tag:           None,
            offset:        0,
        }
    }

    pub fn begin_block(&mut self, tag: Tag, offset: u64) {
        self.tag = Some(tag);
        self.offset = offset;
    }

    /// Record the asset type announced by a marker block.
    pub fn set_asset_type(&mut self, found: AssetType) -> Result<(), DecodeError> {
        if let Some(expected) = self.expected {
            if expected != found {
                return Err(DecodeError::AssetTypeMismatch { expected, found, offset: self.offset });
            }
        }
        if let Some(previous) = self.asset_type {
            if previous != found {
                return Err(self.violation(format!("{found} marker in a {previous} stream")));
            }
        }
        self.asset_type = Some(found);
        Ok(())
    }

    fn tag_name(&self) -> &'static str {
        self.tag.map_or("<none>", Tag::name)
    }

    pub fn violation(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::StructuralViolation {
            tag:    self.tag_name(),
            offset: self.offset,
            reason: reason.into(),
        }
    }

    /// The active entity is not of the kind this block needs.
    pub fn wrong_target(&self, wanted: &str) -> DecodeError {
        self.violation(format!(
            "expected {wanted} to be active, found {}",
            self.active_entity.describe()
        ))
    }

    pub fn out_of_range(&self, what: &'static str, index: i64, len: usize) -> DecodeError {
        DecodeError::IndexOutOfRange {
            tag:    self.tag_name(),
            offset: self.offset,
            what,
            index,
            len,
        }
    }

    /// Bounds-check a wire index against a slot array.
    pub fn slot(&self, what: &'static str, index: i64, len: usize) -> Result<usize, DecodeError> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < len)
            .ok_or_else(|| self.out_of_range(what, index, len))
    }

    /// Validate a count read from the wire.
    pub fn count(&self, what: &str, n: i64) -> Result<usize, DecodeError> {
        usize::try_from(n).map_err(|_| self.violation(format!("negative {what} count {n}")))
    }
}
