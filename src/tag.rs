//! Tag table: every 16-bit block id the format defines.
//!
//! The ids are frozen by the format.  Each one maps to a display name (used in
//! diagnostics and errors), a [`TagKind`] describing what its handler does,
//! and the asset type it belongs to.

use std::fmt;

/// What a block's handler does with the decode state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Sets the asset type.
    Marker,
    /// Stand-alone value (comment, version, framerate...).
    Scalar,
    /// Sizes a slot array.
    Counter,
    /// Fills one slot of a sized array without selecting it.
    Slot,
    /// Selects or creates the active entity.
    Index,
    /// Writes into the active entity.
    Property,
    /// Known to the format but has no reader.  Always fatal.
    Unsupported,
}

/// Which asset type a tag is expected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    Any,
    Model,
    Anim,
}

macro_rules! tags {
    ($( $variant:ident = $id:literal, $name:literal, $kind:ident, $applies:ident; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Tag {
            $( $variant = $id, )*
        }

        impl Tag {
            /// Every tag, in table order.
            pub const ALL: &'static [Tag] = &[ $( Tag::$variant, )* ];

            /// Resolve a raw id.  `None` means the id is not part of the format.
            pub fn from_u16(id: u16) -> Option<Self> {
                match id {
                    $( $id => Some(Tag::$variant), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Tag::$variant => $name, )*
                }
            }

            pub fn kind(self) -> TagKind {
                match self {
                    $( Tag::$variant => TagKind::$kind, )*
                }
            }

            pub fn applies_to(self) -> Applicability {
                match self {
                    $( Tag::$variant => Applicability::$applies, )*
                }
            }
        }
    };
}

tags! {
    Comment            = 0xC355, "Comment block",                Scalar,      Any;
    Model              = 0x46C8, "Model identification block",   Marker,      Model;
    Anim               = 0x7AAC, "Animation block",              Marker,      Anim;
    Version            = 0x24D1, "Version block",                Scalar,      Any;

    BoneCount          = 0x76BA, "Bone count block",             Counter,     Model;
    CosmeticCount      = 0x7836, "Cosmetic bone count block",    Scalar,      Model;
    BoneInfo           = 0xF099, "Bone block",                   Slot,        Model;
    BoneIndex          = 0xDD9A, "Bone index block",             Index,       Model;
    Offset             = 0x9383, "Vert / Bone offset block",     Property,    Any;
    BoneScale          = 0x1C56, "Bone scale block",             Property,    Model;
    MatrixX            = 0xDCFD, "Bone x matrix",                Property,    Any;
    MatrixY            = 0xCCDC, "Bone y matrix",                Property,    Any;
    MatrixZ            = 0xFCBF, "Bone z matrix",                Property,    Any;

    VertexCount        = 0x950D, "Number of verts",              Counter,     Model;
    VertexCount32      = 0x2AEC, "Number of verts32",            Counter,     Model;
    VertexIndex        = 0x8F03, "Vert info block marker",       Index,       Model;
    VertexIndex32      = 0xB097, "Vert32 info block marker",     Index,       Model;
    WeightCount        = 0xEA46, "Vert weighted bones count",    Property,    Model;
    Weight             = 0xF1AB, "Vert bone weight info",        Property,    Model;

    FaceCount          = 0xBE92, "Number of faces block",        Counter,     Model;
    TriangleInfo       = 0x562F, "Triangle info block",          Index,       Model;
    TriangleInfo16     = 0x6711, "Triangle info (16) block",     Index,       Model;
    Normal             = 0x89EC, "Normal info",                  Property,    Model;
    Color              = 0x6DD8, "Color info",                   Property,    Model;
    Uv                 = 0x1AD4, "UV info",                      Property,    Model;

    ObjectCount        = 0x62AF, "Number of objects block",      Counter,     Model;
    ObjectInfo         = 0x87D4, "Object info block",            Slot,        Model;

    MaterialCount      = 0xA1B2, "Number of materials",          Counter,     Model;
    MaterialInfo       = 0xA700, "Material info block",          Index,       Model;
    Transparency       = 0x6DAB, "Material transparency",        Property,    Model;
    AmbientColor       = 0x37FF, "Material ambient color",       Property,    Model;
    Incandescence      = 0x4265, "Material incandescence",       Property,    Model;
    Coeffs             = 0xC835, "Material coeffs",              Property,    Model;
    Glow               = 0xFE0C, "Material glow",                Property,    Model;
    Refractive         = 0x7E24, "Material refractive",          Property,    Model;
    SpecularColor      = 0x317C, "Material specular color",      Property,    Model;
    ReflectiveColor    = 0xE593, "Material reflective color",    Property,    Model;
    Reflective         = 0x7D76, "Material reflective",          Property,    Model;
    Blinn              = 0x83C7, "Material blinn",               Property,    Model;
    Phong              = 0x5CD2, "Material phong",               Property,    Model;

    PartCount          = 0x9279, "NumParts block",               Counter,     Anim;
    PartInfo           = 0x360B, "Part info block",              Slot,        Anim;
    PartIndex          = 0x745A, "Part index block",             Index,       Anim;
    Framerate          = 0x92D3, "Framerate block",              Scalar,      Anim;
    FrameCount         = 0xB917, "NumFrames block",              Counter,     Anim;
    FrameIndex         = 0xC723, "Frame block",                  Index,       Anim;

    NotetrackSection   = 0xC7F3, "Notetrack section block",      Index,       Anim;
    TrackCount         = 0x9016, "NumTracks block",              Scalar,      Anim;
    KeyCount           = 0x7A6C, "NumKeys block",                Scalar,      Anim;
    Notetrack          = 0x4643, "Notetrack block",              Scalar,      Anim;
    NoteFrame          = 0x1675, "Note frame block",             Scalar,      Anim;

    FirstFrame         = 0xBCD4, "FIRSTFRAME",                   Unsupported, Any;
    SBoneCount         = 0x1FC2, "NUMSBONES",                    Unsupported, Any;
    SWeightCount       = 0xB35E, "NUMSWEIGHTS",                  Unsupported, Any;
    Quaternion         = 0xEF69, "QUATERNION",                   Unsupported, Any;
    IkPitchLayerCount  = 0xA65B, "NUMIKPITCHLAYERS",             Unsupported, Any;
    IkPitchLayer       = 0x1D7D, "IKPITCHLAYER",                 Unsupported, Any;
    Rotation           = 0xA58B, "ROTATION",                     Unsupported, Any;
    Extra              = 0x6EEE, "EXTRA",                        Unsupported, Any;
}

impl Tag {
    /// Matrix row tags in row order.
    pub const MATRIX_ROWS: [u16; 3] = [Tag::MatrixX as u16, Tag::MatrixY as u16, Tag::MatrixZ as u16];

    #[inline]
    pub fn id(self) -> u16 {
        self as u16
    }

    pub fn is_supported(self) -> bool {
        self.kind() != TagKind::Unsupported
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (0x{:04X})", self.name(), self.id())
    }
}
