use std::num::NonZeroU32;

use crate::command::{
    AttributeType, QuadRenderInfo, SpriteInstance, TextureFormat, WrapMode,
};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            pub fn raw(self) -> u32 {
                self.0.get()
            }
        }
    };
}

handle!(
    /// Driver texture object.
    TextureId
);
handle!(
    /// Driver sampler object.
    SamplerId
);
handle!(
    /// Driver buffer object.
    BufferId
);
handle!(
    /// Driver vertex layout (vertex array object).
    LayoutId
);
handle!(
    /// Linked program.
    ProgramId
);

// ── queries ───────────────────────────────────────────────────────────────

/// Identification strings reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DriverStrings {
    pub vendor: String,
    pub renderer: String,
    pub version: String,
}

/// Driver identification and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub strings: DriverStrings,
    pub max_texture_size: u32,
    pub max_texture_units: u32,
    pub max_array_layers: u32,
    pub max_3d_size: u32,
    /// Vertex-stage uniform vectors available to one program.
    pub max_uniform_vectors: u32,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Display mode from the window system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: u32,
}

// ── textures ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    D2,
    D2Array,
    D3,
}

impl TextureTarget {
    pub fn is_layered(self) -> bool {
        !matches!(self, TextureTarget::D2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub target: TextureTarget,
    pub width: u32,
    pub height: u32,
    /// Layers for arrays, depth for 3D, 1 otherwise.
    pub depth: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
}

impl TextureDesc {
    pub fn full_region(&self) -> TextureRegion {
        TextureRegion {
            x: 0,
            y: 0,
            z: 0,
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }
}

/// Number of mip levels for a texture, optionally capped at `max_level`.
pub fn mip_level_count(width: u32, height: u32, max_level: Option<u32>) -> u32 {
    let full = 32 - width.max(height).max(1).leading_zeros();
    match max_level {
        Some(max) => full.min(max + 1),
        None => full,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl TextureRegion {
    pub fn rect(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            z: 0,
            width,
            height,
            depth: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub wrap: WrapMode,
    pub mipmapped: bool,
    pub lod_bias: Option<f32>,
    pub max_level: Option<u32>,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            wrap: WrapMode::Repeat,
            mipmapped: false,
            lod_bias: None,
            max_level: None,
        }
    }
}

/// What a texture unit is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub texture: TextureId,
    pub sampler: Option<SamplerId>,
    pub target: TextureTarget,
}

// ── buffers and layouts ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// One attribute of a vertex layout, bound to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub location: u32,
    pub buffer: BufferId,
    pub kind: AttributeType,
    pub components: u32,
    pub normalized: bool,
    pub stride: u32,
    pub offset: u32,
}

// ── programs ──────────────────────────────────────────────────────────────

/// Built-in programs, one per draw family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Primitive { textured: bool },
    Primitive3D { textured: bool },
    Tile { textured: bool },
    BorderTile { textured: bool },
    BorderTileLine { textured: bool },
    /// Buffered quad layer with per-quad colour, offset and rotation.
    QuadLayer { textured: bool },
    /// Quad container drawn with one colour and an optional rotation.
    Quad { textured: bool, rotation: bool },
    SpriteMultiple,
}

impl ProgramKind {
    pub fn is_textured(self) -> bool {
        match self {
            ProgramKind::Primitive { textured }
            | ProgramKind::Primitive3D { textured }
            | ProgramKind::Tile { textured }
            | ProgramKind::BorderTile { textured }
            | ProgramKind::BorderTileLine { textured }
            | ProgramKind::QuadLayer { textured }
            | ProgramKind::Quad { textured, .. } => textured,
            ProgramKind::SpriteMultiple => true,
        }
    }

    /// Whether the program samples a layered texture.
    pub fn is_layered(self) -> bool {
        matches!(
            self,
            ProgramKind::Primitive3D { .. }
                | ProgramKind::Tile { .. }
                | ProgramKind::BorderTile { .. }
                | ProgramKind::BorderTileLine { .. }
        )
    }
}

/// A uniform value for the current draw family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Uniform<'a> {
    Ortho([[f32; 4]; 2]),
    TextureUnit(u32),
    Color([f32; 4]),
    Offset([f32; 2]),
    Dir([f32; 2]),
    JumpIndex(u32),
    Center([f32; 2]),
    Rotation(f32),
    Quads(&'a [QuadRenderInfo]),
    /// First quad of the batch, for indexing `Quads`.
    QuadOffset(u32),
    Sprites(&'a [SpriteInstance]),
}

impl Uniform<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Uniform::Ortho(_) => "pos",
            Uniform::TextureUnit(_) => "texture_sampler",
            Uniform::Color(_) => "color",
            Uniform::Offset(_) => "offset",
            Uniform::Dir(_) => "dir",
            Uniform::JumpIndex(_) => "jump_index",
            Uniform::Center(_) => "center",
            Uniform::Rotation(_) => "rotation",
            Uniform::Quads(_) => "quads",
            Uniform::QuadOffset(_) => "quad_offset",
            Uniform::Sprites(_) => "sprites",
        }
    }
}

// ── draws ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Lines,
    Triangles,
    /// Every four vertices form a quad (v0 v1 v2, v0 v2 v3).
    Quads,
}

impl Topology {
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            Topology::Lines => 2,
            Topology::Triangles => 3,
            Topology::Quads => 4,
        }
    }
}

impl From<crate::command::Primitive> for Topology {
    fn from(primitive: crate::command::Primitive) -> Self {
        match primitive {
            crate::command::Primitive::Lines => Topology::Lines,
            crate::command::Primitive::Triangles => Topology::Triangles,
            crate::command::Primitive::Quads => Topology::Quads,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    Arrays { first: u32, count: u32 },
    /// `first_index` counts indices, not bytes.
    Indexed { first_index: u32, count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub topology: Topology,
    pub range: DrawRange,
    pub instances: u32,
}

impl DrawCall {
    pub fn arrays(topology: Topology, first: u32, count: u32) -> Self {
        Self {
            topology,
            range: DrawRange::Arrays { first, count },
            instances: 1,
        }
    }

    pub fn indexed(first_index: u32, count: u32) -> Self {
        Self {
            topology: Topology::Triangles,
            range: DrawRange::Indexed { first_index, count },
            instances: 1,
        }
    }

    pub fn instanced(mut self, instances: u32) -> Self {
        self.instances = instances;
        self
    }
}

/// Vertex format of a client-memory draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientFormat {
    Vertex,
    VertexTex3D,
}
