use std::ops::BitOr;

use bytemuck::{Pod, Zeroable};

/// Vertices per streamed draw and per stream buffer.
pub const MAX_VERTICES: usize = 32 * 1024;

/// Initial size of the texture table.
pub const MAX_TEXTURES: usize = 1024 * 8;

/// Number of round-robin stream buffers on the core tier.
pub const MAX_STREAM_BUFFER_COUNT: usize = 30;

/// Sprite instances per draw on the core tier.
pub const SPRITE_BATCH_SIZE: usize = 256 - 4 - 16 - 8;

/// Quads per draw on the core tier, before the uniform-space cap.
pub const QUAD_BATCH_SIZE: usize = 256;

// ── render state ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    None,
    #[default]
    Alpha,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
}

/// Primitive type of a streamed draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Lines,
    Triangles,
    Quads,
}

impl Primitive {
    pub fn vertices_per_primitive(self) -> usize {
        match self {
            Primitive::Lines => 2,
            Primitive::Triangles => 3,
            Primitive::Quads => 4,
        }
    }
}

/// Scissor rectangle in framebuffer pixels, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipRect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

/// World-space rectangle mapped onto the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenRect {
    pub tl: [f32; 2],
    pub br: [f32; 2],
}

impl ScreenRect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            tl: [x0, y0],
            br: [x1, y1],
        }
    }

    /// Orthographic projection as two rows of a 4x2 matrix.
    ///
    /// z is constant for every vertex, so only x and y rows are kept.
    pub fn ortho(&self) -> [[f32; 4]; 2] {
        let [l, t] = self.tl;
        let [r, b] = self.br;
        [
            [2.0 / (r - l), 0.0, 0.0, -((r + l) / (r - l))],
            [0.0, 2.0 / (t - b), 0.0, -((t + b) / (t - b))],
        ]
    }
}

/// Fixed state carried by every draw record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderState {
    pub blend: BlendMode,
    pub wrap: WrapMode,
    /// Texture slot, or `None` for untextured draws.
    pub texture: Option<u32>,
    pub clip: Option<ClipRect>,
    pub screen: ScreenRect,
}

impl RenderState {
    pub fn new(screen: ScreenRect) -> Self {
        Self {
            screen,
            ..Self::default()
        }
    }

    pub fn with_texture(mut self, slot: u32) -> Self {
        self.texture = Some(slot);
        self
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_clip(mut self, clip: ClipRect) -> Self {
        self.clip = Some(clip);
        self
    }
}

// ── textures ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgb,
    Rgba,
    Alpha,
}

impl TextureFormat {
    pub fn channels(self) -> usize {
        match self {
            TextureFormat::Rgb => 3,
            TextureFormat::Rgba => 4,
            TextureFormat::Alpha => 1,
        }
    }
}

/// Texture creation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureFlags(u32);

impl TextureFlags {
    pub const NONE: Self = Self(0);
    pub const NO_MIPMAPS: Self = Self(1);
    pub const COMPRESSED: Self = Self(1 << 1);
    pub const QUALITY: Self = Self(1 << 2);
    pub const TO_2D_ARRAY: Self = Self(1 << 3);
    pub const TO_3D: Self = Self(1 << 4);
    pub const TO_2D_ARRAY_SINGLE_LAYER: Self = Self(1 << 5);
    pub const TO_3D_SINGLE_LAYER: Self = Self(1 << 6);
    pub const NO_2D: Self = Self(1 << 7);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn wants_layered(self) -> bool {
        self.intersects(
            Self::TO_2D_ARRAY | Self::TO_3D | Self::TO_2D_ARRAY_SINGLE_LAYER | Self::TO_3D_SINGLE_LAYER,
        )
    }

    pub fn wants_3d(self) -> bool {
        self.intersects(Self::TO_3D | Self::TO_3D_SINGLE_LAYER)
    }

    pub fn single_layer(self) -> bool {
        self.intersects(Self::TO_2D_ARRAY_SINGLE_LAYER | Self::TO_3D_SINGLE_LAYER)
    }
}

impl BitOr for TextureFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── vertices ──────────────────────────────────────────────────────────────

/// Streamed 2D vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 2],
    pub tex: [f32; 2],
    pub color: [u8; 4],
}

impl Vertex {
    pub const fn new(pos: [f32; 2], tex: [f32; 2], color: [u8; 4]) -> Self {
        Self { pos, tex, color }
    }
}

/// Streamed vertex sampling a layered texture.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct VertexTex3D {
    pub pos: [f32; 2],
    pub color: [u8; 4],
    pub tex: [f32; 3],
}

/// Per-quad parameters for a buffered quad layer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct QuadRenderInfo {
    pub color: [f32; 4],
    pub offset: [f32; 2],
    pub rotation: f32,
    pub padding: f32,
}

/// One sprite instance of a sprite-multiple draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SpriteInstance {
    pub pos: [f32; 2],
    pub scale: f32,
    pub rotation: f32,
}

// ── buffer containers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float,
    UnsignedByte,
    UnsignedShort,
}

impl AttributeType {
    pub fn size(self) -> u32 {
        match self {
            AttributeType::Float => 4,
            AttributeType::UnsignedByte => 1,
            AttributeType::UnsignedShort => 2,
        }
    }
}

/// One vertex attribute of a buffer container.
///
/// `buffer_index` names a buffer object slot. It is cleared when the
/// container releases that buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub buffer_index: Option<u32>,
    pub kind: AttributeType,
    pub components: u32,
    pub normalized: bool,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn float(buffer_index: u32, components: u32, offset: u32) -> Self {
        Self {
            buffer_index: Some(buffer_index),
            kind: AttributeType::Float,
            components,
            normalized: false,
            offset,
        }
    }

    pub fn unorm8(buffer_index: u32, components: u32, offset: u32) -> Self {
        Self {
            buffer_index: Some(buffer_index),
            kind: AttributeType::UnsignedByte,
            components,
            normalized: true,
            offset,
        }
    }
}

/// Vertex layout description of a buffer container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerInfo {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

// ── read-back results ─────────────────────────────────────────────────────

/// Framebuffer contents, RGB8, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Screenshot {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A display mode as reported to the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoMode {
    pub width: u32,
    pub height: u32,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub refresh_rate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layouts_have_no_padding() {
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
        assert_eq!(std::mem::size_of::<VertexTex3D>(), 24);
        assert_eq!(std::mem::size_of::<QuadRenderInfo>(), 32);
        assert_eq!(std::mem::size_of::<SpriteInstance>(), 16);
    }

    #[test]
    fn ortho_maps_corners_to_clip_space() {
        let m = ScreenRect::new(0.0, 0.0, 800.0, 600.0).ortho();
        let map = |x: f32, y: f32| {
            (
                m[0][0] * x + m[0][3],
                m[1][1] * y + m[1][3],
            )
        };
        let close = |a: (f32, f32), b: (f32, f32)| {
            (a.0 - b.0).abs() < 1e-5 && (a.1 - b.1).abs() < 1e-5
        };
        assert!(close(map(0.0, 0.0), (-1.0, 1.0)));
        assert!(close(map(800.0, 600.0), (1.0, -1.0)));
    }

    #[test]
    fn flags_compose() {
        let flags = TextureFlags::NO_MIPMAPS | TextureFlags::TO_3D_SINGLE_LAYER;
        assert!(flags.contains(TextureFlags::NO_MIPMAPS));
        assert!(flags.wants_layered());
        assert!(flags.wants_3d());
        assert!(flags.single_layer());
        assert!(!TextureFlags::QUALITY.wants_layered());
    }

    #[test]
    fn format_channels() {
        assert_eq!(TextureFormat::Rgb.channels(), 3);
        assert_eq!(TextureFormat::Rgba.channels(), 4);
        assert_eq!(TextureFormat::Alpha.channels(), 1);
    }
}
