//! Device-side objects behind the driver handles, plus the CPU helpers they
//! need (format widening, mip chains, vertex signatures).

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::command::{AttributeType, QuadRenderInfo, TextureFormat, WrapMode};
use crate::driver::{
    BufferId, BufferKind, ClientFormat, ProgramKind, SamplerDesc, TextureDesc, TextureRegion,
    TextureTarget, Uniform, VertexBinding,
};

use super::shader::{ATTR_COLOR, ATTR_TEX, Globals, Sampled};

/// Bytes of quad or sprite parameters one draw may carry.
pub(super) const ITEM_WINDOW: usize = 256 * size_of::<QuadRenderInfo>();

pub(super) fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

// ── textures ──────────────────────────────────────────────────────────────

/// Widens any upload format to RGBA8. Alpha-only data becomes white.
pub(super) fn to_rgba(format: TextureFormat, data: &[u8]) -> Vec<u8> {
    match format {
        TextureFormat::Rgba => data.to_vec(),
        TextureFormat::Rgb => data
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        TextureFormat::Alpha => data.iter().flat_map(|&a| [255, 255, 255, a]).collect(),
    }
}

/// Level-0 RGBA copy of a texture, layer-major. Mip levels are rebuilt from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct TexelShadow {
    width: u32,
    height: u32,
    depth: u32,
    pixels: Vec<u8>,
}

impl TexelShadow {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        let len = width as usize * height as usize * depth.max(1) as usize * 4;
        Self {
            width,
            height,
            depth: depth.max(1),
            pixels: vec![0; len],
        }
    }

    fn layer_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Copies region-sized RGBA data in. Returns false when the region does not fit.
    pub fn write(&mut self, region: TextureRegion, rgba: &[u8]) -> bool {
        let fits = region.x + region.width <= self.width
            && region.y + region.height <= self.height
            && region.z + region.depth <= self.depth;
        let expected = region.width as usize * region.height as usize * region.depth as usize * 4;
        if !fits || rgba.len() < expected {
            return false;
        }
        let row = region.width as usize * 4;
        let layer_len = self.layer_len();
        for z in 0..region.depth as usize {
            for y in 0..region.height as usize {
                let src = (z * region.height as usize + y) * row;
                let dst = (region.z as usize + z) * layer_len
                    + ((region.y as usize + y) * self.width as usize + region.x as usize) * 4;
                self.pixels[dst..dst + row].copy_from_slice(&rgba[src..src + row]);
            }
        }
        true
    }

    pub fn layer(&self, z: u32) -> &[u8] {
        let len = self.layer_len();
        let start = z as usize * len;
        &self.pixels[start..start + len]
    }

    /// Levels `1..levels` of layer `z`, each as `(width, height, rgba)`.
    pub fn mip_chain(&self, z: u32, levels: u32) -> Vec<(u32, u32, Vec<u8>)> {
        let Some(mut current) = RgbaImage::from_raw(self.width, self.height, self.layer(z).to_vec())
        else {
            return Vec::new();
        };
        let mut chain = Vec::new();
        for _ in 1..levels {
            let (w, h) = ((current.width() / 2).max(1), (current.height() / 2).max(1));
            current = imageops::resize(&current, w, h, FilterType::Triangle);
            chain.push((w, h, current.as_raw().clone()));
        }
        chain
    }
}

pub(super) struct TextureObject {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub desc: TextureDesc,
    pub shadow: TexelShadow,
}

impl TextureObject {
    pub fn sampled(&self) -> Sampled {
        sampled(self.desc.target)
    }
}

pub(super) fn sampled(target: TextureTarget) -> Sampled {
    match target {
        TextureTarget::D2 => Sampled::D2,
        TextureTarget::D2Array => Sampled::D2Array,
        TextureTarget::D3 => Sampled::D3,
    }
}

pub(super) fn view_dimension(target: TextureTarget) -> wgpu::TextureViewDimension {
    match target {
        TextureTarget::D2 => wgpu::TextureViewDimension::D2,
        TextureTarget::D2Array => wgpu::TextureViewDimension::D2Array,
        TextureTarget::D3 => wgpu::TextureViewDimension::D3,
    }
}

// ── samplers ──────────────────────────────────────────────────────────────

pub(super) struct SamplerObject {
    pub desc: SamplerDesc,
    pub sampler: wgpu::Sampler,
}

pub(super) fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
    }
}

/// Level-of-detail bias has no wgpu counterpart and is dropped.
pub(super) fn sampler_descriptor(desc: &SamplerDesc) -> wgpu::SamplerDescriptor<'static> {
    let mode = address_mode(desc.wrap);
    let lod_max_clamp = match (desc.mipmapped, desc.max_level) {
        (false, _) => 0.0,
        (true, Some(max)) => max as f32,
        (true, None) => 32.0,
    };
    wgpu::SamplerDescriptor {
        label: Some("kiln sampler"),
        address_mode_u: mode,
        address_mode_v: mode,
        address_mode_w: mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: if desc.mipmapped {
            wgpu::MipmapFilterMode::Linear
        } else {
            wgpu::MipmapFilterMode::Nearest
        },
        lod_max_clamp,
        ..Default::default()
    }
}

// ── buffers ───────────────────────────────────────────────────────────────

/// A GPU buffer plus its CPU copy. Writes go through the copy so partial,
/// unaligned updates can be uploaded as whole aligned words.
pub(super) struct BufferObject {
    pub buffer: wgpu::Buffer,
    pub kind: BufferKind,
    pub shadow: Vec<u8>,
}

impl BufferObject {
    /// Byte range of the shadow to upload after touching `offset..offset+len`.
    pub fn dirty_range(&self, offset: usize, len: usize) -> std::ops::Range<usize> {
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        let start = offset / align * align;
        let end = align_up(offset + len, align).min(self.buffer.size() as usize);
        start..end
    }
}

/// Buffer size in bytes for `len` bytes of content.
pub(super) fn gpu_buffer_size(len: usize) -> u64 {
    align_up(len.max(1), wgpu::COPY_BUFFER_ALIGNMENT as usize) as u64
}

pub(super) fn buffer_usage(kind: BufferKind) -> wgpu::BufferUsages {
    let base = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
    match kind {
        BufferKind::Vertex => base | wgpu::BufferUsages::VERTEX,
        BufferKind::Index => base | wgpu::BufferUsages::INDEX,
    }
}

// ── vertex layouts ────────────────────────────────────────────────────────

/// Byte attributes are always read normalized.
pub(super) fn vertex_format(kind: AttributeType, components: u32) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    match (kind, components) {
        (AttributeType::Float, 1) => Some(F::Float32),
        (AttributeType::Float, 2) => Some(F::Float32x2),
        (AttributeType::Float, 3) => Some(F::Float32x3),
        (AttributeType::Float, 4) => Some(F::Float32x4),
        (AttributeType::UnsignedByte, 2) => Some(F::Unorm8x2),
        (AttributeType::UnsignedByte, 4) => Some(F::Unorm8x4),
        (AttributeType::UnsignedShort, 2) => Some(F::Unorm16x2),
        (AttributeType::UnsignedShort, 4) => Some(F::Unorm16x4),
        _ => None,
    }
}

/// One vertex buffer slot of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct SlotLayout {
    pub stride: u32,
    pub attributes: Vec<wgpu::VertexAttribute>,
}

/// Vertex input of a pipeline: the buffer slots plus which optional
/// attributes exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub(super) struct VertexSignature {
    pub slots: Vec<SlotLayout>,
    pub attributes: u8,
}

impl VertexSignature {
    /// Groups bindings by buffer, in order of first use. Also returns the
    /// buffer feeding each slot.
    pub fn from_bindings(bindings: &[VertexBinding]) -> (Self, Vec<BufferId>) {
        let mut signature = Self::default();
        let mut buffers: Vec<(BufferId, u32)> = Vec::new();
        for binding in bindings {
            if binding.location > 2 {
                log::debug!("vertex location {} has no shader input", binding.location);
                continue;
            }
            let Some(format) = vertex_format(binding.kind, binding.components) else {
                log::warn!(
                    "unsupported vertex attribute {:?}x{}",
                    binding.kind,
                    binding.components
                );
                continue;
            };
            let attribute = wgpu::VertexAttribute {
                format,
                offset: u64::from(binding.offset),
                shader_location: binding.location,
            };
            let key = (binding.buffer, binding.stride);
            let slot = match buffers.iter().position(|b| *b == key) {
                Some(slot) => slot,
                None => {
                    buffers.push(key);
                    signature.slots.push(SlotLayout {
                        stride: binding.stride,
                        attributes: Vec::new(),
                    });
                    buffers.len() - 1
                }
            };
            signature.slots[slot].attributes.push(attribute);
            signature.attributes |= location_bit(binding.location);
        }
        (signature, buffers.into_iter().map(|(buffer, _)| buffer).collect())
    }

    /// Single interleaved slot for client-memory vertices.
    pub fn client(format: ClientFormat) -> Self {
        use wgpu::VertexFormat as F;
        let (stride, attributes) = match format {
            ClientFormat::Vertex => (
                20,
                vec![(0, F::Float32x2, 0), (1, F::Float32x2, 8), (2, F::Unorm8x4, 16)],
            ),
            ClientFormat::VertexTex3D => (
                24,
                vec![(0, F::Float32x2, 0), (2, F::Unorm8x4, 8), (1, F::Float32x3, 12)],
            ),
        };
        Self {
            slots: vec![SlotLayout {
                stride,
                attributes: attributes
                    .into_iter()
                    .map(|(shader_location, format, offset)| wgpu::VertexAttribute {
                        format,
                        offset,
                        shader_location,
                    })
                    .collect(),
            }],
            attributes: ATTR_TEX | ATTR_COLOR,
        }
    }
}

fn location_bit(location: u32) -> u8 {
    match location {
        1 => ATTR_TEX,
        2 => ATTR_COLOR,
        _ => 0,
    }
}

pub(super) fn client_stride(format: ClientFormat) -> usize {
    match format {
        ClientFormat::Vertex => 20,
        ClientFormat::VertexTex3D => 24,
    }
}

#[derive(Debug, Default)]
pub(super) struct LayoutObject {
    pub bindings: Vec<VertexBinding>,
    pub index_buffer: Option<BufferId>,
}

// ── programs ──────────────────────────────────────────────────────────────

/// Uniform state of one program, or of the fixed pipeline when `kind` is `None`.
#[derive(Debug, Clone)]
pub(super) struct ProgramObject {
    pub kind: Option<ProgramKind>,
    pub globals: Globals,
    pub unit: u32,
    pub items: Vec<u8>,
}

impl ProgramObject {
    pub fn new(kind: Option<ProgramKind>) -> Self {
        Self {
            kind,
            globals: Globals::for_kind(kind),
            unit: 0,
            items: Vec::new(),
        }
    }

    pub fn is_textured(&self) -> bool {
        self.kind.is_none_or(ProgramKind::is_textured)
    }

    pub fn apply(&mut self, uniform: Uniform<'_>) {
        let g = &mut self.globals;
        match uniform {
            Uniform::Ortho(ortho) => g.ortho = ortho,
            Uniform::TextureUnit(unit) => self.unit = unit,
            Uniform::Color(color) => g.color = color,
            Uniform::Offset([x, y]) => g.offset_dir[..2].copy_from_slice(&[x, y]),
            Uniform::Dir([x, y]) => g.offset_dir[2..].copy_from_slice(&[x, y]),
            Uniform::JumpIndex(jump) => g.params[1] = jump,
            Uniform::Center([x, y]) => g.center_rotation[..2].copy_from_slice(&[x, y]),
            Uniform::Rotation(rotation) => g.center_rotation[2] = rotation,
            Uniform::Quads(quads) => self.items = bytemuck::cast_slice(quads).to_vec(),
            Uniform::QuadOffset(offset) => g.params[2] = offset,
            Uniform::Sprites(sprites) => self.items = bytemuck::cast_slice(sprites).to_vec(),
        }
        self.items.truncate(ITEM_WINDOW);
    }
}

// ── geometry helpers ──────────────────────────────────────────────────────

/// Rewrites client quads as triangle lists.
pub(super) fn quads_to_triangles(vertices: &[u8], stride: usize) -> Vec<u8> {
    let quad = stride * 4;
    let mut out = Vec::with_capacity(vertices.len() / 4 * 6);
    for q in vertices.chunks_exact(quad) {
        for v in [0, 1, 2, 0, 2, 3] {
            out.extend_from_slice(&q[v * stride..(v + 1) * stride]);
        }
    }
    out
}

/// Converts a padded top-down RGBA read-back into tight RGB rows, bottom to top.
pub(super) fn readback_to_rgb(data: &[u8], padded_row: usize, width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 3);
    for row in (0..height as usize).rev() {
        let start = row * padded_row;
        let Some(line) = data.get(start..start + width as usize * 4) else {
            break;
        };
        for px in line.chunks_exact(4) {
            out.extend_from_slice(&px[..3]);
        }
    }
    out
}
