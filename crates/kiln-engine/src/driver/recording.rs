use std::collections::{HashMap, HashSet};

use crate::command::{BlendMode, ClipRect, TextureFormat, WrapMode};
use crate::logging::DebugMessage;

use super::traits::{GpuContext, GpuDriver};
use super::types::{
    BufferId, BufferKind, ClientFormat, DisplayMode, DrawCall, DriverInfo, DriverStrings,
    LayoutId, ProgramId, ProgramKind, SamplerDesc, SamplerId, TextureBinding, TextureDesc,
    TextureId, TextureRegion, Topology, Uniform, VertexBinding, Viewport,
};

/// A recorded draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: Option<ProgramId>,
    pub kind: DrawKind,
    /// Texture bound at unit 0 when the draw was issued.
    pub unit0: Option<TextureBinding>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawKind {
    Layout {
        layout: LayoutId,
        index_buffer: Option<BufferId>,
        call: DrawCall,
    },
    Client {
        topology: Topology,
        format: ClientFormat,
        vertex_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureRecord {
    pub desc: TextureDesc,
    pub uploads: Vec<TextureRegion>,
    pub mipmaps: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferRecord {
    pub kind: BufferKind,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutRecord {
    pub bindings: Vec<VertexBinding>,
    pub index_buffer: Option<BufferId>,
}

/// Headless driver that records every call.
///
/// Deterministic stand-in for a real device: handles come from a counter,
/// buffer contents are kept in memory, releases are counted per handle and
/// `read_pixels` returns a configurable framebuffer.
#[derive(Debug)]
pub struct RecordingDriver {
    pub info: DriverInfo,
    pub missing_entry_points: HashSet<String>,
    pub failing_programs: HashSet<ProgramKind>,
    pub debug_supported: bool,
    pub debug_enabled: bool,
    pub pending_debug: Vec<DebugMessage>,

    next_id: u32,

    pub textures: HashMap<TextureId, TextureRecord>,
    pub samplers: HashMap<SamplerId, SamplerDesc>,
    pub buffers: HashMap<BufferId, BufferRecord>,
    pub layouts: HashMap<LayoutId, LayoutRecord>,
    pub programs: HashMap<ProgramId, ProgramKind>,

    /// Delete calls per buffer handle, including handles no longer live.
    pub buffer_releases: HashMap<BufferId, u32>,
    pub texture_releases: HashMap<TextureId, u32>,

    pub draws: Vec<DrawRecord>,
    pub uniforms: Vec<(ProgramId, &'static str)>,
    pub bound: HashMap<u32, TextureBinding>,
    pub bind_calls: usize,
    pub current_program: Option<ProgramId>,
    pub program_switches: usize,
    pub blend: BlendMode,
    pub blend_calls: usize,
    pub scissor: Option<ClipRect>,
    pub scissor_calls: usize,
    pub clear_color: [f32; 4],
    pub clear_color_calls: usize,
    pub clears: usize,
    pub viewport: Viewport,
    pub fixed_projection: Option<[[f32; 4]; 2]>,
    pub finishes: usize,

    /// RGB8 framebuffer returned by `read_pixels`, rows bottom to top.
    pub framebuffer: Option<(u32, u32, Vec<u8>)>,

    pub current: bool,
    pub swaps: usize,
    pub swap_interval: Option<i32>,
    pub swap_interval_supported: bool,
    pub drawable: (u32, u32),
    pub modes: Vec<DisplayMode>,
}

impl RecordingDriver {
    pub fn new(info: DriverInfo) -> Self {
        Self {
            info,
            missing_entry_points: HashSet::new(),
            failing_programs: HashSet::new(),
            debug_supported: true,
            debug_enabled: false,
            pending_debug: Vec::new(),
            next_id: 1,
            textures: HashMap::new(),
            samplers: HashMap::new(),
            buffers: HashMap::new(),
            layouts: HashMap::new(),
            programs: HashMap::new(),
            buffer_releases: HashMap::new(),
            texture_releases: HashMap::new(),
            draws: Vec::new(),
            uniforms: Vec::new(),
            bound: HashMap::new(),
            bind_calls: 0,
            current_program: None,
            program_switches: 0,
            blend: BlendMode::None,
            blend_calls: 0,
            scissor: None,
            scissor_calls: 0,
            clear_color: [0.0; 4],
            clear_color_calls: 0,
            clears: 0,
            viewport: Viewport {
                x: 0,
                y: 0,
                width: 640,
                height: 480,
            },
            fixed_projection: None,
            finishes: 0,
            framebuffer: None,
            current: false,
            swaps: 0,
            swap_interval: None,
            swap_interval_supported: true,
            drawable: (640, 480),
            modes: Vec::new(),
        }
    }

    /// A driver reporting `version` with generous limits.
    pub fn with_version(version: &str) -> Self {
        Self::new(DriverInfo {
            strings: DriverStrings {
                vendor: "Kiln".to_string(),
                renderer: "Recording".to_string(),
                version: version.to_string(),
            },
            max_texture_size: 16384,
            max_texture_units: 16,
            max_array_layers: 2048,
            max_3d_size: 2048,
            max_uniform_vectors: 1024,
            extensions: vec![
                "GL_ARB_texture_non_power_of_two".to_string(),
                "GL_EXT_texture_array".to_string(),
            ],
        })
    }

    pub fn set_vendor(&mut self, vendor: &str) {
        self.info.strings.vendor = vendor.to_string();
    }

    pub fn remove_entry_point(&mut self, name: &str) {
        self.missing_entry_points.insert(name.to_string());
    }

    pub fn set_framebuffer(&mut self, width: u32, height: u32, rgb: Vec<u8>) {
        self.framebuffer = Some((width, height, rgb));
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn releases_of(&self, buffer: BufferId) -> u32 {
        self.buffer_releases.get(&buffer).copied().unwrap_or(0)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn draw_count(&self) -> usize {
        self.draws.len()
    }

    pub fn uniform_count(&self, program: ProgramId, name: &str) -> usize {
        self.uniforms
            .iter()
            .filter(|(p, n)| *p == program && *n == name)
            .count()
    }

    pub fn program_of(&self, kind: ProgramKind) -> Option<ProgramId> {
        self.programs
            .iter()
            .find(|(_, k)| **k == kind)
            .map(|(id, _)| *id)
    }
}

impl GpuDriver for RecordingDriver {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    fn has_entry_point(&self, name: &str) -> bool {
        !self.missing_entry_points.contains(name)
    }

    fn enable_debug_output(&mut self) -> bool {
        self.debug_enabled = self.debug_supported;
        self.debug_enabled
    }

    fn drain_debug_messages(&mut self) -> Vec<DebugMessage> {
        std::mem::take(&mut self.pending_debug)
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_scissor(&mut self, clip: Option<ClipRect>) {
        self.scissor = clip;
        self.scissor_calls += 1;
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
        self.blend_calls += 1;
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
        self.clear_color_calls += 1;
    }

    fn clear(&mut self) {
        self.clears += 1;
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureId> {
        let id = TextureId::from_raw(self.alloc_id())?;
        self.textures.insert(
            id,
            TextureRecord {
                desc: *desc,
                uploads: Vec::new(),
                mipmaps: false,
            },
        );
        Some(id)
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        _format: TextureFormat,
        _data: &[u8],
    ) {
        if let Some(tex) = self.textures.get_mut(&texture) {
            tex.uploads.push(region);
        }
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.get_mut(&texture) {
            tex.mipmaps = true;
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        *self.texture_releases.entry(texture).or_insert(0) += 1;
        self.textures.remove(&texture);
        self.bound.retain(|_, b| b.texture != texture);
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Option<SamplerId> {
        let id = SamplerId::from_raw(self.alloc_id())?;
        self.samplers.insert(id, *desc);
        Some(id)
    }

    fn set_sampler_wrap(&mut self, sampler: SamplerId, wrap: WrapMode) {
        if let Some(desc) = self.samplers.get_mut(&sampler) {
            desc.wrap = wrap;
        }
    }

    fn delete_sampler(&mut self, sampler: SamplerId) {
        self.samplers.remove(&sampler);
    }

    fn bind_texture(&mut self, unit: u32, binding: Option<TextureBinding>) {
        self.bind_calls += 1;
        match binding {
            Some(b) => {
                self.bound.insert(unit, b);
            }
            None => {
                self.bound.remove(&unit);
            }
        }
    }

    fn create_buffer(
        &mut self,
        kind: BufferKind,
        size: usize,
        data: Option<&[u8]>,
    ) -> Option<BufferId> {
        let id = BufferId::from_raw(self.alloc_id())?;
        let mut bytes = vec![0u8; size];
        if let Some(data) = data {
            let n = data.len().min(size);
            bytes[..n].copy_from_slice(&data[..n]);
        }
        self.buffers.insert(id, BufferRecord { kind, data: bytes });
        Some(id)
    }

    fn reallocate_buffer(&mut self, buffer: BufferId, size: usize, data: Option<&[u8]>) {
        let Some(record) = self.buffers.get_mut(&buffer) else {
            return;
        };
        record.data = vec![0u8; size];
        if let Some(data) = data {
            let n = data.len().min(size);
            record.data[..n].copy_from_slice(&data[..n]);
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) {
        let Some(record) = self.buffers.get_mut(&buffer) else {
            return;
        };
        let end = (offset + data.len()).min(record.data.len());
        if offset < end {
            record.data[offset..end].copy_from_slice(&data[..end - offset]);
        }
    }

    fn copy_buffer(
        &mut self,
        src: BufferId,
        dst: BufferId,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
    ) {
        let Some(bytes) = self
            .buffers
            .get(&src)
            .and_then(|b| b.data.get(src_offset..src_offset + size))
            .map(<[u8]>::to_vec)
        else {
            return;
        };
        self.write_buffer(dst, dst_offset, &bytes);
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        *self.buffer_releases.entry(buffer).or_insert(0) += 1;
        self.buffers.remove(&buffer);
    }

    fn create_vertex_layout(&mut self) -> Option<LayoutId> {
        let id = LayoutId::from_raw(self.alloc_id())?;
        self.layouts.insert(id, LayoutRecord::default());
        Some(id)
    }

    fn set_vertex_attributes(&mut self, layout: LayoutId, bindings: &[VertexBinding]) {
        if let Some(record) = self.layouts.get_mut(&layout) {
            record.bindings = bindings.to_vec();
        }
    }

    fn set_index_buffer(&mut self, layout: LayoutId, buffer: Option<BufferId>) {
        if let Some(record) = self.layouts.get_mut(&layout) {
            record.index_buffer = buffer;
        }
    }

    fn delete_vertex_layout(&mut self, layout: LayoutId) {
        self.layouts.remove(&layout);
    }

    fn create_program(&mut self, kind: ProgramKind) -> Option<ProgramId> {
        if self.failing_programs.contains(&kind) {
            return None;
        }
        let id = ProgramId::from_raw(self.alloc_id())?;
        self.programs.insert(id, kind);
        Some(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
        self.program_switches += 1;
    }

    fn set_uniform(&mut self, program: ProgramId, uniform: Uniform<'_>) {
        self.uniforms.push((program, uniform.name()));
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn set_fixed_projection(&mut self, ortho: [[f32; 4]; 2]) {
        self.fixed_projection = Some(ortho);
    }

    fn draw(&mut self, layout: LayoutId, call: DrawCall) {
        let index_buffer = self.layouts.get(&layout).and_then(|l| l.index_buffer);
        self.draws.push(DrawRecord {
            program: self.current_program,
            kind: DrawKind::Layout {
                layout,
                index_buffer,
                call,
            },
            unit0: self.bound.get(&0).copied(),
        });
    }

    fn draw_client(&mut self, topology: Topology, format: ClientFormat, vertices: &[u8]) {
        let stride = match format {
            ClientFormat::Vertex => std::mem::size_of::<crate::command::Vertex>(),
            ClientFormat::VertexTex3D => std::mem::size_of::<crate::command::VertexTex3D>(),
        };
        self.draws.push(DrawRecord {
            program: self.current_program,
            kind: DrawKind::Client {
                topology,
                format,
                vertex_count: vertices.len() / stride,
            },
            unit0: self.bound.get(&0).copied(),
        });
    }

    fn read_pixels(&mut self, viewport: Viewport) -> Vec<u8> {
        let (w, h) = (viewport.width as usize, viewport.height as usize);
        let mut out = vec![0u8; w * h * 3];

        let Some((fw, fh, pixels)) = &self.framebuffer else {
            return out;
        };
        let (fw, fh) = (*fw as usize, *fh as usize);
        let (x0, y0) = (viewport.x.max(0) as usize, viewport.y.max(0) as usize);

        for y in 0..h.min(fh.saturating_sub(y0)) {
            let cols = w.min(fw.saturating_sub(x0));
            let src = ((y0 + y) * fw + x0) * 3;
            let dst = y * w * 3;
            if let Some(row) = pixels.get(src..src + cols * 3) {
                out[dst..dst + cols * 3].copy_from_slice(row);
            }
        }
        out
    }

    fn finish(&mut self) {
        self.finishes += 1;
    }
}

impl GpuContext for RecordingDriver {
    fn make_current(&mut self) -> bool {
        self.current = true;
        true
    }

    fn release_current(&mut self) {
        self.current = false;
    }

    fn swap(&mut self) {
        self.swaps += 1;
    }

    fn set_swap_interval(&mut self, interval: i32) -> bool {
        if self.swap_interval_supported {
            self.swap_interval = Some(interval);
        }
        self.swap_interval_supported
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.drawable = (width, height);
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.drawable
    }

    fn display_modes(&self, _screen: u32) -> Vec<DisplayMode> {
        self.modes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_copy_and_release_counting() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let a = d
            .create_buffer(BufferKind::Vertex, 8, Some(&[1, 2, 3, 4]))
            .expect("buffer");
        let b = d.create_buffer(BufferKind::Vertex, 8, None).expect("buffer");

        d.copy_buffer(a, b, 0, 4, 4);
        assert_eq!(d.buffer_data(b), Some(&[0, 0, 0, 0, 1, 2, 3, 4][..]));

        d.delete_buffer(a);
        d.delete_buffer(a);
        assert_eq!(d.releases_of(a), 2);
        assert_eq!(d.live_buffers(), 1);
    }

    #[test]
    fn read_pixels_crops_framebuffer() {
        let mut d = RecordingDriver::with_version("3.0.0");
        // 2x2 framebuffer, each pixel a distinct grey
        d.set_framebuffer(2, 2, vec![10, 10, 10, 20, 20, 20, 30, 30, 30, 40, 40, 40]);
        let px = d.read_pixels(Viewport {
            x: 1,
            y: 1,
            width: 1,
            height: 1,
        });
        assert_eq!(px, vec![40, 40, 40]);
    }

    #[test]
    fn failing_program_returns_none() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let kind = ProgramKind::Tile { textured: true };
        d.failing_programs.insert(kind);
        assert!(d.create_program(kind).is_none());
        assert!(d.create_program(ProgramKind::SpriteMultiple).is_some());
    }
}
