use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};

use anyhow::Result;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::command::{BlendMode, ClipRect, QUAD_BATCH_SIZE, TextureFormat, WrapMode};
use crate::driver::{
    BufferId, BufferKind, ClientFormat, DisplayMode, DrawCall, DrawRange, DriverInfo,
    DriverStrings, GpuContext, GpuDriver, LayoutId, ProgramId, ProgramKind, SamplerDesc,
    SamplerId, TextureBinding, TextureDesc, TextureId, TextureRegion, TextureTarget, Topology,
    Uniform, VertexBinding, Viewport,
};
use crate::logging::{DebugMessage, DebugSeverity, DebugType};
use crate::negotiate::{ARB_TEXTURE_NPOT, EXT_TEXTURE_ARRAY};
use crate::resources::quad_indices;

use super::frame::{DrawSpan, FrameRecorder, PendingDraw, VertexSource, to_target_rect};
use super::objects::{
    BufferObject, LayoutObject, ProgramObject, SamplerObject, TexelShadow, TextureObject,
    VertexSignature, align_up, buffer_usage, client_stride, gpu_buffer_size, quads_to_triangles,
    readback_to_rgb, sampler_descriptor, to_rgba, view_dimension,
};
use super::pipeline::{PipelineCache, PipelineKey, TARGET_FORMAT};
use super::shader::{Sampled, ShaderKey};
use super::{Gpu, GpuInit};

/// Every program kind is served, so the newest known version is reported.
const REPORTED_VERSION: &str = "4.6.0";
const TEXTURE_UNITS: usize = 16;
/// Reserved vectors plus twelve per quad of a full batch.
const UNIFORM_VECTORS: u32 = 20 + 12 * QUAD_BATCH_SIZE as u32;
/// Pending draws before the frame is flushed early.
const MAX_PENDING_DRAWS: usize = 4096;

fn vendor_name(id: u32) -> String {
    match id {
        0x10de => "NVIDIA Corporation".to_string(),
        0x1002 | 0x1022 => "AMD".to_string(),
        0x8086 => "Intel".to_string(),
        0x13b5 => "ARM".to_string(),
        0x5143 => "Qualcomm".to_string(),
        0x106b => "Apple".to_string(),
        0 => "Unknown".to_string(),
        other => format!("0x{other:04x}"),
    }
}

/// Keeps the driver build last so the blocklist can find it.
fn version_string(backend: wgpu::Backend, driver_info: &str) -> String {
    format!("{REPORTED_VERSION} wgpu {backend:?} {driver_info}")
        .trim_end()
        .to_string()
}

fn driver_info(adapter: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> DriverInfo {
    DriverInfo {
        strings: DriverStrings {
            vendor: vendor_name(adapter.vendor),
            renderer: adapter.name.clone(),
            version: version_string(adapter.backend, &adapter.driver_info),
        },
        max_texture_size: limits.max_texture_dimension_2d,
        max_texture_units: TEXTURE_UNITS as u32,
        max_array_layers: limits.max_texture_array_layers,
        max_3d_size: limits.max_texture_dimension_3d,
        max_uniform_vectors: UNIFORM_VECTORS,
        extensions: vec![ARB_TEXTURE_NPOT.to_string(), EXT_TEXTURE_ARRAY.to_string()],
    }
}

/// Uncaptured wgpu errors, queued as debug output once enabled.
#[derive(Default)]
struct DebugSink {
    enabled: AtomicBool,
    messages: Mutex<Vec<DebugMessage>>,
}

impl DebugSink {
    fn report(&self, error: &wgpu::Error) {
        if !self.enabled.load(Ordering::Relaxed) {
            log::error!("wgpu: {error}");
            return;
        }
        let kind = match error {
            wgpu::Error::Validation { .. } => DebugType::Error,
            _ => DebugType::Other,
        };
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DebugMessage::new(kind, DebugSeverity::High, error.to_string()));
    }

    fn drain(&self) -> Vec<DebugMessage> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Offscreen colour target all draws land in.
struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl RenderTarget {
    fn new(device: &wgpu::Device, size: (u32, u32)) -> Self {
        let size = (size.0.max(1), size.1.max(1));
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("kiln frame target"),
            size: wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }
}

/// [`GpuDriver`] and [`GpuContext`] over wgpu.
///
/// Handles map to wgpu objects kept in tables. Draws are recorded and
/// submitted in batches; anything that would observe or change data a
/// recorded draw uses flushes the batch first, so the results match
/// immediate submission.
pub struct WgpuDevice {
    gpu: Gpu,
    info: DriverInfo,
    pipelines: PipelineCache,
    frame: FrameRecorder,
    target: RenderTarget,
    debug: Arc<DebugSink>,
    display_modes: Vec<Vec<DisplayMode>>,

    next_id: u32,
    textures: HashMap<TextureId, TextureObject>,
    samplers: HashMap<SamplerId, SamplerObject>,
    buffers: HashMap<BufferId, BufferObject>,
    layouts: HashMap<LayoutId, LayoutObject>,
    programs: HashMap<ProgramId, ProgramObject>,
    texture_groups: HashMap<(TextureId, Option<SamplerId>), wgpu::BindGroup>,
    default_sampler: wgpu::Sampler,
    blit_sampler: wgpu::Sampler,
    quad_index: Option<(wgpu::Buffer, u32)>,

    fixed: ProgramObject,
    current: Option<ProgramId>,
    units: [Option<TextureBinding>; TEXTURE_UNITS],
    viewport: Viewport,
    scissor: Option<ClipRect>,
    blend: BlendMode,
    clear_color: [f32; 4],
    warned_lod_bias: bool,
}

impl WgpuDevice {
    /// Wraps an initialized [`Gpu`]. `display_modes` is indexed by screen.
    pub fn new(gpu: Gpu, display_modes: Vec<Vec<DisplayMode>>) -> Self {
        let device = gpu.device();
        let info = driver_info(&gpu.adapter_info(), &device.limits());

        let debug = Arc::new(DebugSink::default());
        let sink = Arc::clone(&debug);
        device.on_uncaptured_error(Arc::new(move |error: wgpu::Error| sink.report(&error)));

        let pipelines = PipelineCache::new(device);
        let frame = FrameRecorder::new(&device.limits());
        let target = RenderTarget::new(device, gpu.size());
        let default_sampler = device.create_sampler(&sampler_descriptor(&SamplerDesc::default()));
        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("kiln blit sampler"),
            ..Default::default()
        });
        let (width, height) = target.size;

        log::debug!(
            "wgpu device ready: {} / {}",
            info.strings.renderer,
            info.strings.version
        );

        Self {
            gpu,
            info,
            pipelines,
            frame,
            target,
            debug,
            display_modes,
            next_id: 1,
            textures: HashMap::new(),
            samplers: HashMap::new(),
            buffers: HashMap::new(),
            layouts: HashMap::new(),
            programs: HashMap::new(),
            texture_groups: HashMap::new(),
            default_sampler,
            blit_sampler,
            quad_index: None,
            fixed: ProgramObject::new(None),
            current: None,
            units: [None; TEXTURE_UNITS],
            viewport: Viewport {
                x: 0,
                y: 0,
                width,
                height,
            },
            scissor: None,
            blend: BlendMode::None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            warned_lod_bias: false,
        }
    }

    /// Device presenting to `window`.
    pub fn windowed(
        window: Arc<Window>,
        init: GpuInit,
        display_modes: Vec<Vec<DisplayMode>>,
    ) -> Result<Self> {
        let gpu = pollster::block_on(Gpu::new(Some(window), (0, 0), init))?;
        Ok(Self::new(gpu, display_modes))
    }

    /// Device rendering into an offscreen target of the given size.
    pub fn headless(width: u32, height: u32, init: GpuInit) -> Result<Self> {
        let gpu = pollster::block_on(Gpu::new(None, (width, height), init))?;
        Ok(Self::new(gpu, Vec::new()))
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Submits everything recorded so far.
    fn flush_frame(&mut self) {
        self.frame.flush(
            self.gpu.device(),
            self.gpu.queue(),
            self.pipelines.globals_layout(),
            &self.target.view,
            self.target.size,
        );
    }

    fn wait_idle(&self) {
        if let Err(err) = self.gpu.device().poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        }) {
            log::error!("device poll failed: {err:?}");
        }
    }

    /// Writes into a buffer's copy and uploads the touched words.
    fn store(&mut self, buffer: BufferId, offset: usize, data: &[u8]) {
        if !self.frame.is_idle() {
            self.flush_frame();
        }
        let Some(object) = self.buffers.get_mut(&buffer) else {
            return;
        };
        let Some(dst) = object.shadow.get_mut(offset..offset + data.len()) else {
            log::warn!(
                "write of {} bytes at {offset} overruns buffer {buffer:?}",
                data.len()
            );
            return;
        };
        dst.copy_from_slice(data);
        let range = object.dirty_range(offset, data.len());
        self.gpu
            .queue()
            .write_buffer(&object.buffer, range.start as u64, &object.shadow[range]);
    }

    fn make_buffer(&self, kind: BufferKind, size: usize, data: Option<&[u8]>) -> BufferObject {
        let mut shadow = vec![0; gpu_buffer_size(size) as usize];
        if let Some(data) = data {
            let n = data.len().min(size);
            shadow[..n].copy_from_slice(&data[..n]);
        }
        let buffer = self
            .gpu
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kiln buffer"),
                contents: &shadow,
                usage: buffer_usage(kind),
            });
        BufferObject {
            buffer,
            kind,
            shadow,
        }
    }

    fn write_level(&self, texture: &wgpu::Texture, level: u32, z: u32, size: (u32, u32), rgba: &[u8]) {
        self.gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: level,
                origin: wgpu::Origin3d { x: 0, y: 0, z },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.0 * 4),
                rows_per_image: Some(size.1),
            },
            wgpu::Extent3d {
                width: size.0,
                height: size.1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Index buffer covering at least `quads` quads.
    fn quad_index_buffer(&mut self, quads: u32) -> wgpu::Buffer {
        if let Some((buffer, capacity)) = &self.quad_index
            && *capacity >= quads
        {
            return buffer.clone();
        }
        let capacity = quads.next_power_of_two().max(1024);
        let indices = quad_indices(0, capacity as usize);
        let buffer = self
            .gpu
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("kiln quad indices"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        self.quad_index = Some((buffer.clone(), capacity));
        buffer
    }

    /// Bind group for a texture unit binding, cached per texture/sampler pair.
    fn texture_group(&mut self, binding: TextureBinding) -> Option<(Sampled, wgpu::BindGroup)> {
        let object = self.textures.get(&binding.texture)?;
        let sampled = object.sampled();
        let key = (binding.texture, binding.sampler);
        if let Some(group) = self.texture_groups.get(&key) {
            return Some((sampled, group.clone()));
        }
        let sampler = binding
            .sampler
            .and_then(|id| self.samplers.get(&id))
            .map_or(&self.default_sampler, |s| &s.sampler);
        let device = self.gpu.device();
        let layout = self.pipelines.texture_layout(device, sampled);
        let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln texture bindings"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&object.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        self.texture_groups.insert(key, group.clone());
        Some((sampled, group))
    }

    /// Records one draw with the current program and fixed state.
    fn record(
        &mut self,
        vertex_signature: VertexSignature,
        topology: Topology,
        vertex: Vec<VertexSource>,
        span: DrawSpan,
    ) {
        let program = self
            .current
            .and_then(|id| self.programs.get(&id))
            .unwrap_or(&self.fixed);
        let globals = program.globals;
        let items = program.items.clone();
        let binding = if program.is_textured() {
            self.units.get(program.unit as usize).copied().flatten()
        } else {
            None
        };

        let texture = binding.and_then(|binding| self.texture_group(binding));
        let key = PipelineKey {
            shader: ShaderKey {
                attributes: vertex_signature.attributes,
                sampled: texture.as_ref().map_or(Sampled::None, |(sampled, _)| *sampled),
            },
            vertex: vertex_signature,
            lines: topology == Topology::Lines,
            blend: self.blend,
        };
        let pipeline = self.pipelines.pipeline(self.gpu.device(), &key);

        let globals_offset = self.frame.push_globals(&globals);
        let items_offset = self.frame.push_items(&items);
        self.frame.push(PendingDraw {
            pipeline,
            vertex,
            span,
            globals_offset,
            items_offset,
            texture: texture.map(|(_, group)| group),
            viewport: self.viewport,
            scissor: self.scissor,
        });
        if self.frame.draw_count() >= MAX_PENDING_DRAWS {
            self.flush_frame();
        }
    }

    fn forget_texture_groups(&mut self, keep: impl Fn(&(TextureId, Option<SamplerId>)) -> bool) {
        self.texture_groups.retain(|key, _| keep(key));
    }
}

impl GpuDriver for WgpuDevice {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    fn has_entry_point(&self, _name: &str) -> bool {
        true
    }

    fn enable_debug_output(&mut self) -> bool {
        self.debug.enabled.store(true, Ordering::Relaxed);
        true
    }

    fn drain_debug_messages(&mut self) -> Vec<DebugMessage> {
        self.debug.drain()
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_scissor(&mut self, clip: Option<ClipRect>) {
        self.scissor = clip;
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    fn clear(&mut self) {
        self.frame.clear(self.clear_color);
    }

    // ── textures ──

    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureId> {
        let max = match desc.target {
            TextureTarget::D3 => self.info.max_3d_size,
            _ => self.info.max_texture_size,
        };
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            log::warn!("texture size {}x{} unsupported", desc.width, desc.height);
            return None;
        }
        let depth = desc.depth.max(1);
        // mip chains are rebuilt per layer, which a 3D texture does not have
        let mip_levels = match desc.target {
            TextureTarget::D3 => 1,
            _ => desc.mip_levels.max(1),
        };
        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("kiln texture"),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: depth,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: match desc.target {
                TextureTarget::D3 => wgpu::TextureDimension::D3,
                _ => wgpu::TextureDimension::D2,
            },
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(view_dimension(desc.target)),
            ..Default::default()
        });
        let id = TextureId::from_raw(self.alloc_id())?;
        self.textures.insert(
            id,
            TextureObject {
                texture,
                view,
                desc: *desc,
                shadow: TexelShadow::new(desc.width, desc.height, depth),
            },
        );
        Some(id)
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        format: TextureFormat,
        data: &[u8],
    ) {
        if !self.frame.is_idle() {
            self.flush_frame();
        }
        let Some(object) = self.textures.get_mut(&texture) else {
            return;
        };
        let rgba = to_rgba(format, data);
        if !object.shadow.write(region, &rgba) {
            log::warn!("upload to {texture:?} does not fit {region:?}");
            return;
        }
        self.gpu.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &object.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: region.x,
                    y: region.y,
                    z: region.z,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(region.width * 4),
                rows_per_image: Some(region.height),
            },
            wgpu::Extent3d {
                width: region.width,
                height: region.height,
                depth_or_array_layers: region.depth,
            },
        );
    }

    fn generate_mipmaps(&mut self, texture: TextureId) {
        if !self.frame.is_idle() {
            self.flush_frame();
        }
        let Some(object) = self.textures.get(&texture) else {
            return;
        };
        let levels = object.texture.mip_level_count();
        if levels <= 1 {
            return;
        }
        for z in 0..object.texture.depth_or_array_layers() {
            for (level, (w, h, rgba)) in object.shadow.mip_chain(z, levels).into_iter().enumerate() {
                self.write_level(&object.texture, level as u32 + 1, z, (w, h), &rgba);
            }
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            return;
        }
        self.forget_texture_groups(|(t, _)| *t != texture);
        for unit in &mut self.units {
            if unit.is_some_and(|b| b.texture == texture) {
                *unit = None;
            }
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Option<SamplerId> {
        if desc.lod_bias.is_some() && !self.warned_lod_bias {
            log::debug!("sampler level-of-detail bias is not supported and ignored");
            self.warned_lod_bias = true;
        }
        let sampler = self.gpu.device().create_sampler(&sampler_descriptor(desc));
        let id = SamplerId::from_raw(self.alloc_id())?;
        self.samplers.insert(id, SamplerObject { desc: *desc, sampler });
        Some(id)
    }

    fn set_sampler_wrap(&mut self, sampler: SamplerId, wrap: WrapMode) {
        let Some(object) = self.samplers.get_mut(&sampler) else {
            return;
        };
        if object.desc.wrap == wrap {
            return;
        }
        object.desc.wrap = wrap;
        object.sampler = self.gpu.device().create_sampler(&sampler_descriptor(&object.desc));
        self.forget_texture_groups(|(_, s)| *s != Some(sampler));
    }

    fn delete_sampler(&mut self, sampler: SamplerId) {
        if self.samplers.remove(&sampler).is_some() {
            self.forget_texture_groups(|(_, s)| *s != Some(sampler));
        }
    }

    fn bind_texture(&mut self, unit: u32, binding: Option<TextureBinding>) {
        match self.units.get_mut(unit as usize) {
            Some(slot) => *slot = binding,
            None => log::warn!("texture unit {unit} out of range"),
        }
    }

    // ── buffers ──

    fn create_buffer(
        &mut self,
        kind: BufferKind,
        size: usize,
        data: Option<&[u8]>,
    ) -> Option<BufferId> {
        let object = self.make_buffer(kind, size, data);
        let id = BufferId::from_raw(self.alloc_id())?;
        self.buffers.insert(id, object);
        Some(id)
    }

    fn reallocate_buffer(&mut self, buffer: BufferId, size: usize, data: Option<&[u8]>) {
        let Some(kind) = self.buffers.get(&buffer).map(|b| b.kind) else {
            return;
        };
        // recorded draws keep the old storage alive
        let object = self.make_buffer(kind, size, data);
        self.buffers.insert(buffer, object);
    }

    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]) {
        self.store(buffer, offset, data);
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
            .and_then(|b| b.shadow.get(src_offset..src_offset + size))
            .map(<[u8]>::to_vec)
        else {
            log::warn!("copy of {size} bytes at {src_offset} overruns buffer {src:?}");
            return;
        };
        self.store(dst, dst_offset, &bytes);
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    // ── vertex layouts ──

    fn create_vertex_layout(&mut self) -> Option<LayoutId> {
        let id = LayoutId::from_raw(self.alloc_id())?;
        self.layouts.insert(id, LayoutObject::default());
        Some(id)
    }

    fn set_vertex_attributes(&mut self, layout: LayoutId, bindings: &[VertexBinding]) {
        if let Some(object) = self.layouts.get_mut(&layout) {
            object.bindings = bindings.to_vec();
        }
    }

    fn set_index_buffer(&mut self, layout: LayoutId, buffer: Option<BufferId>) {
        if let Some(object) = self.layouts.get_mut(&layout) {
            object.index_buffer = buffer;
        }
    }

    fn delete_vertex_layout(&mut self, layout: LayoutId) {
        self.layouts.remove(&layout);
    }

    // ── programs ──

    fn create_program(&mut self, kind: ProgramKind) -> Option<ProgramId> {
        let id = ProgramId::from_raw(self.alloc_id())?;
        self.programs.insert(id, ProgramObject::new(Some(kind)));
        Some(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current = program;
    }

    fn set_uniform(&mut self, program: ProgramId, uniform: Uniform<'_>) {
        if let Some(object) = self.programs.get_mut(&program) {
            object.apply(uniform);
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn set_fixed_projection(&mut self, ortho: [[f32; 4]; 2]) {
        self.fixed.apply(Uniform::Ortho(ortho));
    }

    // ── draws ──

    fn draw(&mut self, layout: LayoutId, call: DrawCall) {
        let Some(object) = self.layouts.get(&layout) else {
            return;
        };
        let (signature, slot_buffers) = VertexSignature::from_bindings(&object.bindings);
        let index_buffer = object.index_buffer;

        let mut vertex = Vec::with_capacity(slot_buffers.len());
        for id in slot_buffers {
            match self.buffers.get(&id) {
                Some(buffer) => vertex.push(VertexSource::Buffer(buffer.buffer.clone())),
                None => {
                    log::debug!("layout {layout:?} references deleted buffer {id:?}");
                    return;
                }
            }
        }

        let span = match call.range {
            DrawRange::Arrays { first, count } if call.topology == Topology::Quads => {
                let quads = count / 4;
                DrawSpan::Indexed {
                    buffer: self.quad_index_buffer(quads),
                    indices: 0..quads * 6,
                    base_vertex: first as i32,
                    instances: call.instances,
                }
            }
            DrawRange::Arrays { first, count } => DrawSpan::Arrays {
                vertices: first..first + count,
                instances: call.instances,
            },
            DrawRange::Indexed { first_index, count } => {
                let Some(buffer) = index_buffer
                    .and_then(|id| self.buffers.get(&id))
                    .map(|b| b.buffer.clone())
                else {
                    log::warn!("indexed draw on {layout:?} without an index buffer");
                    return;
                };
                DrawSpan::Indexed {
                    buffer,
                    indices: first_index..first_index + count,
                    base_vertex: 0,
                    instances: call.instances,
                }
            }
        };
        self.record(signature, call.topology, vertex, span);
    }

    fn draw_client(&mut self, topology: Topology, format: ClientFormat, vertices: &[u8]) {
        let stride = client_stride(format);
        let bytes: Cow<'_, [u8]> = match topology {
            Topology::Quads => Cow::Owned(quads_to_triangles(vertices, stride)),
            _ => Cow::Borrowed(vertices),
        };
        let count = (bytes.len() / stride) as u32;
        if count == 0 {
            return;
        }
        let offset = self.frame.push_client(&bytes);
        self.record(
            VertexSignature::client(format),
            topology,
            vec![VertexSource::Client(offset)],
            DrawSpan::Arrays {
                vertices: 0..count,
                instances: 1,
            },
        );
    }

    fn read_pixels(&mut self, viewport: Viewport) -> Vec<u8> {
        self.flush_frame();
        let Some(rect) = to_target_rect(
            viewport.x,
            viewport.y,
            viewport.width,
            viewport.height,
            self.target.size,
        ) else {
            return Vec::new();
        };
        let padded_row = align_up(
            rect.width as usize * 4,
            wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize,
        );
        let device = self.gpu.device();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kiln read-back"),
            size: (padded_row * rect.height as usize) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kiln read-back encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row as u32),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        let submission = self.gpu.queue().submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        if let Err(err) = device.poll(wgpu::PollType::Wait {
            submission_index: Some(submission),
            timeout: None,
        }) {
            log::error!("read-back poll failed: {err:?}");
            return Vec::new();
        }
        match rx.recv() {
            Ok(Ok(())) => {}
            other => {
                log::error!("read-back mapping failed: {other:?}");
                return Vec::new();
            }
        }
        let pixels = {
            let data = slice.get_mapped_range();
            readback_to_rgb(&data, padded_row, rect.width, rect.height)
        };
        staging.unmap();
        pixels
    }

    fn finish(&mut self) {
        self.flush_frame();
        self.wait_idle();
    }
}

impl GpuContext for WgpuDevice {
    fn make_current(&mut self) -> bool {
        true
    }

    fn release_current(&mut self) {
        self.flush_frame();
    }

    fn swap(&mut self) {
        self.flush_frame();
        let Some(format) = self.gpu.surface_format() else {
            return;
        };
        let Some(frame) = self.gpu.acquire() else {
            return;
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (pipeline, layout) = self.pipelines.blit(self.gpu.device(), format);
        let device = self.gpu.device();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kiln blit bindings"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.target.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.blit_sampler),
                },
            ],
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("kiln present encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("kiln present pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        frame.present();
    }

    fn set_swap_interval(&mut self, interval: i32) -> bool {
        self.gpu.set_swap_interval(interval)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.flush_frame();
        self.gpu.resize(width, height);
        if width > 0 && height > 0 {
            self.target = RenderTarget::new(self.gpu.device(), (width, height));
        }
    }

    fn drawable_size(&self) -> (u32, u32) {
        self.gpu.size()
    }

    fn display_modes(&self, screen: u32) -> Vec<DisplayMode> {
        self.display_modes
            .get(screen as usize)
            .cloned()
            .unwrap_or_default()
    }
}
