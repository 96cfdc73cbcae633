use crate::command::{BlendMode, ClipRect, TextureFormat, WrapMode};
use crate::logging::DebugMessage;

use super::types::{
    BufferId, BufferKind, ClientFormat, DisplayMode, DrawCall, DriverInfo, LayoutId, ProgramId,
    ProgramKind, SamplerDesc, SamplerId, TextureBinding, TextureDesc, TextureId, TextureRegion,
    Topology, Uniform, VertexBinding, Viewport,
};

/// Handle-based GPU API, called only from the render thread.
///
/// Creation calls return `None` when the driver cannot provide the object.
/// Calls taking a handle that is no longer live are ignored.
pub trait GpuDriver {
    // ── queries ──
    fn info(&self) -> &DriverInfo;

    /// Whether a named API entry point resolved.
    fn has_entry_point(&self, name: &str) -> bool;

    fn has_extension(&self, name: &str) -> bool {
        self.info().extensions.iter().any(|ext| ext == name)
    }

    /// Turns on the driver's debug-output facility. Returns false if absent.
    fn enable_debug_output(&mut self) -> bool;

    /// Messages produced since the last call.
    fn drain_debug_messages(&mut self) -> Vec<DebugMessage>;

    // ── fixed state ──
    fn set_viewport(&mut self, viewport: Viewport);
    fn viewport(&self) -> Viewport;
    fn set_scissor(&mut self, clip: Option<ClipRect>);
    /// `BlendMode::None` disables blending.
    fn set_blend(&mut self, mode: BlendMode);
    fn set_clear_color(&mut self, color: [f32; 4]);
    fn clear(&mut self);

    // ── textures ──
    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureId>;
    /// Uploads level 0 of `region`.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        region: TextureRegion,
        format: TextureFormat,
        data: &[u8],
    );
    fn generate_mipmaps(&mut self, texture: TextureId);
    fn delete_texture(&mut self, texture: TextureId);
    fn create_sampler(&mut self, desc: &SamplerDesc) -> Option<SamplerId>;
    fn set_sampler_wrap(&mut self, sampler: SamplerId, wrap: WrapMode);
    fn delete_sampler(&mut self, sampler: SamplerId);
    fn bind_texture(&mut self, unit: u32, binding: Option<TextureBinding>);

    // ── buffers ──
    fn create_buffer(
        &mut self,
        kind: BufferKind,
        size: usize,
        data: Option<&[u8]>,
    ) -> Option<BufferId>;
    /// Replaces storage with `size` bytes, initialised from `data` when given.
    fn reallocate_buffer(&mut self, buffer: BufferId, size: usize, data: Option<&[u8]>);
    fn write_buffer(&mut self, buffer: BufferId, offset: usize, data: &[u8]);
    fn copy_buffer(
        &mut self,
        src: BufferId,
        dst: BufferId,
        src_offset: usize,
        dst_offset: usize,
        size: usize,
    );
    fn delete_buffer(&mut self, buffer: BufferId);

    // ── vertex layouts ──
    fn create_vertex_layout(&mut self) -> Option<LayoutId>;
    fn set_vertex_attributes(&mut self, layout: LayoutId, bindings: &[VertexBinding]);
    fn set_index_buffer(&mut self, layout: LayoutId, buffer: Option<BufferId>);
    fn delete_vertex_layout(&mut self, layout: LayoutId);

    // ── programs ──
    fn create_program(&mut self, kind: ProgramKind) -> Option<ProgramId>;
    /// `None` selects the fixed pipeline.
    fn use_program(&mut self, program: Option<ProgramId>);
    fn set_uniform(&mut self, program: ProgramId, uniform: Uniform<'_>);
    fn delete_program(&mut self, program: ProgramId);
    /// Projection used by the fixed pipeline.
    fn set_fixed_projection(&mut self, ortho: [[f32; 4]; 2]);

    // ── draws ──
    fn draw(&mut self, layout: LayoutId, call: DrawCall);
    /// Draws vertices straight from client memory with the current program.
    fn draw_client(&mut self, topology: Topology, format: ClientFormat, vertices: &[u8]);

    /// Reads RGB8 pixels, rows bottom to top.
    fn read_pixels(&mut self, viewport: Viewport) -> Vec<u8>;

    /// Blocks until all submitted work has completed.
    fn finish(&mut self);
}

/// Window/context provider seen from the render thread.
pub trait GpuContext {
    /// Binds the context to the calling thread.
    fn make_current(&mut self) -> bool;
    fn release_current(&mut self);
    /// Presents the current frame.
    fn swap(&mut self);
    /// Returns false if the interval is not supported.
    fn set_swap_interval(&mut self, interval: i32) -> bool;
    fn resize(&mut self, width: u32, height: u32);
    fn drawable_size(&self) -> (u32, u32);
    fn display_modes(&self, screen: u32) -> Vec<DisplayMode>;
}

/// Everything the render thread needs from one device.
pub trait RenderDevice: GpuDriver + GpuContext + Send + 'static {}

impl<T> RenderDevice for T where T: GpuDriver + GpuContext + Send + 'static {}
