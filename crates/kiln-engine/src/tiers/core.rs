use std::collections::HashMap;

use crate::command::{
    Command, MAX_VERTICES, Opcode, Primitive, QUAD_BATCH_SIZE, RenderBorderTile,
    RenderBorderTileLine, RenderQuadContainer, RenderQuadContainerEx, RenderQuadLayer,
    RenderSpriteMultiple, RenderState, RenderStream, RenderTileLayer, SPRITE_BATCH_SIZE, Vertex,
    VertexTex3D,
};
use crate::config::EngineConfig;
use crate::driver::{DrawCall, GpuDriver, LayoutId, ProgramId, ProgramKind, Topology, Uniform};
use crate::image::Resizer;
use crate::negotiate::{InitError, TierKind};
use crate::resources::{
    BufferTable, ContainerTable, QuadIndexBuffer, StateCache, StreamPool, TextureMemory,
};

use super::state::{bind_program_state, screenshot, stream_bytes};
use super::texture::{TexturePolicy, TextureStore};

/// Entry points the core path needs on top of the shader set.
pub const CORE_ENTRY_POINTS: &[&str] = &[
    "glGenVertexArrays",
    "glBindVertexArray",
    "glDeleteVertexArrays",
    "glDrawElementsInstanced",
    "glDrawArraysInstanced",
    "glCopyBufferSubData",
    "glMapBufferRange",
    "glGenSamplers",
    "glBindSampler",
    "glSamplerParameteri",
    "glSamplerParameterf",
    "glDeleteSamplers",
    "glGenerateMipmap",
    "glTexImage3D",
    "glVertexAttribIPointer",
    "glUniform4fv",
    "glUniformMatrix4x2fv",
];

const PROGRAM_KINDS: &[ProgramKind] = &[
    ProgramKind::Primitive { textured: false },
    ProgramKind::Primitive { textured: true },
    ProgramKind::Primitive3D { textured: false },
    ProgramKind::Primitive3D { textured: true },
    ProgramKind::Tile { textured: false },
    ProgramKind::Tile { textured: true },
    ProgramKind::BorderTile { textured: false },
    ProgramKind::BorderTile { textured: true },
    ProgramKind::BorderTileLine { textured: false },
    ProgramKind::BorderTileLine { textured: true },
    ProgramKind::QuadLayer { textured: false },
    ProgramKind::QuadLayer { textured: true },
    ProgramKind::Quad { textured: false, rotation: false },
    ProgramKind::Quad { textured: false, rotation: true },
    ProgramKind::Quad { textured: true, rotation: false },
    ProgramKind::Quad { textured: true, rotation: true },
    ProgramKind::SpriteMultiple,
];

/// Uniform vectors each program reserves for everything but the quad array.
const RESERVED_UNIFORM_VECTORS: u32 = 20;
/// Uniform vectors per quad in a quad-layer batch.
const VECTORS_PER_QUAD: u32 = 12;

const INDEX_SIZE: usize = 4;

fn first_index(byte_offset: usize) -> u32 {
    (byte_offset / INDEX_SIZE) as u32
}

/// Tier for 3.3 and 4.x contexts: native buffers, vertex layouts and
/// instanced draws.
pub struct CoreTier {
    textures: TextureStore,
    cache: StateCache,
    buffers: BufferTable,
    containers: ContainerTable,
    programs: HashMap<ProgramKind, ProgramId>,
    streams: StreamPool,
    quad_index: QuadIndexBuffer,
    multi_unit: bool,
    max_quads_at_once: usize,
}

impl CoreTier {
    /// Checks entry points and builds every program before touching any
    /// other resource. Failure names the emulated fallback.
    pub fn init<D: GpuDriver + ?Sized>(
        driver: &mut D,
        config: &EngineConfig,
        memory: TextureMemory,
    ) -> Result<Self, InitError> {
        let fallback = InitError::renegotiate(TierKind::Core.init_fallback());

        if let Some(missing) = CORE_ENTRY_POINTS.iter().find(|name| !driver.has_entry_point(name)) {
            log::warn!("core tier: missing entry point {missing}");
            return Err(fallback);
        }

        let mut programs = HashMap::with_capacity(PROGRAM_KINDS.len());
        for &kind in PROGRAM_KINDS {
            match driver.create_program(kind) {
                Some(program) => {
                    programs.insert(kind, program);
                }
                None => {
                    log::warn!("core tier: {kind:?} failed to build");
                    for program in programs.into_values() {
                        driver.delete_program(program);
                    }
                    return Err(fallback);
                }
            }
        }

        let info = driver.info();
        let max_texture_size = info.max_texture_size;
        let units = info.max_texture_units;
        let max_quads_at_once = (info.max_uniform_vectors.saturating_sub(RESERVED_UNIFORM_VECTORS)
            / VECTORS_PER_QUAD)
            .clamp(1, QUAD_BATCH_SIZE as u32) as usize;

        let streams = StreamPool::create(driver, config.preinit_stream_buffer);
        let quad_index = QuadIndexBuffer::create(driver, MAX_VERTICES / 4 * 6);

        log::info!(
            "core tier: {units} texture units, {max_quads_at_once} quads per batch, unit optimisation {}",
            config.texture_unit_optimization
        );

        Ok(Self {
            textures: TextureStore::new(TexturePolicy::core(config.lod_bias()), max_texture_size, memory),
            cache: StateCache::new(units),
            buffers: BufferTable::new(false, true),
            containers: ContainerTable::new(true),
            programs,
            streams,
            quad_index,
            multi_unit: config.texture_unit_optimization,
            max_quads_at_once,
        })
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    pub fn max_quads_at_once(&self) -> usize {
        self.max_quads_at_once
    }

    pub fn claims(opcode: Opcode) -> bool {
        !matches!(
            opcode,
            Opcode::Nop
                | Opcode::Signal
                | Opcode::Init
                | Opcode::Shutdown
                | Opcode::Swap
                | Opcode::VSync
                | Opcode::Resize
                | Opcode::UpdateViewport
                | Opcode::VideoModes
                | Opcode::TierInit
        )
    }

    pub fn execute<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        command: Command,
        arena: &[u8],
        resizer: &dyn Resizer,
    ) {
        match command {
            Command::TextureCreate(cmd) => {
                self.textures.create(driver, resizer, &cmd, cmd.data.bytes(arena));
                if self.multi_unit {
                    self.cache.reset_unit(cmd.slot % self.cache.unit_count());
                }
            }
            Command::TextureUpdate(cmd) => {
                self.textures.update(driver, resizer, &cmd, cmd.data.bytes(arena));
            }
            Command::TextureDestroy { slot } => {
                let unit = if self.multi_unit {
                    slot % self.cache.unit_count()
                } else {
                    0
                };
                driver.bind_texture(unit, None);
                self.cache.reset_unit(unit);
                self.textures.destroy(driver, slot);
            }
            Command::Clear { color } => {
                self.cache.set_clear_color(driver, color);
                driver.clear();
            }
            Command::Screenshot { reply } => reply.set(screenshot(driver)),
            Command::Render(cmd) => self.render(driver, &cmd, arena),
            Command::RenderTex3D(cmd) => self.render_tex3d(driver, &cmd, arena),

            Command::CreateBufferObject(cmd) => {
                self.buffers.create(driver, cmd.index, cmd.size, cmd.data.bytes(arena));
            }
            Command::RecreateBufferObject(cmd) => {
                self.buffers.recreate(driver, cmd.index, cmd.size, cmd.data.bytes(arena));
            }
            Command::UpdateBufferObject { index, offset, data } => {
                self.buffers.update(driver, index, offset, data.bytes(arena));
            }
            Command::CopyBufferObject {
                src,
                dst,
                src_offset,
                dst_offset,
                size,
            } => self.buffers.copy(driver, src, dst, src_offset, dst_offset, size),
            Command::DeleteBufferObject { index } => self.buffers.delete(driver, index),

            Command::CreateBufferContainer { index, info } => {
                self.containers.create(driver, index, info, &self.buffers);
            }
            Command::UpdateBufferContainer { index, info } => {
                self.containers.update(driver, index, info, &self.buffers);
            }
            Command::DeleteBufferContainer {
                index,
                destroy_buffers,
            } => self
                .containers
                .delete(driver, index, destroy_buffers, &mut self.buffers),
            Command::IndicesRequiredNumNotify { required } => {
                if self.quad_index.append_indices(driver, required) {
                    self.streams.reset_index_caches();
                    self.containers.reset_index_caches();
                }
            }

            Command::RenderTileLayer(cmd) => self.render_tile_layer(driver, &cmd),
            Command::RenderBorderTile(cmd) => self.render_border_tile(driver, &cmd),
            Command::RenderBorderTileLine(cmd) => self.render_border_tile_line(driver, &cmd),
            Command::RenderQuadLayer(cmd) => self.render_quad_layer(driver, &cmd),
            Command::RenderQuadContainer(cmd) => self.render_quad_container(driver, &cmd),
            Command::RenderQuadContainerEx(cmd) => self.render_quad_container_ex(driver, &cmd),
            Command::RenderQuadContainerAsSpriteMultiple(cmd) => {
                self.render_sprite_multiple(driver, &cmd)
            }

            Command::TierShutdown => self.shutdown(driver),
            other => log::debug!("core tier ignores {:?}", other.opcode()),
        }
    }

    /// Activates the program for `kind` and applies `state` to it.
    fn use_program<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        kind: ProgramKind,
        state: &RenderState,
    ) -> Option<ProgramId> {
        let program = *self.programs.get(&kind)?;
        self.cache.use_program(driver, Some(program));
        bind_program_state(
            driver,
            &mut self.cache,
            &mut self.textures,
            state,
            program,
            kind.is_layered(),
            self.multi_unit,
        );
        Some(program)
    }

    /// Layout of a live container with its index buffer attached.
    fn container_layout<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, index: u32) -> Option<LayoutId> {
        let index_buffer = self.quad_index.handle?;
        let container = self.containers.get_mut(index)?;
        let layout = container.layout?;
        container.bind_index_buffer(driver, index_buffer);
        Some(layout)
    }

    fn render<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderStream, arena: &[u8]) {
        let textured = cmd.state.texture.is_some();
        if self.use_program(driver, ProgramKind::Primitive { textured }, &cmd.state).is_none() {
            return;
        }
        let vertices = cmd.count * cmd.primitive.vertices_per_primitive();
        let bytes = stream_bytes(cmd.vertices.bytes(arena), vertices, size_of::<Vertex>());
        let index_buffer = self.quad_index.handle;
        let stream = self.streams.upload(driver, bytes, false);
        if let Some(layout) = stream.layout {
            match (cmd.primitive, index_buffer) {
                (Primitive::Quads, Some(index_buffer)) => {
                    stream.bind_index_buffer(driver, index_buffer);
                    driver.draw(layout, DrawCall::indexed(0, (cmd.count * 6) as u32));
                }
                (Primitive::Quads, None) => log::warn!("quad draw without an index buffer"),
                (primitive, _) => {
                    driver.draw(layout, DrawCall::arrays(Topology::from(primitive), 0, vertices as u32));
                }
            }
        }
        self.streams.advance();
    }

    fn render_tex3d<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderStream, arena: &[u8]) {
        let textured = cmd.state.texture.is_some();
        if self.use_program(driver, ProgramKind::Primitive3D { textured }, &cmd.state).is_none() {
            return;
        }
        let vertices = cmd.count * cmd.primitive.vertices_per_primitive();
        let bytes = stream_bytes(cmd.vertices.bytes(arena), vertices, size_of::<VertexTex3D>());
        let index_buffer = self.quad_index.handle;
        let stream = self.streams.upload(driver, bytes, true);
        let Some(layout) = stream.layout else {
            return;
        };
        match (cmd.primitive, index_buffer) {
            (Primitive::Quads, Some(index_buffer)) => {
                stream.bind_index_buffer(driver, index_buffer);
                driver.draw(layout, DrawCall::indexed(0, (cmd.count * 6) as u32));
            }
            (Primitive::Quads, None) => log::warn!("quad draw without an index buffer"),
            (primitive, _) => {
                driver.draw(layout, DrawCall::arrays(Topology::from(primitive), 0, vertices as u32));
            }
        }
    }

    fn render_tile_layer<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderTileLayer) {
        if cmd.draws.is_empty() {
            return;
        }
        let Some(layout) = self.container_layout(driver, cmd.container) else {
            return;
        };
        let textured = cmd.state.texture.is_some();
        let Some(program) = self.use_program(driver, ProgramKind::Tile { textured }, &cmd.state) else {
            return;
        };
        self.cache.set_color(driver, program, cmd.color);
        for draw in &cmd.draws {
            driver.draw(
                layout,
                DrawCall::indexed(first_index(draw.index_offset), draw.index_count as u32),
            );
        }
    }

    fn render_border_tile<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderBorderTile) {
        if cmd.draw_num == 0 {
            return;
        }
        let Some(layout) = self.container_layout(driver, cmd.container) else {
            return;
        };
        let textured = cmd.state.texture.is_some();
        let Some(program) = self.use_program(driver, ProgramKind::BorderTile { textured }, &cmd.state) else {
            return;
        };
        self.cache.set_color(driver, program, cmd.color);
        driver.set_uniform(program, Uniform::Offset(cmd.offset));
        driver.set_uniform(program, Uniform::Dir(cmd.dir));
        driver.set_uniform(program, Uniform::JumpIndex(cmd.jump_index));
        driver.draw(
            layout,
            DrawCall::indexed(first_index(cmd.index_offset), 6).instanced(cmd.draw_num),
        );
    }

    fn render_border_tile_line<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        cmd: &RenderBorderTileLine,
    ) {
        if cmd.draw_num == 0 || cmd.index_count == 0 {
            return;
        }
        let Some(layout) = self.container_layout(driver, cmd.container) else {
            return;
        };
        let textured = cmd.state.texture.is_some();
        let kind = ProgramKind::BorderTileLine { textured };
        let Some(program) = self.use_program(driver, kind, &cmd.state) else {
            return;
        };
        self.cache.set_color(driver, program, cmd.color);
        driver.set_uniform(program, Uniform::Offset(cmd.offset));
        driver.set_uniform(program, Uniform::Dir(cmd.dir));
        driver.draw(
            layout,
            DrawCall::indexed(first_index(cmd.index_offset), cmd.index_count as u32)
                .instanced(cmd.draw_num),
        );
    }

    fn render_quad_layer<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderQuadLayer) {
        if cmd.quads.is_empty() {
            return;
        }
        let Some(layout) = self.container_layout(driver, cmd.container) else {
            return;
        };
        let textured = cmd.state.texture.is_some();
        let Some(program) = self.use_program(driver, ProgramKind::QuadLayer { textured }, &cmd.state) else {
            return;
        };

        let mut drawn = 0;
        for batch in cmd.quads.chunks(self.max_quads_at_once) {
            let first_quad = cmd.quad_offset + drawn;
            driver.set_uniform(program, Uniform::Quads(batch));
            driver.set_uniform(program, Uniform::QuadOffset(first_quad as u32));
            driver.draw(
                layout,
                DrawCall::indexed((first_quad * 6) as u32, (batch.len() * 6) as u32),
            );
            drawn += batch.len();
        }
    }

    fn render_quad_container<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        cmd: &RenderQuadContainer,
    ) {
        if cmd.index_count == 0 {
            return;
        }
        let Some(layout) = self.container_layout(driver, cmd.container) else {
            return;
        };
        let textured = cmd.state.texture.is_some();
        if self.use_program(driver, ProgramKind::Primitive { textured }, &cmd.state).is_none() {
            return;
        }
        driver.draw(
            layout,
            DrawCall::indexed(first_index(cmd.index_offset), cmd.index_count as u32),
        );
    }

    fn render_quad_container_ex<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        cmd: &RenderQuadContainerEx,
    ) {
        if cmd.index_count == 0 {
            return;
        }
        let Some(layout) = self.container_layout(driver, cmd.container) else {
            return;
        };
        let kind = ProgramKind::Quad {
            textured: cmd.state.texture.is_some(),
            rotation: cmd.rotation != 0.0,
        };
        let Some(program) = self.use_program(driver, kind, &cmd.state) else {
            return;
        };
        if cmd.rotation != 0.0 {
            self.cache.set_center(driver, program, cmd.center);
        }
        self.cache.set_rotation(driver, program, cmd.rotation);
        self.cache.set_color(driver, program, cmd.color);
        driver.draw(
            layout,
            DrawCall::indexed(first_index(cmd.index_offset), cmd.index_count as u32),
        );
    }

    fn render_sprite_multiple<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        cmd: &RenderSpriteMultiple,
    ) {
        if cmd.index_count == 0 || cmd.sprites.is_empty() {
            return;
        }
        let Some(layout) = self.container_layout(driver, cmd.container) else {
            return;
        };
        let Some(program) = self.use_program(driver, ProgramKind::SpriteMultiple, &cmd.state) else {
            return;
        };
        self.cache.set_center(driver, program, cmd.center);
        self.cache.set_color(driver, program, cmd.color);
        for batch in cmd.sprites.chunks(SPRITE_BATCH_SIZE) {
            driver.set_uniform(program, Uniform::Sprites(batch));
            driver.draw(
                layout,
                DrawCall::indexed(first_index(cmd.index_offset), cmd.index_count as u32)
                    .instanced(batch.len() as u32),
            );
        }
    }

    pub fn shutdown<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        self.cache.use_program(driver, None);
        for unit in 0..self.cache.unit_count() {
            self.cache.reset_unit(unit);
        }
        driver.bind_texture(0, None);
        self.textures.release_all(driver);
        self.containers.release_all(driver);
        self.buffers.release_all(driver);
        self.streams.release(driver);
        self.quad_index.release(driver);
        for (_, program) in self.programs.drain() {
            self.cache.forget_program(program);
            driver.delete_program(program);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        BlendMode, BufferUpload, ContainerInfo, Payload, QuadRenderInfo, ScreenRect, SpriteInstance,
        TextureCreate, TextureFlags, TextureFormat, TileDraw, VertexAttribute,
    };
    use crate::config::ApiVersion;
    use crate::driver::{DrawKind, DrawRange, RecordingDriver};
    use crate::image::ImageResizer;

    fn tier(d: &mut RecordingDriver) -> CoreTier {
        CoreTier::init(d, &EngineConfig::default(), TextureMemory::new()).expect("core init")
    }

    fn run(t: &mut CoreTier, d: &mut RecordingDriver, command: Command) {
        t.execute(d, command, &[], &ImageResizer::default());
    }

    fn with_container(t: &mut CoreTier, d: &mut RecordingDriver) {
        run(
            t,
            d,
            Command::CreateBufferObject(BufferUpload {
                index: 0,
                size: 64 * 20,
                data: Payload::None,
            }),
        );
        run(
            t,
            d,
            Command::CreateBufferContainer {
                index: 0,
                info: ContainerInfo {
                    stride: 20,
                    attributes: vec![VertexAttribute::float(0, 2, 0), VertexAttribute::float(0, 3, 8)],
                },
            },
        );
    }

    fn last_call(d: &RecordingDriver) -> DrawCall {
        match d.draws.last().map(|r| &r.kind) {
            Some(DrawKind::Layout { call, .. }) => *call,
            other => panic!("expected a layout draw, got {other:?}"),
        }
    }

    fn screen() -> RenderState {
        RenderState::new(ScreenRect::new(0.0, 0.0, 100.0, 100.0))
    }

    // ── initialisation ──

    #[test]
    fn init_builds_every_program_and_the_stream_pool() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let t = tier(&mut d);
        assert_eq!(d.programs.len(), PROGRAM_KINDS.len());
        assert_eq!(t.max_quads_at_once(), QUAD_BATCH_SIZE.min((1024 - 20) / 12));
        assert_eq!(d.draw_count(), 0);
    }

    #[test]
    fn failing_program_renegotiates_one_tier_down_without_drawing() {
        let mut d = RecordingDriver::with_version("3.3.0");
        d.failing_programs.insert(ProgramKind::SpriteMultiple);
        let err = CoreTier::init(&mut d, &EngineConfig::default(), TextureMemory::new()).err();
        assert_eq!(err, Some(InitError::renegotiate(ApiVersion::new(3, 0, 0))));
        assert_eq!(d.draw_count(), 0);
        assert!(d.programs.is_empty());
        assert_eq!(d.live_buffers(), 0);
    }

    #[test]
    fn missing_entry_point_renegotiates_before_building() {
        let mut d = RecordingDriver::with_version("3.3.0");
        d.remove_entry_point("glDrawElementsInstanced");
        let err = CoreTier::init(&mut d, &EngineConfig::default(), TextureMemory::new()).err();
        assert_eq!(err.and_then(|e| e.fallback()), Some(ApiVersion::CORE_FALLBACK));
        assert!(d.programs.is_empty());
        assert_eq!(d.draw_count(), 0);
    }

    // ── streamed draws ──

    #[test]
    fn quads_draw_indexed_and_rotate_streams() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        let quads = Command::Render(RenderStream {
            state: screen(),
            primitive: Primitive::Quads,
            count: 2,
            vertices: Payload::owned(vec![0; 8 * size_of::<Vertex>()]),
        });
        run(&mut t, &mut d, quads);
        assert_eq!(last_call(&d).range, DrawRange::Indexed { first_index: 0, count: 12 });
        let DrawKind::Layout { layout: first, index_buffer, .. } = d.draws[0].kind else {
            panic!("layout draw");
        };
        assert_eq!(index_buffer, t.quad_index.handle);

        run(
            &mut t,
            &mut d,
            Command::Render(RenderStream {
                state: screen(),
                primitive: Primitive::Lines,
                count: 1,
                vertices: Payload::owned(vec![0; 2 * size_of::<Vertex>()]),
            }),
        );
        let DrawKind::Layout { layout: second, call, .. } = d.draws[1].kind else {
            panic!("layout draw");
        };
        assert_ne!(first, second);
        assert_eq!(call.range, DrawRange::Arrays { first: 0, count: 2 });
        assert_eq!(call.topology, Topology::Lines);
    }

    #[test]
    fn first_alpha_draw_enables_blending() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        assert_eq!(d.blend, BlendMode::None);
        let triangle = || {
            Command::Render(RenderStream {
                state: screen().with_blend(BlendMode::Alpha),
                primitive: Primitive::Triangles,
                count: 1,
                vertices: Payload::owned(vec![0; 3 * size_of::<Vertex>()]),
            })
        };
        run(&mut t, &mut d, triangle());
        assert_eq!(d.draw_count(), 1);
        assert_eq!(d.blend, BlendMode::Alpha);
        assert_eq!(d.blend_calls, 1);

        run(&mut t, &mut d, triangle());
        assert_eq!(d.blend_calls, 1);
    }

    // ── containers ──

    #[test]
    fn tile_layer_draws_each_span() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        with_container(&mut t, &mut d);
        run(
            &mut t,
            &mut d,
            Command::RenderTileLayer(RenderTileLayer {
                state: screen(),
                color: [1.0; 4],
                container: 0,
                draws: vec![
                    TileDraw {
                        index_offset: 0,
                        index_count: 12,
                    },
                    TileDraw {
                        index_offset: 96,
                        index_count: 6,
                    },
                ],
            }),
        );
        assert_eq!(d.draw_count(), 2);
        assert_eq!(last_call(&d).range, DrawRange::Indexed { first_index: 24, count: 6 });
    }

    #[test]
    fn border_tile_is_instanced() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        with_container(&mut t, &mut d);
        run(
            &mut t,
            &mut d,
            Command::RenderBorderTile(RenderBorderTile {
                state: screen(),
                color: [1.0; 4],
                container: 0,
                index_offset: 24,
                offset: [0.0; 2],
                dir: [32.0, 0.0],
                jump_index: 4,
                draw_num: 9,
            }),
        );
        let call = last_call(&d);
        assert_eq!(call.instances, 9);
        assert_eq!(call.range, DrawRange::Indexed { first_index: 6, count: 6 });
        let program = d.program_of(ProgramKind::BorderTile { textured: false }).expect("program");
        assert_eq!(d.uniform_count(program, "jump_index"), 1);
    }

    #[test]
    fn quad_layer_batches_by_uniform_space() {
        let mut d = RecordingDriver::with_version("3.3.0");
        d.info.max_uniform_vectors = 20 + 12 * 3;
        let mut t = tier(&mut d);
        assert_eq!(t.max_quads_at_once(), 3);
        with_container(&mut t, &mut d);
        run(
            &mut t,
            &mut d,
            Command::RenderQuadLayer(RenderQuadLayer {
                state: screen(),
                container: 0,
                quads: vec![QuadRenderInfo::default(); 7],
                quad_offset: 2,
            }),
        );
        let calls: Vec<_> = d
            .draws
            .iter()
            .filter_map(|r| match r.kind {
                DrawKind::Layout { call, .. } => Some(call.range),
                DrawKind::Client { .. } => None,
            })
            .collect();
        assert_eq!(
            calls,
            vec![
                DrawRange::Indexed { first_index: 12, count: 18 },
                DrawRange::Indexed { first_index: 30, count: 18 },
                DrawRange::Indexed { first_index: 48, count: 6 },
            ]
        );
    }

    #[test]
    fn quad_container_ex_picks_program_by_rotation() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        with_container(&mut t, &mut d);
        let ex = |rotation: f32| {
            Command::RenderQuadContainerEx(RenderQuadContainerEx {
                state: screen(),
                container: 0,
                index_offset: 0,
                index_count: 6,
                color: [1.0; 4],
                center: [5.0, 5.0],
                rotation,
            })
        };
        run(&mut t, &mut d, ex(0.0));
        let plain = d.program_of(ProgramKind::Quad { textured: false, rotation: false });
        assert_eq!(d.draws.last().and_then(|r| r.program), plain);
        assert_eq!(d.uniform_count(plain.expect("program"), "center"), 0);

        run(&mut t, &mut d, ex(1.5));
        let rotating = d.program_of(ProgramKind::Quad { textured: false, rotation: true });
        assert_eq!(d.draws.last().and_then(|r| r.program), rotating);
        assert_eq!(d.uniform_count(rotating.expect("program"), "center"), 1);
    }

    #[test]
    fn sprites_are_batched() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        with_container(&mut t, &mut d);
        run(
            &mut t,
            &mut d,
            Command::RenderQuadContainerAsSpriteMultiple(RenderSpriteMultiple {
                state: screen(),
                container: 0,
                index_offset: 0,
                index_count: 6,
                center: [0.0; 2],
                color: [1.0; 4],
                sprites: vec![SpriteInstance::default(); SPRITE_BATCH_SIZE + 10],
            }),
        );
        assert_eq!(d.draw_count(), 2);
        assert_eq!(last_call(&d).instances, 10);
    }

    #[test]
    fn index_growth_invalidates_bound_index_buffers() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        with_container(&mut t, &mut d);
        let draw = || {
            Command::RenderQuadContainer(RenderQuadContainer {
                state: screen(),
                container: 0,
                index_offset: 0,
                index_count: 6,
            })
        };
        run(&mut t, &mut d, draw());
        let old = t.quad_index.handle;

        run(&mut t, &mut d, Command::IndicesRequiredNumNotify { required: MAX_VERTICES * 4 });
        assert_ne!(t.quad_index.handle, old);
        run(&mut t, &mut d, draw());
        let Some(DrawKind::Layout { index_buffer, .. }) = d.draws.last().map(|r| r.kind.clone()) else {
            panic!("layout draw");
        };
        assert_eq!(index_buffer, t.quad_index.handle);
    }

    // ── textures ──

    #[test]
    fn multi_unit_binding_skips_rebinds() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let config = EngineConfig {
            texture_unit_optimization: true,
            ..EngineConfig::default()
        };
        let mut t = CoreTier::init(&mut d, &config, TextureMemory::new()).expect("init");
        run(
            &mut t,
            &mut d,
            Command::TextureCreate(TextureCreate {
                slot: 17,
                width: 4,
                height: 4,
                format: TextureFormat::Rgba,
                flags: TextureFlags::NONE,
                data: Payload::owned(vec![0; 64]),
            }),
        );
        let render = || {
            Command::Render(RenderStream {
                state: screen().with_texture(17),
                primitive: Primitive::Triangles,
                count: 1,
                vertices: Payload::owned(vec![0; 3 * size_of::<Vertex>()]),
            })
        };
        run(&mut t, &mut d, render());
        run(&mut t, &mut d, render());
        // 17 % 16 units
        assert!(d.bound.contains_key(&1));
        assert_eq!(d.bind_calls, 1);

        run(&mut t, &mut d, Command::TextureDestroy { slot: 17 });
        assert!(!d.bound.contains_key(&1));
        assert_eq!(t.textures().memory().get(), 0);
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut t = tier(&mut d);
        with_container(&mut t, &mut d);
        run(&mut t, &mut d, Command::TierShutdown);
        assert_eq!(d.live_buffers(), 0);
        assert!(d.layouts.is_empty());
        assert!(d.programs.is_empty());
        assert_eq!(d.live_textures(), 0);
    }
}
