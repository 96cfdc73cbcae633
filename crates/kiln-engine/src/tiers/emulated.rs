use crate::command::{
    Command, MAX_VERTICES, Opcode, RenderBorderTile, RenderBorderTileLine, RenderState,
    RenderStream, RenderTileLayer, Vertex, VertexTex3D,
};
use crate::config::EngineConfig;
use crate::driver::{ClientFormat, DrawCall, GpuDriver, ProgramId, ProgramKind, Topology};
use crate::image::Resizer;
use crate::negotiate::{Capabilities, InitError, TierKind};
use crate::resources::{BufferTable, ContainerTable, StateCache, TextureMemory};
use crate::selftest::{self, SelfTestPrograms};

use super::expand::{
    ClientStream, ShadowReader, expand_border_tile, expand_border_tile_line, expand_tile_layer,
};
use super::state::{bind_fixed_state, bind_program_state, screenshot, stream_bytes};
use super::texture::{TexturePolicy, TextureStore};

/// Entry points the shader path needs.
pub const SHADER_ENTRY_POINTS: &[&str] = &[
    "glUniformMatrix4x2fv",
    "glGenBuffers",
    "glBindBuffer",
    "glBufferData",
    "glEnableVertexAttribArray",
    "glDisableVertexAttribArray",
    "glVertexAttribPointer",
    "glDeleteBuffers",
    "glUseProgram",
    "glGetUniformLocation",
    "glUniform1i",
    "glUniform1f",
    "glUniform1ui",
    "glUniform4fv",
    "glUniform2fv",
    "glGetProgramInfoLog",
    "glGetProgramiv",
    "glGetShaderiv",
    "glGetShaderInfoLog",
    "glDetachShader",
    "glDeleteShader",
    "glDeleteProgram",
    "glLinkProgram",
    "glAttachShader",
    "glCreateProgram",
    "glCompileShader",
    "glShaderSource",
    "glCreateShader",
];

/// `[untextured, textured]` program pairs.
#[derive(Debug, Clone, Copy)]
struct ShaderPrograms {
    primitive_3d: [ProgramId; 2],
    tile: [ProgramId; 2],
}

impl ShaderPrograms {
    fn create<D: GpuDriver + ?Sized>(driver: &mut D) -> Option<Self> {
        let mut created = Vec::with_capacity(4);
        for kind in [
            ProgramKind::Primitive3D { textured: false },
            ProgramKind::Primitive3D { textured: true },
            ProgramKind::Tile { textured: false },
            ProgramKind::Tile { textured: true },
        ] {
            match driver.create_program(kind) {
                Some(program) => created.push(program),
                None => {
                    log::warn!("emulated tier: {kind:?} failed to build");
                    for program in created {
                        driver.delete_program(program);
                    }
                    return None;
                }
            }
        }
        Some(Self {
            primitive_3d: [created[0], created[1]],
            tile: [created[2], created[3]],
        })
    }

    fn all(&self) -> [ProgramId; 4] {
        [self.primitive_3d[0], self.primitive_3d[1], self.tile[0], self.tile[1]]
    }
}

/// Tier for 2.x and 3.0 contexts.
///
/// With a working shader path layered draws go through programs; otherwise
/// every buffer keeps a CPU shadow and container draws are expanded on the
/// CPU.
pub struct EmulatedTier {
    textures: TextureStore,
    cache: StateCache,
    buffers: BufferTable,
    containers: ContainerTable,
    programs: Option<ShaderPrograms>,
    stream: ClientStream,
    capabilities: Capabilities,
}

impl EmulatedTier {
    /// Runs the shader gate and the self-test. On failure everything created
    /// is released and the error names the legacy fallback.
    pub fn init<D: GpuDriver + ?Sized>(
        driver: &mut D,
        config: &EngineConfig,
        capabilities: Capabilities,
        memory: TextureMemory,
    ) -> Result<(Self, bool), InitError> {
        let fallback = InitError::renegotiate(TierKind::Emulated.init_fallback());
        let mut programs = None;

        if capabilities.shaders {
            if let Some(missing) = SHADER_ENTRY_POINTS.iter().find(|name| !driver.has_entry_point(name)) {
                log::warn!("emulated tier: missing entry point {missing}");
                return Err(fallback);
            }
            programs = Some(ShaderPrograms::create(driver).ok_or_else(|| fallback.clone())?);
        }

        let mut texture_analysis_done = config.texture_analysis_done;
        if !texture_analysis_done {
            let test_programs = programs.map(|p| SelfTestPrograms {
                primitive_3d: p.primitive_3d[1],
                tile: p.tile[1],
            });
            if !selftest::run(driver, capabilities.texture_2d_array, test_programs) {
                if let Some(programs) = programs {
                    for program in programs.all() {
                        driver.delete_program(program);
                    }
                }
                driver.use_program(None);
                return Err(fallback);
            }
            texture_analysis_done = true;
        }

        let textures = TextureStore::new(
            TexturePolicy::fixed(&capabilities, config.lod_bias()),
            driver.info().max_texture_size,
            memory,
        );
        log::info!(
            "emulated tier: shaders {}, layered textures {}",
            programs.is_some(),
            capabilities.has_layered_textures()
        );

        Ok((
            Self {
                textures,
                cache: StateCache::new(1),
                buffers: BufferTable::new(true, capabilities.shaders),
                containers: ContainerTable::new(capabilities.shaders),
                programs,
                stream: ClientStream::new(MAX_VERTICES),
                capabilities,
            },
            texture_analysis_done,
        ))
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }

    pub fn has_shaders(&self) -> bool {
        self.programs.is_some()
    }

    pub fn claims(opcode: Opcode) -> bool {
        matches!(
            opcode,
            Opcode::TierShutdown
                | Opcode::TextureCreate
                | Opcode::TextureUpdate
                | Opcode::TextureDestroy
                | Opcode::Clear
                | Opcode::Screenshot
                | Opcode::Render
                | Opcode::RenderTex3D
                | Opcode::CreateBufferObject
                | Opcode::RecreateBufferObject
                | Opcode::UpdateBufferObject
                | Opcode::CopyBufferObject
                | Opcode::DeleteBufferObject
                | Opcode::CreateBufferContainer
                | Opcode::UpdateBufferContainer
                | Opcode::DeleteBufferContainer
                | Opcode::IndicesRequiredNumNotify
                | Opcode::RenderTileLayer
                | Opcode::RenderBorderTile
                | Opcode::RenderBorderTileLine
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
            }
            Command::TextureUpdate(cmd) => {
                self.textures.update(driver, resizer, &cmd, cmd.data.bytes(arena));
            }
            Command::TextureDestroy { slot } => self.textures.destroy(driver, slot),
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
            Command::IndicesRequiredNumNotify { .. } => {}

            Command::RenderTileLayer(cmd) => self.render_tile_layer(driver, &cmd),
            Command::RenderBorderTile(cmd) => self.render_border_tile(driver, &cmd),
            Command::RenderBorderTileLine(cmd) => self.render_border_tile_line(driver, &cmd),

            Command::TierShutdown => self.shutdown(driver),
            other => log::debug!("emulated tier ignores {:?}", other.opcode()),
        }
    }

    /// Selects the layered program, or the fixed pipeline without shaders.
    fn bind_layered<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        state: &RenderState,
        tile: bool,
    ) -> Option<ProgramId> {
        let textured = usize::from(state.texture.is_some());
        match self.programs {
            Some(programs) => {
                let program = if tile {
                    programs.tile[textured]
                } else {
                    programs.primitive_3d[textured]
                };
                self.cache.use_program(driver, Some(program));
                bind_program_state(driver, &mut self.cache, &mut self.textures, state, program, true, false);
                Some(program)
            }
            None => {
                self.cache.use_program(driver, None);
                bind_fixed_state(driver, &mut self.cache, &mut self.textures, state, true);
                None
            }
        }
    }

    fn render<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderStream, arena: &[u8]) {
        self.cache.use_program(driver, None);
        bind_fixed_state(driver, &mut self.cache, &mut self.textures, &cmd.state, false);
        let vertices = cmd.count * cmd.primitive.vertices_per_primitive();
        let bytes = stream_bytes(cmd.vertices.bytes(arena), vertices, size_of::<Vertex>());
        if !bytes.is_empty() {
            driver.draw_client(Topology::from(cmd.primitive), ClientFormat::Vertex, bytes);
        }
    }

    fn render_tex3d<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderStream, arena: &[u8]) {
        self.bind_layered(driver, &cmd.state, false);
        let vertices = cmd.count * cmd.primitive.vertices_per_primitive();
        let bytes = stream_bytes(cmd.vertices.bytes(arena), vertices, size_of::<VertexTex3D>());
        if !bytes.is_empty() {
            driver.draw_client(Topology::from(cmd.primitive), ClientFormat::VertexTex3D, bytes);
        }
    }

    fn render_tile_layer<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderTileLayer) {
        if cmd.draws.is_empty() || self.containers.get(cmd.container).is_none() {
            return;
        }
        match self.bind_layered(driver, &cmd.state, true) {
            Some(program) => {
                self.cache.set_color(driver, program, cmd.color);
                let Some(layout) = self.containers.get(cmd.container).and_then(|c| c.layout) else {
                    return;
                };
                for draw in &cmd.draws {
                    let first = draw.index_offset / 24 * 4;
                    let count = draw.index_count / 6 * 4;
                    driver.draw(layout, DrawCall::arrays(Topology::Quads, first as u32, count as u32));
                }
            }
            None => {
                let Some(container) = self.containers.get(cmd.container) else {
                    return;
                };
                let Some(reader) = ShadowReader::new(container, &self.buffers) else {
                    log::debug!("tile layer on container {} without shadow data", cmd.container);
                    return;
                };
                expand_tile_layer(driver, &mut self.stream, &reader, &cmd.draws, cmd.color);
            }
        }
    }

    fn render_border_tile<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderBorderTile) {
        if cmd.draw_num == 0 || self.containers.get(cmd.container).is_none() {
            return;
        }
        self.bind_layered(driver, &cmd.state, false);
        let Some(container) = self.containers.get(cmd.container) else {
            return;
        };
        if let Some(reader) = ShadowReader::new(container, &self.buffers) {
            expand_border_tile(driver, &mut self.stream, &reader, cmd);
        }
    }

    fn render_border_tile_line<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        cmd: &RenderBorderTileLine,
    ) {
        if cmd.draw_num == 0 || cmd.index_count == 0 || self.containers.get(cmd.container).is_none() {
            return;
        }
        self.bind_layered(driver, &cmd.state, false);
        let Some(container) = self.containers.get(cmd.container) else {
            return;
        };
        if let Some(reader) = ShadowReader::new(container, &self.buffers) {
            expand_border_tile_line(driver, &mut self.stream, &reader, cmd);
        }
    }

    pub fn shutdown<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        self.cache.use_program(driver, None);
        driver.bind_texture(0, None);
        self.textures.release_all(driver);
        self.containers.release_all(driver);
        self.buffers.release_all(driver);
        if let Some(programs) = self.programs.take() {
            for program in programs.all() {
                self.cache.forget_program(program);
                driver.delete_program(program);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        BlendMode, ContainerInfo, Payload, Primitive, ScreenRect, TextureCreate, TextureFlags,
        TextureFormat, TileDraw, VertexAttribute,
    };
    use crate::config::ApiVersion;
    use crate::driver::{DrawKind, DrawRange, RecordingDriver};
    use crate::image::ImageResizer;
    use crate::selftest::reference_framebuffer;

    fn caps(shaders: bool) -> Capabilities {
        Capabilities {
            mipmapping: true,
            npot_textures: true,
            texture_2d_array: true,
            textures_3d: true,
            tile_buffering: true,
            shaders,
            ..Capabilities::default()
        }
    }

    fn passing_driver() -> RecordingDriver {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (w, h) = (d.viewport.width, d.viewport.height);
        d.set_framebuffer(w, h, reference_framebuffer(w, h));
        d
    }

    fn analysed() -> EngineConfig {
        EngineConfig {
            texture_analysis_done: true,
            ..EngineConfig::default()
        }
    }

    fn tile_container(t: &mut EmulatedTier, d: &mut RecordingDriver) {
        let resizer = ImageResizer::default();
        let mut quad = Vec::new();
        for v in 0..4 {
            quad.extend_from_slice(bytemuck::cast_slice(&[v as f32, 0.0f32, 0.0, 0.0, 1.0]));
        }
        t.execute(
            d,
            Command::CreateBufferObject(crate::command::BufferUpload {
                index: 0,
                size: quad.len(),
                data: Payload::owned(quad),
            }),
            &[],
            &resizer,
        );
        t.execute(
            d,
            Command::CreateBufferContainer {
                index: 0,
                info: ContainerInfo {
                    stride: 20,
                    attributes: vec![VertexAttribute::float(0, 2, 0), VertexAttribute::float(0, 3, 8)],
                },
            },
            &[],
            &resizer,
        );
    }

    fn tile_layer() -> Command {
        Command::RenderTileLayer(RenderTileLayer {
            state: RenderState::new(ScreenRect::new(0.0, 0.0, 4.0, 4.0)),
            color: [1.0; 4],
            container: 0,
            draws: vec![TileDraw {
                index_offset: 0,
                index_count: 6,
            }],
        })
    }

    // ── initialisation ──

    #[test]
    fn self_test_pass_sets_the_flag() {
        let mut d = passing_driver();
        let (t, done) = EmulatedTier::init(&mut d, &EngineConfig::default(), caps(true), TextureMemory::new())
            .expect("init");
        assert!(done);
        assert!(t.has_shaders());
    }

    #[test]
    fn self_test_failure_falls_back_to_legacy() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let err = EmulatedTier::init(&mut d, &EngineConfig::default(), caps(true), TextureMemory::new())
            .err()
            .expect("self-test must fail on a blank framebuffer");
        assert_eq!(err, InitError::renegotiate(ApiVersion::new(1, 5, 0)));
        assert!(d.programs.is_empty());
        assert_eq!(d.live_textures(), 0);
    }

    #[test]
    fn missing_entry_point_falls_back_before_drawing() {
        let mut d = passing_driver();
        d.remove_entry_point("glUniform1ui");
        let err = EmulatedTier::init(&mut d, &EngineConfig::default(), caps(true), TextureMemory::new()).err();
        assert_eq!(err.and_then(|e| e.fallback()), Some(ApiVersion::LEGACY_FALLBACK));
        assert_eq!(d.draw_count(), 0);
    }

    #[test]
    fn cached_analysis_skips_the_self_test() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (_, done) = EmulatedTier::init(&mut d, &analysed(), caps(true), TextureMemory::new()).expect("init");
        assert!(done);
        assert_eq!(d.draw_count(), 0);
    }

    // ── container draws ──

    #[test]
    fn shader_tile_layer_draws_arrays_per_span() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (mut t, _) = EmulatedTier::init(&mut d, &analysed(), caps(true), TextureMemory::new()).expect("init");
        tile_container(&mut t, &mut d);
        t.execute(&mut d, tile_layer(), &[], &ImageResizer::default());

        let draw = d.draws.last().expect("draw");
        let DrawKind::Layout { call, .. } = draw.kind else {
            panic!("expected a layout draw");
        };
        assert_eq!(call.range, DrawRange::Arrays { first: 0, count: 4 });
        assert_eq!(call.topology, Topology::Quads);
        let tile = d.program_of(ProgramKind::Tile { textured: false });
        assert_eq!(draw.program, tile);
        assert_eq!(d.uniform_count(tile.expect("tile"), "color"), 1);
    }

    #[test]
    fn first_shader_tile_layer_enables_blending() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (mut t, _) = EmulatedTier::init(&mut d, &analysed(), caps(true), TextureMemory::new()).expect("init");
        tile_container(&mut t, &mut d);
        assert_eq!(d.blend_calls, 0);
        t.execute(&mut d, tile_layer(), &[], &ImageResizer::default());
        assert_eq!(d.blend, BlendMode::Alpha);
        assert_eq!(d.blend_calls, 1);
    }

    #[test]
    fn without_shaders_tiles_are_expanded_on_the_cpu() {
        let mut d = RecordingDriver::with_version("2.0.0");
        let (mut t, _) = EmulatedTier::init(&mut d, &analysed(), caps(false), TextureMemory::new()).expect("init");
        tile_container(&mut t, &mut d);
        assert_eq!(d.live_buffers(), 0);
        t.execute(&mut d, tile_layer(), &[], &ImageResizer::default());

        let draw = d.draws.last().expect("draw");
        assert_eq!(draw.program, None);
        assert_eq!(
            draw.kind,
            DrawKind::Client {
                topology: Topology::Quads,
                format: ClientFormat::VertexTex3D,
                vertex_count: 4,
            }
        );
    }

    #[test]
    fn border_tiles_are_always_expanded() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (mut t, _) = EmulatedTier::init(&mut d, &analysed(), caps(true), TextureMemory::new()).expect("init");
        tile_container(&mut t, &mut d);
        t.execute(
            &mut d,
            Command::RenderBorderTile(RenderBorderTile {
                state: RenderState::default(),
                color: [1.0; 4],
                container: 0,
                index_offset: 0,
                offset: [0.0; 2],
                dir: [1.0; 2],
                jump_index: 2,
                draw_num: 3,
            }),
            &[],
            &ImageResizer::default(),
        );
        let draw = d.draws.last().expect("draw");
        assert_eq!(draw.program, d.program_of(ProgramKind::Primitive3D { textured: false }));
        assert!(matches!(draw.kind, DrawKind::Client { vertex_count: 12, .. }));
    }

    #[test]
    fn quad_layers_are_not_claimed() {
        assert!(!EmulatedTier::claims(Opcode::RenderQuadLayer));
        assert!(!EmulatedTier::claims(Opcode::RenderQuadContainer));
        assert!(EmulatedTier::claims(Opcode::IndicesRequiredNumNotify));
    }

    // ── streamed draws ──

    #[test]
    fn render_uses_the_fixed_pipeline() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (mut t, _) = EmulatedTier::init(&mut d, &analysed(), caps(true), TextureMemory::new()).expect("init");
        let resizer = ImageResizer::default();
        t.execute(
            &mut d,
            Command::TextureCreate(TextureCreate {
                slot: 1,
                width: 16,
                height: 16,
                format: TextureFormat::Rgba,
                flags: TextureFlags::TO_2D_ARRAY,
                data: Payload::owned(vec![0; 16 * 16 * 4]),
            }),
            &[],
            &resizer,
        );
        t.execute(
            &mut d,
            Command::Render(RenderStream {
                state: RenderState::default().with_texture(1),
                primitive: Primitive::Triangles,
                count: 2,
                vertices: Payload::owned(vec![0; 6 * size_of::<Vertex>()]),
            }),
            &[],
            &resizer,
        );
        let draw = d.draws.last().expect("draw");
        assert_eq!(draw.program, None);
        assert!(matches!(draw.kind, DrawKind::Client { vertex_count: 6, .. }));

        t.execute(
            &mut d,
            Command::RenderTex3D(RenderStream {
                state: RenderState::default().with_texture(1),
                primitive: Primitive::Quads,
                count: 1,
                vertices: Payload::owned(vec![0; 4 * size_of::<VertexTex3D>()]),
            }),
            &[],
            &resizer,
        );
        let draw = d.draws.last().expect("draw");
        assert_eq!(draw.program, d.program_of(ProgramKind::Primitive3D { textured: true }));
        assert!(draw.unit0.is_some_and(|b| b.target.is_layered()));
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let (mut t, _) = EmulatedTier::init(&mut d, &analysed(), caps(true), TextureMemory::new()).expect("init");
        tile_container(&mut t, &mut d);
        t.execute(&mut d, Command::TierShutdown, &[], &ImageResizer::default());
        assert_eq!(d.live_buffers(), 0);
        assert!(d.layouts.is_empty());
        assert!(d.programs.is_empty());
    }
}
