use crate::command::{Command, Opcode, RenderStream, Vertex};
use crate::driver::{ClientFormat, DriverInfo, GpuDriver, Topology};
use crate::image::Resizer;
use crate::negotiate::Capabilities;
use crate::resources::{StateCache, TextureMemory};

use super::state::{bind_fixed_state, screenshot, stream_bytes};
use super::texture::{TexturePolicy, TextureStore};

/// Fixed-pipeline tier: one texture unit, client-memory draws only.
pub struct LegacyTier {
    textures: TextureStore,
    cache: StateCache,
    capabilities: Capabilities,
}

impl LegacyTier {
    pub fn new(info: &DriverInfo, capabilities: Capabilities, memory: TextureMemory) -> Self {
        log::info!("legacy tier: fixed pipeline, {} max texture size", info.max_texture_size);
        Self {
            textures: TextureStore::new(
                TexturePolicy::fixed(&capabilities, None),
                info.max_texture_size,
                memory,
            ),
            cache: StateCache::new(1),
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
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
                driver.set_clear_color([color[0], color[1], color[2], 0.0]);
                driver.clear();
            }
            Command::Screenshot { reply } => reply.set(screenshot(driver)),
            Command::Render(cmd) => self.render(driver, &cmd, arena),
            Command::TierShutdown => self.shutdown(driver),
            other => log::debug!("legacy tier ignores {:?}", other.opcode()),
        }
    }

    fn render<D: GpuDriver + ?Sized>(&mut self, driver: &mut D, cmd: &RenderStream, arena: &[u8]) {
        bind_fixed_state(driver, &mut self.cache, &mut self.textures, &cmd.state, false);
        let vertices = cmd.count * cmd.primitive.vertices_per_primitive();
        let bytes = stream_bytes(cmd.vertices.bytes(arena), vertices, size_of::<Vertex>());
        if !bytes.is_empty() {
            driver.draw_client(Topology::from(cmd.primitive), ClientFormat::Vertex, bytes);
        }
    }

    pub fn shutdown<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        driver.bind_texture(0, None);
        self.textures.release_all(driver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        Payload, Primitive, RenderState, ReplySlot, ScreenRect, TextureCreate, TextureFlags,
        TextureFormat,
    };
    use crate::driver::{DrawKind, RecordingDriver};
    use crate::image::ImageResizer;

    fn tier(d: &RecordingDriver) -> LegacyTier {
        LegacyTier::new(&d.info, Capabilities::default(), TextureMemory::new())
    }

    fn quad_payload() -> Payload {
        Payload::owned(bytemuck::cast_slice(&[Vertex::default(); 4]).to_vec())
    }

    #[test]
    fn claims_only_the_base_set() {
        assert!(LegacyTier::claims(Opcode::Render));
        assert!(!LegacyTier::claims(Opcode::RenderTex3D));
        assert!(!LegacyTier::claims(Opcode::CreateBufferObject));
        assert!(!LegacyTier::claims(Opcode::TierInit));
    }

    #[test]
    fn render_draws_from_client_memory() {
        let mut d = RecordingDriver::with_version("1.5.0");
        let mut t = tier(&d);
        let resizer = ImageResizer::default();
        t.execute(
            &mut d,
            Command::TextureCreate(TextureCreate {
                slot: 0,
                width: 8,
                height: 8,
                format: TextureFormat::Rgba,
                flags: TextureFlags::NONE,
                data: Payload::owned(vec![0; 256]),
            }),
            &[],
            &resizer,
        );
        let state = RenderState::new(ScreenRect::new(0.0, 0.0, 8.0, 8.0)).with_texture(0);
        t.execute(
            &mut d,
            Command::Render(RenderStream {
                state,
                primitive: Primitive::Quads,
                count: 1,
                vertices: quad_payload(),
            }),
            &[],
            &resizer,
        );

        let draw = d.draws.last().expect("draw");
        assert_eq!(draw.program, None);
        assert!(draw.unit0.is_some());
        assert_eq!(
            draw.kind,
            DrawKind::Client {
                topology: Topology::Quads,
                format: ClientFormat::Vertex,
                vertex_count: 4,
            }
        );
    }

    #[test]
    fn clear_always_sets_colour_with_zero_alpha() {
        let mut d = RecordingDriver::with_version("1.5.0");
        let mut t = tier(&d);
        let resizer = ImageResizer::default();
        for _ in 0..2 {
            t.execute(&mut d, Command::Clear { color: [0.5, 0.5, 0.5, 1.0] }, &[], &resizer);
        }
        assert_eq!(d.clear_color_calls, 2);
        assert_eq!(d.clears, 2);
        assert_eq!(d.clear_color[3], 0.0);
    }

    #[test]
    fn screenshot_replies() {
        let mut d = RecordingDriver::with_version("1.5.0");
        let mut t = tier(&d);
        let reply = ReplySlot::new();
        t.execute(&mut d, Command::Screenshot { reply: reply.clone() }, &[], &ImageResizer::default());
        let shot = reply.take().expect("screenshot");
        assert_eq!((shot.width, shot.height), (640, 480));
        assert_eq!(shot.pixels.len(), 640 * 480 * 3);
    }

    #[test]
    fn shutdown_releases_textures() {
        let mut d = RecordingDriver::with_version("1.5.0");
        let mut t = tier(&d);
        let resizer = ImageResizer::default();
        t.execute(
            &mut d,
            Command::TextureCreate(TextureCreate {
                slot: 9,
                width: 4,
                height: 4,
                format: TextureFormat::Alpha,
                flags: TextureFlags::NO_MIPMAPS,
                data: Payload::owned(vec![0; 16]),
            }),
            &[],
            &resizer,
        );
        assert_eq!(d.live_textures(), 1);
        t.execute(&mut d, Command::TierShutdown, &[], &resizer);
        assert_eq!(d.live_textures(), 0);
        assert_eq!(t.textures().memory().get(), 0);
    }
}
