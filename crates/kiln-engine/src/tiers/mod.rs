//! Capability tiers.
//!
//! One tier serves a session, picked from the negotiated version. Each owns
//! its resource tables and state cache and claims the opcodes it can execute;
//! the dispatch chain routes everything else elsewhere.

mod core;
mod emulated;
mod expand;
mod legacy;
mod state;
mod texture;

pub use self::core::{CORE_ENTRY_POINTS, CoreTier};
pub use emulated::{EmulatedTier, SHADER_ENTRY_POINTS};
pub use legacy::LegacyTier;
pub use texture::{TexturePolicy, TextureStore};

use crate::command::{Command, Opcode};
use crate::config::EngineConfig;
use crate::driver::GpuDriver;
use crate::image::Resizer;
use crate::negotiate::{Capabilities, TierInitReport, TierKind};
use crate::resources::TextureMemory;

pub enum Tier {
    Legacy(LegacyTier),
    Emulated(EmulatedTier),
    Core(CoreTier),
}

impl Tier {
    /// Builds the tier for `kind`. On failure nothing is left allocated and
    /// the report names the version to renegotiate with.
    pub fn init<D: GpuDriver + ?Sized>(
        kind: TierKind,
        driver: &mut D,
        config: &EngineConfig,
        capabilities: Capabilities,
        memory: TextureMemory,
    ) -> (Option<Tier>, TierInitReport) {
        let analysis_done = config.texture_analysis_done;
        let result = match kind {
            TierKind::Legacy => Ok((
                Tier::Legacy(LegacyTier::new(driver.info(), capabilities, memory)),
                analysis_done,
            )),
            TierKind::Emulated => EmulatedTier::init(driver, config, capabilities, memory)
                .map(|(tier, done)| (Tier::Emulated(tier), done)),
            TierKind::Core => {
                CoreTier::init(driver, config, memory).map(|tier| (Tier::Core(tier), analysis_done))
            }
        };

        match result {
            Ok((tier, done)) => {
                log::info!("{kind:?} tier ready");
                (Some(tier), TierInitReport::ok(done))
            }
            Err(err) => {
                log::warn!("{kind:?} tier failed to initialise: {err}");
                (
                    None,
                    TierInitReport {
                        result: Err(err),
                        texture_analysis_done: analysis_done,
                    },
                )
            }
        }
    }

    pub fn kind(&self) -> TierKind {
        match self {
            Tier::Legacy(_) => TierKind::Legacy,
            Tier::Emulated(_) => TierKind::Emulated,
            Tier::Core(_) => TierKind::Core,
        }
    }

    pub fn claims(&self, opcode: Opcode) -> bool {
        match self {
            Tier::Legacy(_) => LegacyTier::claims(opcode),
            Tier::Emulated(_) => EmulatedTier::claims(opcode),
            Tier::Core(_) => CoreTier::claims(opcode),
        }
    }

    pub fn execute<D: GpuDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        command: Command,
        arena: &[u8],
        resizer: &dyn Resizer,
    ) {
        match self {
            Tier::Legacy(tier) => tier.execute(driver, command, arena, resizer),
            Tier::Emulated(tier) => tier.execute(driver, command, arena, resizer),
            Tier::Core(tier) => tier.execute(driver, command, arena, resizer),
        }
    }

    pub fn shutdown<D: GpuDriver + ?Sized>(&mut self, driver: &mut D) {
        match self {
            Tier::Legacy(tier) => tier.shutdown(driver),
            Tier::Emulated(tier) => tier.shutdown(driver),
            Tier::Core(tier) => tier.shutdown(driver),
        }
    }

    pub fn textures(&self) -> &TextureStore {
        match self {
            Tier::Legacy(tier) => tier.textures(),
            Tier::Emulated(tier) => tier.textures(),
            Tier::Core(tier) => tier.textures(),
        }
    }
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier")
            .field("kind", &self.kind())
            .field("live_textures", &self.textures().live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        Payload, Primitive, RenderState, RenderStream, ScreenRect, TextureCreate, TextureFlags,
        TextureFormat, TextureUpdate, Vertex,
    };
    use crate::config::ApiVersion;
    use crate::driver::{ProgramKind, RecordingDriver};
    use crate::image::ImageResizer;
    use crate::negotiate::InitError;

    fn core_caps() -> Capabilities {
        Capabilities {
            tile_buffering: true,
            quad_buffering: true,
            text_buffering: true,
            quad_container_buffering: true,
            mipmapping: true,
            npot_textures: true,
            textures_3d: true,
            texture_2d_array: true,
            texture_2d_array_as_extension: false,
            shaders: true,
        }
    }

    // ── end to end ──

    #[test]
    fn create_update_render_destroy_leaves_nothing_live() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let memory = TextureMemory::new();
        let (tier, report) = Tier::init(
            TierKind::Core,
            &mut d,
            &EngineConfig::default(),
            core_caps(),
            memory.clone(),
        );
        assert_eq!(report.result, Ok(()));
        let mut tier = tier.expect("core tier");
        let resizer = ImageResizer::default();

        let commands = vec![
            Command::TextureCreate(TextureCreate {
                slot: 0,
                width: 64,
                height: 64,
                format: TextureFormat::Rgba,
                flags: TextureFlags::NONE,
                data: Payload::owned(vec![255; 64 * 64 * 4]),
            }),
            Command::TextureUpdate(TextureUpdate {
                slot: 0,
                x: 0,
                y: 0,
                width: 32,
                height: 32,
                format: TextureFormat::Rgba,
                data: Payload::owned(vec![0; 32 * 32 * 4]),
            }),
            Command::Render(RenderStream {
                state: RenderState::new(ScreenRect::new(0.0, 0.0, 64.0, 64.0)).with_texture(0),
                primitive: Primitive::Quads,
                count: 1,
                vertices: Payload::owned(bytemuck::cast_slice(&[Vertex::default(); 4]).to_vec()),
            }),
            Command::TextureDestroy { slot: 0 },
        ];
        for command in commands {
            assert!(tier.claims(command.opcode()));
            tier.execute(&mut d, command, &[], &resizer);
        }

        assert_eq!(d.draw_count(), 1);
        let draw = d.draws.last().expect("draw");
        assert!(draw.unit0.is_some());
        assert_eq!(memory.get(), 0);
        assert_eq!(tier.textures().live_count(), 0);
        assert_eq!(d.live_textures(), 0);
    }

    // ── fallback ──

    #[test]
    fn failing_core_driver_renegotiates_without_drawing() {
        let mut d = RecordingDriver::with_version("3.3.0");
        d.failing_programs.insert(ProgramKind::Tile { textured: true });
        let (tier, report) = Tier::init(
            TierKind::Core,
            &mut d,
            &EngineConfig::default(),
            core_caps(),
            TextureMemory::new(),
        );
        assert!(tier.is_none());
        assert_eq!(report.result, Err(InitError::renegotiate(ApiVersion::new(3, 0, 0))));
        assert_eq!(d.draw_count(), 0);
    }

    #[test]
    fn failing_emulated_self_test_drops_to_legacy_version() {
        let mut d = RecordingDriver::with_version("3.0.0");
        d.set_framebuffer(640, 480, vec![0; 640 * 480 * 3]);
        let caps = Capabilities {
            quad_buffering: false,
            text_buffering: false,
            quad_container_buffering: false,
            ..core_caps()
        };
        let (tier, report) =
            Tier::init(TierKind::Emulated, &mut d, &EngineConfig::default(), caps, TextureMemory::new());
        assert!(tier.is_none());
        assert_eq!(report.result.err().and_then(|e| e.fallback()), Some(ApiVersion::LEGACY_FALLBACK));
        assert!(!report.texture_analysis_done);
    }

    #[test]
    fn tiers_claim_progressively_more() {
        let mut d = RecordingDriver::with_version("1.5.0");
        let (legacy, _) = Tier::init(
            TierKind::Legacy,
            &mut d,
            &EngineConfig::default(),
            Capabilities::default(),
            TextureMemory::new(),
        );
        let legacy = legacy.expect("legacy tier");
        assert_eq!(legacy.kind(), TierKind::Legacy);
        assert!(legacy.claims(Opcode::Render));
        assert!(!legacy.claims(Opcode::RenderTileLayer));
        assert!(EmulatedTier::claims(Opcode::RenderTileLayer));
        assert!(!EmulatedTier::claims(Opcode::RenderQuadLayer));
        assert!(CoreTier::claims(Opcode::RenderQuadLayer));
        assert!(!CoreTier::claims(Opcode::Swap));
    }
}
