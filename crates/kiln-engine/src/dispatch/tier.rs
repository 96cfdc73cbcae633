use crate::command::{Command, Opcode};
use crate::driver::RenderDevice;
use crate::image::ImageResizer;
use crate::tiers::Tier;

use super::{DispatchState, Fragment};

/// Forwards records to the active tier. `TierInit` builds it from the
/// negotiated state; until then only lifecycle records are claimed.
#[derive(Debug, Default)]
pub struct TierFragment {
    tier: Option<Tier>,
    resizer: ImageResizer,
}

impl TierFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&Tier> {
        self.tier.as_ref()
    }
}

impl<D: RenderDevice> Fragment<D> for TierFragment {
    fn claims(&self, opcode: Opcode) -> bool {
        match opcode {
            Opcode::TierInit | Opcode::TierShutdown => true,
            _ => self.tier.as_ref().is_some_and(|tier| tier.claims(opcode)),
        }
    }

    fn execute(&mut self, device: &mut D, state: &mut DispatchState, command: Command, arena: &[u8]) {
        match command {
            Command::TierInit(init) => {
                if let Some(mut previous) = self.tier.take() {
                    previous.shutdown(device);
                }
                let (tier, report) = Tier::init(
                    state.tier_kind,
                    device,
                    &state.config,
                    state.capabilities,
                    state.memory.clone(),
                );
                state.config.texture_analysis_done = report.texture_analysis_done;
                self.tier = tier;
                init.reply.set(report);
            }
            Command::TierShutdown => {
                if let Some(mut tier) = self.tier.take() {
                    tier.shutdown(device);
                }
            }
            command => match self.tier.as_mut() {
                Some(tier) => tier.execute(device, command, arena, &self.resizer),
                None => log::warn!("{:?} before tier init", command.opcode()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ReplySlot, TierInit};
    use crate::config::EngineConfig;
    use crate::driver::RecordingDriver;
    use crate::negotiate::{Capabilities, TierKind};
    use crate::resources::TextureMemory;

    fn init(fragment: &mut TierFragment, d: &mut RecordingDriver, state: &mut DispatchState) -> bool {
        let reply = ReplySlot::new();
        fragment.execute(d, state, Command::TierInit(TierInit { reply: reply.clone() }), &[]);
        reply.take().is_some_and(|r| r.result.is_ok())
    }

    #[test]
    fn claims_follow_the_active_tier() {
        let mut d = RecordingDriver::with_version("1.5.0");
        let mut state = DispatchState::new(EngineConfig::default(), TextureMemory::new());
        state.tier_kind = TierKind::Legacy;
        let mut fragment = TierFragment::new();
        assert!(Fragment::<RecordingDriver>::claims(&fragment, Opcode::TierInit));
        assert!(!Fragment::<RecordingDriver>::claims(&fragment, Opcode::Render));

        assert!(init(&mut fragment, &mut d, &mut state));
        assert!(Fragment::<RecordingDriver>::claims(&fragment, Opcode::Render));
        assert!(!Fragment::<RecordingDriver>::claims(&fragment, Opcode::RenderQuadLayer));

        fragment.execute(&mut d, &mut state, Command::TierShutdown, &[]);
        assert!(fragment.active().is_none());
    }

    #[test]
    fn self_test_result_is_written_back() {
        let mut d = RecordingDriver::with_version("3.0.0");
        let mut state = DispatchState::new(EngineConfig::default(), TextureMemory::new());
        state.tier_kind = TierKind::Emulated;
        state.capabilities = Capabilities {
            mipmapping: true,
            npot_textures: true,
            texture_2d_array: true,
            tile_buffering: true,
            shaders: true,
            ..Capabilities::default()
        };
        let mut fragment = TierFragment::new();
        // blank framebuffer fails the sampled colours
        assert!(!init(&mut fragment, &mut d, &mut state));
        assert!(!state.config.texture_analysis_done);
        assert!(fragment.active().is_none());
    }
}
