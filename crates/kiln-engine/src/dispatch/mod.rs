//! Replays command buffers on the render thread.
//!
//! Every record is offered to the fragments in a fixed order (tier,
//! platform, general); the first one that claims the opcode runs it.
//! Records nobody claims are logged and skipped.

mod general;
mod platform;
mod tier;

pub use general::GeneralFragment;
pub use platform::PlatformFragment;
pub use tier::TierFragment;

use crate::command::{Command, CommandBuffer, Opcode};
use crate::config::EngineConfig;
use crate::driver::RenderDevice;
use crate::negotiate::{Blocklist, Capabilities, TierKind};
use crate::resources::TextureMemory;

/// State shared between fragments, written by the platform `Init` and read
/// by the tier fragment.
#[derive(Debug, Clone)]
pub struct DispatchState {
    pub config: EngineConfig,
    pub capabilities: Capabilities,
    pub tier_kind: TierKind,
    pub memory: TextureMemory,
    pub debug_output: bool,
}

impl DispatchState {
    pub fn new(config: EngineConfig, memory: TextureMemory) -> Self {
        let tier_kind = TierKind::for_version(config.requested_version());
        Self {
            config,
            capabilities: Capabilities::default(),
            tier_kind,
            memory,
            debug_output: false,
        }
    }
}

/// A dispatch unit owning a subset of opcodes.
pub trait Fragment<D: RenderDevice> {
    fn claims(&self, opcode: Opcode) -> bool;

    fn execute(&mut self, device: &mut D, state: &mut DispatchState, command: Command, arena: &[u8]);
}

/// Owns the device and every fragment; lives on the render thread.
pub struct CommandProcessor<D: RenderDevice> {
    device: D,
    state: DispatchState,
    tier: TierFragment,
    platform: PlatformFragment,
    general: GeneralFragment,
}

impl<D: RenderDevice> CommandProcessor<D> {
    pub fn new(device: D, config: EngineConfig, memory: TextureMemory) -> Self {
        Self::with_blocklist(device, config, memory, Blocklist::builtin())
    }

    pub fn with_blocklist(
        device: D,
        config: EngineConfig,
        memory: TextureMemory,
        blocklist: Blocklist,
    ) -> Self {
        Self {
            device,
            state: DispatchState::new(config, memory),
            tier: TierFragment::new(),
            platform: PlatformFragment::new(blocklist),
            general: GeneralFragment,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    pub fn tier(&self) -> &TierFragment {
        &self.tier
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Runs every record in order and rewinds the buffer.
    pub fn run_buffer(&mut self, buffer: &mut CommandBuffer) {
        let (records, arena) = buffer.drain();
        for command in records {
            self.dispatch(command, arena);
        }
        if self.state.debug_output {
            self.platform.drain_debug_output(&mut self.device);
        }
        buffer.reset();
    }

    fn dispatch(&mut self, command: Command, arena: &[u8]) {
        let opcode = command.opcode();
        let fragments: [&mut dyn Fragment<D>; 3] =
            [&mut self.tier, &mut self.platform, &mut self.general];
        for fragment in fragments {
            if fragment.claims(opcode) {
                fragment.execute(&mut self.device, &mut self.state, command, arena);
                return;
            }
        }
        log::warn!("unknown command {opcode:?}");
    }
}
