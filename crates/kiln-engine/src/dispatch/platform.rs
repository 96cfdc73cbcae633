use std::collections::HashSet;

use crate::command::{BlendMode, Command, Opcode, PlatformInit, VideoMode};
use crate::driver::{DisplayMode, RenderDevice, Viewport};
use crate::logging::log_debug_message;
use crate::negotiate::{Blocklist, negotiate};

use super::{DispatchState, Fragment};

/// Context, presentation and negotiation records.
#[derive(Debug)]
pub struct PlatformFragment {
    blocklist: Blocklist,
}

impl PlatformFragment {
    pub fn new(blocklist: Blocklist) -> Self {
        Self { blocklist }
    }

    pub fn drain_debug_output<D: RenderDevice>(&mut self, device: &mut D) {
        for message in device.drain_debug_messages() {
            log_debug_message(&message);
        }
    }

    fn init<D: RenderDevice>(&mut self, device: &mut D, state: &mut DispatchState, init: PlatformInit) {
        if !device.make_current() {
            log::warn!("context could not be made current on the render thread");
        }

        let info = device.info().clone();
        let report = negotiate(&init.config, &info, init.loader, &self.blocklist);

        state.config = report.config.clone();
        state.capabilities = report.capabilities;
        state.tier_kind = report.tier;

        if state.config.debug_gfx {
            state.debug_output = device.enable_debug_output();
            if !state.debug_output {
                log::info!("driver has no debug output facility");
            }
        }

        let (width, height) = device.drawable_size();
        device.set_viewport(Viewport {
            x: 0,
            y: 0,
            width,
            height,
        });
        device.set_blend(BlendMode::Alpha);

        init.reply.set(report);
    }
}

/// One mode per resolution, reported as 8 bits per channel.
pub(crate) fn video_modes(modes: &[DisplayMode]) -> Vec<VideoMode> {
    let mut seen = HashSet::new();
    modes
        .iter()
        .filter(|mode| seen.insert((mode.width, mode.height)))
        .map(|mode| VideoMode {
            width: mode.width,
            height: mode.height,
            red: 8,
            green: 8,
            blue: 8,
            refresh_rate: mode.refresh_rate,
        })
        .collect()
}

impl<D: RenderDevice> Fragment<D> for PlatformFragment {
    fn claims(&self, opcode: Opcode) -> bool {
        matches!(
            opcode,
            Opcode::Init
                | Opcode::Shutdown
                | Opcode::Swap
                | Opcode::VSync
                | Opcode::Resize
                | Opcode::UpdateViewport
                | Opcode::VideoModes
        )
    }

    fn execute(&mut self, device: &mut D, state: &mut DispatchState, command: Command, _arena: &[u8]) {
        match command {
            Command::Init(init) => self.init(device, state, init),
            Command::Shutdown => device.release_current(),
            Command::Swap { finish } => {
                if finish {
                    device.finish();
                }
                device.swap();
            }
            Command::VSync { interval, reply } => reply.set(device.set_swap_interval(interval)),
            Command::Resize { width, height } => {
                device.set_viewport(Viewport {
                    x: 0,
                    y: 0,
                    width,
                    height,
                });
                device.resize(width, height);
            }
            Command::UpdateViewport {
                x,
                y,
                width,
                height,
            } => device.set_viewport(Viewport {
                x,
                y,
                width,
                height,
            }),
            Command::VideoModes { screen, reply } => {
                reply.set(video_modes(&device.display_modes(screen)));
            }
            other => log::debug!("platform ignores {:?}", other.opcode()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ReplySlot;
    use crate::config::{ApiVersion, EngineConfig};
    use crate::driver::RecordingDriver;
    use crate::negotiate::{InitError, TierKind};
    use crate::resources::TextureMemory;

    fn state() -> DispatchState {
        DispatchState::new(EngineConfig::default(), TextureMemory::new())
    }

    fn mode(width: u32, height: u32, refresh_rate: u32) -> DisplayMode {
        DisplayMode {
            width,
            height,
            refresh_rate,
        }
    }

    // ── video modes ──

    #[test]
    fn video_modes_are_deduplicated_by_resolution() {
        let modes = video_modes(&[mode(1920, 1080, 60), mode(1920, 1080, 144), mode(1280, 720, 60)]);
        assert_eq!(modes.len(), 2);
        assert_eq!(modes[0].refresh_rate, 60);
        assert_eq!((modes[1].red, modes[1].green, modes[1].blue), (8, 8, 8));
    }

    // ── presentation ──

    #[test]
    fn resize_updates_viewport_and_context() {
        let mut d = RecordingDriver::with_version("3.3.0");
        let mut p = PlatformFragment::new(Blocklist::empty());
        let mut s = state();
        p.execute(&mut d, &mut s, Command::Resize { width: 300, height: 200 }, &[]);
        assert_eq!((d.viewport.width, d.viewport.height), (300, 200));
        assert_eq!(d.drawable, (300, 200));

        p.execute(&mut d, &mut s, Command::Swap { finish: true }, &[]);
        assert_eq!((d.finishes, d.swaps), (1, 1));
    }

    #[test]
    fn vsync_reports_support() {
        let mut d = RecordingDriver::with_version("3.3.0");
        d.swap_interval_supported = false;
        let mut p = PlatformFragment::new(Blocklist::empty());
        let reply = ReplySlot::new();
        p.execute(&mut d, &mut state(), Command::VSync { interval: 1, reply: reply.clone() }, &[]);
        assert_eq!(reply.take(), Some(false));
        assert_eq!(d.swap_interval, None);
    }

    // ── negotiation ──

    #[test]
    fn init_fills_shared_state() {
        let mut d = RecordingDriver::with_version("4.6.0");
        d.drawable = (800, 600);
        let mut p = PlatformFragment::new(Blocklist::empty());
        let mut s = state();
        let mut config = EngineConfig::default();
        config.set_requested_version(ApiVersion::new(3, 3, 0));
        let reply = ReplySlot::new();
        p.execute(
            &mut d,
            &mut s,
            Command::Init(PlatformInit {
                config,
                loader: ApiVersion::new(4, 6, 0),
                reply: reply.clone(),
            }),
            &[],
        );

        let report = reply.take().expect("report");
        assert_eq!(report.result, Ok(()));
        assert!(d.current);
        assert_eq!(s.tier_kind, TierKind::Core);
        assert!(s.capabilities.shaders);
        assert_eq!((d.viewport.width, d.viewport.height), (800, 600));
        assert_eq!(d.blend, BlendMode::Alpha);
    }

    #[test]
    fn blocklisted_driver_sets_flag_and_advisory() {
        let mut d = RecordingDriver::with_version("4.6.0 - Build 26.20.100.7870");
        d.set_vendor("Intel");
        let mut p = PlatformFragment::new(Blocklist::builtin());
        let mut s = state();
        let reply = ReplySlot::new();
        p.execute(
            &mut d,
            &mut s,
            Command::Init(PlatformInit {
                config: EngineConfig::default(),
                loader: ApiVersion::new(4, 6, 0),
                reply: reply.clone(),
            }),
            &[],
        );

        let report = reply.take().expect("report");
        assert!(matches!(report.result, Err(InitError::Renegotiate { advisory: Some(_), .. })));
        assert!(s.config.driver_is_blocked);
    }
}
