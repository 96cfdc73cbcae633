use std::fmt;
use std::mem;

use crate::command::{
    Command, CommandBuffer, CommandBufferFull, PlatformInit, ReplySlot, Screenshot, TierInit,
    VideoMode,
};
use crate::config::{ApiVersion, EngineConfig, SettingsStore};
use crate::dispatch::CommandProcessor;
use crate::driver::{DriverStrings, RenderDevice};
use crate::negotiate::{Blocklist, Capabilities, InitError, TierKind, check_loader};
use crate::resources::TextureMemory;

use super::{RenderThreadLost, ThreadedBackend};

/// A failed start. The caller retries with `config`, which already carries
/// the version to fall back to.
pub struct StartFailure<D> {
    pub error: InitError,
    pub config: EngineConfig,
    /// `None` only when the render thread could not be spawned or panicked.
    pub device: Option<D>,
}

impl<D> fmt::Debug for StartFailure<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartFailure")
            .field("error", &self.error)
            .field("config", &self.config)
            .field("device", &self.device.is_some())
            .finish()
    }
}

impl<D> fmt::Display for StartFailure<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

/// Producer side of a running engine.
///
/// Two command buffers alternate: one is recorded here while the render
/// thread runs the other.
pub struct Session<D: RenderDevice> {
    backend: ThreadedBackend<CommandProcessor<D>>,
    current: CommandBuffer,
    config: EngineConfig,
    memory: TextureMemory,
    capabilities: Capabilities,
    driver: DriverStrings,
    tier: TierKind,
}

impl<D: RenderDevice> Session<D> {
    /// Negotiates a context and initialises its tier on a new render thread.
    ///
    /// Every downgrade is written to `settings` before the failure is
    /// returned. Retrying is the caller's job.
    pub fn start(
        device: D,
        config: EngineConfig,
        loader: ApiVersion,
        settings: &mut dyn SettingsStore,
    ) -> Result<Self, StartFailure<D>> {
        Self::start_with_blocklist(device, config, loader, settings, Blocklist::builtin())
    }

    pub fn start_with_blocklist(
        device: D,
        mut config: EngineConfig,
        loader: ApiVersion,
        settings: &mut dyn SettingsStore,
        blocklist: Blocklist,
    ) -> Result<Self, StartFailure<D>> {
        config.clamp_version();
        if let Err(error) = check_loader(config.requested_version(), loader) {
            log::warn!("{error}");
            config.set_requested_version(loader);
            settings.store(&config);
            return Err(StartFailure {
                error,
                config,
                device: Some(device),
            });
        }

        let memory = TextureMemory::new();
        let processor = CommandProcessor::with_blocklist(device, config.clone(), memory.clone(), blocklist);
        let backend = match ThreadedBackend::start(processor) {
            Ok(backend) => backend,
            Err(err) => {
                log::error!("could not spawn the render thread: {err}");
                return Err(StartFailure {
                    error: InitError::ProcessorUnavailable,
                    config,
                    device: None,
                });
            }
        };

        let mut session = Session {
            backend,
            current: CommandBuffer::from_config(&config),
            config: config.clone(),
            memory,
            capabilities: Capabilities::default(),
            driver: DriverStrings::default(),
            tier: TierKind::for_version(config.requested_version()),
        };

        let platform = ReplySlot::new();
        session.round_trip(Command::Init(PlatformInit {
            config: config.clone(),
            loader,
            reply: platform.clone(),
        }));
        let Some(report) = platform.take() else {
            return Err(session.fail(InitError::ProcessorUnavailable, settings));
        };
        session.config = report.config;
        session.capabilities = report.capabilities;
        session.driver = report.driver;
        session.tier = report.tier;
        if let Err(error) = report.result {
            session.config.set_requested_version(report.context);
            return Err(session.fail(error, settings));
        }

        let tier = ReplySlot::new();
        session.round_trip(Command::TierInit(TierInit { reply: tier.clone() }));
        let Some(report) = tier.take() else {
            return Err(session.fail(InitError::ProcessorUnavailable, settings));
        };
        let analysis_changed = report.texture_analysis_done != session.config.texture_analysis_done;
        session.config.texture_analysis_done = report.texture_analysis_done;
        if let Err(error) = report.result {
            if let Some(fallback) = error.fallback() {
                session.config.set_requested_version(fallback);
            }
            return Err(session.fail(error, settings));
        }

        if analysis_changed || session.config != config {
            settings.store(&session.config);
        }
        log::info!(
            "session started: {:?} tier on {}",
            session.tier,
            session.driver.renderer
        );
        Ok(session)
    }

    /// Tears the half-started session down and persists its config.
    fn fail(self, error: InitError, settings: &mut dyn SettingsStore) -> StartFailure<D> {
        log::warn!("start failed: {error}");
        let config = self.config.clone();
        settings.store(&config);
        let device = self.shutdown();
        StartFailure {
            error,
            config,
            device,
        }
    }

    /// Runs everything recorded so far plus `command` and waits. A lost
    /// render thread leaves the command's reply empty.
    fn round_trip(&mut self, command: Command) {
        if let Err(err) = self.current.push(command) {
            log::error!("{err}");
        }
        if let Err(err) = self.flush().and_then(|()| self.backend.wait_for_idle()) {
            log::error!("{err}");
        }
    }

    /// The buffer being recorded.
    pub fn command_buffer(&mut self) -> &mut CommandBuffer {
        &mut self.current
    }

    pub fn push(&mut self, command: Command) -> Result<(), CommandBufferFull> {
        self.current.push(command)
    }

    /// Hands the recorded buffer to the render thread and continues with
    /// the one it finished last.
    pub fn flush(&mut self) -> Result<(), RenderThreadLost> {
        let next = self
            .backend
            .reclaim()
            .unwrap_or_else(|| CommandBuffer::from_config(&self.config));
        let submitted = mem::replace(&mut self.current, next);
        self.backend.run_buffer(submitted)
    }

    pub fn wait_for_idle(&self) -> Result<(), RenderThreadLost> {
        self.backend.wait_for_idle()
    }

    pub fn is_idle(&self) -> bool {
        self.backend.is_idle()
    }

    /// Bytes of texture memory the render thread currently holds.
    pub fn texture_memory_usage(&self) -> usize {
        self.memory.get()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn driver_strings(&self) -> &DriverStrings {
        &self.driver
    }

    pub fn tier(&self) -> TierKind {
        self.tier
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Records a read-back, runs everything recorded so far and waits.
    pub fn screenshot(&mut self) -> Option<Screenshot> {
        let reply = ReplySlot::new();
        self.round_trip(Command::Screenshot {
            reply: reply.clone(),
        });
        reply.take()
    }

    pub fn video_modes(&mut self, screen: u32) -> Vec<VideoMode> {
        let reply = ReplySlot::new();
        self.round_trip(Command::VideoModes {
            screen,
            reply: reply.clone(),
        });
        reply.take().unwrap_or_default()
    }

    /// Returns whether the interval was accepted.
    pub fn set_vsync(&mut self, interval: i32) -> bool {
        let reply = ReplySlot::new();
        self.round_trip(Command::VSync {
            interval,
            reply: reply.clone(),
        });
        reply.take().unwrap_or(false)
    }

    /// Releases the tier and the context, stops the render thread and
    /// hands the device back.
    pub fn shutdown(mut self) -> Option<D> {
        for command in [Command::TierShutdown, Command::Shutdown] {
            if let Err(err) = self.current.push(command) {
                log::error!("{err}");
            }
        }
        if let Err(err) = self.flush().and_then(|()| self.backend.wait_for_idle()) {
            log::error!("{err}");
        }
        self.backend.stop().map(CommandProcessor::into_device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        Payload, Primitive, RenderState, RenderStream, ScreenRect, TextureCreate, TextureFlags,
        TextureFormat, TextureUpdate, Vertex,
    };
    use crate::config::MemorySettings;
    use crate::driver::{DisplayMode, ProgramKind, RecordingDriver};

    const LOADER: ApiVersion = ApiVersion::new(4, 6, 0);

    fn config(version: ApiVersion) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.set_requested_version(version);
        config
    }

    fn start(
        driver: RecordingDriver,
        config: EngineConfig,
        settings: &mut MemorySettings,
    ) -> Result<Session<RecordingDriver>, StartFailure<RecordingDriver>> {
        Session::start_with_blocklist(driver, config, LOADER, settings, Blocklist::empty())
    }

    // ── start-up ──

    #[test]
    fn core_session_starts_idle() {
        let mut settings = MemorySettings::new();
        let session = start(
            RecordingDriver::with_version("4.6.0"),
            config(ApiVersion::new(3, 3, 0)),
            &mut settings,
        )
        .expect("session");
        assert!(session.is_idle());
        assert_eq!(session.tier(), TierKind::Core);
        assert!(session.capabilities().shaders);
        assert_eq!(session.driver_strings().version, "4.6.0");
        let driver = session.shutdown().expect("device back");
        assert!(!driver.current);
        assert!(driver.programs.is_empty());
    }

    #[test]
    fn loader_below_request_fails_before_spawning() {
        let mut settings = MemorySettings::new();
        let failure = Session::start_with_blocklist(
            RecordingDriver::with_version("4.6.0"),
            config(ApiVersion::new(4, 0, 0)),
            ApiVersion::new(3, 3, 0),
            &mut settings,
            Blocklist::empty(),
        )
        .err()
        .expect("loader failure");
        assert_eq!(failure.error.code(), -1);
        assert_eq!(failure.config.requested_version(), ApiVersion::new(3, 3, 0));
        assert!(failure.device.is_some());
        assert_eq!(settings.load().map(|c| c.requested_version()), Some(ApiVersion::new(3, 3, 0)));
    }

    #[test]
    fn failing_core_tier_downgrades_and_persists() {
        let mut driver = RecordingDriver::with_version("4.6.0");
        driver.failing_programs.insert(ProgramKind::SpriteMultiple);
        let mut settings = MemorySettings::new();
        let failure = start(driver, config(ApiVersion::new(3, 3, 0)), &mut settings)
            .err()
            .expect("tier failure");

        assert_eq!(failure.error, InitError::renegotiate(ApiVersion::CORE_FALLBACK));
        assert_eq!(failure.config.requested_version(), ApiVersion::CORE_FALLBACK);
        assert_eq!(settings.load(), Some(failure.config.clone()));
        let driver = failure.device.expect("device back");
        assert_eq!(driver.draw_count(), 0);
        assert!(!driver.current);
    }

    #[test]
    fn context_below_request_renegotiates_to_context() {
        let mut settings = MemorySettings::new();
        let failure = start(
            RecordingDriver::with_version("2.1.0"),
            config(ApiVersion::new(3, 3, 0)),
            &mut settings,
        )
        .err()
        .expect("context failure");
        assert_eq!(failure.error.fallback(), Some(ApiVersion::new(2, 1, 0)));
        assert_eq!(failure.config.requested_version(), ApiVersion::new(2, 1, 0));
    }

    #[test]
    fn unchanged_config_is_not_persisted() {
        let mut settings = MemorySettings::new();
        let mut cfg = config(ApiVersion::new(1, 5, 0));
        cfg.texture_analysis_done = true;
        let session = start(RecordingDriver::with_version("1.5.0"), cfg, &mut settings)
            .expect("session");
        assert_eq!(session.tier(), TierKind::Legacy);
        assert_eq!(settings.writes(), 0);
        session.shutdown();
    }

    // ── frames ──

    #[test]
    fn texture_lifecycle_returns_memory_to_zero() {
        let mut settings = MemorySettings::new();
        let mut session = start(
            RecordingDriver::with_version("4.6.0"),
            config(ApiVersion::new(3, 3, 0)),
            &mut settings,
        )
        .expect("session");

        let buffer = session.command_buffer();
        let pixels = buffer.alloc_inline(&[255; 64 * 64 * 4]).expect("arena");
        buffer
            .push(Command::TextureCreate(TextureCreate {
                slot: 0,
                width: 64,
                height: 64,
                format: TextureFormat::Rgba,
                flags: TextureFlags::NONE,
                data: pixels,
            }))
            .expect("push");
        session.flush().expect("flush");
        session.wait_for_idle().expect("idle");
        assert!(session.texture_memory_usage() >= 64 * 64 * 4);

        let quad = session
            .command_buffer()
            .alloc_pod(&[Vertex::default(); 4])
            .expect("arena");
        let commands = [
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
                vertices: quad,
            }),
            Command::TextureDestroy { slot: 0 },
        ];
        for command in commands {
            session.push(command).expect("push");
        }
        session.flush().expect("flush");
        session.wait_for_idle().expect("idle");
        assert_eq!(session.texture_memory_usage(), 0);

        let driver = session.shutdown().expect("device back");
        assert_eq!(driver.draw_count(), 1);
        assert_eq!(driver.live_textures(), 0);
    }

    #[test]
    fn read_backs_wait_for_the_render_thread() {
        let mut driver = RecordingDriver::with_version("4.6.0");
        driver.modes = vec![
            DisplayMode {
                width: 1920,
                height: 1080,
                refresh_rate: 60,
            },
            DisplayMode {
                width: 1920,
                height: 1080,
                refresh_rate: 120,
            },
        ];
        let mut settings = MemorySettings::new();
        let mut session = start(driver, config(ApiVersion::new(3, 3, 0)), &mut settings)
            .expect("session");

        let shot = session.screenshot().expect("screenshot");
        assert_eq!((shot.width, shot.height), (640, 480));
        assert_eq!(session.video_modes(0).len(), 1);
        assert!(session.set_vsync(1));
        session.shutdown();
    }

    #[test]
    fn buffers_alternate() {
        let mut settings = MemorySettings::new();
        let mut session = start(
            RecordingDriver::with_version("4.6.0"),
            config(ApiVersion::new(3, 3, 0)),
            &mut settings,
        )
        .expect("session");
        for _ in 0..4 {
            session.push(Command::Clear { color: [0.0; 4] }).expect("push");
            session.push(Command::Swap { finish: false }).expect("push");
            session.flush().expect("flush");
        }
        session.wait_for_idle().expect("idle");
        let driver = session.shutdown().expect("device back");
        assert_eq!(driver.swaps, 4);
        assert_eq!(driver.clears, 4);
    }
}
