mod app;
mod scene;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use kiln_engine::backend::{Session, StartFailure};
use kiln_engine::command::Command;
use kiln_engine::config::{ApiVersion, EngineConfig, MemorySettings, SettingsStore};
use kiln_engine::device::{GpuInit, WgpuDevice};
use kiln_engine::driver::GpuDriver;
use kiln_engine::logging::{LoggingConfig, init_logging};

use crate::app::WindowConfig;
use crate::scene::Scene;

/// Every fallback lowers the requested version, so a few attempts suffice.
const MAX_START_ATTEMPTS: usize = 4;
const HEADLESS_SIZE: (u32, u32) = (640, 480);

#[derive(Debug, Clone, PartialEq, Default)]
struct Options {
    /// Render offscreen and optionally save the last frame as PNG.
    headless: Option<Option<PathBuf>>,
    frames: Option<u64>,
    version: Option<ApiVersion>,
    debug_gfx: bool,
    no_vsync: bool,
    /// Low-power adapter on downlevel limits.
    software: bool,
}

impl Options {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Options::default();
        let mut args = args.into_iter().peekable();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => {
                    let path = args.next_if(|next| !next.starts_with("--")).map(PathBuf::from);
                    options.headless = Some(path);
                }
                "--frames" => {
                    let value = args.next().context("--frames needs a count")?;
                    let frames = value
                        .parse()
                        .with_context(|| format!("bad frame count {value:?}"))?;
                    options.frames = Some(frames);
                }
                "--version" => {
                    let value = args.next().context("--version needs a version")?;
                    options.version = Some(ApiVersion::parse(&value));
                }
                "--debug-gfx" => options.debug_gfx = true,
                "--no-vsync" => options.no_vsync = true,
                "--software" => options.software = true,
                other => bail!("unknown argument {other:?}"),
            }
        }
        Ok(options)
    }

    fn gpu_init(&self) -> GpuInit {
        if self.software {
            GpuInit::fallback()
        } else {
            GpuInit::default()
        }
    }

    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            debug_gfx: self.debug_gfx,
            ..EngineConfig::default()
        };
        if let Some(version) = self.version {
            config.set_requested_version(version);
        }
        config
    }
}

/// Starts a session, retrying with each fallback version the engine names.
pub(crate) fn start_session(
    mut device: WgpuDevice,
    settings: &mut MemorySettings,
) -> Result<Session<WgpuDevice>> {
    let loader = ApiVersion::parse(&device.info().strings.version);
    let mut config = settings.load().unwrap_or_default();

    for attempt in 1..=MAX_START_ATTEMPTS {
        match Session::start(device, config, loader, settings) {
            Ok(session) => return Ok(session),
            Err(StartFailure {
                error,
                config: next,
                device: Some(returned),
            }) => {
                log::warn!(
                    "start attempt {attempt} failed ({error}); retrying with {}",
                    next.requested_version()
                );
                config = next;
                device = returned;
            }
            Err(failure) => bail!("engine start failed: {failure}"),
        }
    }
    bail!("engine did not start after {MAX_START_ATTEMPTS} attempts")
}

fn run_headless(options: &Options, output: Option<PathBuf>) -> Result<()> {
    let (width, height) = HEADLESS_SIZE;
    let device = WgpuDevice::headless(width, height, options.gpu_init())?;
    let mut settings = MemorySettings::new();
    settings.store(&options.engine_config());
    let mut session = start_session(device, &mut settings)?;

    let mut scene = Scene::default();
    for _ in 0..options.frames.unwrap_or(1) {
        scene.record(session.command_buffer(), width, height)?;
        session.push(Command::Swap { finish: true })?;
        session.flush()?;
    }

    let shot = session
        .screenshot()
        .context("render thread returned no screenshot")?;
    log::info!(
        "rendered {} frames at {}x{} on {}",
        scene.frame(),
        shot.width,
        shot.height,
        session.driver_strings().renderer
    );
    if let Some(path) = output {
        image::save_buffer(&path, &shot.pixels, shot.width, shot.height, image::ColorType::Rgb8)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("saved {}", path.display());
    }

    session.shutdown();
    Ok(())
}

fn main() -> Result<()> {
    let options = Options::parse(std::env::args().skip(1))?;
    init_logging(LoggingConfig::for_engine(&options.engine_config()));

    if let Some(output) = options.headless.clone() {
        return run_headless(&options, output);
    }

    let config = WindowConfig {
        vsync: !options.no_vsync,
        ..WindowConfig::default()
    };
    app::run(config, options.gpu_init(), options.engine_config())
}
