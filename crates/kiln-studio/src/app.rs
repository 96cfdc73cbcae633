use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use kiln_engine::backend::Session;
use kiln_engine::command::Command;
use kiln_engine::config::{EngineConfig, MemorySettings, SettingsStore};
use kiln_engine::device::{GpuInit, WgpuDevice};
use kiln_engine::driver::DisplayMode;

use crate::scene::Scene;
use crate::start_session;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "kiln studio".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            vsync: true,
        }
    }
}

/// Runs the windowed demo until the window closes.
pub fn run(config: WindowConfig, gpu_init: GpuInit, engine: EngineConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut state = AppState::new(config, gpu_init, engine);

    event_loop
        .run_app(&mut state)
        .context("winit event loop terminated with error")?;

    state.failure.map_or(Ok(()), Err)
}

struct Running {
    window: Arc<Window>,
    session: Session<WgpuDevice>,
}

struct AppState {
    config: WindowConfig,
    gpu_init: GpuInit,
    settings: MemorySettings,
    scene: Scene,
    running: Option<Running>,
    failure: Option<anyhow::Error>,
}

impl AppState {
    fn new(config: WindowConfig, gpu_init: GpuInit, engine: EngineConfig) -> Self {
        let mut settings = MemorySettings::new();
        settings.store(&engine);
        Self {
            config,
            gpu_init,
            settings,
            scene: Scene::default(),
            running: None,
            failure: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let device = WgpuDevice::windowed(
            Arc::clone(&window),
            self.gpu_init.clone(),
            display_modes(event_loop),
        )?;
        let mut session = start_session(device, &mut self.settings)?;
        if !session.set_vsync(i32::from(self.config.vsync)) {
            log::warn!("swap interval {} not supported", i32::from(self.config.vsync));
        }
        Ok(Running { window, session })
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            log::info!("stopping after {} frames", self.scene.frame());
            running.session.shutdown();
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = &mut self.running else {
            return;
        };
        let size = running.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return;
        }

        if let Err(err) = self
            .scene
            .record(running.session.command_buffer(), size.width, size.height)
        {
            log::warn!("frame dropped: {err}");
            running.session.command_buffer().reset();
            return;
        }
        if let Err(err) = running.session.push(Command::Swap { finish: false }) {
            log::warn!("{err}");
        }
        if let Err(err) = running.session.flush() {
            log::error!("{err}");
            self.failure = Some(err.into());
            self.stop();
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.running = Some(running);
            }
            Err(err) => {
                log::error!("failed to start: {err:#}");
                self.failure = Some(err);
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(running) = &mut self.running
                    && let Err(err) = running.session.push(Command::Resize {
                        width: size.width,
                        height: size.height,
                    })
                {
                    log::warn!("{err}");
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.stop();
    }
}

/// Modes of every monitor, indexed by screen.
fn display_modes(event_loop: &ActiveEventLoop) -> Vec<Vec<DisplayMode>> {
    event_loop
        .available_monitors()
        .map(|monitor| {
            monitor
                .video_modes()
                .map(|mode| DisplayMode {
                    width: mode.size().width,
                    height: mode.size().height,
                    refresh_rate: mode.refresh_rate_millihertz() / 1000,
                })
                .collect()
        })
        .collect()
}
