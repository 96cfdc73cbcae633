use std::sync::Arc;

use anyhow::{Context, Result};
use winit::window::Window;

use super::surface;
use super::{GpuInit, SurfaceErrorAction};

/// Swapchain bound to a window.
struct PresentSurface {
    surface: wgpu::Surface<'static>,
    caps: wgpu::SurfaceCapabilities,
    config: wgpu::SurfaceConfiguration,
}

/// Owns wgpu core objects and, when windowed, the surface configuration.
///
/// Without a window the device renders into its offscreen target only;
/// presenting is then a no-op.
pub struct Gpu {
    _instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: Option<PresentSurface>,
    vsync_mode: wgpu::PresentMode,
    size: (u32, u32),
}

impl Gpu {
    /// Creates the device, bound to `window` when given.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: Option<Arc<Window>>, size: (u32, u32), init: GpuInit) -> Result<Self> {
        let size = match &window {
            Some(window) => {
                let inner = window.inner_size();
                (inner.width, inner.height)
            }
            None => size,
        };
        anyhow::ensure!(size.0 > 0 && size.1 > 0, "drawable has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let surface = window
            .map(|window| instance.create_surface(window))
            .transpose()
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: init.power_preference,
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("kiln-engine device"),
                required_features: wgpu::Features::empty(),
                required_limits: init.limits.resolve(&adapter.limits()),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let surface = match surface {
            Some(surface) => {
                let caps = surface.get_capabilities(&adapter);
                let format = surface::choose_surface_format(&caps, init.srgb_surface)
                    .context("no supported surface formats")?;
                let config = wgpu::SurfaceConfiguration {
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    format,
                    width: size.0,
                    height: size.1,
                    present_mode: surface::choose_present_mode(&caps, 1, init.vsync_mode)
                        .unwrap_or(wgpu::PresentMode::Fifo),
                    alpha_mode: surface::choose_alpha_mode(&caps, init.alpha_mode),
                    view_formats: vec![],
                    desired_maximum_frame_latency: init.frame_latency,
                };
                surface.configure(&device, &config);
                Some(PresentSurface {
                    surface,
                    caps,
                    config,
                })
            }
            None => None,
        };

        let info = adapter.get_info();
        log::info!(
            "wgpu adapter: {} ({:?}, {})",
            info.name,
            info.backend,
            info.driver_info
        );

        Ok(Self {
            _instance: instance,
            adapter,
            device,
            queue,
            surface,
            vsync_mode: init.vsync_mode,
            size,
        })
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn is_headless(&self) -> bool {
        self.surface.is_none()
    }

    /// Format of the presentable surface, if any.
    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.surface.as_ref().map(|s| s.config.format)
    }

    /// Reconfigures the surface after a resize. Zero sizes are remembered but
    /// not applied.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        if width == 0 || height == 0 {
            return;
        }
        if let Some(present) = &mut self.surface {
            present.config.width = width;
            present.config.height = height;
            present.surface.configure(&self.device, &present.config);
        }
    }

    /// Returns false when the surface cannot honour `interval`.
    pub fn set_swap_interval(&mut self, interval: i32) -> bool {
        let Some(present) = &mut self.surface else {
            return false;
        };
        let Some(mode) = surface::choose_present_mode(&present.caps, interval, self.vsync_mode) else {
            return false;
        };
        if present.config.present_mode != mode {
            present.config.present_mode = mode;
            present.surface.configure(&self.device, &present.config);
        }
        true
    }

    /// Acquires the next surface texture, reconfiguring on loss.
    ///
    /// `None` means the frame should be skipped.
    pub fn acquire(&mut self) -> Option<wgpu::SurfaceTexture> {
        let present = self.surface.as_mut()?;
        if present.config.width == 0 || present.config.height == 0 {
            return None;
        }
        match present.surface.get_current_texture() {
            Ok(texture) => Some(texture),
            Err(err) => {
                let reason = err.to_string();
                match surface::map_surface_error(&present.surface, &self.device, &present.config, err)
                {
                    SurfaceErrorAction::Reconfigured => log::debug!("surface reconfigured"),
                    SurfaceErrorAction::SkipFrame => log::debug!("surface frame skipped: {reason}"),
                    SurfaceErrorAction::Fatal => log::error!("surface out of memory"),
                }
                None
            }
        }
    }
}
