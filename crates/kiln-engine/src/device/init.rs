/// Device limits to request from the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitRequest {
    /// Everything the adapter offers. The driver then reports the adapter's
    /// real texture size, array layer and 3D size limits to negotiation.
    #[default]
    Adapter,
    /// wgpu's portable defaults.
    Portable,
    /// Downlevel limits for old GL/GLES adapters.
    Downlevel,
}

impl LimitRequest {
    pub fn resolve(self, adapter: &wgpu::Limits) -> wgpu::Limits {
        match self {
            LimitRequest::Adapter => adapter.clone(),
            LimitRequest::Portable => wgpu::Limits::default(),
            LimitRequest::Downlevel => wgpu::Limits::downlevel_defaults(),
        }
    }
}

/// Options for creating a [`Gpu`](super::Gpu).
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub limits: LimitRequest,

    /// Present mode for swap interval 1; interval 0 picks an unsynced mode.
    pub vsync_mode: wgpu::PresentMode,
    /// Frames are blitted from a linear RGBA8 target, so an sRGB surface would
    /// brighten them.
    pub srgb_surface: bool,
    /// Falls back to a supported mode when unsupported.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,
    pub frame_latency: u32,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            limits: LimitRequest::default(),
            vsync_mode: wgpu::PresentMode::Fifo,
            srgb_surface: false,
            alpha_mode: None,
            frame_latency: 2,
        }
    }
}

impl GpuInit {
    /// Software adapter on portable limits, for machines without a usable GPU.
    pub fn fallback() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::LowPower,
            limits: LimitRequest::Downlevel,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_limits_pass_through() {
        let adapter = wgpu::Limits {
            max_texture_dimension_2d: 16384,
            max_texture_array_layers: 2048,
            ..wgpu::Limits::default()
        };
        let limits = LimitRequest::Adapter.resolve(&adapter);
        assert_eq!(limits.max_texture_dimension_2d, 16384);
        assert_eq!(limits.max_texture_array_layers, 2048);
        assert_eq!(
            LimitRequest::Portable.resolve(&adapter).max_texture_dimension_2d,
            wgpu::Limits::default().max_texture_dimension_2d
        );
    }

    #[test]
    fn fallback_uses_downlevel_limits() {
        let init = GpuInit::fallback();
        assert_eq!(init.limits, LimitRequest::Downlevel);
        assert!(!init.srgb_surface);
    }
}
