use super::SurfaceErrorAction;

/// Eight-bit colour format for the blit target, falling back to whatever the
/// surface lists first.
pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    srgb: bool,
) -> Option<wgpu::TextureFormat> {
    caps.formats
        .iter()
        .copied()
        .find(|format| {
            matches!(
                format.remove_srgb_suffix(),
                wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Rgba8Unorm
            ) && format.is_srgb() == srgb
        })
        .or_else(|| caps.formats.first().copied())
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Present mode for a swap interval: 0 tears, anything else waits for vblank.
pub(crate) fn choose_present_mode(
    caps: &wgpu::SurfaceCapabilities,
    interval: i32,
    vsync_mode: wgpu::PresentMode,
) -> Option<wgpu::PresentMode> {
    let wanted: &[wgpu::PresentMode] = if interval == 0 {
        &[wgpu::PresentMode::Immediate, wgpu::PresentMode::Mailbox]
    } else {
        &[vsync_mode, wgpu::PresentMode::Fifo]
    };
    wanted.iter().copied().find(|m| caps.present_modes.contains(m))
}

/// Classifies a failed `get_current_texture`. Lost and outdated surfaces are
/// reconfigured in place unless the window is minimized.
pub(crate) fn map_surface_error(
    surface: &wgpu::Surface<'_>,
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
    err: wgpu::SurfaceError,
) -> SurfaceErrorAction {
    use wgpu::SurfaceError as E;

    if matches!(err, E::OutOfMemory) {
        return SurfaceErrorAction::Fatal;
    }
    if !matches!(err, E::Lost | E::Outdated) {
        return SurfaceErrorAction::SkipFrame;
    }
    let minimized = config.width == 0 || config.height == 0;
    if !minimized {
        surface.configure(device, config);
    }
    SurfaceErrorAction::Reconfigured
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(formats: Vec<wgpu::TextureFormat>, present_modes: Vec<wgpu::PresentMode>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes,
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    #[test]
    fn linear_format_is_preferred_by_default() {
        let c = caps(
            vec![
                wgpu::TextureFormat::Bgra8UnormSrgb,
                wgpu::TextureFormat::Bgra8Unorm,
            ],
            vec![wgpu::PresentMode::Fifo],
        );
        assert_eq!(choose_surface_format(&c, false), Some(wgpu::TextureFormat::Bgra8Unorm));
        assert_eq!(choose_surface_format(&c, true), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&caps(vec![], vec![]), false), None);
    }

    #[test]
    fn swap_interval_maps_to_present_mode() {
        let c = caps(vec![], vec![wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate]);
        assert_eq!(
            choose_present_mode(&c, 0, wgpu::PresentMode::Fifo),
            Some(wgpu::PresentMode::Immediate)
        );
        assert_eq!(
            choose_present_mode(&c, 1, wgpu::PresentMode::Fifo),
            Some(wgpu::PresentMode::Fifo)
        );
        let fifo_only = caps(vec![], vec![wgpu::PresentMode::Fifo]);
        assert_eq!(choose_present_mode(&fifo_only, 0, wgpu::PresentMode::Fifo), None);
    }

    #[test]
    fn unsupported_alpha_mode_falls_back() {
        let c = caps(vec![], vec![]);
        assert_eq!(
            choose_alpha_mode(&c, Some(wgpu::CompositeAlphaMode::PreMultiplied)),
            wgpu::CompositeAlphaMode::Opaque
        );
    }
}
