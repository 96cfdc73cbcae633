use super::ApiVersion;

/// Options recognised by the engine.
///
/// Passed by value into the session and copied into the render thread. Values
/// that the engine changes during negotiation (downgraded version, blocklist
/// state, self-test result) are written back and persisted through a
/// [`SettingsStore`](super::SettingsStore).
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub gl_major: u32,
    pub gl_minor: u32,
    pub gl_patch: u32,

    /// Allocate every stream buffer at full size up front and write into it,
    /// instead of reallocating on each upload.
    pub preinit_stream_buffer: bool,

    /// Texture LOD bias in thousandths.
    pub texture_lod_bias: i32,

    /// Spread textures over all units and track what each unit holds.
    pub texture_unit_optimization: bool,

    /// Route driver debug output to the log.
    pub debug_gfx: bool,

    /// Set while the current driver is on the blocklist.
    pub driver_is_blocked: bool,

    /// The tile-map self-test already passed on this machine.
    pub texture_analysis_done: bool,

    /// Maximum number of records per command buffer.
    pub command_buffer_capacity: usize,

    /// Inline payload arena size per command buffer, in bytes.
    pub command_arena_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gl_major: 3,
            gl_minor: 0,
            gl_patch: 0,
            preinit_stream_buffer: false,
            texture_lod_bias: -500,
            texture_unit_optimization: false,
            debug_gfx: false,
            driver_is_blocked: false,
            texture_analysis_done: false,
            command_buffer_capacity: 16 * 1024,
            command_arena_capacity: 2 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    /// The requested API version.
    pub fn requested_version(&self) -> ApiVersion {
        ApiVersion::new(self.gl_major, self.gl_minor, self.gl_patch)
    }

    pub fn set_requested_version(&mut self, version: ApiVersion) {
        self.gl_major = version.major;
        self.gl_minor = version.minor;
        self.gl_patch = version.patch;
    }

    /// Normalises the requested version to one the engine knows how to serve.
    pub fn clamp_version(&mut self) {
        self.gl_major = self.gl_major.clamp(1, 4);

        match self.gl_major {
            1 => {
                self.gl_minor = self.gl_minor.clamp(1, 5);
                self.gl_patch = if self.gl_minor == 2 {
                    self.gl_patch.min(1)
                } else {
                    0
                };
            }
            2 => {
                self.gl_minor = self.gl_minor.min(1);
                self.gl_patch = 0;
            }
            3 => {
                self.gl_minor = if self.gl_minor >= 3 { 3 } else { 0 };
                self.gl_patch = 0;
            }
            _ => {}
        }
    }

    /// LOD bias as the float the driver expects, or `None` when unset.
    pub fn lod_bias(&self) -> Option<f32> {
        (self.texture_lod_bias != 0).then(|| self.texture_lod_bias as f32 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clamped(major: u32, minor: u32, patch: u32) -> ApiVersion {
        let mut cfg = EngineConfig::default();
        cfg.set_requested_version(ApiVersion::new(major, minor, patch));
        cfg.clamp_version();
        cfg.requested_version()
    }

    // ── defaults ──────────────────────────────────────────────────────────

    #[test]
    fn default_requests_three_zero() {
        assert_eq!(
            EngineConfig::default().requested_version(),
            ApiVersion::new(3, 0, 0)
        );
    }

    #[test]
    fn lod_bias_in_thousandths() {
        let mut cfg = EngineConfig::default();
        cfg.texture_lod_bias = -500;
        assert_eq!(cfg.lod_bias(), Some(-0.5));
        cfg.texture_lod_bias = 0;
        assert_eq!(cfg.lod_bias(), None);
    }

    // ── clamp_version ─────────────────────────────────────────────────────

    #[test]
    fn clamp_major_range() {
        assert_eq!(clamped(0, 0, 0), ApiVersion::new(1, 1, 0));
        assert_eq!(clamped(9, 2, 1), ApiVersion::new(4, 2, 1));
    }

    #[test]
    fn clamp_one_x() {
        assert_eq!(clamped(1, 9, 3), ApiVersion::new(1, 5, 0));
        assert_eq!(clamped(1, 2, 3), ApiVersion::new(1, 2, 1));
        assert_eq!(clamped(1, 3, 1), ApiVersion::new(1, 3, 0));
    }

    #[test]
    fn clamp_two_x() {
        assert_eq!(clamped(2, 5, 2), ApiVersion::new(2, 1, 0));
        assert_eq!(clamped(2, 0, 1), ApiVersion::new(2, 0, 0));
    }

    #[test]
    fn clamp_three_x_snaps_to_zero_or_three() {
        assert_eq!(clamped(3, 1, 0), ApiVersion::new(3, 0, 0));
        assert_eq!(clamped(3, 2, 4), ApiVersion::new(3, 0, 0));
        assert_eq!(clamped(3, 3, 0), ApiVersion::new(3, 3, 0));
        assert_eq!(clamped(3, 7, 0), ApiVersion::new(3, 3, 0));
    }
}
