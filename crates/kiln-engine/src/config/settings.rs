use super::EngineConfig;

/// Persistence boundary for engine options.
///
/// The session stores the config after negotiation changes it (downgraded
/// version, blocklist flag, self-test result) so the next start skips work
/// that already happened.
pub trait SettingsStore: Send {
    fn load(&self) -> Option<EngineConfig>;
    fn store(&mut self, config: &EngineConfig);
}

/// In-process settings store.
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    saved: Option<EngineConfig>,
    writes: usize,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `store` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self) -> Option<EngineConfig> {
        self.saved.clone()
    }

    fn store(&mut self, config: &EngineConfig) {
        self.saved = Some(config.clone());
        self.writes += 1;
    }
}

impl<S: SettingsStore + ?Sized> SettingsStore for &mut S {
    fn load(&self) -> Option<EngineConfig> {
        (**self).load()
    }

    fn store(&mut self, config: &EngineConfig) {
        (**self).store(config)
    }
}
