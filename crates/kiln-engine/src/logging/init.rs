use crate::config::EngineConfig;

/// Filter used when nothing else is configured.
const BASE_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";
/// Adds engine internals and the `gfx` debug-output target.
const DEBUG_GFX_FILTER: &str = "info,kiln_engine=debug,gfx=trace,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger setup, in `env_logger` filter syntax.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    filter: &'static str,
    /// Lets `RUST_LOG` replace the built-in filter.
    pub honor_env: bool,
    pub write_style: env_logger::WriteStyle,
}

impl LoggingConfig {
    /// Picks the filter matching the engine's debug setting.
    pub fn for_engine(config: &EngineConfig) -> Self {
        Self {
            filter: if config.debug_gfx { DEBUG_GFX_FILTER } else { BASE_FILTER },
            honor_env: true,
            write_style: env_logger::WriteStyle::Auto,
        }
    }

    /// The filter that will be installed, after `RUST_LOG` if honored.
    pub fn effective_filter(&self, env: Option<String>) -> String {
        match env {
            Some(filter) if self.honor_env && !filter.trim().is_empty() => filter,
            _ => self.filter.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_engine(&EngineConfig::default())
    }
}

/// Installs the global logger. Returns `false` when one was already present.
pub fn init_logging(config: LoggingConfig) -> bool {
    let filter = config.effective_filter(std::env::var("RUST_LOG").ok());
    let installed = env_logger::Builder::new()
        .parse_filters(&filter)
        .write_style(config.write_style)
        .try_init()
        .is_ok();
    if installed {
        log::debug!("logging with filter {filter:?}");
    }
    installed
}
