//! Engine configuration.
//!
//! `EngineConfig` is an explicit value handed to the session at start-up and
//! threaded down to the active tier. Nothing in the engine reads ambient global
//! state; persisted options go through a `SettingsStore`.

mod engine;
mod settings;
mod version;

pub use engine::EngineConfig;
pub use settings::{MemorySettings, SettingsStore};
pub use version::ApiVersion;
