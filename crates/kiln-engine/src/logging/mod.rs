//! Logging utilities.
//!
//! This module centralizes logger initialization and the classification of
//! driver debug output. Everything goes through the standard `log` facade;
//! `env_logger` is the only backend the engine installs.

mod debug_output;
mod init;

pub use debug_output::{DebugMessage, DebugSeverity, DebugType, log_debug_message};
pub use init::{LoggingConfig, init_logging};
