//! Context negotiation.
//!
//! Decides, from the requested version and what the driver reports, which
//! tier serves the session and what it may use. Every failure is a
//! non-fatal [`InitError`]; the caller retries start-up with the version the
//! error names.

mod blocklist;
mod capabilities;
mod error;

pub use blocklist::{Blocklist, BlocklistEntry, DriverBuild};
pub use capabilities::{ARB_TEXTURE_NPOT, Capabilities, EXT_TEXTURE_ARRAY};
pub use error::InitError;

use crate::config::{ApiVersion, EngineConfig};
use crate::driver::{DriverInfo, DriverStrings};

/// Which tier implementation serves a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
    Legacy,
    Emulated,
    Core,
}

impl TierKind {
    pub fn for_version(version: ApiVersion) -> Self {
        if version.major < 2 {
            TierKind::Legacy
        } else if version.is_core() {
            TierKind::Core
        } else {
            TierKind::Emulated
        }
    }

    /// Version to retry with when this tier fails its own initialisation.
    pub fn init_fallback(self) -> ApiVersion {
        match self {
            TierKind::Core => ApiVersion::CORE_FALLBACK,
            TierKind::Legacy | TierKind::Emulated => ApiVersion::LEGACY_FALLBACK,
        }
    }
}

/// Result of the platform `Init` record.
#[derive(Debug, Clone)]
pub struct InitReport {
    /// Config with the blocklist flag updated.
    pub config: EngineConfig,
    /// Version the context actually provides, or the one to retry with.
    pub context: ApiVersion,
    pub capabilities: Capabilities,
    pub tier: TierKind,
    pub driver: DriverStrings,
    pub result: Result<(), InitError>,
}

/// Result of the tier `TierInit` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierInitReport {
    pub result: Result<(), InitError>,
    /// Set once the tile-map self-test has passed on this machine.
    pub texture_analysis_done: bool,
}

impl TierInitReport {
    pub fn ok(texture_analysis_done: bool) -> Self {
        Self {
            result: Ok(()),
            texture_analysis_done,
        }
    }

    pub fn failed(fallback: ApiVersion, texture_analysis_done: bool) -> Self {
        Self {
            result: Err(InitError::renegotiate(fallback)),
            texture_analysis_done,
        }
    }
}

/// Producer-side check, before any thread is started.
pub fn check_loader(requested: ApiVersion, loader: ApiVersion) -> Result<(), InitError> {
    if requested.is_supported_by(loader) {
        Ok(())
    } else {
        Err(InitError::VersionUnsupportedByLoader { loader })
    }
}

/// Negotiates the session from the driver's report.
pub fn negotiate(
    config: &EngineConfig,
    info: &DriverInfo,
    loader: ApiVersion,
    blocklist: &Blocklist,
) -> InitReport {
    let mut config = config.clone();
    let requested = config.requested_version();
    let mut context = ApiVersion::parse(&info.strings.version);
    let mut result = Ok(());

    log::info!("vendor: {}", info.strings.vendor);
    log::info!("version: {}", info.strings.version);
    log::info!("renderer: {}", info.strings.renderer);

    match blocklist.find(&info.strings) {
        Some(entry) if requested == ApiVersion::DEFAULT => {
            if !config.driver_is_blocked {
                log::warn!("driver is blocklisted, falling back to {}", entry.fallback);
                context = entry.fallback;
                result = Err(InitError::Renegotiate {
                    fallback: entry.fallback,
                    advisory: Some(entry.advisory.clone()),
                });
                config.driver_is_blocked = true;
            }
        }
        Some(_) => {}
        None if config.driver_is_blocked => {
            log::info!("driver no longer blocklisted, restoring {}", ApiVersion::DEFAULT);
            context = ApiVersion::DEFAULT;
            result = Err(InitError::renegotiate(context));
            config.driver_is_blocked = false;
        }
        None => {}
    }

    if result.is_ok() && context < requested {
        log::warn!("context provides {context}, {requested} was requested");
        result = Err(InitError::renegotiate(context));
    }

    let mut capabilities = Capabilities::default();
    if result.is_ok() {
        let (caps, fallback) = Capabilities::derive(requested, info, loader);
        capabilities = caps;
        if let Some(fallback) = fallback {
            log::warn!("driver lacks layered or NPOT textures, falling back to {fallback}");
            context = fallback;
            result = Err(InitError::renegotiate(fallback));
        }
    }

    let tier = TierKind::for_version(requested);
    if result.is_ok() {
        log::info!("context {context}, serving {requested} with the {tier:?} tier");
    }

    InitReport {
        config,
        context,
        capabilities,
        tier,
        driver: info.strings.clone(),
        result,
    }
}
