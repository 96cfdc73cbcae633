use std::fmt;

use crate::config::ApiVersion;

/// Non-fatal outcome of context negotiation.
///
/// None of these abort the process. The caller reacts by retrying start-up,
/// usually with the version carried by the error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// The loader cannot provide the requested version at all.
    VersionUnsupportedByLoader { loader: ApiVersion },
    /// The context or tier cannot serve the request; retry with `fallback`.
    Renegotiate {
        fallback: ApiVersion,
        advisory: Option<String>,
    },
    /// The render thread could not be started or is gone.
    ProcessorUnavailable,
}

impl InitError {
    pub fn renegotiate(fallback: ApiVersion) -> Self {
        InitError::Renegotiate {
            fallback,
            advisory: None,
        }
    }

    /// Numeric code used by hosts that persist or compare results.
    pub fn code(&self) -> i32 {
        match self {
            InitError::VersionUnsupportedByLoader { .. } => -1,
            InitError::Renegotiate { .. } => -2,
            InitError::ProcessorUnavailable => -3,
        }
    }

    /// Version to retry with, if any.
    pub fn fallback(&self) -> Option<ApiVersion> {
        match self {
            InitError::VersionUnsupportedByLoader { loader } => Some(*loader),
            InitError::Renegotiate { fallback, .. } => Some(*fallback),
            InitError::ProcessorUnavailable => None,
        }
    }

    /// Driver advisory to show to the user.
    pub fn advisory(&self) -> Option<&str> {
        match self {
            InitError::Renegotiate { advisory, .. } => advisory.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::VersionUnsupportedByLoader { loader } => {
                write!(f, "requested version not supported, loader provides {loader}")
            }
            InitError::Renegotiate {
                fallback,
                advisory: Some(advisory),
            } => write!(f, "renegotiate with {fallback}: {advisory}"),
            InitError::Renegotiate { fallback, .. } => write!(f, "renegotiate with {fallback}"),
            InitError::ProcessorUnavailable => f.write_str("render thread unavailable"),
        }
    }
}

impl std::error::Error for InitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_legacy_values() {
        let loader = ApiVersion::new(2, 1, 0);
        assert_eq!(InitError::VersionUnsupportedByLoader { loader }.code(), -1);
        assert_eq!(InitError::renegotiate(ApiVersion::LEGACY_FALLBACK).code(), -2);
        assert_eq!(InitError::ProcessorUnavailable.code(), -3);
    }

    #[test]
    fn display_includes_advisory() {
        let err = InitError::Renegotiate {
            fallback: ApiVersion::new(2, 0, 0),
            advisory: Some("update your driver".to_string()),
        };
        assert_eq!(err.to_string(), "renegotiate with 2.0.0: update your driver");
        assert_eq!(err.advisory(), Some("update your driver"));
        assert_eq!(err.fallback(), Some(ApiVersion::new(2, 0, 0)));
    }
}
