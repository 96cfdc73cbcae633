use std::fmt;

/// A graphics API version triple (major.minor.patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ApiVersion {
    /// Default request; selects the emulated tier.
    pub const DEFAULT: Self = Self::new(3, 0, 0);

    /// Fallback after the emulated tier fails its gate.
    pub const LEGACY_FALLBACK: Self = Self::new(1, 5, 0);

    /// Fallback after the core tier fails its gate.
    pub const CORE_FALLBACK: Self = Self::new(3, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses the leading version number of a driver version string.
    ///
    /// Reads up to three `.`-separated integers. Parsing stops at the first
    /// space or any other non-digit; components that were not reached stay 0.
    /// A string that does not start with a digit yields `0.0.0`.
    ///
    /// ```
    /// use kiln_engine::config::ApiVersion;
    /// assert_eq!(ApiVersion::parse("4.6.0 NVIDIA 535.54"), ApiVersion::new(4, 6, 0));
    /// assert_eq!(ApiVersion::parse("3.3 (Core Profile) Mesa"), ApiVersion::new(3, 3, 0));
    /// ```
    pub fn parse(s: &str) -> Self {
        let mut numbers = [0u32; 3];
        let mut passed = 0;
        let mut current: Option<u32> = None;

        for ch in s.chars() {
            if passed == numbers.len() {
                break;
            }

            if let Some(digit) = ch.to_digit(10) {
                current = Some(current.unwrap_or(0).saturating_mul(10).saturating_add(digit));
                continue;
            }

            let Some(value) = current.take() else {
                break;
            };
            numbers[passed] = value;
            passed += 1;

            if ch != '.' {
                break;
            }
        }

        if let Some(value) = current {
            if passed < numbers.len() {
                numbers[passed] = value;
            }
        }

        Self::new(numbers[0], numbers[1], numbers[2])
    }

    /// Returns true if a loader exposing up to `loader` can provide this version.
    pub fn is_supported_by(self, loader: ApiVersion) -> bool {
        self <= loader
    }

    /// True for versions served by the core tier (3.3 and 4.x).
    pub fn is_core(self) -> bool {
        self.major >= 4 || (self.major == 3 && self.minor == 3)
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
