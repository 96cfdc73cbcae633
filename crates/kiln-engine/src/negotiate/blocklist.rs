use std::fmt;

use crate::config::ApiVersion;
use crate::driver::DriverStrings;

/// Four-part driver build number, e.g. `26.20.100.7870`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DriverBuild(pub [u32; 4]);

impl DriverBuild {
    /// Finds the last whitespace-separated token of exactly four
    /// dot-separated numbers in a driver version string.
    ///
    /// ```
    /// use kiln_engine::negotiate::DriverBuild;
    /// assert_eq!(
    ///     DriverBuild::find_in("4.6.0 - Build 26.20.100.7870"),
    ///     Some(DriverBuild([26, 20, 100, 7870]))
    /// );
    /// ```
    pub fn find_in(version: &str) -> Option<Self> {
        version.split_whitespace().rev().find_map(Self::parse_token)
    }

    fn parse_token(token: &str) -> Option<Self> {
        let mut parts = [0u32; 4];
        let mut fields = token.split('.');
        for part in &mut parts {
            *part = fields.next()?.parse().ok()?;
        }
        fields.next().is_none().then_some(Self(parts))
    }
}

impl fmt::Display for DriverBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

/// A driver range known to misbehave with the default version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlocklistEntry {
    /// Substring of the vendor string.
    pub vendor: String,
    pub first: DriverBuild,
    pub last: DriverBuild,
    /// Version known to work on the affected drivers.
    pub fallback: ApiVersion,
    pub advisory: String,
}

impl BlocklistEntry {
    pub fn matches(&self, strings: &DriverStrings) -> bool {
        if !strings.vendor.contains(&self.vendor) {
            return false;
        }
        DriverBuild::find_in(&strings.version)
            .is_some_and(|build| (self.first..=self.last).contains(&build))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blocklist {
    entries: Vec<BlocklistEntry>,
}

impl Blocklist {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Drivers the engine knows about.
    pub fn builtin() -> Self {
        Self {
            entries: vec![BlocklistEntry {
                vendor: "Intel".to_string(),
                first: DriverBuild([26, 20, 100, 7870]),
                last: DriverBuild([26, 20, 100, 7999]),
                fallback: ApiVersion::new(2, 0, 0),
                advisory: "This Intel driver version can cause crashes, please update it to a newer version."
                    .to_string(),
            }],
        }
    }

    pub fn with_entry(mut self, entry: BlocklistEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn find(&self, strings: &DriverStrings) -> Option<&BlocklistEntry> {
        self.entries.iter().find(|entry| entry.matches(strings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(vendor: &str, version: &str) -> DriverStrings {
        DriverStrings {
            vendor: vendor.to_string(),
            renderer: String::new(),
            version: version.to_string(),
        }
    }

    #[test]
    fn build_needs_exactly_four_parts() {
        assert_eq!(DriverBuild::find_in("4.6.0 NVIDIA 535.54.03"), None);
        assert_eq!(DriverBuild::find_in("3.0 Mesa 1.2.3.4.5"), None);
        assert_eq!(
            DriverBuild::find_in("27.20.100.8280 4.6.0"),
            Some(DriverBuild([27, 20, 100, 8280]))
        );
    }

    #[test]
    fn builtin_matches_affected_intel_range() {
        let list = Blocklist::builtin();
        let hit = list.find(&strings("Intel", "4.6.0 - Build 26.20.100.7900"));
        assert_eq!(hit.map(|e| e.fallback), Some(ApiVersion::new(2, 0, 0)));

        assert!(list.find(&strings("Intel", "4.6.0 - Build 26.20.100.8000")).is_none());
        assert!(list.find(&strings("NVIDIA Corporation", "4.6.0 - Build 26.20.100.7900")).is_none());
    }

    #[test]
    fn range_is_inclusive() {
        let list = Blocklist::builtin();
        assert!(list.find(&strings("Intel", "Build 26.20.100.7870")).is_some());
        assert!(list.find(&strings("Intel", "Build 26.20.100.7999")).is_some());
    }

    #[test]
    fn empty_list_matches_nothing() {
        assert!(Blocklist::empty()
            .find(&strings("Intel", "4.6.0 - Build 26.20.100.7900"))
            .is_none());
    }
}
