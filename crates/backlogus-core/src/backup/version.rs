//! Archive format versioning.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Archive format version written by this build.
///
/// 1.x archives carried only games and movies under `userGames`/`games` keys;
/// 2.x uses `libraryEntries`/`catalogItems` with all four media kinds.
pub const CURRENT_ARCHIVE_VERSION: &str = "2.0.0";

/// Semantic version of an archive's `metadata.version` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Parse a version string (e.g., "2.0.0").
    pub fn parse(s: &str) -> Result<Self, String> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(format!("Invalid version format: {}", s));
        }

        let component = |name: &str, raw: &str| {
            raw.parse::<u64>()
                .map_err(|_| format!("Invalid {} version: {}", name, raw))
        };

        Ok(Version {
            major: component("major", parts[0])?,
            minor: component("minor", parts[1])?,
            patch: component("patch", parts[2])?,
        })
    }

    /// The version this build writes.
    pub fn current() -> Self {
        Version {
            major: 2,
            minor: 0,
            patch: 0,
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_valid() {
        let v = Version::parse("2.3.4").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (2, 3, 4));

        let v = Version::parse(" 1.0.0 ").unwrap();
        assert_eq!(v, Version { major: 1, minor: 0, patch: 0 });
    }

    #[test]
    fn test_version_parse_invalid() {
        assert!(Version::parse("2.0").is_err());
        assert!(Version::parse("2.0.0.1").is_err());
        assert!(Version::parse("two.0.0").is_err());
        assert!(Version::parse("").is_err());
    }

    #[test]
    fn test_version_ordering() {
        let v1 = Version::parse("1.9.9").unwrap();
        let v2 = Version::parse("2.0.0").unwrap();
        let v3 = Version::parse("2.0.1").unwrap();
        let v4 = Version::parse("2.1.0").unwrap();

        assert!(v1 < v2);
        assert!(v2 < v3);
        assert!(v3 < v4);
    }

    #[test]
    fn test_current_matches_constant() {
        let parsed = Version::parse(CURRENT_ARCHIVE_VERSION).unwrap();
        assert_eq!(parsed, Version::current());
        assert_eq!(parsed.to_string(), CURRENT_ARCHIVE_VERSION);
    }
}
