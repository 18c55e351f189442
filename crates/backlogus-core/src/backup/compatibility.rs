//! Archive version compatibility checking.

use super::version::{Version, CURRENT_ARCHIVE_VERSION};
use crate::{Error, Result};

/// Result of comparing an archive's version against this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibilityResult {
    /// Same version.
    Compatible,

    /// Same major, older minor or differing patch. Importable as-is.
    SameMajor { archive_version: String },

    /// Newer minor of the same major. Unknown fields are ignored.
    NewerMinor {
        archive_version: String,
        warnings: Vec<String>,
    },

    /// Different major version or unreadable version string.
    Incompatible { reason: String },
}

impl CompatibilityResult {
    /// Convert into the import gate: incompatible archives become a validation error.
    pub fn into_result(self) -> Result<Self> {
        match self {
            CompatibilityResult::Incompatible { reason } => Err(Error::Validation(reason)),
            other => Ok(other),
        }
    }
}

/// Check whether an archive written with `archive_version` can be imported.
pub fn check_archive_compatibility(archive_version: &str) -> CompatibilityResult {
    let current = Version::current();

    let archive = match Version::parse(archive_version) {
        Ok(v) => v,
        Err(e) => {
            return CompatibilityResult::Incompatible {
                reason: format!("Unreadable archive version: {}", e),
            }
        }
    };

    if archive.major < current.major {
        return CompatibilityResult::Incompatible {
            reason: format!(
                "Archive version {} uses the legacy {}.x backup format, which cannot be imported \
                 (supported version {}). Export a new backup from a current BackLogus release",
                archive, archive.major, CURRENT_ARCHIVE_VERSION
            ),
        };
    }

    if archive.major > current.major {
        return CompatibilityResult::Incompatible {
            reason: format!(
                "Archive version {} is newer than supported version {}",
                archive, CURRENT_ARCHIVE_VERSION
            ),
        };
    }

    if archive == current {
        return CompatibilityResult::Compatible;
    }

    if archive.minor > current.minor {
        return CompatibilityResult::NewerMinor {
            archive_version: archive.to_string(),
            warnings: vec![format!(
                "Archive was created by a newer release ({}) than this server ({}); unknown fields are ignored",
                archive, CURRENT_ARCHIVE_VERSION
            )],
        };
    }

    CompatibilityResult::SameMajor {
        archive_version: archive.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_version_compatible() {
        assert_eq!(
            check_archive_compatibility(CURRENT_ARCHIVE_VERSION),
            CompatibilityResult::Compatible
        );
    }

    #[test]
    fn test_patch_difference_is_same_major() {
        let result = check_archive_compatibility("2.0.3");
        assert!(matches!(result, CompatibilityResult::SameMajor { .. }));
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_newer_minor_forward_compatible() {
        match check_archive_compatibility("2.4.0") {
            CompatibilityResult::NewerMinor {
                archive_version,
                warnings,
            } => {
                assert_eq!(archive_version, "2.4.0");
                assert!(!warnings.is_empty());
            }
            other => panic!("Expected NewerMinor, got {:?}", other),
        }
    }

    #[test]
    fn test_previous_major_names_legacy_format() {
        match check_archive_compatibility("1.0.0").into_result() {
            Err(Error::Validation(msg)) => {
                assert!(msg.contains("1.0.0"));
                assert!(msg.contains("legacy 1.x backup format"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_future_major_incompatible() {
        match check_archive_compatibility("3.0.0") {
            CompatibilityResult::Incompatible { reason } => {
                assert!(reason.contains("newer"));
                assert!(!reason.contains("legacy"));
            }
            other => panic!("Expected Incompatible, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_version_incompatible() {
        match check_archive_compatibility("latest") {
            CompatibilityResult::Incompatible { reason } => {
                assert!(reason.contains("Unreadable"))
            }
            other => panic!("Expected Incompatible, got {:?}", other),
        }
    }
}
