//! Backup archive format: bundle types, zip codec and version compatibility.

pub mod bundle;
pub mod codec;
pub mod compatibility;
pub mod version;

pub use bundle::{
    BackupManifest, CachedImage, CatalogItems, DatabaseDump, DecodedArchive, ExportBundle,
    ImportSummary, LibraryEntries, ManifestCounts, UserDataDocument, UserSnapshot,
    MAX_SAFE_JSON_INTEGER,
};
pub use codec::{read_archive, write_archive};
pub use compatibility::{check_archive_compatibility, CompatibilityResult};
pub use version::{Version, CURRENT_ARCHIVE_VERSION};
