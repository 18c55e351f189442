//! # backlogus-core
//!
//! Core types, traits, and the backup archive format for BackLogus.
//!
//! This crate has no storage or network dependencies of its own; the
//! database layer and HTTP server build on the types defined here.

pub mod backup;
pub mod error;
pub mod file_safety;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use backup::{
    check_archive_compatibility, read_archive, write_archive, BackupManifest, CachedImage,
    CompatibilityResult, DatabaseDump, DecodedArchive, ExportBundle, ImportSummary, UserSnapshot,
    CURRENT_ARCHIVE_VERSION,
};
pub use error::{Error, ImportStep, Result};
pub use file_safety::{filename_for_url, is_image_filename, sanitize_image_filename};
pub use models::*;
pub use traits::*;
