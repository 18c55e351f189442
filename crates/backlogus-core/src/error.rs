//! Error types for BackLogus.

use std::fmt;

use thiserror::Error;

/// Result type alias using BackLogus's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Transactional step of a backup import, attached to [`Error::ImportFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStep {
    Begin,
    Wipe,
    RestoreProfile,
    RestoreCredentials,
    RestoreCatalog,
    RestoreLibrary,
    Commit,
    Timeout,
}

impl ImportStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStep::Begin => "begin",
            ImportStep::Wipe => "wipe",
            ImportStep::RestoreProfile => "restore_profile",
            ImportStep::RestoreCredentials => "restore_credentials",
            ImportStep::RestoreCatalog => "restore_catalog",
            ImportStep::RestoreLibrary => "restore_library",
            ImportStep::Commit => "commit",
            ImportStep::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ImportStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for BackLogus operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The upload is not a readable archive container
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    /// The archive container is readable but a required document is missing or undecodable
    #[error("Corrupt archive ({path}): {reason}")]
    CorruptArchive { path: String, reason: String },

    /// The archive decoded but cannot be imported (e.g. incompatible version)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transactional restore failed and was rolled back
    #[error("Import failed during {step}: {source}")]
    ImportFailed {
        step: ImportStep,
        #[source]
        source: Box<Error>,
    },

    /// Image cache restore failed (non-fatal, logged only)
    #[error("Image restore warning: {0}")]
    ImageRestore(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an error raised inside the restore transaction.
    pub fn import_failed(step: ImportStep, source: impl Into<Error>) -> Self {
        Error::ImportFailed {
            step,
            source: Box::new(source.into()),
        }
    }

    pub fn corrupt(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::CorruptArchive {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error is caused by the uploaded archive rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidFormat(_)
                | Error::CorruptArchive { .. }
                | Error::Validation(_)
                | Error::InvalidInput(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
