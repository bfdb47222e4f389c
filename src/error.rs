// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for Xcer
#[derive(Error, Debug)]
pub enum Error {
    /// No configuration file in any of the searched locations
    #[error("Config file not found (searched: {0})")]
    ConfigNotFound(String),

    /// Configuration file present but unreadable or invalid
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Remote index could not be fetched
    #[error("Failed to fetch package index: {0}")]
    IndexFetchError(String),

    /// Remote index is not valid JSON or does not match the schema
    #[error("Failed to parse package index: {0}")]
    IndexParseError(String),

    /// Package (or dependency) not present in the index
    #[error("Package '{0}' not found in index")]
    UnknownPackage(String),

    /// Dependency graph contains a cycle; carries the cycle path
    #[error("Circular dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    /// Archive download failed
    #[error("Download failed: {0}")]
    DownloadError(String),

    /// Archive expected in the cache is missing
    #[error("Package '{package}' not found in cache at {}", path.display())]
    CacheMiss { package: String, path: PathBuf },

    /// A candidate file is already owned by another package
    #[error("File '{path}' from package '{candidate}' is already owned by '{owner}'")]
    ConflictError {
        path: String,
        owner: String,
        candidate: String,
    },

    /// Install root not writable
    #[error("No write permissions for '{}'", .0.display())]
    PermissionError(PathBuf),

    /// Metadata document could not be parsed or failed validation
    #[error("Malformed package metadata: {0}")]
    MalformedMetadata(String),

    /// Database record could not be written
    #[error("Failed to register package: {0}")]
    RegistrationError(String),

    /// Archive payload could not be unpacked or moved into place
    #[error("Extraction failed: {0}")]
    ExtractionError(String),

    /// I/O failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is unexpected and deserves a full diagnostic report
    /// rather than a one-line message.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

/// Result type alias using Xcer's Error type
pub type Result<T> = std::result::Result<T, Error>;
