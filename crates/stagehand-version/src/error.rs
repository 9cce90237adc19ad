//! Version check error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from version lookups and the version cache.
#[derive(Debug, Error)]
pub enum VersionError {
    /// Reading or writing a cache file failed.
    #[error("Version cache error at {path}: {message}")]
    Cache {
        /// Cache file path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A domain name cannot be used as a cache file name.
    #[error("Invalid version domain '{0}'")]
    InvalidDomain(String),

    /// A lookup path is not valid for its domain.
    #[error("Invalid path '{path}' for domain {domain}")]
    InvalidPath {
        /// Version domain.
        domain: String,
        /// The rejected path.
        path: String,
    },

    /// The HTTP request could not be completed.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote service answered with an error status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The remote service returned something that is not a version.
    #[error("Invalid version '{value}': {message}")]
    InvalidVersion {
        /// The raw value.
        value: String,
        /// Parser message.
        message: String,
    },
}

/// Result type for version operations.
pub type VersionResult<T> = Result<T, VersionError>;
