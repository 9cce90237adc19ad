use std::path::PathBuf;

use thiserror::Error;

use crate::event::EventError;

/// Virtual filesystem errors.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Native IO error with the physical path that caused it.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Physical path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Missing directory or file.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The handle was deleted from its backing store.
    #[error("Handle no longer exists: {0}")]
    Deleted(String),

    /// A glob pattern could not be compiled.
    #[error("Invalid glob '{pattern}': {reason}")]
    InvalidGlob {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A glob tried to walk above the VFS root with `..`.
    #[error("Glob '{0}' escapes the VFS root")]
    GlobEscape(String),

    /// A glob started with `/` while absolute globs are disabled.
    #[error("Absolute glob '{0}' is not allowed")]
    AbsoluteGlob(String),

    /// A path attempted to traverse outside its root.
    #[error("Path resolves outside the VFS root: {0}")]
    PathEscape(String),

    /// The archive could not be read.
    #[error("Archive error in {path}: {message}")]
    Archive {
        /// Archive path (or `<memory>`).
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// The archive contains an entry that cannot be represented safely.
    #[error("Unsafe archive entry '{entry}': {reason}")]
    UnsafeArchiveEntry {
        /// Entry path as stored in the archive.
        entry: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No reader is registered for the requested type.
    #[error("No reader registered for {0}")]
    NoReader(&'static str),

    /// A reader for this type was already registered.
    #[error("A reader for {0} is already registered")]
    DuplicateReader(&'static str),

    /// A reader failed to decode a file.
    #[error("Failed to decode {path} as {target}: {message}")]
    Decode {
        /// VFS path of the file.
        path: String,
        /// Name of the target type.
        target: &'static str,
        /// Decoder message.
        message: String,
    },

    /// Subscription to a handle event failed.
    #[error(transparent)]
    Event(#[from] EventError),
}

impl VfsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type for VFS operations.
pub type VfsResult<T> = Result<T, VfsError>;
