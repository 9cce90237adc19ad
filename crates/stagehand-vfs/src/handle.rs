//! Handle abstraction shared by every backend.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::cache::TypedCache;
use crate::event::{Event, OneShot};
use crate::path::VfsPath;
use crate::{VfsError, VfsResult};

/// What changed about a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleEvent {
    /// Content (files) or child set (directories) changed.
    Updated,
    /// The handle no longer exists in its backing store.
    Deleted,
}

/// Change notifications for handles whose backend can change.
#[derive(Debug)]
pub struct HandleEvents {
    /// Fired on every observed change.
    pub updated: Event<VfsPath>,
    /// Fired once when the handle disappears.
    pub deleted: OneShot<VfsPath>,
}

impl HandleEvents {
    pub(crate) fn new() -> Self {
        Self {
            updated: Event::new(),
            deleted: OneShot::new("handle deleted"),
        }
    }
}

/// Common surface of directories and files.
pub trait Node: Send + Sync {
    /// Absolute VFS path.
    fn path(&self) -> &VfsPath;

    /// Whether the handle still exists in its backend.
    fn is_alive(&self) -> bool;

    /// The containing directory, or `None` at the root.
    fn parent(&self) -> Option<Arc<dyn Directory>>;

    /// Change notifications. `None` for immutable backends.
    fn events(&self) -> Option<&HandleEvents> {
        None
    }

    /// Final path segment.
    fn name(&self) -> &str {
        self.path().name()
    }
}

/// An enumerable directory.
pub trait Directory: Node {
    /// Look up a direct child by name.
    fn get(&self, name: &str) -> Option<Handle>;

    /// All direct children, ordered by name.
    fn children(&self) -> Vec<Handle>;
}

/// A readable file.
pub trait File: Node {
    /// Open a fresh byte stream over the file's contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the file was deleted.
    fn open_read(&self) -> VfsResult<Box<dyn Read + Send>>;

    /// Typed views cached on this handle.
    fn cache(&self) -> &TypedCache;

    /// Read the whole file into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened or read.
    fn read_all(&self) -> VfsResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_read()?
            .read_to_end(&mut buf)
            .map_err(|e| VfsError::io(self.path().as_str(), e))?;
        Ok(buf)
    }
}

/// A directory or a file.
#[derive(Clone)]
pub enum Handle {
    /// A directory handle.
    Directory(Arc<dyn Directory>),
    /// A file handle.
    File(Arc<dyn File>),
}

impl Handle {
    /// Absolute VFS path.
    #[must_use]
    pub fn path(&self) -> &VfsPath {
        match self {
            Self::Directory(d) => d.path(),
            Self::File(f) => f.path(),
        }
    }

    /// Final path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path().name()
    }

    /// Whether this is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    /// Whether the handle still exists in its backend.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        match self {
            Self::Directory(d) => d.is_alive(),
            Self::File(f) => f.is_alive(),
        }
    }

    /// The containing directory, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<dyn Directory>> {
        match self {
            Self::Directory(d) => d.parent(),
            Self::File(f) => f.parent(),
        }
    }

    /// Change notifications, if the backend supports them.
    #[must_use]
    pub fn events(&self) -> Option<&HandleEvents> {
        match self {
            Self::Directory(d) => d.events(),
            Self::File(f) => f.events(),
        }
    }

    /// The directory behind this handle, if it is one.
    #[must_use]
    pub fn as_directory(&self) -> Option<&Arc<dyn Directory>> {
        match self {
            Self::Directory(d) => Some(d),
            Self::File(_) => None,
        }
    }

    /// The file behind this handle, if it is one.
    #[must_use]
    pub fn as_file(&self) -> Option<&Arc<dyn File>> {
        match self {
            Self::Directory(_) => None,
            Self::File(f) => Some(f),
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(d) => write!(f, "Directory({})", d.path()),
            Self::File(file) => write!(f, "File({})", file.path()),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.path(), f)
    }
}

/// Walk up from `dir` to the root of its tree.
#[must_use]
pub fn root_of(dir: &Arc<dyn Directory>) -> Arc<dyn Directory> {
    let mut current = Arc::clone(dir);
    while let Some(parent) = current.parent() {
        current = parent;
    }
    current
}

/// Resolve a relative `/`-separated path below `dir`.
///
/// # Errors
///
/// Returns `VfsError::PathEscape` if the path walks above `dir`'s tree root,
/// or `VfsError::NotFound` if a segment does not exist.
pub fn lookup(dir: &Arc<dyn Directory>, relative: &str) -> VfsResult<Handle> {
    let target = dir.path().resolve(relative)?;
    let mut current = Handle::Directory(root_of(dir));
    for segment in target.segments() {
        let next = current
            .as_directory()
            .and_then(|d| d.get(segment))
            .ok_or_else(|| VfsError::NotFound(target.to_string()))?;
        current = next;
    }
    Ok(current)
}
