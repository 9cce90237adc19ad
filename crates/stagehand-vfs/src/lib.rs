//! Stagehand Virtual File System (VFS).
//!
//! One handle abstraction spans on-disk directories and package archives.
//! On top of it sit the glob engine used to select package assets, the typed
//! reader registry, and the event primitives that drive cache invalidation.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Archive-backed, immutable handles.
pub mod archive;
/// Per-file typed caches.
pub mod cache;
/// Disk-backed handles with explicit refresh.
pub mod disk;
/// Virtual filesystem error types.
pub mod error;
/// Multicast and one-shot events.
pub mod event;
/// Glob compilation and matching.
pub mod glob;
/// The handle abstraction shared by all backends.
pub mod handle;
/// VFS path type.
pub mod path;
/// Typed file readers.
pub mod reader;

pub use archive::{ArchiveDirectory, ArchiveFile};
pub use cache::TypedCache;
pub use disk::{DiskDirectory, DiskFile};
pub use error::{VfsError, VfsResult};
pub use event::{Event, EventError, OneShot};
pub use glob::{Glob, GlobFactory, GlobOptions};
pub use handle::{Directory, File, Handle, HandleEvent, HandleEvents, Node, lookup, root_of};
pub use path::VfsPath;
pub use reader::{JsonArray, JsonObject, Lines, ReaderRegistry};

use std::path::Path;
use std::sync::Arc;

/// Archive file extension recognised by [`open_root`].
pub const ARCHIVE_EXTENSION: &str = "shpkg";

/// Open `path` as a VFS tree: a directory becomes a disk tree, a `.shpkg`
/// file an archive tree.
///
/// # Errors
///
/// Returns `VfsError::NotFound` if `path` is neither a directory nor an
/// archive, or the backend's own error if opening fails.
pub fn open_root(path: &Path) -> VfsResult<Arc<dyn Directory>> {
    if path.is_dir() {
        let dir = DiskDirectory::open(path)?;
        return Ok(dir as Arc<dyn Directory>);
    }
    if path.is_file() && path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION) {
        let dir = ArchiveDirectory::open(path)?;
        return Ok(dir as Arc<dyn Directory>);
    }
    Err(VfsError::NotFound(path.display().to_string()))
}
