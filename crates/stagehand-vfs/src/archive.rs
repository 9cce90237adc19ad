//! Archive-backed handles.
//!
//! A package archive is a gzip-compressed tar. The whole entry list is read
//! once when the archive is opened and frozen into an immutable tree; archive
//! handles never change, so they expose no change notifications.
//!
//! Guards against:
//! - Path traversal (`../` components) and absolute paths
//! - Links, device nodes and other non-file entries
//! - Excessive entry counts and decompressed sizes

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path};
use std::sync::{Arc, Weak};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;

use crate::cache::TypedCache;
use crate::handle::{Directory, File, Handle, Node};
use crate::path::VfsPath;
use crate::{VfsError, VfsResult};

/// Maximum number of entries allowed in a package archive.
const MAX_ENTRY_COUNT: usize = 10_000;

/// Maximum total decompressed size (256 MB).
const MAX_EXTRACTED_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Default)]
struct TreeNode {
    dirs: BTreeMap<String, TreeNode>,
    files: BTreeMap<String, Arc<[u8]>>,
}

impl TreeNode {
    /// Walk (and create) the directory chain named by `segments`.
    fn dir_mut(&mut self, segments: &[String], entry: &str) -> VfsResult<&mut TreeNode> {
        let mut node = self;
        for segment in segments {
            if node.files.contains_key(segment) {
                return Err(conflict(entry));
            }
            node = node.dirs.entry(segment.clone()).or_default();
        }
        Ok(node)
    }
}

fn conflict(entry: &str) -> VfsError {
    VfsError::UnsafeArchiveEntry {
        entry: entry.to_owned(),
        reason: "entry is both a file and a directory".into(),
    }
}

#[derive(Clone)]
enum ArchiveNode {
    Directory(Arc<ArchiveDirectory>),
    File(Arc<ArchiveFile>),
}

impl ArchiveNode {
    fn to_handle(&self) -> Handle {
        match self {
            Self::Directory(d) => Handle::Directory(Arc::clone(d) as Arc<dyn Directory>),
            Self::File(f) => Handle::File(Arc::clone(f) as Arc<dyn File>),
        }
    }
}

/// A directory inside a package archive.
pub struct ArchiveDirectory {
    path: VfsPath,
    parent: Option<Weak<ArchiveDirectory>>,
    children: BTreeMap<String, ArchiveNode>,
}

impl ArchiveDirectory {
    /// Open an archive file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid package archive.
    pub fn open(path: &Path) -> VfsResult<Arc<Self>> {
        let data = std::fs::read(path).map_err(|e| VfsError::io(path, e))?;
        let root = Self::parse(&data, &path.display().to_string())?;
        debug!(path = %path.display(), "Opened package archive");
        Ok(root)
    }

    /// Build a tree from in-memory archive bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid package archive.
    pub fn from_bytes(data: &[u8]) -> VfsResult<Arc<Self>> {
        Self::parse(data, "<memory>")
    }

    fn parse(data: &[u8], label: &str) -> VfsResult<Arc<Self>> {
        let archive_err = |message: String| VfsError::Archive {
            path: label.to_owned(),
            message,
        };

        let mut archive = Archive::new(GzDecoder::new(data));
        let mut tree = TreeNode::default();
        let mut entry_count = 0usize;
        let mut total_size: u64 = 0;

        let entries = archive
            .entries()
            .map_err(|e| archive_err(format!("failed to read archive entries: {e}")))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| archive_err(format!("failed to read archive entry: {e}")))?;

            entry_count = entry_count.saturating_add(1);
            if entry_count > MAX_ENTRY_COUNT {
                return Err(archive_err(format!(
                    "archive exceeds maximum entry count ({MAX_ENTRY_COUNT})"
                )));
            }

            let raw_path = entry
                .path()
                .map_err(|e| archive_err(format!("invalid entry path: {e}")))?
                .into_owned();
            let display = raw_path.display().to_string();
            let segments = normalize_entry_path(&raw_path, &display)?;

            match entry.header().entry_type() {
                EntryType::Directory => {
                    tree.dir_mut(&segments, &display)?;
                },
                EntryType::Regular | EntryType::Continuous => {
                    let Some((name, dirs)) = segments.split_last() else {
                        return Err(VfsError::UnsafeArchiveEntry {
                            entry: display,
                            reason: "file entry without a name".into(),
                        });
                    };

                    let size = entry.header().size().unwrap_or(0);
                    total_size = total_size.saturating_add(size);
                    if total_size > MAX_EXTRACTED_SIZE {
                        return Err(archive_err(format!(
                            "archive exceeds maximum extracted size ({MAX_EXTRACTED_SIZE} bytes)"
                        )));
                    }

                    let mut bytes = Vec::new();
                    entry
                        .read_to_end(&mut bytes)
                        .map_err(|e| archive_err(format!("failed to read {display}: {e}")))?;

                    let dir = tree.dir_mut(dirs, &display)?;
                    if dir.dirs.contains_key(name) {
                        return Err(conflict(&display));
                    }
                    dir.files.insert(name.clone(), Arc::from(bytes));
                },
                EntryType::XGlobalHeader | EntryType::XHeader => {},
                other => {
                    return Err(VfsError::UnsafeArchiveEntry {
                        entry: display,
                        reason: format!("unsupported entry type {other:?}"),
                    });
                },
            }
        }

        Ok(Self::build(VfsPath::root(), None, tree))
    }

    fn build(path: VfsPath, parent: Option<Weak<Self>>, tree: TreeNode) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let mut children = BTreeMap::new();
            for (name, sub) in tree.dirs {
                let child = Self::build(path.join(&name), Some(this.clone()), sub);
                children.insert(name, ArchiveNode::Directory(child));
            }
            for (name, data) in tree.files {
                let file = ArchiveFile {
                    path: path.join(&name),
                    parent: this.clone(),
                    data,
                    cache: TypedCache::new(),
                };
                children.insert(name, ArchiveNode::File(Arc::new(file)));
            }
            Self {
                path,
                parent,
                children,
            }
        })
    }
}

/// Split an entry path into plain segments, rejecting anything that could
/// land outside the archive root.
fn normalize_entry_path(path: &Path, display: &str) -> VfsResult<Vec<String>> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| VfsError::UnsafeArchiveEntry {
                    entry: display.to_owned(),
                    reason: "entry name is not valid UTF-8".into(),
                })?;
                segments.push(part.to_owned());
            },
            Component::ParentDir => {
                return Err(VfsError::UnsafeArchiveEntry {
                    entry: display.to_owned(),
                    reason: "path traversal".into(),
                });
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(VfsError::UnsafeArchiveEntry {
                    entry: display.to_owned(),
                    reason: "absolute path".into(),
                });
            },
        }
    }
    Ok(segments)
}

impl Node for ArchiveDirectory {
    fn path(&self) -> &VfsPath {
        &self.path
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn parent(&self) -> Option<Arc<dyn Directory>> {
        let parent = self.parent.as_ref()?.upgrade()?;
        Some(parent as Arc<dyn Directory>)
    }
}

impl Directory for ArchiveDirectory {
    fn get(&self, name: &str) -> Option<Handle> {
        self.children.get(name).map(ArchiveNode::to_handle)
    }

    fn children(&self) -> Vec<Handle> {
        self.children.values().map(ArchiveNode::to_handle).collect()
    }
}

impl std::fmt::Debug for ArchiveDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDirectory")
            .field("path", &self.path)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

/// A file inside a package archive, held in memory.
pub struct ArchiveFile {
    path: VfsPath,
    parent: Weak<ArchiveDirectory>,
    data: Arc<[u8]>,
    cache: TypedCache,
}

impl Node for ArchiveFile {
    fn path(&self) -> &VfsPath {
        &self.path
    }

    fn is_alive(&self) -> bool {
        true
    }

    fn parent(&self) -> Option<Arc<dyn Directory>> {
        let parent = self.parent.upgrade()?;
        Some(parent as Arc<dyn Directory>)
    }
}

impl File for ArchiveFile {
    fn open_read(&self) -> VfsResult<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.data))))
    }

    fn cache(&self) -> &TypedCache {
        &self.cache
    }

    fn read_all(&self) -> VfsResult<Vec<u8>> {
        Ok(self.data.to_vec())
    }
}

impl std::fmt::Debug for ArchiveFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveFile")
            .field("path", &self.path)
            .field("len", &self.data.len())
            .finish_non_exhaustive()
    }
}
