//! Disk-backed handles.
//!
//! The tree is scanned eagerly when opened. Afterwards it only changes through
//! an explicit [`DiskDirectory::refresh`], which diffs the disk against the
//! cached children and fires `Updated`/`Deleted` only for real changes.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::cache::TypedCache;
use crate::handle::{Directory, File, Handle, HandleEvents, Node};
use crate::path::VfsPath;
use crate::{VfsError, VfsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    File(FileStamp),
}

#[derive(Clone)]
enum DiskNode {
    Directory(Arc<DiskDirectory>),
    File(Arc<DiskFile>),
}

impl DiskNode {
    fn to_handle(&self) -> Handle {
        match self {
            Self::Directory(d) => Handle::Directory(Arc::clone(d) as Arc<dyn Directory>),
            Self::File(f) => Handle::File(Arc::clone(f) as Arc<dyn File>),
        }
    }

    fn mark_deleted(&self) {
        match self {
            Self::Directory(d) => d.mark_deleted(),
            Self::File(f) => f.mark_deleted(),
        }
    }
}

/// A directory on the host filesystem.
pub struct DiskDirectory {
    path: VfsPath,
    physical: PathBuf,
    parent: Option<Weak<DiskDirectory>>,
    this: Weak<DiskDirectory>,
    children: RwLock<BTreeMap<String, DiskNode>>,
    alive: AtomicBool,
    events: HandleEvents,
}

impl DiskDirectory {
    /// Open `root` as the root of a new VFS tree and scan it.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a readable directory.
    pub fn open(root: impl Into<PathBuf>) -> VfsResult<Arc<Self>> {
        let physical = root.into();
        let meta = std::fs::metadata(&physical).map_err(|e| VfsError::io(&physical, e))?;
        if !meta.is_dir() {
            return Err(VfsError::NotFound(format!(
                "{} is not a directory",
                physical.display()
            )));
        }

        let dir = Self::create(VfsPath::root(), physical, None);
        dir.scan()?;
        debug!(path = %dir.physical.display(), "Opened disk directory");
        Ok(dir)
    }

    fn create(path: VfsPath, physical: PathBuf, parent: Option<Weak<Self>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            path,
            physical,
            parent,
            this: this.clone(),
            children: RwLock::new(BTreeMap::new()),
            alive: AtomicBool::new(true),
            events: HandleEvents::new(),
        })
    }

    /// Physical location of this directory.
    #[must_use]
    pub fn physical_path(&self) -> &Path {
        &self.physical
    }

    fn scan(&self) -> VfsResult<()> {
        let entries = read_entries(&self.physical)?;
        let mut created = BTreeMap::new();
        for (name, kind) in entries {
            created.insert(name.clone(), self.create_child(&name, kind)?);
        }
        *self
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner) = created;
        Ok(())
    }

    fn create_child(&self, name: &str, kind: EntryKind) -> VfsResult<DiskNode> {
        let path = self.path.join(name);
        let physical = self.physical.join(name);
        match kind {
            EntryKind::Directory => {
                let dir = Self::create(path, physical, Some(self.this.clone()));
                dir.scan()?;
                Ok(DiskNode::Directory(dir))
            },
            EntryKind::File(stamp) => Ok(DiskNode::File(Arc::new(DiskFile {
                path,
                physical,
                parent: self.this.clone(),
                stamp: Mutex::new(stamp),
                alive: AtomicBool::new(true),
                events: HandleEvents::new(),
                cache: TypedCache::new(),
            }))),
        }
    }

    /// Re-scan this directory and everything below it.
    ///
    /// Returns `true` if anything changed. Files whose length or modification
    /// time differ fire `Updated` (and drop their cached views); directories
    /// whose child set differs fire `Updated`; vanished handles fire `Deleted`.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::Deleted` if this directory was already deleted, or an
    /// IO error if the directory cannot be read.
    pub fn refresh(&self) -> VfsResult<bool> {
        if !self.is_alive() {
            return Err(VfsError::Deleted(self.path.to_string()));
        }

        let on_disk = match read_entries(&self.physical) {
            Ok(entries) => entries,
            Err(VfsError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                self.mark_deleted();
                return Ok(true);
            },
            Err(e) => return Err(e),
        };

        let snapshot = self
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut removed = Vec::new();
        let mut kept_files = Vec::new();
        let mut kept_dirs = Vec::new();
        for (name, node) in &snapshot {
            match (node, on_disk.get(name)) {
                (DiskNode::File(f), Some(EntryKind::File(stamp))) => {
                    kept_files.push((Arc::clone(f), *stamp));
                },
                (DiskNode::Directory(d), Some(EntryKind::Directory)) => {
                    kept_dirs.push(Arc::clone(d));
                },
                _ => removed.push((name.clone(), node.clone())),
            }
        }

        let mut added = Vec::new();
        for (name, kind) in &on_disk {
            let replaced = removed.iter().any(|(n, _)| n == name);
            if replaced || !snapshot.contains_key(name) {
                added.push((name.clone(), self.create_child(name, *kind)?));
            }
        }

        let set_changed = !removed.is_empty() || !added.is_empty();
        if set_changed {
            let mut children = self
                .children
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for (name, _) in &removed {
                children.remove(name);
            }
            for (name, node) in &added {
                children.insert(name.clone(), node.clone());
            }
        }

        let mut changed = set_changed;
        for (_, node) in removed {
            node.mark_deleted();
        }
        for (file, stamp) in kept_files {
            changed |= file.update_stamp(stamp);
        }
        for dir in kept_dirs {
            changed |= dir.refresh()?;
        }

        if set_changed {
            trace!(path = %self.path, "Directory contents changed");
            self.events.updated.emit(&self.path);
        }
        Ok(changed)
    }

    fn mark_deleted(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let children = std::mem::take(
            &mut *self
                .children
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for node in children.values() {
            node.mark_deleted();
        }
        debug!(path = %self.path, "Directory deleted");
        let _ = self.events.deleted.fire(&self.path);
    }
}

impl Node for DiskDirectory {
    fn path(&self) -> &VfsPath {
        &self.path
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn parent(&self) -> Option<Arc<dyn Directory>> {
        let parent = self.parent.as_ref()?.upgrade()?;
        Some(parent as Arc<dyn Directory>)
    }

    fn events(&self) -> Option<&HandleEvents> {
        Some(&self.events)
    }
}

impl Directory for DiskDirectory {
    fn get(&self, name: &str) -> Option<Handle> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(DiskNode::to_handle)
    }

    fn children(&self) -> Vec<Handle> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(DiskNode::to_handle)
            .collect()
    }
}

impl std::fmt::Debug for DiskDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskDirectory")
            .field("path", &self.path)
            .field("physical", &self.physical)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// A file on the host filesystem.
pub struct DiskFile {
    path: VfsPath,
    physical: PathBuf,
    parent: Weak<DiskDirectory>,
    stamp: Mutex<FileStamp>,
    alive: AtomicBool,
    events: HandleEvents,
    cache: TypedCache,
}

impl DiskFile {
    /// Physical location of this file.
    #[must_use]
    pub fn physical_path(&self) -> &Path {
        &self.physical
    }

    fn update_stamp(&self, stamp: FileStamp) -> bool {
        {
            let mut current = self.stamp.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == stamp {
                return false;
            }
            *current = stamp;
        }
        self.cache.invalidate();
        trace!(path = %self.path, "File changed");
        self.events.updated.emit(&self.path);
        true
    }

    fn mark_deleted(&self) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cache.invalidate();
        debug!(path = %self.path, "File deleted");
        let _ = self.events.deleted.fire(&self.path);
    }
}

impl Node for DiskFile {
    fn path(&self) -> &VfsPath {
        &self.path
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn parent(&self) -> Option<Arc<dyn Directory>> {
        let parent = self.parent.upgrade()?;
        Some(parent as Arc<dyn Directory>)
    }

    fn events(&self) -> Option<&HandleEvents> {
        Some(&self.events)
    }
}

impl File for DiskFile {
    fn open_read(&self) -> VfsResult<Box<dyn Read + Send>> {
        if !self.is_alive() {
            return Err(VfsError::Deleted(self.path.to_string()));
        }
        let file = std::fs::File::open(&self.physical).map_err(|e| VfsError::io(&self.physical, e))?;
        Ok(Box::new(file))
    }

    fn cache(&self) -> &TypedCache {
        &self.cache
    }
}

impl std::fmt::Debug for DiskFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskFile")
            .field("path", &self.path)
            .field("physical", &self.physical)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

/// List a physical directory. Symlinks and non-UTF-8 names are skipped.
fn read_entries(dir: &Path) -> VfsResult<BTreeMap<String, EntryKind>> {
    let mut entries = BTreeMap::new();
    for entry in std::fs::read_dir(dir).map_err(|e| VfsError::io(dir, e))? {
        let entry = entry.map_err(|e| VfsError::io(dir, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            debug!(dir = %dir.display(), "Skipping non UTF-8 entry name");
            continue;
        };
        let meta = std::fs::symlink_metadata(entry.path()).map_err(|e| VfsError::io(entry.path(), e))?;
        if meta.is_symlink() {
            debug!(path = %entry.path().display(), "Skipping symlink");
            continue;
        }
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else if meta.is_file() {
            EntryKind::File(FileStamp {
                len: meta.len(),
                modified: meta.modified().ok(),
            })
        } else {
            continue;
        };
        entries.insert(name, kind);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("a/c")).unwrap();
        std::fs::write(tmp.path().join("a/b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a/c/d.txt"), "d").unwrap();
        std::fs::write(tmp.path().join("e.txt"), "e").unwrap();
        tmp
    }

    #[test]
    fn scans_tree_eagerly() {
        let tmp = fixture();
        let root = DiskDirectory::open(tmp.path()).unwrap();
        let names: Vec<_> = root.children().iter().map(|h| h.name().to_owned()).collect();
        assert_eq!(names, vec!["a", "e.txt"]);

        let a = root.get("a").unwrap();
        let a = a.as_directory().unwrap();
        assert_eq!(a.path().as_str(), "/a");
        assert_eq!(a.parent().unwrap().path(), &VfsPath::root());
        let d = a.get("c").unwrap();
        assert!(d.as_directory().unwrap().get("d.txt").is_some());
    }

    #[test]
    fn refresh_without_changes_fires_nothing() {
        let tmp = fixture();
        let root = DiskDirectory::open(tmp.path()).unwrap();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        root.events.updated.subscribe(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!root.refresh().unwrap());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn refresh_reports_changes_and_deletions() {
        let tmp = fixture();
        let root = DiskDirectory::open(tmp.path()).unwrap();
        let e = root.get("e.txt").unwrap();
        let e_file = Arc::clone(e.as_file().unwrap());
        e_file.cache().insert(Arc::new(String::from("e")));

        let updates = Arc::new(AtomicUsize::new(0));
        let u = Arc::clone(&updates);
        e.events().unwrap().updated.subscribe(move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        });

        std::fs::write(tmp.path().join("e.txt"), "changed contents").unwrap();
        assert!(root.refresh().unwrap());
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert!(e_file.cache().is_empty());

        let b = root.get("a").unwrap().as_directory().unwrap().get("b.txt").unwrap();
        let deleted = Arc::new(AtomicBool::new(false));
        let d = Arc::clone(&deleted);
        b.events()
            .unwrap()
            .deleted
            .subscribe(move |_| d.store(true, Ordering::SeqCst))
            .unwrap();

        std::fs::remove_file(tmp.path().join("a/b.txt")).unwrap();
        std::fs::write(tmp.path().join("new.txt"), "n").unwrap();
        assert!(root.refresh().unwrap());
        assert!(deleted.load(Ordering::SeqCst));
        assert!(!b.is_alive());
        assert!(root.get("new.txt").is_some());
        assert!(b.as_file().unwrap().open_read().is_err());
    }
}
