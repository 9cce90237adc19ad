//! Package discovery.
//!
//! Each root is scanned depth-first. A directory with `manifest.json` at its
//! top level is one package and is not descended into. Otherwise every
//! `.shpkg` archive in the directory is a package and subdirectories are
//! scanned in turn. A candidate that fails to open is logged and skipped.

use std::path::{Path, PathBuf};

use stagehand_vfs::ARCHIVE_EXTENSION;
use tracing::{debug, info, warn};

use crate::manifest::MANIFEST_FILE_NAME;
use crate::package::Package;

/// Discover every package below `roots`, in scan order.
pub fn discover(roots: &[PathBuf]) -> Vec<Package> {
    let mut packages = Vec::new();
    for root in roots {
        if !root.is_dir() {
            warn!(path = %root.display(), "Package root is not a directory");
            continue;
        }
        info!(path = %root.display(), "Discovering packages");
        let mut candidates = Vec::new();
        collect_candidates(root, &mut candidates);
        packages.extend(candidates.iter().filter_map(|path| open_candidate(path)));
    }
    info!(count = packages.len(), "Discovered packages");
    packages
}

/// Collect package candidate paths below `dir`, sorted by name at each level.
pub fn collect_candidates(dir: &Path, out: &mut Vec<PathBuf>) {
    if dir.join(MANIFEST_FILE_NAME).is_file() {
        out.push(dir.to_path_buf());
        return;
    }

    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to scan directory");
            return;
        },
    };
    entries.sort();

    for path in entries.iter().filter(|p| is_archive(p)) {
        out.push(path.clone());
    }
    for path in entries.iter().filter(|p| p.is_dir()) {
        collect_candidates(path, out);
    }
}

fn is_archive(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

fn open_candidate(path: &Path) -> Option<Package> {
    match Package::open(path) {
        Ok(package) => {
            debug!(
                path = %path.display(),
                package = %package.guid(),
                version = %package.version(),
                "Loaded package manifest"
            );
            Some(package)
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping package");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn manifest(guid: &str) -> String {
        format!(r#"{{"guid":"{guid}","version":"1.0.0","require":"1.0.0"}}"#)
    }

    #[test]
    fn finds_directories_and_skips_broken_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        fs::create_dir_all(root.join("good/nested")).unwrap();
        fs::write(root.join("good/manifest.json"), manifest("good")).unwrap();
        // Not visited: the parent is already a package.
        fs::write(root.join("good/nested/manifest.json"), manifest("nested")).unwrap();

        fs::create_dir_all(root.join("group/inner")).unwrap();
        fs::write(root.join("group/inner/manifest.json"), manifest("inner")).unwrap();

        fs::create_dir_all(root.join("broken")).unwrap();
        fs::write(root.join("broken/manifest.json"), "{ not json").unwrap();

        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("stray.shpkg"), b"not an archive").unwrap();

        let guids: Vec<String> = discover(&[root.to_path_buf()])
            .iter()
            .map(|p| p.guid().to_owned())
            .collect();
        assert_eq!(guids, ["good", "inner"]);
    }

    #[test]
    fn missing_roots_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover(&[tmp.path().join("absent")]).is_empty());
    }
}
