use std::fmt;

use crate::{VfsError, VfsResult};

/// An absolute, `/`-separated path inside one VFS tree.
///
/// The root is `/`. Paths never carry a trailing separator and never contain
/// `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VfsPath(String);

impl VfsPath {
    /// The VFS root.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Append a single child name.
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        if self.is_root() {
            Self(format!("/{name}"))
        } else {
            Self(format!("{}/{name}", self.0))
        }
    }

    /// The final segment, or the empty string for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// The containing path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_owned())),
        }
    }

    /// Iterate the non-empty segments from the root down.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lexically resolve `relative` against this path.
    ///
    /// Does not touch any backend; `.` is ignored and `..` pops one segment.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::PathEscape` if `relative` is absolute or walks above the root.
    pub fn resolve(&self, relative: &str) -> VfsResult<Self> {
        if relative.starts_with('/') {
            return Err(VfsError::PathEscape(relative.to_owned()));
        }

        let mut resolved = self.clone();
        for segment in relative.split('/') {
            match segment {
                "" | "." => {},
                ".." => {
                    resolved = resolved
                        .parent()
                        .ok_or_else(|| VfsError::PathEscape(relative.to_owned()))?;
                },
                name => resolved = resolved.join(name),
            }
        }
        Ok(resolved)
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VfsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_parent() {
        let p = VfsPath::root().join("a").join("b.txt");
        assert_eq!(p.as_str(), "/a/b.txt");
        assert_eq!(p.name(), "b.txt");
        assert_eq!(p.parent().unwrap().as_str(), "/a");
        assert_eq!(p.parent().unwrap().parent().unwrap(), VfsPath::root());
        assert!(VfsPath::root().parent().is_none());
    }

    #[test]
    fn test_valid_path() {
        let base = VfsPath::root().join("mods");
        let res = base.resolve("src/./main.rs").unwrap();
        assert_eq!(res.as_str(), "/mods/src/main.rs");
    }

    #[test]
    fn test_traversal_blocked() {
        let base = VfsPath::root().join("sandbox");
        let res = base.resolve("src/../../../etc/passwd");
        assert!(matches!(res, Err(VfsError::PathEscape(_))));
    }

    #[test]
    fn test_absolute_blocked() {
        let res = VfsPath::root().resolve("/etc/passwd");
        assert!(matches!(res, Err(VfsError::PathEscape(_))));
    }
}
