//! Glob compilation and matching over VFS handles.
//!
//! A glob is split on `/` and compiled once into a list of segments. Matching
//! folds the segments over a set of handles: every intermediate result is
//! narrowed to directories before the next segment runs, so only the final
//! segment can yield files. A compiled [`Glob`] holds no handles and can be
//! matched against any number of roots.

use std::collections::HashSet;
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use tracing::trace;

use crate::handle::{Directory, Handle, root_of};
use crate::{VfsError, VfsResult};

/// Options applied when compiling globs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobOptions {
    /// Whether a leading `/` (start at the VFS root) is accepted.
    pub allow_absolute: bool,
}

/// Compiles glob patterns with a fixed set of [`GlobOptions`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobFactory {
    options: GlobOptions,
}

impl GlobFactory {
    /// Create a factory with the given options.
    #[must_use]
    pub fn new(options: GlobOptions) -> Self {
        Self { options }
    }

    /// The options this factory compiles with.
    #[must_use]
    pub fn options(&self) -> GlobOptions {
        self.options
    }

    /// Compile a pattern.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::InvalidGlob` for empty patterns, empty inner segments or
    /// malformed wildcards, and `VfsError::AbsoluteGlob` for a leading `/` when
    /// absolute globs are disabled.
    pub fn compile(&self, pattern: &str) -> VfsResult<Glob> {
        Glob::compile(pattern, self.options)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Current,
    Parent,
    Recursive,
    Literal(String),
    Pattern(GlobMatcher),
}

impl Segment {
    fn compile(pattern: &str, raw: &str) -> VfsResult<Self> {
        match raw {
            "." => return Ok(Self::Current),
            ".." => return Ok(Self::Parent),
            "**" => return Ok(Self::Recursive),
            _ => {},
        }

        if !raw.contains(['*', '?', '[']) {
            return Ok(Self::Literal(raw.to_owned()));
        }

        // Braces are plain characters here, not alternation groups.
        let escaped = raw.replace('{', "[{]").replace('}', "[}]");
        let glob = GlobBuilder::new(&escaped)
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| VfsError::InvalidGlob {
                pattern: pattern.to_owned(),
                reason: e.kind().to_string(),
            })?;
        Ok(Self::Pattern(glob.compile_matcher()))
    }

    fn expand(&self, pattern: &str, dir: &Arc<dyn Directory>, out: &mut Vec<Handle>) -> VfsResult<()> {
        match self {
            Self::Current => out.push(Handle::Directory(Arc::clone(dir))),
            Self::Parent => {
                let parent = dir
                    .parent()
                    .ok_or_else(|| VfsError::GlobEscape(pattern.to_owned()))?;
                out.push(Handle::Directory(parent));
            },
            Self::Recursive => {
                out.push(Handle::Directory(Arc::clone(dir)));
                push_descendants(dir, out);
            },
            Self::Literal(name) => out.extend(dir.get(name)),
            Self::Pattern(matcher) => out.extend(
                dir.children()
                    .into_iter()
                    .filter(|child| matcher.is_match(child.name())),
            ),
        }
        Ok(())
    }
}

fn push_descendants(dir: &Arc<dyn Directory>, out: &mut Vec<Handle>) {
    for child in dir.children() {
        let sub = child.as_directory().cloned();
        out.push(child);
        if let Some(sub) = sub {
            push_descendants(&sub, out);
        }
    }
}

/// A compiled glob.
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    absolute: bool,
    dirs_only: bool,
    segments: Vec<Segment>,
}

impl Glob {
    /// Compile `pattern` with `options`.
    ///
    /// # Errors
    ///
    /// See [`GlobFactory::compile`].
    pub fn compile(pattern: &str, options: GlobOptions) -> VfsResult<Self> {
        if pattern.is_empty() {
            return Err(VfsError::InvalidGlob {
                pattern: String::new(),
                reason: "empty pattern".into(),
            });
        }

        let mut parts: Vec<&str> = pattern.split('/').collect();

        let absolute = parts.len() > 1 && parts.first() == Some(&"");
        if absolute {
            if !options.allow_absolute {
                return Err(VfsError::AbsoluteGlob(pattern.to_owned()));
            }
            parts.remove(0);
        }

        let dirs_only = parts.last() == Some(&"");
        if dirs_only {
            parts.pop();
        }

        let segments = parts
            .into_iter()
            .map(|raw| {
                if raw.is_empty() {
                    Err(VfsError::InvalidGlob {
                        pattern: pattern.to_owned(),
                        reason: "empty path segment".into(),
                    })
                } else {
                    Segment::compile(pattern, raw)
                }
            })
            .collect::<VfsResult<Vec<_>>>()?;

        Ok(Self {
            pattern: pattern.to_owned(),
            absolute,
            dirs_only,
            segments,
        })
    }

    /// The source pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern starts at the VFS root.
    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether only directories can match.
    #[must_use]
    pub fn is_dirs_only(&self) -> bool {
        self.dirs_only
    }

    /// Evaluate the glob relative to `dir`.
    ///
    /// Results are de-duplicated by path and keep first-seen order.
    ///
    /// # Errors
    ///
    /// Returns `VfsError::GlobEscape` if a `..` segment is applied at the VFS root.
    pub fn matches(&self, dir: &Arc<dyn Directory>) -> VfsResult<Vec<Handle>> {
        let start = if self.absolute {
            root_of(dir)
        } else {
            Arc::clone(dir)
        };

        let mut current = vec![Handle::Directory(start)];
        for segment in &self.segments {
            let mut next = Vec::new();
            for handle in &current {
                if let Some(d) = handle.as_directory() {
                    segment.expand(&self.pattern, d, &mut next)?;
                }
            }
            current = dedup(next);
            if current.is_empty() {
                break;
            }
        }

        if self.dirs_only {
            current.retain(Handle::is_dir);
        }

        trace!(glob = %self.pattern, root = %dir.path(), count = current.len(), "Glob evaluated");
        Ok(current)
    }
}

fn dedup(handles: Vec<Handle>) -> Vec<Handle> {
    let mut seen = HashSet::new();
    handles
        .into_iter()
        .filter(|h| seen.insert(h.path().clone()))
        .collect()
}
