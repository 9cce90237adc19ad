//! On-disk version cache.
//!
//! One JSON file per domain, `<dir>/<domain>.json`, mapping a lookup path to
//! the time it was checked and the version found (or `null` when the remote
//! had none). Entries older than the TTL are treated as absent and are dropped
//! on the next flush.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{VersionError, VersionResult};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::hours(1);

/// One cached lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When the lookup was made.
    pub timestamp: DateTime<Utc>,
    /// The version found, if any.
    pub version: Option<Version>,
}

impl CacheEntry {
    /// Whether the entry is still within `ttl` at `now`.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.timestamp) < ttl
    }
}

#[derive(Debug, Default)]
struct DomainEntries {
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

/// Version lookups cached per domain.
#[derive(Debug)]
pub struct VersionCache {
    dir: PathBuf,
    ttl: Duration,
    domains: HashMap<String, DomainEntries>,
}

impl VersionCache {
    /// Create an empty cache stored under `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            domains: HashMap::new(),
        }
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache file for `domain`.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidDomain` if the domain is not a plain name.
    pub fn file_for(&self, domain: &str) -> VersionResult<PathBuf> {
        validate_domain(domain)?;
        Ok(self.dir.join(format!("{domain}.json")))
    }

    /// Load the cache file for `domain`, replacing anything held in memory.
    ///
    /// A missing file yields an empty domain. Stale entries are discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&mut self, domain: &str) -> VersionResult<()> {
        let path = self.file_for(domain)?;
        let now = Utc::now();

        let entries: BTreeMap<String, CacheEntry> = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| VersionError::Cache {
                path: path.clone(),
                message: format!("failed to parse cache file: {e}"),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(VersionError::Cache {
                    path,
                    message: format!("failed to read cache file: {e}"),
                });
            },
        };

        let total = entries.len();
        let fresh: BTreeMap<_, _> = entries
            .into_iter()
            .filter(|(_, entry)| entry.is_fresh(self.ttl, now))
            .collect();
        debug!(
            domain,
            path = %path.display(),
            fresh = fresh.len(),
            stale = total.saturating_sub(fresh.len()),
            "Loaded version cache"
        );

        self.domains.insert(
            domain.to_owned(),
            DomainEntries {
                dirty: fresh.len() != total,
                entries: fresh,
            },
        );
        Ok(())
    }

    /// The fresh entry for `path` in `domain`, if any.
    #[must_use]
    pub fn get(&self, domain: &str, path: &str) -> Option<&CacheEntry> {
        self.get_at(domain, path, Utc::now())
    }

    /// The entry for `path` in `domain` if it is fresh at `now`.
    #[must_use]
    pub fn get_at(&self, domain: &str, path: &str, now: DateTime<Utc>) -> Option<&CacheEntry> {
        self.domains
            .get(domain)?
            .entries
            .get(path)
            .filter(|entry| entry.is_fresh(self.ttl, now))
    }

    /// Record a lookup made now.
    pub fn insert(&mut self, domain: &str, path: &str, version: Option<Version>) {
        self.insert_entry(
            domain,
            path,
            CacheEntry {
                timestamp: Utc::now(),
                version,
            },
        );
    }

    /// Record a lookup with an explicit timestamp.
    pub fn insert_entry(&mut self, domain: &str, path: &str, entry: CacheEntry) {
        let domain = self.domains.entry(domain.to_owned()).or_default();
        domain.entries.insert(path.to_owned(), entry);
        domain.dirty = true;
    }

    /// Number of entries held for `domain`, fresh or not.
    #[must_use]
    pub fn len(&self, domain: &str) -> usize {
        self.domains.get(domain).map_or(0, |d| d.entries.len())
    }

    /// Write every modified domain back to disk.
    ///
    /// Each file is written to a temporary file in the cache directory and
    /// renamed over the old one. Stale entries are not written.
    ///
    /// # Errors
    ///
    /// Returns the first write failure; domains after it stay dirty.
    pub fn flush(&mut self) -> VersionResult<()> {
        let now = Utc::now();
        let mut names: Vec<String> = self
            .domains
            .iter()
            .filter(|(_, d)| d.dirty)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        for name in names {
            let path = self.file_for(&name)?;
            let Some(domain) = self.domains.get_mut(&name) else {
                continue;
            };
            let ttl = self.ttl;
            domain.entries.retain(|_, entry| entry.is_fresh(ttl, now));
            write_atomic(&path, &domain.entries)?;
            domain.dirty = false;
            debug!(domain = %name, entries = domain.entries.len(), "Flushed version cache");
        }
        Ok(())
    }
}

fn validate_domain(domain: &str) -> VersionResult<()> {
    let valid = !domain.is_empty()
        && !domain.starts_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(VersionError::InvalidDomain(domain.to_owned()))
    }
}

fn write_atomic(path: &Path, entries: &BTreeMap<String, CacheEntry>) -> VersionResult<()> {
    let cache_err = |message: String| VersionError::Cache {
        path: path.to_path_buf(),
        message,
    };

    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)
        .map_err(|e| cache_err(format!("failed to create cache directory: {e}")))?;

    let body = serde_json::to_string_pretty(entries)
        .map_err(|e| cache_err(format!("failed to serialize cache: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| cache_err(format!("failed to create temp file for atomic write: {e}")))?;
    tmp.write_all(body.as_bytes())
        .map_err(|e| cache_err(format!("failed to write temp cache file: {e}")))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| cache_err(format!("failed to sync temp cache file: {e}")))?;
    tmp.persist(path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to replace version cache");
        cache_err(format!("failed to atomically replace cache file: {e}"))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn flush_then_load_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = VersionCache::new(dir.path(), DEFAULT_TTL);
        cache.insert("github", "owner/repo", Some(v("1.2.3")));
        cache.insert("github", "owner/empty", None);
        cache.flush().unwrap();

        let mut reloaded = VersionCache::new(dir.path(), DEFAULT_TTL);
        reloaded.load("github").unwrap();
        assert_eq!(
            reloaded.get("github", "owner/repo").unwrap().version,
            Some(v("1.2.3"))
        );
        assert_eq!(reloaded.get("github", "owner/empty").unwrap().version, None);
        assert!(reloaded.get("github", "owner/other").is_none());
    }

    #[test]
    fn stale_entries_are_absent_and_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = VersionCache::new(dir.path(), DEFAULT_TTL);
        let old = Utc::now() - Duration::hours(2);
        cache.insert_entry(
            "github",
            "owner/old",
            CacheEntry {
                timestamp: old,
                version: Some(v("0.1.0")),
            },
        );
        cache.insert("github", "owner/new", Some(v("2.0.0")));
        assert!(cache.get("github", "owner/old").is_none());
        assert!(cache.get("github", "owner/new").is_some());

        cache.flush().unwrap();
        assert_eq!(cache.len("github"), 1);

        let text = std::fs::read_to_string(cache.file_for("github").unwrap()).unwrap();
        assert!(!text.contains("owner/old"));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = VersionCache::new(dir.path().join("nested"), DEFAULT_TTL);
        cache.load("github").unwrap();
        assert_eq!(cache.len("github"), 0);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("github.json"), "{ not json").unwrap();
        let mut cache = VersionCache::new(dir.path(), DEFAULT_TTL);
        assert!(matches!(cache.load("github"), Err(VersionError::Cache { .. })));
    }

    #[test]
    fn domains_must_be_plain_names() {
        let cache = VersionCache::new("/tmp", DEFAULT_TTL);
        assert!(cache.file_for("github").is_ok());
        assert!(matches!(
            cache.file_for("../escape"),
            Err(VersionError::InvalidDomain(_))
        ));
        assert!(cache.file_for("").is_err());
    }
}
