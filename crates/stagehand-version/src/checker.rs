//! Per-domain version checkers over a shared cache.
//!
//! A check never fails: cache misses go through the domain's rate limiter to
//! its source, and any failure along the way is logged and reported as "no
//! version information".

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use semver::Version;
use stagehand_tasks::Task;
use tracing::{debug, warn};

use crate::cache::VersionCache;
use crate::ratelimit::RateLimiter;
use crate::source::VersionSource;

type SharedCache = Arc<Mutex<VersionCache>>;

fn lock(cache: &SharedCache) -> MutexGuard<'_, VersionCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Version lookups for one domain.
#[derive(Clone)]
pub struct VersionChecker {
    source: Arc<dyn VersionSource>,
    limiter: Arc<RateLimiter>,
    cache: SharedCache,
}

impl VersionChecker {
    /// Create a checker with its own rate limiter.
    #[must_use]
    pub fn new(source: Arc<dyn VersionSource>, cache: Arc<Mutex<VersionCache>>) -> Self {
        Self {
            source,
            limiter: Arc::new(RateLimiter::new()),
            cache,
        }
    }

    /// The domain this checker serves.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.source.domain()
    }

    /// The rate limiter in front of the source.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Look up the latest version of `path`.
    ///
    /// Fresh cache entries resolve immediately. Otherwise the request waits for
    /// a rate-limit token, queries the source, updates the limiter from the
    /// response and caches the answer. Failures resolve to `None`.
    pub fn check(&self, path: &str) -> Task<Option<Version>> {
        let domain = self.domain().to_owned();

        if let Err(e) = self.source.validate_path(path) {
            warn!(domain = %domain, path, error = %e, "Skipping version check");
            return Task::ready(None);
        }

        if let Some(entry) = lock(&self.cache).get(&domain, path) {
            debug!(domain = %domain, path, "Version cache hit");
            return Task::ready(entry.version.clone());
        }

        let source = Arc::clone(&self.source);
        let limiter = Arc::clone(&self.limiter);
        let cache = Arc::clone(&self.cache);
        let path = path.to_owned();

        Task::new(async move {
            limiter.acquire().await;

            // Another check may have filled the entry while this one queued.
            if let Some(entry) = lock(&cache).get(&domain, &path) {
                return Ok(entry.version.clone());
            }

            let lookup = source.fetch(&path).await;
            match lookup.rate {
                Some(rate) => limiter.update(rate),
                None => limiter.unreported(),
            }

            match lookup.outcome {
                Ok(version) => {
                    debug!(
                        domain = %domain,
                        path = %path,
                        version = ?version.as_ref().map(ToString::to_string),
                        "Version check complete"
                    );
                    lock(&cache).insert(&domain, &path, version.clone());
                    Ok(version)
                },
                Err(e) => {
                    warn!(domain = %domain, path = %path, error = %e, "Version check failed");
                    Ok(None)
                },
            }
        })
    }
}

impl std::fmt::Debug for VersionChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionChecker")
            .field("domain", &self.domain())
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

/// Every registered checker, sharing one cache.
#[derive(Debug)]
pub struct VersionCheckers {
    cache: SharedCache,
    checkers: BTreeMap<String, VersionChecker>,
}

impl VersionCheckers {
    /// Create an empty set over `cache`.
    #[must_use]
    pub fn new(cache: VersionCache) -> Self {
        Self {
            cache: Arc::new(Mutex::new(cache)),
            checkers: BTreeMap::new(),
        }
    }

    /// Register a source, replacing any checker for the same domain.
    pub fn register(&mut self, source: Arc<dyn VersionSource>) -> &VersionChecker {
        let domain = source.domain().to_owned();
        let checker = VersionChecker::new(source, Arc::clone(&self.cache));
        debug!(domain = %domain, "Registered version checker");
        self.checkers.insert(domain.clone(), checker);
        &self.checkers[&domain]
    }

    /// The checker for `domain`.
    #[must_use]
    pub fn get(&self, domain: &str) -> Option<&VersionChecker> {
        self.checkers.get(domain)
    }

    /// Registered domain names.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.checkers.keys().map(String::as_str)
    }

    /// Look up `path` in `domain`. Unknown domains resolve to `None`.
    pub fn check(&self, domain: &str, path: &str) -> Task<Option<Version>> {
        match self.checkers.get(domain) {
            Some(checker) => checker.check(path),
            None => {
                warn!(domain, path, "No version checker for domain");
                Task::ready(None)
            },
        }
    }

    /// Load the cache file of every registered domain.
    ///
    /// A domain whose file cannot be loaded starts empty.
    pub fn load(&self) {
        let mut cache = lock(&self.cache);
        for domain in self.checkers.keys() {
            if let Err(e) = cache.load(domain) {
                warn!(domain = %domain, error = %e, "Ignoring unreadable version cache");
            }
        }
    }

    /// Write modified cache files back to disk.
    pub fn flush(&self) {
        if let Err(e) = lock(&self.cache).flush() {
            warn!(error = %e, "Failed to write version cache");
        }
    }
}
