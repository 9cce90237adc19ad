#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use semver::Version;
use stagehand_version::{
    CacheEntry, DEFAULT_TTL, Lookup, RateInfo, RateLimiter, VersionCache, VersionCheckers,
    VersionError, VersionResult, VersionSource,
};
use tokio::time::Instant;

/// Answers every lookup with a fixed version and records what was asked.
struct FakeSource {
    version: Option<Version>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeSource {
    fn new(version: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            version: version.map(|v| Version::parse(v).unwrap()),
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            version: None,
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionSource for FakeSource {
    fn domain(&self) -> &str {
        "fake"
    }

    fn validate_path(&self, path: &str) -> VersionResult<()> {
        if path.is_empty() {
            return Err(VersionError::InvalidPath {
                domain: "fake".into(),
                path: path.into(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, path: &str) -> Lookup {
        self.calls.lock().unwrap().push(path.to_owned());
        if self.fail {
            return Lookup::failed(VersionError::Status {
                url: format!("fake://{path}"),
                status: 500,
            });
        }
        Lookup {
            outcome: Ok(self.version.clone()),
            rate: Some(RateInfo {
                remaining: 100,
                limit: 100,
                reset_after: Duration::from_secs(3600),
            }),
        }
    }
}

fn seeded_cache(dir: &std::path::Path) -> VersionCache {
    let mut cache = VersionCache::new(dir, DEFAULT_TTL);
    cache.insert_entry(
        "fake",
        "pkg/stale",
        CacheEntry {
            timestamp: Utc::now() - chrono::Duration::hours(3),
            version: Some(Version::new(0, 1, 0)),
        },
    );
    cache.insert_entry(
        "fake",
        "pkg/fresh",
        CacheEntry {
            timestamp: Utc::now() - chrono::Duration::minutes(5),
            version: Some(Version::new(1, 0, 0)),
        },
    );
    cache.flush().unwrap();
    cache
}

#[tokio::test]
async fn fresh_entries_are_reused_and_stale_ones_requeried() {
    let dir = tempfile::tempdir().unwrap();
    seeded_cache(dir.path());

    let source = FakeSource::new(Some("2.3.4"));
    let mut checkers = VersionCheckers::new(VersionCache::new(dir.path(), DEFAULT_TTL));
    checkers.register(source.clone());
    checkers.load();

    let fresh = checkers.check("fake", "pkg/fresh").await.unwrap();
    assert_eq!(fresh, Some(Version::new(1, 0, 0)));
    assert!(source.calls().is_empty());

    let stale = checkers.check("fake", "pkg/stale").await.unwrap();
    assert_eq!(stale, Some(Version::new(2, 3, 4)));
    assert_eq!(source.calls(), vec!["pkg/stale"]);

    // The re-queried answer is now cached.
    let again = checkers.check("fake", "pkg/stale").await.unwrap();
    assert_eq!(again, Some(Version::new(2, 3, 4)));
    assert_eq!(source.calls().len(), 1);

    checkers.flush();
    let mut reloaded = VersionCache::new(dir.path(), DEFAULT_TTL);
    reloaded.load("fake").unwrap();
    assert_eq!(
        reloaded.get("fake", "pkg/stale").unwrap().version,
        Some(Version::new(2, 3, 4))
    );
}

#[tokio::test]
async fn failures_degrade_to_none_and_are_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::failing();
    let mut checkers = VersionCheckers::new(VersionCache::new(dir.path(), DEFAULT_TTL));
    checkers.register(source.clone());

    assert_eq!(checkers.check("fake", "pkg/a").await.unwrap(), None);
    assert_eq!(checkers.check("unknown", "pkg/a").await.unwrap(), None);
    assert_eq!(checkers.check("fake", "").await.unwrap(), None);
    assert_eq!(source.calls(), vec!["pkg/a"]);
}

#[tokio::test]
async fn corrupt_cache_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("fake.json"), "[").unwrap();

    let source = FakeSource::new(Some("1.0.0"));
    let mut checkers = VersionCheckers::new(VersionCache::new(dir.path(), DEFAULT_TTL));
    checkers.register(source.clone());
    checkers.load();

    assert_eq!(
        checkers.check("fake", "pkg/a").await.unwrap(),
        Some(Version::new(1, 0, 0))
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_limiter_waits_for_reset_in_arrival_order() {
    let limiter = Arc::new(RateLimiter::new());
    limiter.update(RateInfo {
        remaining: 0,
        limit: 2,
        reset_after: Duration::from_secs(2),
    });

    let start = Instant::now();
    let order = Arc::new(Mutex::new(Vec::new()));
    let waiters = (0..3).map(|id| {
        let limiter = Arc::clone(&limiter);
        let order = Arc::clone(&order);
        async move {
            limiter.acquire().await;
            order.lock().unwrap().push((id, start.elapsed()));
        }
    });
    futures::future::join_all(waiters).await;

    let order = order.lock().unwrap().clone();
    let ids: Vec<_> = order.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    for (_, elapsed) in &order {
        assert!(*elapsed >= Duration::from_secs(2), "resolved after {elapsed:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn buckets_refill_once_per_reported_window() {
    let limiter = Arc::new(RateLimiter::new());
    limiter.update(RateInfo {
        remaining: 0,
        limit: 2,
        reset_after: Duration::from_secs(2),
    });

    let start = Instant::now();
    let grants = Arc::new(Mutex::new(Vec::new()));
    let waiters = (0..6).map(|id| {
        let limiter = Arc::clone(&limiter);
        let grants = Arc::clone(&grants);
        async move {
            limiter.acquire().await;
            grants.lock().unwrap().push((id, start.elapsed().as_secs()));
        }
    });
    futures::future::join_all(waiters).await;

    // No further reports: two tokens per two-second window, never more.
    assert_eq!(
        *grants.lock().unwrap(),
        [(0, 2), (1, 2), (2, 4), (3, 4), (4, 6), (5, 6)]
    );
}

#[tokio::test(start_paused = true)]
async fn failures_without_rate_headers_do_not_stall_the_queue() {
    let dir = tempfile::tempdir().unwrap();
    let source = FakeSource::failing();
    let mut checkers = VersionCheckers::new(VersionCache::new(dir.path(), DEFAULT_TTL));
    checkers.register(source.clone());

    let start = Instant::now();
    let checks = ["pkg/a", "pkg/b", "pkg/c"].map(|path| checkers.check("fake", path));
    for result in futures::future::join_all(checks).await {
        assert_eq!(result.unwrap(), None);
    }
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(source.calls(), ["pkg/a", "pkg/b", "pkg/c"]);
}
