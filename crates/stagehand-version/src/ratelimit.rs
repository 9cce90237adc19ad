//! Token-bucket rate limiting driven by server-reported limits.
//!
//! The limiter starts out assuming a bucket of one token: until a server
//! reports its limits, a request only goes out after the previous one came
//! back. Every response that carries rate information tightens the local
//! view: remaining and limit take the smaller of the local and server values,
//! the reset instant the later one. Once a reported reset passes, the bucket
//! refills to the limit and the next reset is one reported window later.
//! Requests that find the bucket empty wait in arrival order.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Rate information reported by a server response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateInfo {
    /// Requests left in the current window.
    pub remaining: u32,
    /// Requests allowed per window.
    pub limit: u32,
    /// Time until the window resets, measured when the response arrived.
    pub reset_after: Duration,
}

#[derive(Debug)]
struct Bucket {
    remaining: u32,
    /// `None` until a server reports its limit.
    limit: Option<u32>,
    /// When the bucket refills. `None` means only a report can refill it.
    reset: Option<Instant>,
    /// Window length from the latest report.
    window: Option<Duration>,
}

/// What a request found when it tried to take a token.
enum Take {
    Granted,
    Until(Instant),
    Report,
}

/// A FIFO token bucket shared by every request to one service.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    /// Held by the request at the head of the queue while it waits.
    queue: tokio::sync::Mutex<()>,
    updated: Notify,
}

impl RateLimiter {
    /// Create a limiter with the assumed one-token bucket.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                remaining: 1,
                limit: None,
                reset: None,
                window: None,
            }),
            queue: tokio::sync::Mutex::new(()),
            updated: Notify::new(),
        }
    }

    /// Tokens currently available.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.lock().remaining
    }

    /// Wait for a token and take it.
    ///
    /// Callers are served strictly in the order they called `acquire`.
    pub async fn acquire(&self) {
        let _head = self.queue.lock().await;
        loop {
            let notified = self.updated.notified();
            match self.try_take() {
                Take::Granted => return,
                Take::Until(reset) => {
                    trace!(
                        wait_ms = reset.saturating_duration_since(Instant::now()).as_millis(),
                        "Rate limited, waiting"
                    );
                    tokio::select! {
                        () = tokio::time::sleep_until(reset) => {},
                        () = notified => {},
                    }
                },
                Take::Report => {
                    trace!("Rate limited, waiting for a server report");
                    notified.await;
                },
            }
        }
    }

    /// Take a token if one is available, refilling the bucket once its
    /// reported reset has passed.
    fn try_take(&self) -> Take {
        let mut bucket = self.lock();
        let now = Instant::now();
        if bucket.remaining == 0
            && let Some(reset) = bucket.reset
            && now >= reset
        {
            bucket.remaining = bucket.limit.unwrap_or(1);
            bucket.reset = bucket
                .window
                .filter(|w| !w.is_zero())
                .and_then(|w| reset.checked_add(w))
                .map(|next| next.max(now));
            debug!(remaining = bucket.remaining, "Rate limit bucket refilled");
        }
        if bucket.remaining > 0 {
            bucket.remaining = bucket.remaining.saturating_sub(1);
            Take::Granted
        } else {
            bucket.reset.map_or(Take::Report, Take::Until)
        }
    }

    /// Merge rate information reported by a response.
    pub fn update(&self, info: RateInfo) {
        {
            let mut bucket = self.lock();
            let now = Instant::now();
            let server_reset = now.checked_add(info.reset_after).unwrap_or(now);
            match bucket.limit {
                // First report replaces the assumed bucket.
                None => {
                    bucket.remaining = info.remaining;
                    bucket.limit = Some(info.limit);
                    bucket.reset = Some(server_reset);
                },
                Some(limit) => {
                    bucket.remaining = bucket.remaining.min(info.remaining);
                    bucket.limit = Some(limit.min(info.limit));
                    bucket.reset = Some(bucket.reset.map_or(server_reset, |r| r.max(server_reset)));
                },
            }
            bucket.window = Some(info.reset_after);
            debug!(
                remaining = bucket.remaining,
                limit = ?bucket.limit,
                reset_in_ms = bucket
                    .reset
                    .map(|r| r.saturating_duration_since(now).as_millis()),
                "Rate limit updated"
            );
        }
        self.updated.notify_waiters();
    }

    /// Record a response that carried no rate information.
    ///
    /// While no server has reported limits, this hands back the assumed
    /// token so the next queued request can go out. After a report it
    /// changes nothing.
    pub fn unreported(&self) {
        {
            let mut bucket = self.lock();
            if bucket.limit.is_some() {
                return;
            }
            bucket.remaining = 1;
        }
        self.updated.notify_waiters();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn assumed_token_returns_only_with_the_response() {
        let limiter = Arc::new(RateLimiter::new());
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.remaining(), 0);

        // No report yet: the second request waits however long the first takes.
        let second = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.acquire().await;
                start.elapsed()
            }
        });
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!second.is_finished());

        limiter.unreported();
        assert_eq!(second.await.unwrap(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn unreported_responses_do_not_refill_a_reported_bucket() {
        let limiter = RateLimiter::new();
        limiter.update(RateInfo {
            remaining: 0,
            limit: 5,
            reset_after: Duration::from_secs(60),
        });
        limiter.unreported();
        assert_eq!(limiter.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn updates_keep_the_most_conservative_values() {
        let limiter = RateLimiter::new();
        limiter.update(RateInfo {
            remaining: 10,
            limit: 60,
            reset_after: Duration::from_secs(100),
        });
        assert_eq!(limiter.remaining(), 10);

        limiter.update(RateInfo {
            remaining: 30,
            limit: 5000,
            reset_after: Duration::from_secs(10),
        });
        let bucket = limiter.lock();
        assert_eq!(bucket.remaining, 10);
        assert_eq!(bucket.limit, Some(60));
        assert!(bucket.reset.unwrap() >= Instant::now() + Duration::from_secs(99));
    }
}
