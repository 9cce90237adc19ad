//! Remote version checks for Stagehand packages.
//!
//! A [`VersionChecker`] answers "what is the latest version of this path in
//! this domain" through a disk-backed [`VersionCache`] and a server-driven
//! [`RateLimiter`]. [`GitHubSource`] is the shipped source.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cache;
pub mod checker;
pub mod error;
pub mod github;
pub mod ratelimit;
pub mod source;

pub use cache::{CacheEntry, DEFAULT_TTL, VersionCache};
pub use checker::{VersionChecker, VersionCheckers};
pub use error::{VersionError, VersionResult};
pub use github::{GITHUB_DOMAIN, GitHubSource};
pub use ratelimit::{RateInfo, RateLimiter};
pub use source::{Lookup, VersionSource, parse_tag};
