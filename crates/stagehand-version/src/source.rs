//! Remote version sources.

use async_trait::async_trait;
use semver::Version;

use crate::VersionResult;
use crate::ratelimit::RateInfo;

/// Result of one remote lookup.
#[derive(Debug)]
pub struct Lookup {
    /// The latest version, `Ok(None)` if the remote has none.
    pub outcome: VersionResult<Option<Version>>,
    /// Rate information from the response, if the server sent any.
    pub rate: Option<RateInfo>,
}

impl Lookup {
    /// A lookup that failed before any response arrived.
    #[must_use]
    pub fn failed(err: crate::VersionError) -> Self {
        Self {
            outcome: Err(err),
            rate: None,
        }
    }
}

/// A service that can report the latest version of a path in its domain.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Domain name, also the cache file name.
    fn domain(&self) -> &str;

    /// Check that `path` is meaningful for this domain.
    ///
    /// # Errors
    ///
    /// Returns `VersionError::InvalidPath` if it is not.
    fn validate_path(&self, path: &str) -> VersionResult<()>;

    /// Look up the latest version of `path`.
    async fn fetch(&self, path: &str) -> Lookup;
}

/// Parse a release tag into a version, accepting a leading `v` and
/// `major.minor` tags.
///
/// # Errors
///
/// Returns `VersionError::InvalidVersion` if the tag is not a version.
pub fn parse_tag(tag: &str) -> VersionResult<Version> {
    let trimmed = tag.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    Version::parse(bare)
        .or_else(|first| {
            if bare.matches('.').count() == 1 {
                Version::parse(&format!("{bare}.0")).map_err(|_| first)
            } else {
                Err(first)
            }
        })
        .map_err(|e| crate::VersionError::InvalidVersion {
            value: tag.to_owned(),
            message: e.to_string(),
        })
}
