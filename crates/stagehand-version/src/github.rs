//! GitHub releases as a version source.
//!
//! Paths are `owner/repo`. The latest release's `tag_name` is the version;
//! a repository without releases reports no version. Rate information comes
//! from the `x-ratelimit-*` response headers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::ratelimit::RateInfo;
use crate::source::{Lookup, VersionSource, parse_tag};
use crate::{VersionError, VersionResult};

/// Domain name of the GitHub source.
pub const GITHUB_DOMAIN: &str = "github";

/// Default API endpoint.
pub const GITHUB_API: &str = "https://api.github.com/";

/// Request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Latest-release lookups against the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    client: reqwest::Client,
    api: Url,
}

impl GitHubSource {
    /// Create a source against the public API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(user_agent: &str) -> VersionResult<Self> {
        let api = Url::parse(GITHUB_API).map_err(|e| VersionError::InvalidPath {
            domain: GITHUB_DOMAIN.to_owned(),
            path: format!("{GITHUB_API}: {e}"),
        })?;
        Self::with_api(user_agent, api)
    }

    /// Create a source against another endpoint with the same API shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_api(user_agent: &str, api: Url) -> VersionResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, api })
    }

    fn release_url(&self, path: &str) -> VersionResult<Url> {
        self.api
            .join(&format!("repos/{path}/releases/latest"))
            .map_err(|_| VersionError::InvalidPath {
                domain: GITHUB_DOMAIN.to_owned(),
                path: path.to_owned(),
            })
    }

    async fn request(&self, url: Url) -> Lookup {
        let response = match self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Lookup::failed(e.into()),
        };

        let rate = rate_info(response.headers(), Utc::now().timestamp());
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "GitHub release lookup");

        let outcome = if status == StatusCode::NOT_FOUND {
            Ok(None)
        } else if !status.is_success() {
            Err(VersionError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            })
        } else {
            match response.json::<Release>().await {
                Ok(release) => parse_tag(&release.tag_name).map(Some),
                Err(e) => Err(e.into()),
            }
        };

        Lookup { outcome, rate }
    }
}

#[async_trait]
impl VersionSource for GitHubSource {
    fn domain(&self) -> &str {
        GITHUB_DOMAIN
    }

    fn validate_path(&self, path: &str) -> VersionResult<()> {
        let mut parts = path.split('/');
        let valid = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(repo), None) if is_name(owner) && is_name(repo)
        );
        if valid {
            Ok(())
        } else {
            Err(VersionError::InvalidPath {
                domain: GITHUB_DOMAIN.to_owned(),
                path: path.to_owned(),
            })
        }
    }

    async fn fetch(&self, path: &str) -> Lookup {
        if let Err(e) = self.validate_path(path) {
            return Lookup::failed(e);
        }
        match self.release_url(path) {
            Ok(url) => self.request(url).await,
            Err(e) => Lookup::failed(e),
        }
    }
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Read `x-ratelimit-{remaining,limit,reset}` headers. `now` is the current
/// Unix time in seconds; the reset header is an absolute Unix time.
fn rate_info(headers: &HeaderMap, now: i64) -> Option<RateInfo> {
    let number = |name: &str| -> Option<i64> {
        headers.get(name)?.to_str().ok()?.trim().parse().ok()
    };

    let remaining = u32::try_from(number("x-ratelimit-remaining")?).ok()?;
    let limit = u32::try_from(number("x-ratelimit-limit")?).ok()?;
    let reset_at = number("x-ratelimit-reset")?;
    let reset_after = u64::try_from(reset_at.saturating_sub(now)).unwrap_or(0);

    Some(RateInfo {
        remaining,
        limit,
        reset_after: Duration::from_secs(reset_after),
    })
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn rate_headers_are_parsed() {
        let map = headers(&[
            ("x-ratelimit-remaining", "57"),
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-reset", "1000120"),
        ]);
        assert_eq!(
            rate_info(&map, 1_000_000),
            Some(RateInfo {
                remaining: 57,
                limit: 60,
                reset_after: Duration::from_secs(120),
            })
        );
    }

    #[test]
    fn past_reset_means_now() {
        let map = headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-reset", "10"),
        ]);
        assert_eq!(rate_info(&map, 50).unwrap().reset_after, Duration::ZERO);
    }

    #[test]
    fn missing_or_garbage_headers_are_ignored() {
        assert!(rate_info(&HeaderMap::new(), 0).is_none());
        let map = headers(&[
            ("x-ratelimit-remaining", "lots"),
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-reset", "10"),
        ]);
        assert!(rate_info(&map, 0).is_none());
    }

    #[test]
    fn paths_are_owner_and_repo() {
        let source = GitHubSource::new("stagehand-test").unwrap();
        assert!(source.validate_path("owner/repo").is_ok());
        assert!(source.validate_path("owner/repo.rs").is_ok());
        assert!(source.validate_path("owner").is_err());
        assert!(source.validate_path("owner/repo/extra").is_err());
        assert!(source.validate_path("../repo").is_err());
        assert!(source.validate_path("owner/re po").is_err());
    }

    #[test]
    fn release_url_shape() {
        let source = GitHubSource::new("stagehand-test").unwrap();
        assert_eq!(
            source.release_url("owner/repo").unwrap().as_str(),
            "https://api.github.com/repos/owner/repo/releases/latest"
        );
    }
}
