//! Configuration types.
//!
//! Every section implements [`Default`] so a bare `[section]` header, or no
//! file at all, yields a working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Package discovery and loading.
    pub loader: LoaderSection,
    /// Remote version checks.
    pub versions: VersionsSection,
    /// Log level, format and destination.
    pub logging: LoggingSection,
}

/// Package discovery and loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSection {
    /// Directories scanned for packages and archives.
    pub roots: Vec<PathBuf>,
    /// Version checked against package `require` fields. Unset means the
    /// running Stagehand version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_version: Option<String>,
    /// Accept globs that start at the VFS root.
    pub allow_absolute_globs: bool,
}

impl Default for LoaderSection {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("mods")],
            host_version: None,
            allow_absolute_globs: false,
        }
    }
}

/// Remote version checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsSection {
    /// Register the GitHub releases source.
    pub enabled: bool,
    /// Seconds a cached lookup stays fresh.
    pub ttl_secs: u64,
    /// `User-Agent` sent with lookups.
    pub user_agent: String,
    /// Cache directory. Unset means the platform cache directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for VersionsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            user_agent: "stagehand".to_owned(),
            cache_dir: None,
        }
    }
}

impl VersionsSection {
    /// The configured cache directory, or the platform default, or
    /// `.stagehand/cache` when neither is available.
    #[must_use]
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "stagehand").map_or_else(
            || PathBuf::from(".stagehand").join("cache"),
            |dirs| dirs.cache_dir().join("versions"),
        )
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global level: `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
    /// Output format: `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Destination: `stdout`, `stderr` or `file`.
    pub target: String,
    /// Extra filter directives, e.g. `stagehand_version=debug`.
    pub directives: Vec<String>,
    /// Log directory when `target = "file"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// File name prefix for rolling log files.
    pub file_prefix: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directives: Vec::new(),
            directory: None,
            file_prefix: "stagehand".to_owned(),
        }
    }
}
