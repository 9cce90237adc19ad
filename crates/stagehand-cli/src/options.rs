//! Translating configuration into loader and logging settings.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use semver::Version;
use stagehand_config::Config;
use stagehand_loader::{LoaderOptions, parse_version};
use stagehand_telemetry::{LogConfig, LogFormat};
use stagehand_vfs::GlobOptions;

/// Roots from the command line, or the configured ones when none were given.
pub(crate) fn roots(config: &Config, given: Vec<PathBuf>) -> Vec<PathBuf> {
    if given.is_empty() {
        config.loader.roots.clone()
    } else {
        given
    }
}

/// The host version packages are checked against.
pub(crate) fn host_version(config: &Config) -> Result<Version> {
    let text = config
        .loader
        .host_version
        .as_deref()
        .unwrap_or(env!("CARGO_PKG_VERSION"));
    parse_version(text).with_context(|| format!("Invalid host version '{text}'"))
}

pub(crate) fn loader_options(config: &Config) -> Result<LoaderOptions> {
    let mut options =
        LoaderOptions::new(host_version(config)?, config.versions.resolved_cache_dir());
    options.glob = GlobOptions {
        allow_absolute: config.loader.allow_absolute_globs,
    };

    let ttl_secs = i64::try_from(config.versions.ttl_secs)
        .with_context(|| format!("TTL of {} seconds is too large", config.versions.ttl_secs))?;
    options.versions.enabled = config.versions.enabled;
    options.versions.ttl = chrono::Duration::seconds(ttl_secs);
    options.versions.user_agent.clone_from(&config.versions.user_agent);
    Ok(options)
}

pub(crate) fn log_config(config: &Config, verbose: bool) -> Result<LogConfig> {
    let mut log_config =
        LogConfig::try_from(&config.logging).context("Invalid logging configuration")?;
    if verbose {
        "debug".clone_into(&mut log_config.level);
    }
    Ok(log_config)
}

pub(crate) fn fallback_log_config(verbose: bool) -> LogConfig {
    let level = if verbose { "debug" } else { "info" };
    LogConfig::new(level).with_format(LogFormat::Compact)
}
