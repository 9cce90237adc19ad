//! Post-merge validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest accepted cache TTL: one week.
const MAX_TTL_SECS: u64 = 604_800;

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_loader(config)?;
    validate_versions(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_loader(config: &Config) -> ConfigResult<()> {
    let loader = &config.loader;
    if loader.roots.is_empty() {
        return Err(invalid("loader.roots", "at least one package root is required"));
    }
    if let Some(version) = &loader.host_version
        && let Err(e) = semver::Version::parse(version)
    {
        return Err(invalid(
            "loader.host_version",
            format!("'{version}' is not a semantic version: {e}"),
        ));
    }
    Ok(())
}

fn validate_versions(config: &Config) -> ConfigResult<()> {
    let versions = &config.versions;
    if versions.ttl_secs > MAX_TTL_SECS {
        return Err(invalid(
            "versions.ttl_secs",
            format!("must be at most {MAX_TTL_SECS} seconds"),
        ));
    }
    if versions.enabled && versions.user_agent.trim().is_empty() {
        return Err(invalid(
            "versions.user_agent",
            "a user agent is required when version checks are enabled",
        ));
    }
    Ok(())
}

fn one_of(field: &str, value: &str, valid: &[&str]) -> ConfigResult<()> {
    if valid.contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("unsupported value '{value}'; expected one of: {}", valid.join(", ")),
        ))
    }
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let logging = &config.logging;
    one_of(
        "logging.level",
        &logging.level,
        &["trace", "debug", "info", "warn", "error"],
    )?;
    one_of(
        "logging.format",
        &logging.format,
        &["pretty", "compact", "json", "full"],
    )?;
    one_of("logging.target", &logging.target, &["stdout", "stderr", "file"])?;

    if logging.target == "file" && logging.directory.is_none() {
        return Err(invalid(
            "logging.directory",
            "a log directory is required when logging.target = \"file\"",
        ));
    }
    if logging.file_prefix.trim().is_empty() {
        return Err(invalid("logging.file_prefix", "must not be empty"));
    }
    Ok(())
}
