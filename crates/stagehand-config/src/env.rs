//! `STAGEHAND_*` environment overrides.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use crate::merge::{ConfigLayer, FieldSources, set_path};

/// Prefix of every recognised variable.
pub const ENV_PREFIX: &str = "STAGEHAND_";

#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Bool,
    Int,
    PathList,
}

/// Variable suffix, dotted field path, value kind.
const OVERRIDES: &[(&str, &str, Kind)] = &[
    ("ROOTS", "loader.roots", Kind::PathList),
    ("HOST_VERSION", "loader.host_version", Kind::Str),
    ("ALLOW_ABSOLUTE_GLOBS", "loader.allow_absolute_globs", Kind::Bool),
    ("VERSION_CHECKS", "versions.enabled", Kind::Bool),
    ("VERSION_TTL_SECS", "versions.ttl_secs", Kind::Int),
    ("CACHE_DIR", "versions.cache_dir", Kind::Str),
    ("USER_AGENT", "versions.user_agent", Kind::Str),
    ("LOG_LEVEL", "logging.level", Kind::Str),
    ("LOG_FORMAT", "logging.format", Kind::Str),
    ("LOG_TARGET", "logging.target", Kind::Str),
    ("LOG_DIR", "logging.directory", Kind::Str),
];

/// Snapshot every `STAGEHAND_*` variable.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect()
}

fn convert(raw: &str, kind: Kind) -> Option<toml::Value> {
    match kind {
        Kind::Str => Some(toml::Value::String(raw.to_owned())),
        Kind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Some(toml::Value::Boolean(false)),
            _ => None,
        },
        Kind::Int => raw.trim().parse().ok().map(toml::Value::Integer),
        Kind::PathList => {
            let paths: Vec<toml::Value> = std::env::split_paths(raw)
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p: PathBuf| toml::Value::String(p.display().to_string()))
                .collect();
            Some(toml::Value::Array(paths))
        },
    }
}

/// Apply recognised variables from `env` on top of `merged`, returning how
/// many were applied. Values that do not convert are skipped with a debug log
/// and left for validation to report through the file layers.
pub fn apply_env_overrides(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env: &HashMap<String, String>,
) -> usize {
    let mut applied = 0_usize;
    for (suffix, field, kind) in OVERRIDES {
        let var = format!("{ENV_PREFIX}{suffix}");
        let Some(raw) = env.get(&var) else {
            continue;
        };
        let Some(value) = convert(raw, *kind) else {
            debug!(var = %var, value = %raw, "Ignoring unparsable environment override");
            continue;
        };
        set_path(merged, field, value);
        sources.insert((*field).to_owned(), ConfigLayer::Environment);
        applied = applied.saturating_add(1);
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn overrides_replace_merged_values() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"\n").unwrap();
        let mut sources = FieldSources::new();
        let applied = apply_env_overrides(
            &mut merged,
            &mut sources,
            &env(&[
                ("STAGEHAND_LOG_LEVEL", "debug"),
                ("STAGEHAND_VERSION_CHECKS", "off"),
                ("STAGEHAND_VERSION_TTL_SECS", "60"),
                ("UNRELATED", "x"),
            ]),
        );

        assert_eq!(applied, 3);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(merged["versions"]["enabled"].as_bool(), Some(false));
        assert_eq!(merged["versions"]["ttl_secs"].as_integer(), Some(60));
        assert_eq!(sources["logging.level"], ConfigLayer::Environment);
    }

    #[test]
    fn unparsable_values_are_skipped() {
        let mut merged = toml::Value::Table(toml::Table::new());
        let mut sources = FieldSources::new();
        let applied = apply_env_overrides(
            &mut merged,
            &mut sources,
            &env(&[("STAGEHAND_VERSION_CHECKS", "maybe")]),
        );
        assert_eq!(applied, 0);
        assert!(sources.is_empty());
    }

    #[test]
    fn roots_split_like_path() {
        let joined = std::env::join_paths(["a", "b"]).unwrap();
        let value = convert(&joined.to_string_lossy(), Kind::PathList).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }
}
