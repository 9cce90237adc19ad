//! Deep merge of TOML trees with per-field source tracking.
//!
//! Merging works on raw [`toml::Value`] trees, so a key missing from an
//! overlay never resets the value below it.

use std::collections::BTreeMap;
use std::fmt;

/// Which layer a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in defaults.
    Defaults,
    /// `~/.stagehand/config.toml`.
    User,
    /// A file passed with `--config`.
    Explicit,
    /// A `STAGEHAND_*` variable.
    Environment,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::User => write!(f, "user (~/.stagehand/config.toml)"),
            Self::Explicit => write!(f, "--config file"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Layer that set each dotted field path.
pub type FieldSources = BTreeMap<String, ConfigLayer>;

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Merge `overlay` into `base`: tables merge per key, anything else replaces
/// the base value. Every leaf taken from `overlay` is recorded as `layer`.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join(prefix, key);
                match base_table.get_mut(key) {
                    Some(base_val) if overlay_val.is_table() => {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    },
                    Some(base_val) => {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    },
                    None => {
                        base_table.insert(key.clone(), overlay_val.clone());
                        record_leaves(overlay_val, &path, layer, sources);
                    },
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Record every leaf under `val` as coming from `layer`.
pub fn record_leaves(val: &toml::Value, prefix: &str, layer: &ConfigLayer, sources: &mut FieldSources) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

/// Set the value at a dotted `path`, creating tables on the way.
pub(crate) fn set_path(root: &mut toml::Value, path: &str, value: toml::Value) {
    let toml::Value::Table(table) = root else {
        return;
    };
    match path.split_once('.') {
        None => {
            table.insert(path.to_owned(), value);
        },
        Some((head, rest)) => {
            let child = table
                .entry(head)
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            set_path(child, rest, value);
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> toml::Value {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn overlay_replaces_leaves_and_keeps_the_rest() {
        let mut base = parse("[logging]\nlevel = \"info\"\nformat = \"compact\"\n");
        let mut sources = FieldSources::new();
        record_leaves(&base, "", &ConfigLayer::Defaults, &mut sources);

        deep_merge_tracking(
            &mut base,
            &parse("[logging]\nlevel = \"debug\"\n[loader]\nroots = [\"a\"]\n"),
            "",
            &ConfigLayer::User,
            &mut sources,
        );

        assert_eq!(base["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(base["logging"]["format"].as_str(), Some("compact"));
        assert_eq!(sources["logging.level"], ConfigLayer::User);
        assert_eq!(sources["logging.format"], ConfigLayer::Defaults);
        assert_eq!(sources["loader.roots"], ConfigLayer::User);
    }

    #[test]
    fn arrays_are_replaced_not_appended() {
        let mut base = parse("roots = [\"a\", \"b\"]");
        let mut sources = FieldSources::new();
        deep_merge_tracking(
            &mut base,
            &parse("roots = [\"c\"]"),
            "",
            &ConfigLayer::Explicit,
            &mut sources,
        );
        assert_eq!(base["roots"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn set_path_creates_tables() {
        let mut root = toml::Value::Table(toml::Table::new());
        set_path(&mut root, "versions.cache_dir", toml::Value::String("/tmp".into()));
        assert_eq!(root["versions"]["cache_dir"].as_str(), Some("/tmp"));
    }
}
