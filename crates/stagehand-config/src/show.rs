//! The resolved configuration and how it is displayed.

use std::fmt::Write as _;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::FieldSources;
use crate::types::Config;

/// Output format for [`ResolvedConfig::render`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML with a trailing comment block naming each field's source.
    #[default]
    Toml,
    /// Pretty-printed JSON.
    Json,
}

/// A loaded configuration with provenance.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Layer that set each dotted field path.
    pub field_sources: FieldSources,
    /// Config files that were merged, in order.
    pub loaded_files: Vec<String>,
}

impl ResolvedConfig {
    /// Render the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::RenderError` if serialization fails.
    pub fn render(&self, format: ShowFormat) -> ConfigResult<String> {
        match format {
            ShowFormat::Json => serde_json::to_string_pretty(&self.config)
                .map_err(|e| ConfigError::RenderError(e.to_string())),
            ShowFormat::Toml => {
                let mut out = toml::to_string_pretty(&self.config)
                    .map_err(|e| ConfigError::RenderError(e.to_string()))?;
                out.push_str("\n# Sources\n");
                for (field, layer) in &self.field_sources {
                    // Writing to a String cannot fail.
                    let _ = writeln!(out, "#   {field} = {layer}");
                }
                Ok(out)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::ConfigLayer;

    fn resolved() -> ResolvedConfig {
        ResolvedConfig {
            config: Config::default(),
            field_sources: FieldSources::from([("logging.level".to_owned(), ConfigLayer::Defaults)]),
            loaded_files: Vec::new(),
        }
    }

    #[test]
    fn toml_lists_sources() {
        let text = resolved().render(ShowFormat::Toml).unwrap();
        assert!(text.contains("[logging]"));
        assert!(text.contains("#   logging.level = defaults"));
    }

    #[test]
    fn json_round_trips() {
        let text = resolved().render(ShowFormat::Json).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(back, Config::default());
    }
}
