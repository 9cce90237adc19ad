//! Conversion from the `[logging]` config section.

use stagehand_config::LoggingSection;

use crate::error::{TelemetryError, TelemetryResult};
use crate::logging::{LogConfig, LogTarget};

impl TryFrom<&LoggingSection> for LogConfig {
    type Error = TelemetryError;

    fn try_from(section: &LoggingSection) -> TelemetryResult<Self> {
        let target = match section.target.as_str() {
            "stdout" => LogTarget::Stdout,
            "stderr" => LogTarget::Stderr,
            "file" => {
                let directory = section.directory.clone().ok_or_else(|| {
                    TelemetryError::ConfigError("file logging needs a directory".to_owned())
                })?;
                LogTarget::File {
                    directory,
                    prefix: section.file_prefix.clone(),
                }
            },
            other => {
                return Err(TelemetryError::ConfigError(format!(
                    "unknown log target '{other}'"
                )));
            },
        };

        let mut config = LogConfig::new(section.level.clone())
            .with_format(section.format.parse()?)
            .with_target(target);
        config.directives.clone_from(&section.directives);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;

    #[test]
    fn section_converts() {
        let section = LoggingSection {
            level: "debug".to_owned(),
            format: "json".to_owned(),
            target: "file".to_owned(),
            directives: vec!["stagehand_vfs=trace".to_owned()],
            directory: Some("logs".into()),
            file_prefix: "run".to_owned(),
        };
        let config = LogConfig::try_from(&section).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(
            config.target,
            LogTarget::File {
                directory: "logs".into(),
                prefix: "run".to_owned()
            }
        );
        assert_eq!(config.directives, ["stagehand_vfs=trace"]);
    }

    #[test]
    fn file_target_without_directory_fails() {
        let section = LoggingSection {
            target: "file".to_owned(),
            ..LoggingSection::default()
        };
        assert!(LogConfig::try_from(&section).is_err());
    }
}
