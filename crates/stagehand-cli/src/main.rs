//! Stagehand CLI - discover, validate and load packages.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod commands;
mod host;
mod options;
mod theme;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use stagehand_config::{Config, LoadOptions, ShowFormat};

use crate::commands::{check, config, list, run};

/// Stagehand - staged, dependency-aware package loading.
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file layered over `~/.stagehand/config.toml`
    #[arg(short, long, global = true, env = "STAGEHAND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full load: discover, sort, then Patch, Setup and Runtime
    Run {
        /// Package roots (defaults to `loader.roots` from config)
        roots: Vec<PathBuf>,
    },

    /// Discover and sort packages without loading them
    List {
        /// Package roots (defaults to `loader.roots` from config)
        roots: Vec<PathBuf>,
    },

    /// Validate a single package directory or archive
    Check {
        /// Package directory or `.shpkg` archive
        path: PathBuf,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration and where each field came from
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
    /// Show the config files that were merged and derived paths
    Paths,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigFormat {
    Toml,
    Json,
}

impl From<ConfigFormat> for ShowFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Toml => Self::Toml,
            ConfigFormat::Json => Self::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let load_options = LoadOptions {
        explicit: cli.config.clone(),
        ..LoadOptions::default()
    };
    let resolved = Config::load(&load_options);

    let log_config = match &resolved {
        Ok(resolved) => options::log_config(&resolved.config, cli.verbose)?,
        // Fallback so the load error itself gets reported.
        Err(_) => options::fallback_log_config(cli.verbose),
    };
    if let Err(e) = stagehand_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let resolved = resolved.context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { roots } => {
            let roots = options::roots(&resolved.config, roots);
            run::run_load(&resolved.config, &roots)?;
        },
        Commands::List { roots } => {
            let roots = options::roots(&resolved.config, roots);
            list::list_packages(&resolved.config, &roots)?;
        },
        Commands::Check { path } => {
            check::check_package(&resolved.config, &path)?;
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => config::show_config(&resolved, format.into())?,
            ConfigCommands::Paths => config::show_paths(&resolved),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_several_roots() {
        let cli = Cli::try_parse_from(["stagehand", "run", "mods", "extra"]).unwrap();
        match cli.command {
            Commands::Run { roots } => {
                assert_eq!(roots, [PathBuf::from("mods"), PathBuf::from("extra")]);
            },
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli =
            Cli::try_parse_from(["stagehand", "check", "pkg", "--verbose", "-c", "cfg.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("cfg.toml")));
    }

    #[test]
    fn config_show_parses_format() {
        let cli = Cli::try_parse_from(["stagehand", "config", "show", "--format", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Show {
                    format: ConfigFormat::Json
                }
            }
        ));
    }
}
