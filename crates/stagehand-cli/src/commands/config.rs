//! `stagehand config`: inspect the resolved configuration.

use anyhow::Result;
use stagehand_config::loader::user_config_dir;
use stagehand_config::{ResolvedConfig, ShowFormat};

use crate::theme::Theme;

pub(crate) fn show_config(resolved: &ResolvedConfig, format: ShowFormat) -> Result<()> {
    print!("{}", resolved.render(format)?);
    Ok(())
}

pub(crate) fn show_paths(resolved: &ResolvedConfig) {
    println!("{}", Theme::header("Configuration Paths"));
    println!("{}", Theme::separator());

    match user_config_dir() {
        Ok(dir) => println!("  user config:   {}", dir.join("config.toml").display()),
        Err(e) => println!("  user config:   {}", Theme::warning(&e.to_string())),
    }
    println!(
        "  version cache: {}",
        resolved.config.versions.resolved_cache_dir().display()
    );
    if let Some(dir) = &resolved.config.logging.directory {
        println!("  log directory: {}", dir.display());
    }

    println!();
    if resolved.loaded_files.is_empty() {
        println!("{}", Theme::info("No config files loaded, using defaults"));
    } else {
        println!("{}", Theme::header("Loaded Files"));
        for file in &resolved.loaded_files {
            println!("  {file}");
        }
    }
}
