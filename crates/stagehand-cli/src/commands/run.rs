//! `stagehand run`: the full load lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use stagehand_config::Config;
use stagehand_loader::{LoadSummary, Orchestrator, Stage};

use crate::host::LoggingHost;
use crate::options::loader_options;
use crate::theme::Theme;

pub(crate) fn run_load(config: &Config, roots: &[PathBuf]) -> Result<()> {
    let orchestrator = Orchestrator::new(loader_options(config)?, Arc::new(LoggingHost))?;
    for stage in Stage::ALL {
        orchestrator.on_stage_complete(stage, |report| {
            println!(
                "{}",
                Theme::info(&format!(
                    "{} stage finished: {} enabled, {} disabled",
                    report.stage, report.enabled, report.disabled
                ))
            );
        })?;
    }

    let loaded = orchestrator.discover(roots).sort().run_all()?;
    print_summary(&loaded.summary());
    Ok(())
}

/// Print loaded packages in load order, then disabled ones with reasons.
pub(crate) fn print_summary(summary: &LoadSummary) {
    println!();
    println!("{}", Theme::header("Loaded Packages"));
    println!("{}", Theme::separator());
    if summary.loaded.is_empty() {
        println!("{}", Theme::dimmed("  (none)"));
    }
    for package in &summary.loaded {
        println!(
            "  {}",
            Theme::success(&format!("{} {}", package.guid, package.version))
        );
        if !package.binaries.is_empty() {
            println!(
                "      {}",
                Theme::dimmed(&format!("binaries: {}", package.binaries.join(", ")))
            );
        }
    }

    if !summary.disabled.is_empty() {
        println!();
        println!("{}", Theme::header("Disabled Packages"));
        println!("{}", Theme::separator());
        for package in &summary.disabled {
            println!(
                "  {}",
                Theme::error(&format!("{} {}", package.guid, package.version))
            );
            println!(
                "      {}",
                Theme::dimmed(&package.source.display().to_string())
            );
            for diagnostic in &package.diagnostics {
                println!("      {}", Theme::warning(&diagnostic.to_string()));
            }
        }
    }

    println!();
    println!(
        "{}",
        Theme::dimmed(&format!(
            "{} loaded, {} disabled",
            summary.loaded_count(),
            summary.disabled_count()
        ))
    );
}
