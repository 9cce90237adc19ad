//! `stagehand list`: discovery and ordering without loading.

use std::path::PathBuf;

use anyhow::Result;
use stagehand_config::Config;
use stagehand_loader::{LoadSummary, discover, sort_packages};

use crate::commands::run::print_summary;
use crate::options::host_version;
use crate::theme::Theme;

pub(crate) fn list_packages(config: &Config, roots: &[PathBuf]) -> Result<()> {
    let host = host_version(config)?;
    let mut packages = discover(roots);
    if packages.is_empty() {
        println!("{}", Theme::info("No packages found"));
        return Ok(());
    }

    let order = sort_packages(&mut packages, &host);
    println!("{}", Theme::dimmed(&format!("host version {host}")));
    print_summary(&LoadSummary::new(&packages, &order));
    Ok(())
}
