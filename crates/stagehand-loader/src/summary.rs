//! End-of-load reporting.

use std::path::PathBuf;

use semver::Version;
use tracing::info;

use crate::package::{Diagnostic, Package};
use crate::stage::Stage;

/// Outcome of one stage, passed to stage-completion listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    /// The stage that finished.
    pub stage: Stage,
    /// Packages still enabled.
    pub enabled: usize,
    /// Packages disabled so far, including before the stage.
    pub disabled: usize,
}

/// One package as it stands after loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    /// Package guid.
    pub guid: String,
    /// Package version.
    pub version: Version,
    /// Directory or archive the package came from.
    pub source: PathBuf,
    /// Binaries loaded for the package, in load order.
    pub binaries: Vec<String>,
    /// Why the package was disabled, empty when it loaded.
    pub diagnostics: Vec<Diagnostic>,
}

impl PackageReport {
    fn of(package: &Package) -> Self {
        Self {
            guid: package.guid().to_owned(),
            version: package.version().clone(),
            source: package.source().to_path_buf(),
            binaries: package.binaries().to_vec(),
            diagnostics: package.diagnostics().to_vec(),
        }
    }
}

/// Loaded and disabled packages at the end of a load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Enabled packages in load order.
    pub loaded: Vec<PackageReport>,
    /// Disabled packages in discovery order.
    pub disabled: Vec<PackageReport>,
}

impl LoadSummary {
    /// Summarize `packages`. Enabled packages follow `order`; before sorting
    /// (empty `order`) they follow discovery order.
    #[must_use]
    pub fn new(packages: &[Package], order: &[usize]) -> Self {
        let loaded = if order.is_empty() {
            packages
                .iter()
                .filter(|p| p.is_enabled())
                .map(PackageReport::of)
                .collect()
        } else {
            order
                .iter()
                .filter_map(|&i| packages.get(i))
                .filter(|p| p.is_enabled())
                .map(PackageReport::of)
                .collect()
        };
        let disabled = packages
            .iter()
            .filter(|p| !p.is_enabled())
            .map(PackageReport::of)
            .collect();
        Self { loaded, disabled }
    }

    /// Number of loaded packages.
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Number of disabled packages.
    #[must_use]
    pub fn disabled_count(&self) -> usize {
        self.disabled.len()
    }

    /// Guids of loaded packages in load order.
    #[must_use]
    pub fn loaded_guids(&self) -> Vec<&str> {
        self.loaded.iter().map(|p| p.guid.as_str()).collect()
    }

    /// Whether `guid` was disabled.
    #[must_use]
    pub fn is_disabled(&self, guid: &str) -> bool {
        self.disabled.iter().any(|p| p.guid == guid)
    }

    /// Log the counts and every disabled package at `info`.
    pub fn log(&self) {
        info!(
            loaded = self.loaded_count(),
            disabled = self.disabled_count(),
            "Load finished"
        );
        for package in &self.disabled {
            let reasons: Vec<String> = package.diagnostics.iter().map(ToString::to_string).collect();
            info!(package = %package.guid, reasons = %reasons.join("; "), "Not loaded");
        }
    }
}
