//! Discovered packages and their load state.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use stagehand_vfs::{Directory, File as _, lookup, open_root};
use tracing::warn;

use crate::error::DependencyError;
use crate::host::LoadedBinary;
use crate::manifest::{MANIFEST_FILE_NAME, Manifest};
use crate::plugin::{Plugin, PluginConstructor};
use crate::stage::Stage;
use crate::{LoaderError, LoaderResult};

/// Why a package stopped loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Rejected while validating dependencies.
    Dependency(DependencyError),
    /// Failed while a stage ran.
    Stage {
        /// The stage that was running.
        stage: Stage,
        /// Failure description with context.
        message: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dependency(e) => fmt::Display::fmt(e, f),
            Self::Stage { stage, message } => write!(f, "{stage}: {message}"),
        }
    }
}

/// A package: its manifest, its resource root and its load state.
pub struct Package {
    manifest: Manifest,
    root: Arc<dyn Directory>,
    source: PathBuf,
    disabled: bool,
    diagnostics: Vec<Diagnostic>,
    binaries: Vec<String>,
    pending: Vec<PluginConstructor>,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Package {
    /// Open the package at `path`: a directory holding `manifest.json`, or a
    /// `.shpkg` archive with the same layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be opened or the manifest is
    /// missing or invalid.
    pub fn open(path: &Path) -> LoaderResult<Self> {
        let root = open_root(path)?;
        let origin = path.join(MANIFEST_FILE_NAME).display().to_string();
        let file = lookup(&root, MANIFEST_FILE_NAME)
            .ok()
            .and_then(|h| h.as_file().cloned())
            .ok_or_else(|| LoaderError::manifest(&origin, "missing manifest"))?;
        let manifest = Manifest::from_json(&file.read_all()?, &origin)?;
        Ok(Self::new(manifest, root, path))
    }

    /// Assemble a package from parts.
    #[must_use]
    pub fn new(manifest: Manifest, root: Arc<dyn Directory>, source: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            root,
            source: source.into(),
            disabled: false,
            diagnostics: Vec::new(),
            binaries: Vec::new(),
            pending: Vec::new(),
            plugins: Vec::new(),
        }
    }

    /// Package guid.
    #[must_use]
    pub fn guid(&self) -> &str {
        &self.manifest.guid
    }

    /// Package version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.manifest.version
    }

    /// The parsed manifest.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Root of the package's resources.
    #[must_use]
    pub fn root(&self) -> &Arc<dyn Directory> {
        &self.root
    }

    /// Where the package was found.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Whether the package still loads.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Everything that went wrong, in order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Names of binaries this package's assets loaded.
    #[must_use]
    pub fn binaries(&self) -> &[String] {
        &self.binaries
    }

    /// Names of constructed plugins.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Disable the package for the rest of the load, recording why.
    ///
    /// Disabling is irreversible.
    pub fn disable(&mut self, diagnostic: Diagnostic) {
        if !self.disabled {
            warn!(package = %self.guid(), reason = %diagnostic, "Package disabled");
        }
        self.disabled = true;
        self.diagnostics.push(diagnostic);
    }

    /// Record a binary loaded for this package; its plugins are constructed
    /// when the next stage starts.
    pub fn record_binary(&mut self, binary: LoadedBinary) {
        self.pending.extend(binary.plugins().iter().cloned());
        self.binaries.push(binary.name().to_owned());
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PluginConstructor> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn add_plugin(&mut self, plugin: Box<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    pub(crate) fn take_plugins(&mut self) -> Vec<Box<dyn Plugin>> {
        std::mem::take(&mut self.plugins)
    }

    pub(crate) fn restore_plugins(&mut self, plugins: Vec<Box<dyn Plugin>>) {
        self.plugins = plugins;
    }
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("guid", &self.guid())
            .field("version", &self.version().to_string())
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .field("diagnostics", &self.diagnostics)
            .field("binaries", &self.binaries)
            .field("plugins", &self.plugin_names())
            .finish_non_exhaustive()
    }
}
