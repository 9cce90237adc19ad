//! The binary host seam.
//!
//! Stagehand does not execute binaries itself. The embedding process
//! implements [`BinaryHost`] to load binary bytes into its runtime and report
//! the plugin constructors each binary exports.

use crate::LoaderResult;
use crate::plugin::PluginConstructor;

/// A binary the host accepted.
#[derive(Debug, Clone)]
pub struct LoadedBinary {
    name: String,
    plugins: Vec<PluginConstructor>,
}

impl LoadedBinary {
    /// Describe a loaded binary and its exported plugin constructors.
    #[must_use]
    pub fn new(name: impl Into<String>, plugins: Vec<PluginConstructor>) -> Self {
        Self {
            name: name.into(),
            plugins,
        }
    }

    /// Binary name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exported plugin constructors.
    #[must_use]
    pub fn plugins(&self) -> &[PluginConstructor] {
        &self.plugins
    }
}

/// Loads binaries on behalf of packages.
pub trait BinaryHost: Send + Sync {
    /// Load `bytes` as the binary `name` and scan it for plugin constructors.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::Binary` if the host rejects the binary.
    fn load(&self, name: &str, bytes: &[u8]) -> LoaderResult<LoadedBinary>;
}
