//! Plugins exported by loaded binaries.
//!
//! A binary host scans each binary it loads once and reports the plugin
//! constructors it exports. The pipeline constructs a package's plugins at
//! the start of the first stage after their binary loaded, then calls each
//! plugin once for every stage it declared interest in.

use std::fmt;
use std::sync::Arc;

use crate::LoaderResult;
use crate::context::PluginContext;
use crate::stage::Stage;

/// Package code that hooks into stages.
pub trait Plugin {
    /// Plugin name, unique within its binary.
    fn name(&self) -> &str;

    /// Stages this plugin wants a callback for.
    fn stages(&self) -> &[Stage];

    /// Called once per declared stage, before the package's assets for that
    /// stage are loaded.
    ///
    /// # Errors
    ///
    /// A failure disables the owning package for every remaining stage.
    fn on_stage(&mut self, ctx: &mut PluginContext<'_>) -> LoaderResult<()>;
}

type ConstructFn = Arc<dyn Fn() -> LoaderResult<Box<dyn Plugin>> + Send + Sync>;

/// An exported plugin constructor.
#[derive(Clone)]
pub struct PluginConstructor {
    name: String,
    construct: ConstructFn,
}

impl PluginConstructor {
    /// Wrap a constructor function.
    pub fn new<F>(name: impl Into<String>, construct: F) -> Self
    where
        F: Fn() -> LoaderResult<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            construct: Arc::new(construct),
        }
    }

    /// Exported name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build a fresh plugin.
    ///
    /// # Errors
    ///
    /// Returns whatever the constructor reports.
    pub fn construct(&self) -> LoaderResult<Box<dyn Plugin>> {
        (self.construct)()
    }
}

impl fmt::Debug for PluginConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConstructor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
