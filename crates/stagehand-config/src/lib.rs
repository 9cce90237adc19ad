//! Layered configuration for Stagehand.
//!
//! # Precedence
//!
//! From highest to lowest:
//!
//! 1. `STAGEHAND_*` environment variables
//! 2. The file passed with `--config`
//! 3. `~/.stagehand/config.toml`
//! 4. Embedded defaults (`defaults.toml`)
//!
//! ```rust,no_run
//! use stagehand_config::{Config, LoadOptions};
//!
//! let resolved = Config::load(&LoadOptions::default()).unwrap();
//! println!("roots: {:?}", resolved.config.loader.roots);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Environment overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// File discovery and layered loading.
pub mod loader;
/// Deep merge with source tracking.
pub mod merge;
/// Resolved configuration display.
pub mod show;
/// Configuration types.
pub mod types;
/// Validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::LoadOptions;
pub use merge::{ConfigLayer, FieldSources};
pub use show::{ResolvedConfig, ShowFormat};
pub use types::*;

impl Config {
    /// Load with every layer applied.
    ///
    /// # Errors
    ///
    /// See [`loader::load`].
    pub fn load(options: &LoadOptions) -> ConfigResult<ResolvedConfig> {
        loader::load(options)
    }

    /// Load a single file with no layering.
    ///
    /// # Errors
    ///
    /// See [`loader::load_file`].
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
