//! Stagehand package loader.
//!
//! Discovers packages on disk and in `.shpkg` archives, validates their
//! dependencies, and drives them through the Patch, Setup and Runtime stages.
//! At each stage a package's asset entries select resources by glob and hand
//! them to named loaders contributed by the host or by other packages.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use stagehand_loader::{BinaryHost, LoadedBinary, LoaderOptions, LoaderResult, Orchestrator};
//! # struct Host;
//! # impl BinaryHost for Host {
//! #     fn load(&self, name: &str, _: &[u8]) -> LoaderResult<LoadedBinary> {
//! #         Ok(LoadedBinary::new(name, Vec::new()))
//! #     }
//! # }
//! # fn main() -> LoaderResult<()> {
//! let options = LoaderOptions::new(semver::Version::new(1, 0, 0), "cache");
//! let loaded = Orchestrator::new(options, Arc::new(Host))?
//!     .discover(&["mods".into()])
//!     .sort()
//!     .run_all()?;
//! println!("{} packages loaded", loaded.summary().loaded_count());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Loaders owned by the host.
pub mod builtin;
/// Loader and plugin contexts.
pub mod context;
/// Package discovery.
pub mod discovery;
/// Loader error types.
pub mod error;
/// The binary host seam.
pub mod host;
/// Package manifests.
pub mod manifest;
/// The load lifecycle.
pub mod orchestrator;
/// Packages and their load state.
pub mod package;
/// Plugins exported by binaries.
pub mod plugin;
/// Loader registries.
pub mod registry;
/// Dependency validation and ordering.
pub mod sort;
/// Stages and the stage cursor.
pub mod stage;
/// Load reporting.
pub mod summary;

mod pipeline;

pub use builtin::{BUILTIN_GUID, VersionRef, register_builtins};
pub use context::{LoadContext, PluginContext};
pub use discovery::discover;
pub use error::{DependencyError, LoaderError, LoaderResult};
pub use host::{BinaryHost, LoadedBinary};
pub use manifest::{
    AssetEntry, Assets, LoaderId, MANIFEST_FILE_NAME, Manifest, is_valid_guid,
    is_valid_loader_name, parse_version,
};
pub use orchestrator::{
    Discovered, Fresh, Loaded, LoaderOptions, Orchestrator, Patched, SetUp, Sorted,
    VersionCheckOptions,
};
pub use package::{Diagnostic, Package};
pub use plugin::{Plugin, PluginConstructor};
pub use registry::{AsyncLoader, Loader, LoaderRegistry, Registries, StageRegistry, SyncLoader};
pub use sort::{satisfies, sort_packages};
pub use stage::{Stage, StageCursor};
pub use summary::{LoadSummary, PackageReport, StageReport};
