//! The load lifecycle: construct, discover, sort, then run each stage once.
//!
//! The state parameter makes the order a compile-time property:
//!
//! ```text
//! Orchestrator<Fresh> -> <Discovered> -> <Sorted> -> <Patched> -> <SetUp> -> <Loaded>
//! ```
//!
//! A [`StageCursor`] backs the same order at runtime.

use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use semver::Version;
use stagehand_patch::{MutatorRegistry, PatchPipeline};
use stagehand_tasks::Scheduler;
use stagehand_version::{DEFAULT_TTL, GitHubSource, VersionCache, VersionCheckers, VersionSource};
use stagehand_vfs::{EventError, GlobFactory, GlobOptions, OneShot};
use tracing::{debug, info, warn};

use crate::builtin::register_builtins;
use crate::discovery::discover;
use crate::host::BinaryHost;
use crate::package::Package;
use crate::pipeline::{PatchState, Services, run_stage};
use crate::registry::Registries;
use crate::sort::sort_packages;
use crate::stage::{Stage, StageCursor};
use crate::summary::{LoadSummary, StageReport};
use crate::LoaderResult;

/// Version-check settings.
#[derive(Debug, Clone)]
pub struct VersionCheckOptions {
    /// Whether the built-in GitHub source is registered.
    pub enabled: bool,
    /// Directory holding one cache file per domain.
    pub cache_dir: PathBuf,
    /// How long cached lookups stay fresh.
    pub ttl: chrono::Duration,
    /// `User-Agent` sent to remote sources.
    pub user_agent: String,
}

/// Settings for one load.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Version packages' `require` field is checked against.
    pub host_version: Version,
    /// Options for asset globs.
    pub glob: GlobOptions,
    /// Version-check settings.
    pub versions: VersionCheckOptions,
}

impl LoaderOptions {
    /// Options with version checks enabled and the default cache TTL.
    #[must_use]
    pub fn new(host_version: Version, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            host_version,
            glob: GlobOptions::default(),
            versions: VersionCheckOptions {
                enabled: true,
                cache_dir: cache_dir.into(),
                ttl: DEFAULT_TTL,
                user_agent: format!("stagehand/{}", env!("CARGO_PKG_VERSION")),
            },
        }
    }
}

/// Constructed, no packages yet.
#[derive(Debug)]
pub struct Fresh;
/// Packages discovered, not yet ordered.
#[derive(Debug)]
pub struct Discovered;
/// Packages validated and ordered.
#[derive(Debug)]
pub struct Sorted;
/// Patch stage done; the mutator chain is frozen.
#[derive(Debug)]
pub struct Patched;
/// Setup stage done.
#[derive(Debug)]
pub struct SetUp;
/// Every stage done.
#[derive(Debug)]
pub struct Loaded;

struct Inner {
    options: LoaderOptions,
    packages: Vec<Package>,
    order: Vec<usize>,
    services: Services,
    cursor: StageCursor,
    completions: [OneShot<StageReport>; 3],
}

/// Drives packages through discovery, sorting and the three stages.
pub struct Orchestrator<S = Fresh> {
    inner: Inner,
    _state: PhantomData<S>,
}

impl Orchestrator<Fresh> {
    /// Create an orchestrator loading binaries through `host`.
    ///
    /// Registers the built-in loaders and, when enabled, the GitHub version
    /// source. A GitHub client that fails to build only disables version
    /// checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler cannot start or a built-in loader
    /// fails to register.
    pub fn new(options: LoaderOptions, host: Arc<dyn BinaryHost>) -> LoaderResult<Self> {
        let mut registries = Registries::new();
        register_builtins(&mut registries)?;

        let cache = VersionCache::new(options.versions.cache_dir.clone(), options.versions.ttl);
        let mut versions = VersionCheckers::new(cache);
        if options.versions.enabled {
            match GitHubSource::new(&options.versions.user_agent) {
                Ok(source) => {
                    versions.register(Arc::new(source));
                },
                Err(e) => warn!(error = %e, "Version checks disabled"),
            }
        }

        let services = Services {
            host,
            globs: GlobFactory::new(options.glob),
            registries,
            patch: PatchState::Registering(MutatorRegistry::new()),
            versions,
            scheduler: Scheduler::new()?,
        };
        info!(host_version = %options.host_version, "Orchestrator created");

        Ok(Self {
            inner: Inner {
                options,
                packages: Vec::new(),
                order: Vec::new(),
                services,
                cursor: StageCursor::new(),
                completions: [
                    OneShot::new("patch complete"),
                    OneShot::new("setup complete"),
                    OneShot::new("runtime complete"),
                ],
            },
            _state: PhantomData,
        })
    }

    /// Registries for loaders and readers supplied by the embedding host.
    pub fn registries_mut(&mut self) -> &mut Registries {
        &mut self.inner.services.registries
    }

    /// Add a version source for Runtime checks.
    pub fn register_version_source(&mut self, source: Arc<dyn VersionSource>) {
        self.inner.services.versions.register(source);
    }

    /// Discover packages under `roots`.
    #[must_use]
    pub fn discover(self, roots: &[PathBuf]) -> Orchestrator<Discovered> {
        let packages = discover(roots);
        self.with_packages(packages)
    }

    /// Use packages opened by the caller.
    #[must_use]
    pub fn with_packages(mut self, packages: Vec<Package>) -> Orchestrator<Discovered> {
        info!(packages = packages.len(), "Packages discovered");
        self.inner.packages = packages;
        self.transition()
    }
}

impl Orchestrator<Discovered> {
    /// Validate dependencies and fix the load order.
    #[must_use]
    pub fn sort(mut self) -> Orchestrator<Sorted> {
        let inner = &mut self.inner;
        inner.order = sort_packages(&mut inner.packages, &inner.options.host_version);
        info!(
            enabled = inner.order.len(),
            total = inner.packages.len(),
            "Load order resolved"
        );
        self.transition()
    }
}

impl Orchestrator<Sorted> {
    /// Run the Patch stage, then freeze the mutator chain.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::StageOrder` if the stage already ran.
    pub fn run_patch(self) -> LoaderResult<Orchestrator<Patched>> {
        self.run(Stage::Patch)
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// As the individual stage methods.
    pub fn run_all(self) -> LoaderResult<Orchestrator<Loaded>> {
        self.run_patch()?.run_setup()?.run_runtime()
    }
}

impl Orchestrator<Patched> {
    /// Run the Setup stage.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::StageOrder` if the stage already ran.
    pub fn run_setup(self) -> LoaderResult<Orchestrator<SetUp>> {
        self.run(Stage::Setup)
    }
}

impl Orchestrator<SetUp> {
    /// Run the Runtime stage between one load and one flush of the version
    /// cache, then log the summary.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::StageOrder` if the stage already ran.
    pub fn run_runtime(self) -> LoaderResult<Orchestrator<Loaded>> {
        let loaded = self.run::<Loaded>(Stage::Runtime)?;
        loaded.summary().log();
        Ok(loaded)
    }
}

impl<S> Orchestrator<S> {
    fn transition<N>(self) -> Orchestrator<N> {
        Orchestrator {
            inner: self.inner,
            _state: PhantomData,
        }
    }

    fn run<N>(mut self, stage: Stage) -> LoaderResult<Orchestrator<N>> {
        let inner = &mut self.inner;
        inner.cursor.check(stage)?;

        if stage == Stage::Runtime {
            inner.services.versions.load();
        }
        run_stage(stage, &mut inner.packages, &inner.order, &mut inner.services);
        match stage {
            Stage::Patch => inner.services.patch.freeze(),
            Stage::Setup => {},
            Stage::Runtime => inner.services.versions.flush(),
        }
        inner.cursor.complete(stage)?;

        let enabled = inner.packages.iter().filter(|p| p.is_enabled()).count();
        let report = StageReport {
            stage,
            enabled,
            disabled: inner.packages.len().saturating_sub(enabled),
        };
        info!(
            stage = %stage,
            enabled = report.enabled,
            disabled = report.disabled,
            "Stage complete"
        );
        if let Some(event) = inner.completions.get(stage.index())
            && let Err(e) = event.fire(&report)
        {
            debug!(stage = %stage, error = %e, "Stage completion already fired");
        }
        Ok(self.transition())
    }

    /// Call `listener` once when `stage` completes.
    ///
    /// # Errors
    ///
    /// Returns `EventError::Consumed` if the stage already completed.
    pub fn on_stage_complete(
        &self,
        stage: Stage,
        listener: impl FnOnce(&StageReport) + Send + 'static,
    ) -> Result<(), EventError> {
        match self.inner.completions.get(stage.index()) {
            Some(event) => event.subscribe(listener),
            None => Ok(()),
        }
    }

    /// Options the orchestrator was created with.
    #[must_use]
    pub fn options(&self) -> &LoaderOptions {
        &self.inner.options
    }

    /// Every package, enabled or not, in discovery order.
    #[must_use]
    pub fn packages(&self) -> &[Package] {
        &self.inner.packages
    }

    /// The package with `guid`. With duplicates, the first discovered.
    #[must_use]
    pub fn package(&self, guid: &str) -> Option<&Package> {
        self.inner.packages.iter().find(|p| p.guid() == guid)
    }

    /// Enabled packages in load order; empty before sorting.
    pub fn ordered(&self) -> impl Iterator<Item = &Package> {
        self.inner
            .order
            .iter()
            .filter_map(|&i| self.inner.packages.get(i))
            .filter(|p| p.is_enabled())
    }

    /// Registered loaders and readers.
    #[must_use]
    pub fn registries(&self) -> &Registries {
        &self.inner.services.registries
    }

    /// The frozen mutator chain, once the Patch stage has run.
    #[must_use]
    pub fn patch_pipeline(&self) -> Option<&PatchPipeline> {
        self.inner.services.patch.pipeline()
    }

    /// The last completed stage.
    #[must_use]
    pub fn completed_stage(&self) -> Option<Stage> {
        self.inner.cursor.completed()
    }

    /// Current load state of every package.
    #[must_use]
    pub fn summary(&self) -> LoadSummary {
        LoadSummary::new(&self.inner.packages, &self.inner.order)
    }
}

impl<S> fmt::Debug for Orchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &std::any::type_name::<S>())
            .field("packages", &self.inner.packages.len())
            .field("completed", &self.inner.cursor.completed())
            .finish_non_exhaustive()
    }
}
