//! Running one stage over the sorted packages.
//!
//! Per enabled package, in load order:
//!
//! 1. Plugins from binaries loaded in an earlier stage are constructed.
//! 2. Every plugin interested in the stage gets its callback.
//! 3. Each asset entry for the stage resolves its loader, matches its glob
//!    against the package root and invokes the loader per handle.
//!
//! A failure at any step disables the package and skips the rest of its
//! stage; other packages keep loading. Runtime entries are gathered into a
//! task group and driven to completion before the next entry starts.

use std::sync::Arc;

use stagehand_patch::{MutatorRegistry, PatchPipeline};
use stagehand_tasks::{Scheduler, TaskGroup};
use stagehand_version::VersionCheckers;
use stagehand_vfs::{GlobFactory, Handle};
use tracing::{debug, error, info, warn};

use crate::builtin::BUILTIN_GUID;
use crate::context::{LoadContext, PatchAccess, PluginContext};
use crate::host::BinaryHost;
use crate::manifest::{AssetEntry, LoaderId};
use crate::package::{Diagnostic, Package};
use crate::registry::{Loader, Registries};
use crate::stage::Stage;
use crate::{LoaderError, LoaderResult};

/// Mutator registration until the Patch stage ends, the frozen chain after.
pub(crate) enum PatchState {
    Registering(MutatorRegistry),
    Frozen(PatchPipeline),
}

impl PatchState {
    fn access(&mut self) -> PatchAccess<'_> {
        match self {
            Self::Registering(registry) => PatchAccess::Registering(registry),
            Self::Frozen(pipeline) => PatchAccess::Frozen(pipeline),
        }
    }

    fn registering(&mut self) -> Option<&mut MutatorRegistry> {
        match self {
            Self::Registering(registry) => Some(registry),
            Self::Frozen(_) => None,
        }
    }

    /// Freeze the registered mutators. Freezing twice is a no-op.
    pub(crate) fn freeze(&mut self) {
        if let Self::Registering(registry) = self {
            let registry = std::mem::take(registry);
            info!(targets = registry.targets().len(), "Froze patch pipeline");
            *self = Self::Frozen(PatchPipeline::new(registry));
        }
    }

    pub(crate) fn pipeline(&self) -> Option<&PatchPipeline> {
        match self {
            Self::Registering(_) => None,
            Self::Frozen(pipeline) => Some(pipeline),
        }
    }
}

/// Everything a stage run needs besides the packages.
pub(crate) struct Services {
    pub(crate) host: Arc<dyn BinaryHost>,
    pub(crate) globs: GlobFactory,
    pub(crate) registries: Registries,
    pub(crate) patch: PatchState,
    pub(crate) versions: VersionCheckers,
    pub(crate) scheduler: Scheduler,
}

/// Run `stage` for every enabled package in `order`.
pub(crate) fn run_stage(
    stage: Stage,
    packages: &mut [Package],
    order: &[usize],
    services: &mut Services,
) {
    info!(stage = %stage, packages = order.len(), "Running stage");

    for &index in order {
        let Some(package) = packages.get_mut(index) else {
            continue;
        };
        if !package.is_enabled() {
            debug!(stage = %stage, package = %package.guid(), "Skipping disabled package");
            continue;
        }

        if let Err(e) = run_plugins(stage, package, services) {
            error!(stage = %stage, package = %package.guid(), error = %e, "Plugin failed");
            package.disable(Diagnostic::Stage {
                stage,
                message: e.to_string(),
            });
            continue;
        }

        let entries = package.manifest().assets.for_stage(stage).to_vec();
        for entry in &entries {
            if let Err(e) = run_entry(stage, package, entry, services) {
                error!(
                    stage = %stage,
                    package = %package.guid(),
                    loader = %entry.loader,
                    owner = %entry.loader.owner(),
                    path = %entry.path,
                    error = %e,
                    "Asset loading failed"
                );
                package.disable(Diagnostic::Stage {
                    stage,
                    message: e.to_string(),
                });
                break;
            }
        }
    }
}

fn run_plugins(stage: Stage, package: &mut Package, services: &mut Services) -> LoaderResult<()> {
    let guid = package.guid().to_owned();

    for constructor in package.take_pending() {
        let plugin = constructor
            .construct()
            .map_err(|e| plugin_error(&guid, constructor.name(), stage, &e))?;
        debug!(package = %guid, plugin = constructor.name(), "Constructed plugin");
        package.add_plugin(plugin);
    }

    let mut plugins = package.take_plugins();
    let mut result = Ok(());
    for plugin in plugins.iter_mut().filter(|p| p.stages().contains(&stage)) {
        let mut ctx = PluginContext {
            stage,
            package: &guid,
            registries: &mut services.registries,
            mutators: services.patch.registering(),
            versions: &mut services.versions,
        };
        if let Err(e) = plugin.on_stage(&mut ctx) {
            result = Err(plugin_error(&guid, plugin.name(), stage, &e));
            break;
        }
        debug!(package = %guid, plugin = plugin.name(), stage = %stage, "Plugin stage callback done");
    }
    package.restore_plugins(plugins);
    result
}

fn plugin_error(package: &str, plugin: &str, stage: Stage, e: &LoaderError) -> LoaderError {
    LoaderError::Plugin {
        package: package.to_owned(),
        plugin: plugin.to_owned(),
        stage,
        message: e.to_string(),
    }
}

/// Warn when a package uses a loader from a guid it does not depend on.
/// Load order is not guaranteed to have run the owner first.
fn check_owner(package: &Package, loader: &LoaderId) {
    let owner = loader.owner();
    if owner != package.guid()
        && owner != BUILTIN_GUID
        && !package.manifest().dependencies.contains_key(owner)
    {
        warn!(
            package = %package.guid(),
            loader = %loader,
            owner,
            "Loader owner is not a declared dependency"
        );
    }
}

fn run_entry(
    stage: Stage,
    package: &mut Package,
    entry: &AssetEntry,
    services: &mut Services,
) -> LoaderResult<()> {
    check_owner(package, &entry.loader);

    let loader = services
        .registries
        .resolve(stage, &entry.loader)
        .cloned()
        .ok_or_else(|| LoaderError::UnknownLoader {
            loader: entry.loader.to_string(),
            stage,
        })?;
    let glob = services.globs.compile(&entry.path)?;
    let handles = glob.matches(package.root())?;
    debug!(
        package = %package.guid(),
        loader = %entry.loader,
        path = %entry.path,
        matched = handles.len(),
        "Matched asset entry"
    );

    if stage == Stage::Runtime {
        run_runtime_entry(package, entry, &loader, &handles, services)
    } else {
        for handle in &handles {
            let mut ctx = LoadContext {
                stage,
                loader: &entry.loader,
                package: &mut *package,
                readers: &services.registries.stage(stage).readers,
                patch: services.patch.access(),
                host: &*services.host,
                versions: &services.versions,
            };
            loader
                .run(&mut ctx, handle)
                .map_err(|e| with_handle(&entry.loader, handle, e))?;
        }
        Ok(())
    }
}

fn run_runtime_entry(
    package: &mut Package,
    entry: &AssetEntry,
    loader: &Loader,
    handles: &[Handle],
    services: &mut Services,
) -> LoaderResult<()> {
    let mut group = TaskGroup::new();
    for handle in handles {
        let mut ctx = LoadContext {
            stage: Stage::Runtime,
            loader: &entry.loader,
            package: &mut *package,
            readers: &services.registries.stage(Stage::Runtime).readers,
            patch: services.patch.access(),
            host: &*services.host,
            versions: &services.versions,
        };
        let task = loader
            .spawn(&mut ctx, handle)
            .context(format!("{} on {}", entry.loader, handle.path()));
        group.push(task);
    }

    let tasks = group.len();
    services.scheduler.block_on(group.join())?;
    debug!(package = %package.guid(), loader = %entry.loader, tasks, "Runtime entry finished");
    Ok(())
}

/// Attach the handle to a failure that does not already name one.
fn with_handle(loader: &LoaderId, handle: &Handle, e: LoaderError) -> LoaderError {
    match e {
        LoaderError::Load { .. } => e,
        other => LoaderError::Load {
            loader: loader.to_string(),
            handle: handle.path().to_string(),
            message: other.to_string(),
        },
    }
}
