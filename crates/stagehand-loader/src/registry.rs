//! Named loader registries.
//!
//! Every stage owns a registry of stage-local loaders and a reader registry.
//! A shared registry spans stages: a shared loader is usable from the stage
//! it was registered in onward. Lookups try the current stage first, then
//! the shared registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use stagehand_tasks::{Task, TaskError};
use stagehand_vfs::{Handle, ReaderRegistry};
use tracing::debug;

use crate::context::LoadContext;
use crate::manifest::LoaderId;
use crate::stage::Stage;
use crate::{LoaderError, LoaderResult};

/// A loader that finishes before returning.
pub type SyncLoader =
    Arc<dyn Fn(&mut LoadContext<'_>, &Handle) -> LoaderResult<()> + Send + Sync>;

/// A loader that returns a task for the Runtime scheduler.
pub type AsyncLoader = Arc<dyn Fn(&mut LoadContext<'_>, &Handle) -> Task<()> + Send + Sync>;

/// A registered loader function.
#[derive(Clone)]
pub enum Loader {
    /// Runs to completion when invoked.
    Sync(SyncLoader),
    /// Produces a task; Runtime stage only.
    Async(AsyncLoader),
}

impl Loader {
    /// Wrap a synchronous loader function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut LoadContext<'_>, &Handle) -> LoaderResult<()> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Wrap an asynchronous loader function.
    pub fn from_task_fn<F>(f: F) -> Self
    where
        F: Fn(&mut LoadContext<'_>, &Handle) -> Task<()> + Send + Sync + 'static,
    {
        Self::Async(Arc::new(f))
    }

    /// Whether this loader produces tasks.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Invoke a synchronous loader.
    ///
    /// # Errors
    ///
    /// Returns the loader's failure, or `LoaderError::AsyncOutsideRuntime` for
    /// an asynchronous loader.
    pub fn run(&self, ctx: &mut LoadContext<'_>, handle: &Handle) -> LoaderResult<()> {
        match self {
            Self::Sync(f) => f(ctx, handle),
            Self::Async(_) => Err(LoaderError::AsyncOutsideRuntime(ctx.loader().to_string())),
        }
    }

    /// Invoke as a task. Synchronous loaders run now and yield a finished
    /// task.
    pub fn spawn(&self, ctx: &mut LoadContext<'_>, handle: &Handle) -> Task<()> {
        match self {
            Self::Sync(f) => match f(ctx, handle) {
                Ok(()) => Task::ready(()),
                Err(e) => Task::failed(TaskError::failed(e)),
            },
            Self::Async(f) => f(ctx, handle),
        }
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sync(_) => "Loader::Sync",
            Self::Async(_) => "Loader::Async",
        })
    }
}

#[derive(Debug, Clone)]
struct Registered {
    loader: Loader,
    stage: Stage,
}

/// Loaders keyed by id.
#[derive(Debug, Default)]
pub struct LoaderRegistry {
    loaders: BTreeMap<LoaderId, Registered>,
}

impl LoaderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, id: LoaderId, stage: Stage, loader: Loader) {
        debug!(loader = %id, stage = %stage, "Registered loader");
        self.loaders.insert(id, Registered { loader, stage });
    }

    /// The loader registered under `id`.
    #[must_use]
    pub fn get(&self, id: &LoaderId) -> Option<&Loader> {
        self.loaders.get(id).map(|r| &r.loader)
    }

    /// Stage `id` was registered in.
    #[must_use]
    pub fn registered_in(&self, id: &LoaderId) -> Option<Stage> {
        self.loaders.get(id).map(|r| r.stage)
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &LoaderId) -> bool {
        self.loaders.contains_key(id)
    }

    /// Registered ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &LoaderId> {
        self.loaders.keys()
    }

    /// Number of registered loaders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

/// Registries owned by one stage.
#[derive(Debug, Default)]
pub struct StageRegistry {
    /// Stage-local loaders.
    pub loaders: LoaderRegistry,
    /// Typed file readers available to this stage's loaders.
    pub readers: ReaderRegistry,
}

/// Every stage's registries plus the shared loader registry.
#[derive(Debug)]
pub struct Registries {
    shared: LoaderRegistry,
    stages: [StageRegistry; 3],
}

impl Registries {
    /// Empty loader registries with the baseline readers in every stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: LoaderRegistry::new(),
            stages: [
                StageRegistry::default(),
                StageRegistry::default(),
                StageRegistry::default(),
            ],
        }
    }

    /// Registries of `stage`.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> &StageRegistry {
        &self.stages[stage.index()]
    }

    /// Mutable registries of `stage`.
    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageRegistry {
        &mut self.stages[stage.index()]
    }

    /// The shared loader registry.
    #[must_use]
    pub fn shared(&self) -> &LoaderRegistry {
        &self.shared
    }

    /// Register a loader usable only within `stage`.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::DuplicateLoader` if `id` is already visible in
    /// `stage`, or `LoaderError::AsyncOutsideRuntime` for an asynchronous
    /// loader outside the Runtime stage.
    pub fn register_stage(&mut self, stage: Stage, id: LoaderId, loader: Loader) -> LoaderResult<()> {
        if loader.is_async() && stage != Stage::Runtime {
            return Err(LoaderError::AsyncOutsideRuntime(id.to_string()));
        }
        self.check_free(stage, &id)?;
        self.stages[stage.index()].loaders.insert(id, stage, loader);
        Ok(())
    }

    /// Register a loader usable from `stage` onward.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::DuplicateLoader` if `id` is already visible in
    /// `stage`, or `LoaderError::AsyncOutsideRuntime` for an asynchronous
    /// loader registered before the Runtime stage.
    pub fn register_shared(&mut self, stage: Stage, id: LoaderId, loader: Loader) -> LoaderResult<()> {
        if loader.is_async() && stage != Stage::Runtime {
            return Err(LoaderError::AsyncOutsideRuntime(id.to_string()));
        }
        self.check_free(stage, &id)?;
        self.shared.insert(id, stage, loader);
        Ok(())
    }

    fn check_free(&self, stage: Stage, id: &LoaderId) -> LoaderResult<()> {
        if self.resolve(stage, id).is_some() {
            Err(LoaderError::DuplicateLoader(id.to_string()))
        } else {
            Ok(())
        }
    }

    /// Find the loader `id` as seen from `stage`: stage-local first, then
    /// shared loaders registered in `stage` or earlier.
    #[must_use]
    pub fn resolve(&self, stage: Stage, id: &LoaderId) -> Option<&Loader> {
        self.stages[stage.index()].loaders.get(id).or_else(|| {
            self.shared
                .loaders
                .get(id)
                .filter(|r| r.stage <= stage)
                .map(|r| &r.loader)
        })
    }

    /// Every id visible from `stage`.
    #[must_use]
    pub fn visible(&self, stage: Stage) -> Vec<&LoaderId> {
        let mut ids: Vec<&LoaderId> = self.stages[stage.index()].loaders.ids().collect();
        ids.extend(
            self.shared
                .loaders
                .iter()
                .filter(|(_, r)| r.stage <= stage)
                .map(|(id, _)| id),
        );
        ids.sort();
        ids.dedup();
        ids
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(text: &str) -> LoaderId {
        text.parse().unwrap()
    }

    fn noop() -> Loader {
        Loader::from_fn(|_, _| Ok(()))
    }

    #[test]
    fn stage_loaders_stay_in_their_stage() {
        let mut regs = Registries::new();
        regs.register_stage(Stage::Setup, id("pkg:local"), noop()).unwrap();

        assert!(regs.resolve(Stage::Setup, &id("pkg:local")).is_some());
        assert!(regs.resolve(Stage::Patch, &id("pkg:local")).is_none());
        assert!(regs.resolve(Stage::Runtime, &id("pkg:local")).is_none());
    }

    #[test]
    fn shared_loaders_apply_from_their_stage_on() {
        let mut regs = Registries::new();
        regs.register_shared(Stage::Setup, id("pkg:shared"), noop()).unwrap();

        assert!(regs.resolve(Stage::Patch, &id("pkg:shared")).is_none());
        assert!(regs.resolve(Stage::Setup, &id("pkg:shared")).is_some());
        assert!(regs.resolve(Stage::Runtime, &id("pkg:shared")).is_some());
        assert_eq!(regs.shared().registered_in(&id("pkg:shared")), Some(Stage::Setup));
        assert_eq!(regs.visible(Stage::Runtime), [&id("pkg:shared")]);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut regs = Registries::new();
        regs.register_shared(Stage::Patch, id("pkg:a"), noop()).unwrap();
        assert!(matches!(
            regs.register_stage(Stage::Setup, id("pkg:a"), noop()),
            Err(LoaderError::DuplicateLoader(_))
        ));
        assert!(matches!(
            regs.register_shared(Stage::Patch, id("pkg:a"), noop()),
            Err(LoaderError::DuplicateLoader(_))
        ));
    }

    #[test]
    fn async_loaders_are_runtime_only() {
        let mut regs = Registries::new();
        let task_loader = || Loader::from_task_fn(|_, _| Task::ready(()));
        assert!(matches!(
            regs.register_stage(Stage::Setup, id("pkg:later"), task_loader()),
            Err(LoaderError::AsyncOutsideRuntime(_))
        ));
        regs.register_stage(Stage::Runtime, id("pkg:later"), task_loader())
            .unwrap();
    }

    #[test]
    fn every_stage_starts_with_baseline_readers() {
        let regs = Registries::new();
        for stage in Stage::ALL {
            assert!(regs.stage(stage).readers.contains::<String>());
        }
    }
}
