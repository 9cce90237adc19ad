//! What loaders and plugins see while a stage runs.

use std::sync::Arc;

use stagehand_patch::{MutatorRegistry, PatchPipeline};
use stagehand_version::{VersionCheckers, VersionSource};
use stagehand_vfs::{ReaderRegistry, VfsPath};
use tracing::debug;

use crate::host::BinaryHost;
use crate::manifest::LoaderId;
use crate::package::Package;
use crate::registry::{Loader, Registries};
use crate::stage::Stage;
use crate::{LoaderError, LoaderResult};

/// Binary patching as seen from one stage.
pub(crate) enum PatchAccess<'a> {
    /// Patch stage: mutators can still be registered.
    Registering(&'a mut MutatorRegistry),
    /// Later stages: the chain is frozen and applied to loaded binaries.
    Frozen(&'a PatchPipeline),
}

/// Context for one loader invocation.
pub struct LoadContext<'a> {
    pub(crate) stage: Stage,
    pub(crate) loader: &'a LoaderId,
    pub(crate) package: &'a mut Package,
    pub(crate) readers: &'a ReaderRegistry,
    pub(crate) patch: PatchAccess<'a>,
    pub(crate) host: &'a dyn BinaryHost,
    pub(crate) versions: &'a VersionCheckers,
}

impl LoadContext<'_> {
    /// The running stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The loader being invoked.
    #[must_use]
    pub fn loader(&self) -> &LoaderId {
        self.loader
    }

    /// The package whose asset entry is being loaded.
    #[must_use]
    pub fn package(&self) -> &Package {
        self.package
    }

    /// Mutable access to that package.
    pub fn package_mut(&mut self) -> &mut Package {
        self.package
    }

    /// The stage's typed readers.
    #[must_use]
    pub fn readers(&self) -> &ReaderRegistry {
        self.readers
    }

    /// The mutator registry, while the Patch stage runs.
    pub fn mutators(&mut self) -> Option<&mut MutatorRegistry> {
        match &mut self.patch {
            PatchAccess::Registering(registry) => Some(&mut **registry),
            PatchAccess::Frozen(_) => None,
        }
    }

    /// Version checkers; only loaded during the Runtime stage.
    #[must_use]
    pub fn versions(&self) -> &VersionCheckers {
        self.versions
    }

    /// Hand a binary to the host and record it on the package.
    ///
    /// After the Patch stage the binary first runs through the frozen
    /// mutator chain, and any hook companion is loaded right after it.
    ///
    /// # Errors
    ///
    /// Returns a patch failure or the host's rejection.
    pub fn load_binary(&mut self, name: &str, bytes: Vec<u8>) -> LoaderResult<()> {
        let (bytes, companions) = match &self.patch {
            PatchAccess::Frozen(pipeline) if pipeline.has_target(name) => {
                let patched = pipeline.apply(name, bytes)?;
                (patched.bytes, patched.companions)
            },
            _ => (bytes, Vec::new()),
        };

        let binary = self.host.load(name, &bytes)?;
        debug!(
            package = %self.package.guid(),
            binary = name,
            plugins = binary.plugins().len(),
            "Loaded binary"
        );
        self.package.record_binary(binary);

        for companion in companions {
            let binary = self.host.load(&companion.name, &companion.bytes)?;
            self.package.record_binary(binary);
        }
        Ok(())
    }

    /// Build a loader failure for `path` with this context's loader id.
    pub fn fail(&self, path: &VfsPath, message: impl ToString) -> LoaderError {
        LoaderError::Load {
            loader: self.loader.to_string(),
            handle: path.to_string(),
            message: message.to_string(),
        }
    }
}

/// Context for one plugin stage callback.
pub struct PluginContext<'a> {
    pub(crate) stage: Stage,
    pub(crate) package: &'a str,
    pub(crate) registries: &'a mut Registries,
    pub(crate) mutators: Option<&'a mut MutatorRegistry>,
    pub(crate) versions: &'a mut VersionCheckers,
}

impl PluginContext<'_> {
    /// The running stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Guid of the plugin's package.
    #[must_use]
    pub fn package(&self) -> &str {
        self.package
    }

    fn own_id(&self, name: &str) -> LoaderResult<LoaderId> {
        LoaderId::new(self.package, name)
    }

    /// Register a loader usable only in the running stage, owned by the
    /// plugin's package.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid name, a duplicate id, or an
    /// asynchronous loader outside the Runtime stage.
    pub fn register_loader(&mut self, name: &str, loader: Loader) -> LoaderResult<LoaderId> {
        let id = self.own_id(name)?;
        self.registries
            .register_stage(self.stage, id.clone(), loader)?;
        Ok(id)
    }

    /// Register a loader usable from the running stage onward.
    ///
    /// # Errors
    ///
    /// As [`PluginContext::register_loader`].
    pub fn register_shared_loader(&mut self, name: &str, loader: Loader) -> LoaderResult<LoaderId> {
        let id = self.own_id(name)?;
        self.registries
            .register_shared(self.stage, id.clone(), loader)?;
        Ok(id)
    }

    /// The running stage's typed readers.
    pub fn readers_mut(&mut self) -> &mut ReaderRegistry {
        &mut self.registries.stage_mut(self.stage).readers
    }

    /// The mutator registry, during the Patch stage.
    pub fn mutators(&mut self) -> Option<&mut MutatorRegistry> {
        self.mutators.as_deref_mut()
    }

    /// Add a version source for later checks.
    pub fn register_version_source(&mut self, source: Arc<dyn VersionSource>) {
        self.versions.register(source);
    }
}

#[cfg(test)]
mod tests {
    use semver::Version;
    use stagehand_version::VersionCache;
    use stagehand_vfs::{Directory, DiskDirectory};

    use super::*;
    use crate::host::LoadedBinary;
    use crate::manifest::Manifest;

    #[derive(Default)]
    struct RecordingHost {
        loaded: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl BinaryHost for RecordingHost {
        fn load(&self, name: &str, bytes: &[u8]) -> LoaderResult<LoadedBinary> {
            self.loaded
                .lock()
                .unwrap()
                .push((name.to_owned(), bytes.to_vec()));
            Ok(LoadedBinary::new(name, Vec::new()))
        }
    }

    fn package(dir: &std::path::Path) -> Package {
        let manifest =
            Manifest::from_json(br#"{"guid":"pkg","version":"1.0.0","require":"1.0.0"}"#, "test")
                .unwrap();
        let root = DiskDirectory::open(dir).unwrap();
        Package::new(manifest, root as Arc<dyn Directory>, dir)
    }

    #[test]
    fn frozen_pipeline_patches_its_targets() {
        let mut mutators = MutatorRegistry::new();
        mutators.register(
            "Game.wasm",
            "pkg",
            Arc::new(|_: &stagehand_patch::MutationContext<'_>, mut b: Vec<u8>| {
                b.push(b'!');
                Ok(b)
            }),
        );
        let pipeline = PatchPipeline::new(mutators);
        let readers = ReaderRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        let versions = VersionCheckers::new(VersionCache::new(
            dir.path(),
            stagehand_version::DEFAULT_TTL,
        ));
        let loader: LoaderId = "stagehand:binary".parse().unwrap();
        let mut package = package(dir.path());
        let host = RecordingHost::default();

        let mut ctx = LoadContext {
            stage: Stage::Setup,
            loader: &loader,
            package: &mut package,
            readers: &readers,
            patch: PatchAccess::Frozen(&pipeline),
            host: &host,
            versions: &versions,
        };
        assert!(ctx.mutators().is_none());
        ctx.load_binary("Game.wasm", b"bin".to_vec()).unwrap();
        ctx.load_binary("Other.wasm", b"bin".to_vec()).unwrap();

        assert_eq!(package.binaries(), ["Game.wasm", "Other.wasm"]);
        assert_eq!(package.version(), &Version::new(1, 0, 0));
        let loaded = host.loaded.lock().unwrap();
        assert_eq!(loaded[0], ("Game.wasm".to_owned(), b"bin!".to_vec()));
        assert_eq!(loaded[1], ("Other.wasm".to_owned(), b"bin".to_vec()));
    }

    #[test]
    fn plugins_register_only_under_their_own_guid() {
        let mut registries = Registries::new();
        let dir = tempfile::tempdir().unwrap();
        let mut versions = VersionCheckers::new(VersionCache::new(
            dir.path(),
            stagehand_version::DEFAULT_TTL,
        ));
        let mut ctx = PluginContext {
            stage: Stage::Setup,
            package: "pkg",
            registries: &mut registries,
            mutators: None,
            versions: &mut versions,
        };
        let noop = || Loader::from_fn(|_, _| Ok(()));

        let id = ctx.register_loader("text", noop()).unwrap();
        assert_eq!(id.owner(), "pkg");
        assert_eq!(id.name(), "text");

        let err = ctx.register_loader("other:text", noop()).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidLoaderId(ref id) if id == "pkg:other:text"));
        assert!(registries.resolve(Stage::Setup, &"other:text".parse().unwrap()).is_none());
    }
}
