//! Ordered mutator chains per target binary.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::hookgen::{companion_name, generate_hooks};
use crate::{PatchError, PatchResult};

/// What a mutator is running on.
#[derive(Debug, Clone, Copy)]
pub struct MutationContext<'a> {
    /// Target binary name.
    pub target: &'a str,
    /// Package that registered the mutator.
    pub package: &'a str,
}

/// A binary transformation contributed by a package.
pub type Mutator =
    Arc<dyn Fn(&MutationContext<'_>, Vec<u8>) -> PatchResult<Vec<u8>> + Send + Sync>;

/// Mutators one package contributed to one target, in registration order.
pub struct MutatorSlot {
    package: String,
    mutators: Vec<Mutator>,
}

impl MutatorSlot {
    /// Contributing package.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Number of mutators in the slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutators.len()
    }

    /// Whether the slot holds no mutators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutators.is_empty()
    }
}

impl fmt::Debug for MutatorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutatorSlot")
            .field("package", &self.package)
            .field("mutators", &self.mutators.len())
            .finish()
    }
}

/// Target name to ordered mutator slots.
///
/// Slots are created on a package's first contribution to a target, so the
/// chain follows the order packages register in. The loader registers during
/// the Patch stage, which visits packages in dependency order.
#[derive(Debug, Default)]
pub struct MutatorRegistry {
    targets: BTreeMap<String, Vec<MutatorSlot>>,
    hooks: BTreeMap<String, BTreeSet<String>>,
}

impl MutatorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `mutator` to `package`'s slot for `target`.
    pub fn register(&mut self, target: &str, package: &str, mutator: Mutator) {
        let slots = self.targets.entry(target.to_owned()).or_default();
        let index = match slots.iter().position(|s| s.package == package) {
            Some(index) => index,
            None => {
                slots.push(MutatorSlot {
                    package: package.to_owned(),
                    mutators: Vec::new(),
                });
                slots.len().saturating_sub(1)
            },
        };
        slots[index].mutators.push(mutator);
        debug!(target_binary = target, package, "Registered mutator");
    }

    /// Ask for a hook companion to be generated for `target`.
    pub fn request_hooks(&mut self, target: &str, package: &str) {
        let added = self
            .hooks
            .entry(target.to_owned())
            .or_default()
            .insert(package.to_owned());
        if added {
            debug!(target_binary = target, package, "Hook generation requested");
        }
    }

    /// Whether `target` has mutators or a hook request.
    #[must_use]
    pub fn has_target(&self, target: &str) -> bool {
        self.targets.contains_key(target) || self.hooks.contains_key(target)
    }

    /// Every target with mutators or a hook request.
    #[must_use]
    pub fn targets(&self) -> BTreeSet<&str> {
        self.targets
            .keys()
            .chain(self.hooks.keys())
            .map(String::as_str)
            .collect()
    }

    /// Slots registered for `target`, in chain order.
    #[must_use]
    pub fn slots(&self, target: &str) -> &[MutatorSlot] {
        self.targets.get(target).map_or(&[], Vec::as_slice)
    }

    /// Packages that requested hooks for `target`.
    pub fn hook_requests(&self, target: &str) -> impl Iterator<Item = &str> {
        self.hooks
            .get(target)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

/// An extra binary the host should load right after its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Companion {
    /// File name of the companion.
    pub name: String,
    /// Module bytes.
    pub bytes: Vec<u8>,
}

/// A target after its mutator chain ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patched {
    /// Mutated target bytes.
    pub bytes: Vec<u8>,
    /// Binaries to load after the target, in order.
    pub companions: Vec<Companion>,
}

/// Runs the registered chain for a binary the host is about to load.
#[derive(Debug, Clone)]
pub struct PatchPipeline {
    registry: Arc<MutatorRegistry>,
}

impl PatchPipeline {
    /// Freeze `registry` into a pipeline.
    #[must_use]
    pub fn new(registry: MutatorRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// The frozen registry.
    #[must_use]
    pub fn registry(&self) -> &MutatorRegistry {
        &self.registry
    }

    /// Whether loading `target` goes through the pipeline at all.
    #[must_use]
    pub fn has_target(&self, target: &str) -> bool {
        self.registry.has_target(target)
    }

    /// Run every mutator registered for `target`, then generate the hook
    /// companion if one was requested.
    ///
    /// # Errors
    ///
    /// Returns the first mutator failure, wrapped with its target and package,
    /// or a hook generation failure. Binaries are never loaded half-patched.
    pub fn apply(&self, target: &str, bytes: Vec<u8>) -> PatchResult<Patched> {
        let mut bytes = bytes;
        let mut applied = 0usize;
        for slot in self.registry.slots(target) {
            let ctx = MutationContext {
                target,
                package: &slot.package,
            };
            for mutator in &slot.mutators {
                bytes = mutator(&ctx, bytes).map_err(|e| match e {
                    PatchError::Mutator { .. } => e,
                    other => PatchError::Mutator {
                        target: target.to_owned(),
                        package: slot.package.clone(),
                        message: other.to_string(),
                    },
                })?;
                applied = applied.saturating_add(1);
            }
        }

        let mut companions = Vec::new();
        if self.registry.hook_requests(target).next().is_some() {
            companions.push(Companion {
                name: companion_name(target),
                bytes: generate_hooks(target, &bytes)?,
            });
        }

        if applied > 0 || !companions.is_empty() {
            info!(
                target_binary = target,
                mutators = applied,
                companions = companions.len(),
                "Patched binary"
            );
        }
        Ok(Patched { bytes, companions })
    }
}
