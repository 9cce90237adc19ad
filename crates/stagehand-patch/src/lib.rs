//! Binary patching for Stagehand.
//!
//! Packages contribute mutators to named target binaries during the Patch
//! stage. When the host is about to load a target it hands the bytes to
//! [`PatchPipeline::apply`], which runs the chain in dependency order and
//! generates any requested hook companion.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// `SHD1` delta payloads.
pub mod delta;
/// Patch error types.
pub mod error;
/// Hook companion generation.
pub mod hookgen;
/// Mutator registry and pipeline.
pub mod registry;

pub use delta::{DELTA_MAGIC, Delta, DeltaOp};
pub use error::{PatchError, PatchResult};
pub use hookgen::{HOOK_EXPORT_PREFIX, companion_name, generate_hooks};
pub use registry::{
    Companion, MutationContext, Mutator, MutatorRegistry, MutatorSlot, PatchPipeline, Patched,
};

use std::sync::Arc;

/// A mutator that applies `delta` to its input.
#[must_use]
pub fn delta_mutator(delta: Delta) -> Mutator {
    Arc::new(move |_ctx: &MutationContext<'_>, bytes: Vec<u8>| delta.apply(&bytes))
}
