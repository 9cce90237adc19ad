//! Loaders owned by the host itself, under the `stagehand` guid.

mod binary;
mod delta;
mod hooks;
mod version;

pub use version::VersionRef;

use stagehand_vfs::{File, Handle};

use crate::context::LoadContext;
use crate::manifest::LoaderId;
use crate::registry::Registries;
use crate::stage::Stage;
use crate::{LoaderError, LoaderResult};

/// Guid that owns the built-in loaders.
pub const BUILTIN_GUID: &str = "stagehand";

/// Register every built-in loader and reader.
///
/// # Errors
///
/// Returns an error if a built-in id is already taken.
pub fn register_builtins(registries: &mut Registries) -> LoaderResult<()> {
    registries.register_shared(Stage::Patch, id("binary")?, binary::loader())?;
    registries.register_stage(Stage::Patch, id("delta")?, delta::loader())?;
    registries.register_stage(Stage::Patch, id("hooks")?, hooks::loader())?;
    registries.register_stage(Stage::Runtime, id("version")?, version::loader())?;
    registries
        .stage_mut(Stage::Runtime)
        .readers
        .register_json::<VersionRef>()?;
    Ok(())
}

fn id(name: &str) -> LoaderResult<LoaderId> {
    LoaderId::new(BUILTIN_GUID, name)
}

/// The file behind `handle`, or a loader failure for a directory.
fn expect_file<'h>(ctx: &LoadContext<'_>, handle: &'h Handle) -> LoaderResult<&'h dyn File> {
    handle
        .as_file()
        .map(|f| &**f)
        .ok_or_else(|| ctx.fail(handle.path(), "expected a file, found a directory"))
}

fn not_in_stage(ctx: &LoadContext<'_>, handle: &Handle) -> LoaderError {
    ctx.fail(
        handle.path(),
        format!("not available in the {} stage", ctx.stage()),
    )
}
