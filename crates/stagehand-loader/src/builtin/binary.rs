//! `stagehand:binary`: hand a file to the binary host.

use crate::registry::Loader;

use super::expect_file;

pub(super) fn loader() -> Loader {
    Loader::from_fn(|ctx, handle| {
        let file = expect_file(ctx, handle)?;
        let bytes = ctx.readers().read::<Vec<u8>>(file)?;
        ctx.load_binary(handle.name(), bytes)
    })
}
