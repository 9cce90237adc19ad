//! `stagehand:hooks`: every non-empty line that does not start with `#`
//! names a binary to generate a hook companion for.

use stagehand_vfs::Lines;

use crate::registry::Loader;

use super::{expect_file, not_in_stage};

fn targets(lines: &Lines) -> impl Iterator<Item = &str> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

pub(super) fn loader() -> Loader {
    Loader::from_fn(|ctx, handle| {
        let file = expect_file(ctx, handle)?;
        let lines = ctx.readers().read::<Lines>(file)?;
        let package = ctx.package().guid().to_owned();

        let Some(mutators) = ctx.mutators() else {
            return Err(not_in_stage(ctx, handle));
        };
        for target in targets(&lines) {
            mutators.request_hooks(target, &package);
        }
        Ok(())
    })
}
