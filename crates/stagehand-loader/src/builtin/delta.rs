//! `stagehand:delta`: register a delta mutator for the binary named by the
//! file stem (`Game.wasm.delta` patches `Game.wasm`).

use stagehand_patch::{Delta, delta_mutator};
use tracing::debug;

use crate::registry::Loader;

use super::{expect_file, not_in_stage};

fn target_of(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

pub(super) fn loader() -> Loader {
    Loader::from_fn(|ctx, handle| {
        let file = expect_file(ctx, handle)?;
        let payload = ctx.readers().read::<Vec<u8>>(file)?;
        let delta = Delta::parse(&payload).map_err(|e| ctx.fail(handle.path(), e))?;
        let target = target_of(handle.name()).to_owned();
        let package = ctx.package().guid().to_owned();

        let Some(mutators) = ctx.mutators() else {
            return Err(not_in_stage(ctx, handle));
        };
        mutators.register(&target, &package, delta_mutator(delta));
        debug!(package = %package, target_binary = %target, "Registered delta");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_the_file_stem() {
        assert_eq!(target_of("Game.wasm.delta"), "Game.wasm");
        assert_eq!(target_of("Game.delta"), "Game");
        assert_eq!(target_of("noext"), "noext");
    }
}
