//! `stagehand:version`: check a remote source for a newer release of the
//! package.

use semver::Version;
use serde::Deserialize;
use stagehand_tasks::{Task, TaskError};
use tracing::{debug, info};

use crate::registry::Loader;

use super::expect_file;

/// Where to look up the package's latest version.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionRef {
    /// Version source domain, e.g. `github`.
    pub domain: String,
    /// Domain-specific path, e.g. `owner/repo`.
    pub path: String,
}

pub(super) fn loader() -> Loader {
    Loader::from_task_fn(|ctx, handle| {
        let file = match expect_file(ctx, handle) {
            Ok(file) => file,
            Err(e) => return Task::failed(TaskError::failed(e)),
        };
        let reference = match ctx.readers().read_cached::<VersionRef>(file) {
            Ok(reference) => reference,
            Err(e) => return Task::failed(TaskError::failed(e)),
        };

        let package = ctx.package().guid().to_owned();
        let current = ctx.package().version().clone();
        ctx.versions()
            .check(&reference.domain, &reference.path)
            .map(move |latest| report(&package, &current, latest.as_ref()))
    })
}

fn report(package: &str, current: &Version, latest: Option<&Version>) {
    match latest {
        Some(latest) if latest > current => {
            info!(package, current = %current, latest = %latest, "Update available");
        },
        Some(latest) => {
            debug!(package, current = %current, latest = %latest, "Package is up to date");
        },
        None => debug!(package, "No version information"),
    }
}
