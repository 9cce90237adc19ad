//! Loader error types.

use semver::Version;
use stagehand_patch::PatchError;
use stagehand_tasks::TaskError;
use stagehand_vfs::VfsError;
use thiserror::Error;

use crate::stage::Stage;

/// Errors raised while discovering, validating and loading packages.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A manifest could not be read or decoded.
    #[error("Invalid manifest at {path}: {message}")]
    Manifest {
        /// Where the manifest came from.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// A package GUID does not match the allowed charset.
    #[error("Invalid package guid '{0}'")]
    InvalidGuid(String),

    /// A loader id is not `guid:name` with valid parts.
    #[error("Invalid loader id '{0}'")]
    InvalidLoaderId(String),

    /// A version string could not be parsed.
    #[error("Invalid version '{value}': {message}")]
    InvalidVersion {
        /// The offending text.
        value: String,
        /// Parser message.
        message: String,
    },

    /// A dependency could not be satisfied.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// A plugin failed to construct or failed in a stage callback.
    #[error("Plugin {plugin} of {package} failed in {stage}: {message}")]
    Plugin {
        /// Owning package.
        package: String,
        /// Plugin name.
        plugin: String,
        /// Stage being run.
        stage: Stage,
        /// Failure description.
        message: String,
    },

    /// An asset entry named a loader no registry knows.
    #[error("Unknown loader {loader} in {stage} stage")]
    UnknownLoader {
        /// Requested loader id.
        loader: String,
        /// Stage being run.
        stage: Stage,
    },

    /// A loader id was registered twice.
    #[error("Loader {0} is already registered")]
    DuplicateLoader(String),

    /// An asynchronous loader was registered outside the Runtime stage.
    #[error("Asynchronous loader {0} can only be registered in the runtime stage")]
    AsyncOutsideRuntime(String),

    /// A loader failed on one handle.
    #[error("Loader {loader} failed on {handle}: {message}")]
    Load {
        /// Loader id.
        loader: String,
        /// VFS path of the handle.
        handle: String,
        /// Failure description.
        message: String,
    },

    /// The binary host rejected a binary.
    #[error("Failed to load binary {name}: {message}")]
    Binary {
        /// Binary name.
        name: String,
        /// Host message.
        message: String,
    },

    /// A stage was requested out of order.
    #[error("Stage {requested} requested, but the next stage is {}", display_stage(.expected))]
    StageOrder {
        /// Stage that should run next, `None` once every stage ran.
        expected: Option<Stage>,
        /// Stage that was requested.
        requested: Stage,
    },

    /// Virtual filesystem failure.
    #[error(transparent)]
    Vfs(#[from] VfsError),

    /// Binary patching failure.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Task failure.
    #[error(transparent)]
    Task(#[from] TaskError),
}

fn display_stage(stage: &Option<Stage>) -> &'static str {
    stage.map_or("none", Stage::as_str)
}

/// Why a package cannot load given the other packages present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// More than one package claims the guid.
    #[error("Guid {guid} is claimed by {count} packages")]
    Conflict {
        /// Contested guid.
        guid: String,
        /// Number of claimants.
        count: usize,
    },

    /// The package needs a newer or different host.
    #[error("Requires host {required}, running {host}")]
    UnsupportedHost {
        /// Declared requirement.
        required: Version,
        /// Host version.
        host: Version,
    },

    /// A dependency is not present.
    #[error("Missing dependency {guid}")]
    Missing {
        /// Dependency guid.
        guid: String,
    },

    /// A dependency is present at an incompatible version.
    #[error("Dependency {guid} is {found}, requires {required}")]
    Unsatisfied {
        /// Dependency guid.
        guid: String,
        /// Declared requirement.
        required: Version,
        /// Version present.
        found: Version,
    },

    /// A dependency is present but disabled.
    #[error("Dependency {guid} is disabled")]
    Disabled {
        /// Dependency guid.
        guid: String,
    },
}

impl LoaderError {
    pub(crate) fn manifest(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Manifest {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
