//! Loading stages and their ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LoaderError, LoaderResult};

/// One loading stage. Stages run once each, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Binary mutators are registered; nothing has executed yet.
    Patch,
    /// Synchronous setup against loaded binaries.
    Setup,
    /// Asynchronous loading with the task scheduler available.
    Runtime,
}

impl Stage {
    /// Every stage in run order.
    pub const ALL: [Stage; 3] = [Stage::Patch, Stage::Setup, Stage::Runtime];

    /// The stage that runs after this one.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Patch => Some(Self::Setup),
            Self::Setup => Some(Self::Runtime),
            Self::Runtime => None,
        }
    }

    /// Lowercase name, as used in manifests.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Setup => "setup",
            Self::Runtime => "runtime",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Patch => 0,
            Self::Setup => 1,
            Self::Runtime => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks which stage may run next.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCursor {
    completed: Option<Stage>,
}

impl StageCursor {
    /// A cursor before the first stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stage that must run next, or `None` once every stage ran.
    #[must_use]
    pub fn expected(&self) -> Option<Stage> {
        match self.completed {
            None => Some(Stage::Patch),
            Some(stage) => stage.next(),
        }
    }

    /// The last stage that completed.
    #[must_use]
    pub fn completed(&self) -> Option<Stage> {
        self.completed
    }

    /// Check that `stage` is the next stage to run.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::StageOrder` for any other stage.
    pub fn check(&self, stage: Stage) -> LoaderResult<()> {
        let expected = self.expected();
        if expected == Some(stage) {
            Ok(())
        } else {
            Err(LoaderError::StageOrder {
                expected,
                requested: stage,
            })
        }
    }

    /// Record `stage` as complete.
    ///
    /// # Errors
    ///
    /// Returns `LoaderError::StageOrder` if `stage` was not the next stage.
    pub fn complete(&mut self, stage: Stage) -> LoaderResult<()> {
        self.check(stage)?;
        self.completed = Some(stage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_run_in_order_once() {
        let mut cursor = StageCursor::new();
        assert!(cursor.check(Stage::Setup).is_err());
        for stage in Stage::ALL {
            cursor.complete(stage).unwrap();
        }
        assert_eq!(cursor.expected(), None);

        let err = cursor.check(Stage::Patch).unwrap_err();
        assert!(matches!(
            err,
            LoaderError::StageOrder {
                expected: None,
                requested: Stage::Patch
            }
        ));
    }

    #[test]
    fn manifest_names() {
        assert_eq!(serde_json::to_string(&Stage::Runtime).unwrap(), "\"runtime\"");
        assert_eq!(Stage::Setup.to_string(), "setup");
        assert!(Stage::Patch < Stage::Runtime);
    }
}
