//! Patch pipeline error types.

use thiserror::Error;

/// Errors from mutators, delta payloads and hook generation.
#[derive(Debug, Error)]
pub enum PatchError {
    /// A delta payload could not be decoded.
    #[error("Malformed delta: {0}")]
    MalformedDelta(String),

    /// A delta was applied to a binary it was not made for.
    #[error("Delta source mismatch: expected {expected}, found {actual}")]
    SourceMismatch {
        /// Hash recorded in the delta.
        expected: String,
        /// Hash of the binary it was applied to.
        actual: String,
    },

    /// A delta operation reads outside its source or overruns its output.
    #[error("Delta operation out of bounds: {0}")]
    OutOfBounds(String),

    /// A mutator failed.
    #[error("Mutator from {package} failed on {target}: {message}")]
    Mutator {
        /// Target binary name.
        target: String,
        /// Package that registered the mutator.
        package: String,
        /// Failure description.
        message: String,
    },

    /// The binary is not a module hook generation can read.
    #[error("Hook generation failed for {target}: {message}")]
    HookGeneration {
        /// Target binary name.
        target: String,
        /// Failure description.
        message: String,
    },
}

/// Result type for patch operations.
pub type PatchResult<T> = Result<T, PatchError>;
