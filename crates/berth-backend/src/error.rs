//! Backend error types.

use std::time::Duration;

use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors reported by a runtime backend.
///
/// Operations on resources that are already absent are not errors; the
/// adapter returns `Ok` for those.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("`{command}` failed (exit {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {after:?}")]
    Timeout { command: String, after: Duration },
}

impl BackendError {
    /// Whether this error means the runtime cannot be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}
