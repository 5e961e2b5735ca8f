//! Deployment error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use berth_backend::BackendError;
use berth_provision::ProvisionError;

pub type DeployResult<T> = Result<T, DeployError>;

/// A node descriptor that cannot be deployed as written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("node {node}: missing required field '{field}'")]
    MissingField { node: String, field: &'static str },

    #[error("node {node}: role {role} requires blockchainConfig")]
    MissingRoleConfig { node: String, role: String },

    #[error("node {node}: invalid {field}: {reason}")]
    InvalidField {
        node: String,
        field: &'static str,
        reason: String,
    },

    #[error("node {0}: duplicate node id")]
    DuplicateId(String),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Cleanup of a stale container failed. Logged, never fatal to the node.
    #[error("node {node}: conflict resolution failed: {source}")]
    ConflictResolution {
        node: String,
        #[source]
        source: BackendError,
    },

    #[error("node {node}: {source}")]
    Execution {
        node: String,
        #[source]
        source: BackendError,
    },

    #[error("container runtime unavailable: {0}")]
    BackendUnavailable(String),

    #[error("image preparation failed: {0}")]
    Image(String),
}

impl DeployError {
    /// Wrap a backend error raised while working on `node`. Unreachable
    /// runtimes are reported as such regardless of the step.
    pub(crate) fn execution(node: &str, source: BackendError) -> Self {
        match source {
            BackendError::Unavailable(msg) => DeployError::BackendUnavailable(msg),
            source => DeployError::Execution {
                node: node.to_string(),
                source,
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            DeployError::Validation(_) => FailureKind::Validation,
            DeployError::Provision(_) => FailureKind::Provision,
            DeployError::ConflictResolution { .. } => FailureKind::ConflictResolution,
            DeployError::Execution { .. } => FailureKind::Execution,
            DeployError::BackendUnavailable(_) => FailureKind::BackendUnavailable,
            DeployError::Image(_) => FailureKind::Image,
        }
    }
}

/// Category of a node failure, as recorded in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Provision,
    ConflictResolution,
    Execution,
    BackendUnavailable,
    Image,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Validation => "validation",
            FailureKind::Provision => "provision",
            FailureKind::ConflictResolution => "conflict_resolution",
            FailureKind::Execution => "execution",
            FailureKind::BackendUnavailable => "backend_unavailable",
            FailureKind::Image => "image",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
