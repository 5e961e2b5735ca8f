//! Provisioning error types.

use thiserror::Error;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(
        "node {0}: mining address not configured; set blockchainConfig.mining.coinbase \
         or enable automatic generation"
    )]
    UnconfiguredSecret(String),

    #[error("secret generator not available: {0}")]
    GeneratorMissing(String),

    #[error("failed to install generator dependencies: {0}")]
    DependencyInstall(String),

    #[error("secret generator exited with {code:?}: {stderr}")]
    GeneratorFailed { code: Option<i32>, stderr: String },

    #[error("malformed generator output: {0}")]
    MalformedOutput(String),

    #[error("provisioning I/O error: {0}")]
    Io(#[from] std::io::Error),
}
