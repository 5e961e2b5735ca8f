//! Errors raised while loading cluster specs and engine configuration.

use std::path::PathBuf;

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported source scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid source URI: {0}")]
    InvalidUri(String),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),
}
