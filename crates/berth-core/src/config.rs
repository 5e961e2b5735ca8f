//! Configuration loading: cluster specs and `berth.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::ClusterSpec;

impl ClusterSpec {
    /// Load a cluster spec. `.toml` files are parsed as TOML, everything
    /// else as JSON.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = read(path)?;
        if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&content).map_err(|source| CoreError::Toml {
                path: path.to_path_buf(),
                source,
            })
        } else {
            serde_json::from_str(&content).map_err(|source| CoreError::Json {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// Engine settings. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub provisioning: ProvisioningConfig,
    pub deploy: DeployConfig,
    pub backend: BackendConfig,
    pub image: Option<ImageConfig>,
    pub paths: PathsConfig,
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = read(path)?;
        toml::from_str(&content).map_err(|source| CoreError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub mode: ProvisioningMode,
    pub keygen: KeygenConfig,
}

/// What to do when a node needs a secret that is not configured.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningMode {
    /// Fail the node and ask the operator to configure the value.
    #[default]
    Strict,
    /// Generate one through the external keygen.
    Auto,
}

/// External wallet generator invocation.
///
/// `{script}` and `{output}` in `args` are substituted at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeygenConfig {
    pub program: String,
    pub script: Option<PathBuf>,
    pub args: Vec<String>,
    /// Command whose success means the generator's dependencies are present.
    pub check: Option<Vec<String>>,
    /// Command run when `check` fails.
    pub install: Option<Vec<String>>,
}

impl Default for KeygenConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script: Some(PathBuf::from("keygen/boundless_wallet_gen.py")),
            args: vec![
                "{script}".to_string(),
                "generate".to_string(),
                "--output".to_string(),
                "{output}".to_string(),
            ],
            check: Some(vec![
                "python3".to_string(),
                "-c".to_string(),
                "import mnemonic, Crypto.Hash, nacl".to_string(),
            ]),
            install: Some(vec![
                "pip3".to_string(),
                "install".to_string(),
                "mnemonic".to_string(),
                "PyNaCl".to_string(),
                "pycryptodome".to_string(),
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Under the sequential strategy, skip remaining nodes after a failure.
    pub stop_on_failure: bool,
    /// Pause between starting a container and reading its status.
    pub settle_delay: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            stop_on_failure: false,
            settle_delay: "2s".to_string(),
        }
    }
}

impl DeployConfig {
    pub fn settle_delay(&self) -> CoreResult<Duration> {
        parse_duration(&self.settle_delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub binary: String,
    /// Upper bound for a single runtime command. Unset means no limit.
    pub command_timeout: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            command_timeout: None,
        }
    }
}

impl BackendConfig {
    pub fn command_timeout(&self) -> CoreResult<Option<Duration>> {
        self.command_timeout.as_deref().map(parse_duration).transpose()
    }
}

/// An image to make available before deploying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// `repository:tag` as the runtime reports it.
    pub reference: String,
    /// Archive URI used when the runtime lacks the image.
    pub source: Option<String>,
    /// Expected hex SHA-256 of the archive.
    pub sha256: Option<String>,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_download_dir() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub schemas_dir: Option<PathBuf>,
    pub credentials_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            schemas_dir: None,
            credentials_dir: PathBuf::from("."),
        }
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> CoreResult<Duration> {
    let t = s.trim();
    let parsed = if let Some(ms) = t.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = t.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = t.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        t.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| CoreError::InvalidDuration(s.to_string()))
}

fn read(path: &Path) -> CoreResult<String> {
    std::fs::read_to_string(path).map_err(|source| CoreError::Read {
        path: path.to_path_buf(),
        source,
    })
}
