//! External wallet generator.
//!
//! Wraps a keygen program (by default `python3 boundless_wallet_gen.py
//! generate --output <file>`) that writes a JSON wallet containing at least
//! an `address` and usually a `mnemonic`. The wallet file is written into a
//! private temp directory and removed once parsed; persisting the returned
//! secret is the caller's job.

use std::path::Path;
use std::process::{Output, Stdio};

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use berth_core::config::KeygenConfig;

use crate::error::{ProvisionError, ProvisionResult};
use crate::resolver::{GeneratedSecret, KeyMaterial};
use crate::{GenerateFuture, SecretGenerator};

const OUTPUT_PLACEHOLDER: &str = "{output}";
const SCRIPT_PLACEHOLDER: &str = "{script}";

/// Wallet JSON as written by the keygen.
#[derive(Debug, Deserialize)]
struct WalletFile {
    #[serde(default)]
    address: String,
    mnemonic: Option<String>,
}

/// [`SecretGenerator`] backed by an external command.
#[derive(Debug, Clone)]
pub struct KeygenGenerator {
    config: KeygenConfig,
}

impl KeygenGenerator {
    pub fn new(config: KeygenConfig) -> Self {
        Self { config }
    }

    async fn generate_wallet(&self, node_id: &str) -> ProvisionResult<GeneratedSecret> {
        if let Some(script) = &self.config.script {
            if !tokio::fs::try_exists(script).await.unwrap_or(false) {
                return Err(ProvisionError::GeneratorMissing(format!(
                    "keygen script not found: {}",
                    script.display()
                )));
            }
        }

        self.ensure_dependencies().await?;

        let workdir = tempfile::tempdir()?;
        let output_path = workdir.path().join(format!("wallet_{node_id}.json"));
        let args = self.expand_args(&output_path);
        let writes_file = self.config.args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER));

        info!(node = %node_id, program = %self.config.program, "running keygen");
        let mut argv = vec![self.config.program.clone()];
        argv.extend(args);
        let output = run(&argv).await?;
        if !output.status.success() {
            return Err(ProvisionError::GeneratorFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let raw = if writes_file {
            tokio::fs::read_to_string(&output_path).await.map_err(|e| {
                ProvisionError::MalformedOutput(format!(
                    "expected wallet file {}: {e}",
                    output_path.display()
                ))
            })?
        } else {
            String::from_utf8_lossy(&output.stdout).to_string()
        };

        parse_wallet(&raw)
    }

    /// Run the dependency check, installing on failure.
    async fn ensure_dependencies(&self) -> ProvisionResult<()> {
        let Some(check) = &self.config.check else {
            return Ok(());
        };
        if run(check).await.is_ok_and(|out| out.status.success()) {
            debug!("keygen dependencies present");
            return Ok(());
        }

        let Some(install) = &self.config.install else {
            return Err(ProvisionError::DependencyInstall(format!(
                "dependency check `{}` failed and no install command is configured",
                check.join(" ")
            )));
        };

        info!(command = %install.join(" "), "installing keygen dependencies");
        let out = run(install)
            .await
            .map_err(|e| ProvisionError::DependencyInstall(e.to_string()))?;
        if !out.status.success() {
            return Err(ProvisionError::DependencyInstall(
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    fn expand_args(&self, output: &Path) -> Vec<String> {
        let output = output.display().to_string();
        let script = self
            .config
            .script
            .as_ref()
            .map(|s| s.display().to_string())
            .unwrap_or_default();
        self.config
            .args
            .iter()
            .map(|a| {
                a.replace(OUTPUT_PLACEHOLDER, &output)
                    .replace(SCRIPT_PLACEHOLDER, &script)
            })
            .collect()
    }
}

impl SecretGenerator for KeygenGenerator {
    fn generate<'a>(&'a self, node_id: &'a str) -> GenerateFuture<'a> {
        Box::pin(self.generate_wallet(node_id))
    }
}

fn parse_wallet(raw: &str) -> ProvisionResult<GeneratedSecret> {
    let wallet: WalletFile = serde_json::from_str(raw)
        .map_err(|e| ProvisionError::MalformedOutput(e.to_string()))?;
    let address = wallet.address.trim().to_string();
    if address.is_empty() {
        return Err(ProvisionError::MalformedOutput(
            "wallet has no address".to_string(),
        ));
    }
    Ok(GeneratedSecret {
        address,
        key_material: wallet.mnemonic.map(KeyMaterial::new),
    })
}

async fn run(argv: &[String]) -> ProvisionResult<Output> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ProvisionError::GeneratorMissing("empty command".to_string()));
    };
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProvisionError::GeneratorMissing(format!("{program} not found"))
            } else {
                ProvisionError::Io(e)
            }
        })
}
