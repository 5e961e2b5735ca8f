use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing::info;

use berth_backend::RuntimeBackend;
use berth_core::{EngineConfig, ProvisioningMode};
use berth_deploy::{DeployOptions, ImagePreparation, ImagePreparer, Orchestrator, ProvisionedSecret};
use berth_provision::{KeygenGenerator, SecretProvisioner};

use crate::output;

pub struct DeployFlags {
    pub auto_generate: bool,
    pub stop_on_failure: bool,
    pub json: bool,
}

pub async fn deploy(
    config_path: &Path,
    cluster_path: &Path,
    flags: DeployFlags,
) -> anyhow::Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let docker = super::docker(&config)?;
    let binary = docker.binary().to_string();
    let backend: Arc<dyn RuntimeBackend> = Arc::new(docker);

    backend
        .ping()
        .await
        .with_context(|| format!("{binary} is not running or not installed"))?;
    println!("✓ {binary} is available");

    super::load_schemas(&config)?;
    let mut cluster = super::load_cluster(cluster_path)?;

    if let Some(image) = &config.image {
        let prep = ImagePreparer::new(backend.clone())
            .with_download_dir(&image.download_dir)
            .ensure(&image.reference, image.source.as_deref(), image.sha256.as_deref())
            .await?;
        match prep {
            ImagePreparation::AlreadyPresent => println!("✓ Image {} available", image.reference),
            ImagePreparation::Loaded { archive, .. } => {
                println!("✓ Image {} loaded from {}", image.reference, archive.display())
            }
        }
    }

    let provisioner = provisioner(&config, flags.auto_generate);
    let mut options =
        DeployOptions::from_config(&config.deploy).context("invalid [deploy] section")?;
    options.stop_on_failure |= flags.stop_on_failure;
    info!(mode = ?provisioner.mode(), ?options, "starting deployment");

    println!(
        "{}",
        output::banner(&format!("DEPLOYING CLUSTER: {}", cluster.cluster_id))
    );
    let report = Orchestrator::new(backend, provisioner, options)
        .assume_reachable()
        .deploy(&mut cluster)
        .await?;

    let mut saved = Vec::with_capacity(report.provisioned.len());
    for provisioned in &report.provisioned {
        let path = save_credentials(&config.paths.credentials_dir, provisioned)?;
        saved.push((provisioned, path));
    }

    if flags.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", output::format_report(&report));
        println!("{}", output::format_cluster_summary(&cluster));
        println!("{}", output::format_hints(&cluster, &binary));
    }
    for (provisioned, path) in &saved {
        eprintln!(
            "✓ Wallet for {} ({}) saved to {}. Back it up securely.",
            provisioned.node_id,
            provisioned.secret.address,
            path.display()
        );
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn provisioner(config: &EngineConfig, auto_generate: bool) -> SecretProvisioner {
    let mode = if auto_generate {
        ProvisioningMode::Auto
    } else {
        config.provisioning.mode
    };
    match mode {
        ProvisioningMode::Strict => SecretProvisioner::strict(),
        ProvisioningMode::Auto => SecretProvisioner::auto_generate(Arc::new(
            KeygenGenerator::new(config.provisioning.keygen.clone()),
        )),
    }
}

/// Write a generated wallet to `<dir>/wallet_<node>_<epoch>.json`,
/// readable by the owner only.
fn save_credentials(dir: &Path, provisioned: &ProvisionedSecret) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let epoch = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let path = dir.join(format!("wallet_{}_{epoch}.json", provisioned.node_id));

    let body = serde_json::json!({
        "node_id": provisioned.node_id,
        "address": provisioned.secret.address,
        "mnemonic": provisioned.secret.key_material.as_ref().map(|k| k.expose()),
    });

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    file.write_all(serde_json::to_string_pretty(&body)?.as_bytes())?;
    Ok(path)
}
