use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;

use berth_backend::{ContainerStatus, RuntimeBackend};

use crate::output;

/// Cluster summary, live status per node, and operator commands.
pub async fn status(config_path: &Path, cluster_path: &Path) -> anyhow::Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let cluster = super::load_cluster(cluster_path)?;
    let docker = super::docker(&config)?;

    docker
        .ping()
        .await
        .with_context(|| format!("{} is not running or not installed", docker.binary()))?;

    println!("{}", output::format_cluster_summary(&cluster));
    println!("\nContainers:");
    for node in &cluster.nodes {
        let id = node.label();
        let status = match docker.container_status(id).await {
            Ok(raw) => ContainerStatus::parse(&raw).to_string(),
            Err(e) => format!("unknown ({e})"),
        };
        println!("  {id:<20} {status}");
    }
    println!("{}", output::format_hints(&cluster, docker.binary()));

    Ok(ExitCode::SUCCESS)
}
