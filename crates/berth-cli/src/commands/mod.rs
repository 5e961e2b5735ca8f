pub mod deploy;
pub mod plan;
pub mod status;
pub mod validate;

use std::path::Path;

use anyhow::Context;

use berth_backend::DockerCli;
use berth_core::{ClusterSpec, EngineConfig, SchemaSet};

/// The legacy `AUTO_GENERATE_WALLET=true` switch. Read once, here.
pub fn auto_generate_from_env() -> bool {
    std::env::var("AUTO_GENERATE_WALLET").is_ok_and(|v| v == "true")
}

pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    EngineConfig::load_or_default(path)
        .with_context(|| format!("loading engine config {}", path.display()))
}

pub fn load_cluster(path: &Path) -> anyhow::Result<ClusterSpec> {
    let cluster = ClusterSpec::from_file(path)
        .with_context(|| format!("loading cluster spec {}", path.display()))?;
    println!("✓ Loaded cluster: {}", cluster.cluster_id);
    Ok(cluster)
}

/// Load schema documents when a schema directory is configured.
pub fn load_schemas(config: &EngineConfig) -> anyhow::Result<Option<SchemaSet>> {
    let Some(dir) = &config.paths.schemas_dir else {
        return Ok(None);
    };
    let schemas = SchemaSet::load_dir(dir)
        .with_context(|| format!("loading schemas from {}", dir.display()))?;
    println!("✓ Loaded {} schemas", schemas.len());
    Ok(Some(schemas))
}

pub fn docker(config: &EngineConfig) -> anyhow::Result<DockerCli> {
    let timeout = config
        .backend
        .command_timeout()
        .context("invalid backend.command_timeout")?;
    Ok(DockerCli::new(&config.backend.binary).with_timeout(timeout))
}
