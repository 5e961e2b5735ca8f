use std::path::Path;
use std::process::ExitCode;

use berth_deploy::validate_cluster;

pub fn validate(config_path: &Path, cluster_path: &Path) -> anyhow::Result<ExitCode> {
    let config = super::load_config(config_path)?;
    super::load_schemas(&config)?;
    let cluster = super::load_cluster(cluster_path)?;

    let mut invalid = 0;
    for (spec, checked) in cluster.nodes.iter().zip(validate_cluster(&cluster)) {
        match checked {
            Ok(node) => {
                println!("✓ Node {} validated ({})", node.id(), node.role());
                for advisory in node.advisories() {
                    println!("  ⚠ {advisory}");
                }
            }
            Err(e) => {
                invalid += 1;
                println!("✗ Node {}: {e}", spec.label());
            }
        }
    }

    println!(
        "\n{} of {} nodes valid",
        cluster.nodes.len() - invalid,
        cluster.nodes.len()
    );
    Ok(if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
