use std::path::Path;
use std::process::ExitCode;

use berth_backend::docker::render_command;
use berth_deploy::{PlanCompiler, validate_cluster};
use berth_provision::Requirement;

/// Print the rendered runtime command for each node. Nothing is executed
/// and no secrets are provisioned.
pub fn plan(
    config_path: &Path,
    cluster_path: &Path,
    only: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let config = super::load_config(config_path)?;
    let cluster = super::load_cluster(cluster_path)?;
    let compiler = PlanCompiler::default();

    let mut shown = 0;
    let mut invalid = 0;
    for (spec, checked) in cluster.nodes.iter().zip(validate_cluster(&cluster)) {
        if only.is_some_and(|id| id != spec.label()) {
            continue;
        }
        shown += 1;
        println!("\n# {}", spec.label());
        match checked {
            Ok(node) => {
                if Requirement::of(node.spec()) == Requirement::Missing {
                    println!("# mining address not configured; it is provisioned at deploy time");
                }
                let plan = compiler.compile(&node);
                println!("{}", render_command(&config.backend.binary, &plan));
            }
            Err(e) => {
                invalid += 1;
                println!("# ✗ {e}");
            }
        }
    }

    if let (Some(id), 0) = (only, shown) {
        anyhow::bail!("no node named {id} in {}", cluster_path.display());
    }
    Ok(if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
