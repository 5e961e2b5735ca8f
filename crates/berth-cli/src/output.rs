//! Console formatting for reports and operator hints.

use std::fmt::Write;

use berth_core::ClusterSpec;
use berth_deploy::{ClusterDeploymentReport, NodeOutcome};

const RULE: &str = "============================================================";

pub fn banner(title: &str) -> String {
    format!("\n{RULE}\n{title}\n{RULE}")
}

pub fn format_report(report: &ClusterDeploymentReport) -> String {
    let mut out = banner(&format!(
        "DEPLOYMENT COMPLETE: {} ({})",
        report.cluster_id, report.strategy
    ));
    out.push('\n');

    for node in &report.nodes {
        let _ = match &node.outcome {
            NodeOutcome::Succeeded {
                container_id,
                status,
            } => {
                let status = status.as_ref().map_or("unknown", |s| s.label());
                writeln!(
                    out,
                    "  ✓ {:<20} {status} (container {})",
                    node.node_id,
                    short_id(container_id)
                )
            }
            NodeOutcome::Failed { kind, reason } => {
                writeln!(out, "  ✗ {:<20} {kind}: {reason}", node.node_id)
            }
            NodeOutcome::Skipped => writeln!(out, "  - {:<20} skipped", node.node_id),
        };
        for advisory in &node.advisories {
            let _ = writeln!(out, "      ⚠ {advisory}");
        }
        for warning in &node.warnings {
            let _ = writeln!(out, "      ⚠ {warning}");
        }
        if let Some(address) = &node.generated_address {
            let _ = writeln!(out, "      generated address: {address}");
        }
    }

    let _ = write!(
        out,
        "\nSummary: {} succeeded, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
    out
}

pub fn format_cluster_summary(cluster: &ClusterSpec) -> String {
    let mut out = String::from("\nCluster Status:\n");
    let _ = writeln!(out, "  Cluster ID:  {}", cluster.cluster_id);
    let _ = writeln!(out, "  Environment: {}", cluster.environment);
    let _ = writeln!(out, "  Hub:         {}", cluster.hub);
    let _ = writeln!(out, "  Strategy:    {}", cluster.strategy());
    let _ = write!(out, "  Nodes:       {}", cluster.nodes.len());
    out
}

/// Commands an operator uses to manage each node.
pub fn format_hints(cluster: &ClusterSpec, binary: &str) -> String {
    let mut out = String::from("\nUseful commands:\n");
    for node in &cluster.nodes {
        let id = node.label();
        let _ = writeln!(out, "\n  {id}:");
        let _ = writeln!(out, "    View logs:    {binary} logs -f {id}");
        let _ = writeln!(out, "    Stop:         {binary} stop {id}");
        let _ = writeln!(out, "    Start:        {binary} start {id}");
        let _ = writeln!(out, "    Restart:      {binary} restart {id}");
        let _ = writeln!(out, "    Remove:       {binary} stop {id} && {binary} rm {id}");
        let _ = writeln!(out, "    Shell:        {binary} exec -it {id} /bin/sh");
        if let Some(net) = node.chain_network() {
            let _ = writeln!(out, "    RPC:          http://localhost:{}", net.rpc_port);
        }
        if let Some(port) = node.metrics_port() {
            let path = node
                .metrics
                .as_ref()
                .and_then(|m| m.path.as_deref())
                .unwrap_or("");
            let _ = writeln!(out, "    Metrics:      http://localhost:{port}{path}");
        }
    }
    out
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
