//! Deployment results.

use serde::{Deserialize, Serialize};

use berth_backend::ContainerStatus;
use berth_core::DeploymentStrategy;
use berth_provision::GeneratedSecret;

use crate::error::FailureKind;
use crate::validate::Advisory;

/// How one node's deployment ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    Succeeded {
        container_id: String,
        status: Option<ContainerStatus>,
    },
    Failed {
        kind: FailureKind,
        reason: String,
    },
    /// Not attempted because an earlier node failed.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    pub node_id: String,
    #[serde(flatten)]
    pub outcome: NodeOutcome,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<Advisory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Address provisioned during this run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_address: Option<String>,
}

impl NodeReport {
    pub(crate) fn new(node_id: impl Into<String>, outcome: NodeOutcome) -> Self {
        Self {
            node_id: node_id.into(),
            outcome,
            advisories: Vec::new(),
            warnings: Vec::new(),
            generated_address: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, NodeOutcome::Succeeded { .. })
    }

    /// Failure kind, if the node failed.
    pub fn failure(&self) -> Option<FailureKind> {
        match &self.outcome {
            NodeOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// A secret generated during the run. Persisting it is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedSecret {
    pub node_id: String,
    pub secret: GeneratedSecret,
}

/// Per-node outcomes of one run, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDeploymentReport {
    pub cluster_id: String,
    pub strategy: DeploymentStrategy,
    pub nodes: Vec<NodeReport>,
    #[serde(skip)]
    pub provisioned: Vec<ProvisionedSecret>,
}

impl ClusterDeploymentReport {
    pub fn succeeded(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn skipped(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.outcome, NodeOutcome::Skipped))
            .count()
    }

    /// Every node was deployed.
    pub fn is_success(&self) -> bool {
        self.succeeded() == self.nodes.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| n.failure().is_some())
    }

    pub fn node(&self, id: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node_id == id)
    }
}
