//! Cluster orchestrator: runs every node through
//! validate → provision → compile → reconcile under the cluster's strategy.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use berth_backend::{BackendError, RuntimeBackend};
use berth_core::config::DeployConfig;
use berth_core::{ClusterSpec, CoreResult, DeploymentStrategy};
use berth_provision::{GeneratedSecret, SecretProvisioner};

use crate::compile::PlanCompiler;
use crate::error::{DeployError, DeployResult, FailureKind, ValidationError};
use crate::reconciler::Reconciler;
use crate::report::{ClusterDeploymentReport, NodeOutcome, NodeReport, ProvisionedSecret};
use crate::validate::{ValidatedNode, validate_cluster};

/// Per-run policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Sequential only: skip the remaining nodes once one fails.
    pub stop_on_failure: bool,
    /// Pause between starting a container and reading its status.
    pub settle_delay: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            stop_on_failure: false,
            settle_delay: Duration::from_secs(2),
        }
    }
}

impl DeployOptions {
    pub fn from_config(config: &DeployConfig) -> CoreResult<Self> {
        Ok(Self {
            stop_on_failure: config.stop_on_failure,
            settle_delay: config.settle_delay()?,
        })
    }
}

pub struct Orchestrator {
    backend: Arc<dyn RuntimeBackend>,
    provisioner: SecretProvisioner,
    compiler: PlanCompiler,
    options: DeployOptions,
    preflight: bool,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn RuntimeBackend>,
        provisioner: SecretProvisioner,
        options: DeployOptions,
    ) -> Self {
        Self {
            backend,
            provisioner,
            compiler: PlanCompiler::default(),
            options,
            preflight: true,
        }
    }

    /// Skip the preflight `ping` in [`deploy`](Self::deploy). For callers
    /// that have just checked the runtime themselves.
    pub fn assume_reachable(mut self) -> Self {
        self.preflight = false;
        self
    }

    pub fn with_compiler(mut self, compiler: PlanCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Deploy every node of `cluster`.
    ///
    /// Node failures are recorded in the report. Only an unreachable runtime
    /// at preflight is returned as an error. Without the preflight an
    /// unreachable runtime is reported per node instead. Generated mining
    /// addresses are written back into the corresponding node's mining config.
    pub async fn deploy(&self, cluster: &mut ClusterSpec) -> DeployResult<ClusterDeploymentReport> {
        let strategy = cluster.strategy();
        info!(
            cluster = %cluster.cluster_id,
            %strategy,
            nodes = cluster.nodes.len(),
            "deploying cluster"
        );

        if self.preflight {
            self.backend.ping().await.map_err(|e| match e {
                BackendError::Unavailable(msg) => DeployError::BackendUnavailable(msg),
                other => DeployError::BackendUnavailable(other.to_string()),
            })?;
        }

        let engine = Arc::new(NodeEngine {
            provisioner: self.provisioner.clone(),
            compiler: self.compiler.clone(),
            reconciler: Reconciler::new(self.backend.clone(), self.options.settle_delay),
        });
        let work: Vec<(String, Checked)> = cluster
            .nodes
            .iter()
            .map(|n| n.label().to_string())
            .zip(validate_cluster(cluster))
            .collect();

        let runs = match strategy {
            DeploymentStrategy::Sequential => self.run_sequential(&engine, work).await,
            DeploymentStrategy::Parallel => run_parallel(&engine, work).await,
        };

        let mut nodes = Vec::with_capacity(runs.len());
        let mut provisioned = Vec::new();
        for (spec, run) in cluster.nodes.iter_mut().zip(runs) {
            if let Some(secret) = run.secret {
                if let Some(mining) = spec.mining_mut() {
                    mining.coinbase = Some(secret.address.clone());
                }
                provisioned.push(ProvisionedSecret {
                    node_id: run.report.node_id.clone(),
                    secret,
                });
            }
            nodes.push(run.report);
        }

        let report = ClusterDeploymentReport {
            cluster_id: cluster.cluster_id.clone(),
            strategy,
            nodes,
            provisioned,
        };
        info!(
            cluster = %report.cluster_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "cluster deployment finished"
        );
        Ok(report)
    }

    async fn run_sequential(
        &self,
        engine: &NodeEngine,
        work: Vec<(String, Checked)>,
    ) -> Vec<NodeRun> {
        let mut runs = Vec::with_capacity(work.len());
        let mut halted = false;
        for (label, checked) in work {
            if halted {
                info!(node = %label, "skipped");
                runs.push(NodeRun::skipped(label));
                continue;
            }
            let run = engine.run(label, checked).await;
            match run.report.failure() {
                Some(FailureKind::BackendUnavailable) => {
                    error!(
                        node = %run.report.node_id,
                        "runtime unreachable, abandoning remaining nodes"
                    );
                    halted = true;
                }
                Some(_) if self.options.stop_on_failure => {
                    warn!(node = %run.report.node_id, "stopping after failure");
                    halted = true;
                }
                _ => {}
            }
            runs.push(run);
        }
        runs
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provisioner", &self.provisioner)
            .field("options", &self.options)
            .field("preflight", &self.preflight)
            .finish_non_exhaustive()
    }
}

/// One task per node; results are collected in declaration order.
async fn run_parallel(engine: &Arc<NodeEngine>, work: Vec<(String, Checked)>) -> Vec<NodeRun> {
    let handles: Vec<_> = work
        .into_iter()
        .map(|(label, checked)| {
            let engine = engine.clone();
            let task_label = label.clone();
            let handle = tokio::spawn(async move { engine.run(task_label, checked).await });
            (label, handle)
        })
        .collect();

    let mut runs = Vec::with_capacity(handles.len());
    for (label, handle) in handles {
        match handle.await {
            Ok(run) => runs.push(run),
            Err(e) => {
                error!(node = %label, error = %e, "node task aborted");
                runs.push(NodeRun::failed(
                    label,
                    FailureKind::Execution,
                    format!("node task aborted: {e}"),
                ));
            }
        }
    }
    runs
}

type Checked = Result<ValidatedNode, ValidationError>;

/// Shared by every node workflow of one run.
struct NodeEngine {
    provisioner: SecretProvisioner,
    compiler: PlanCompiler,
    reconciler: Reconciler,
}

struct NodeRun {
    report: NodeReport,
    secret: Option<GeneratedSecret>,
}

impl NodeRun {
    fn skipped(label: String) -> Self {
        Self {
            report: NodeReport::new(label, NodeOutcome::Skipped),
            secret: None,
        }
    }

    fn failed(label: String, kind: FailureKind, reason: String) -> Self {
        Self {
            report: NodeReport::new(label, NodeOutcome::Failed { kind, reason }),
            secret: None,
        }
    }
}

impl NodeEngine {
    async fn run(&self, label: String, checked: Checked) -> NodeRun {
        let mut node = match checked {
            Ok(node) => node,
            Err(e) => {
                warn!(node = %label, error = %e, "validation failed");
                let err = DeployError::from(e);
                return NodeRun::failed(label, err.kind(), err.to_string());
            }
        };
        info!(node = %node.id(), role = %node.role(), "deploying node");

        let mut report = NodeReport::new(node.id(), NodeOutcome::Skipped);
        report.advisories = node.advisories().to_vec();

        let secret = match self.provisioner.resolve(node.spec()).await {
            Ok(secret) => secret,
            Err(e) => {
                warn!(node = %node.id(), error = %e, "provisioning failed");
                let err = DeployError::from(e);
                report.outcome = NodeOutcome::Failed {
                    kind: err.kind(),
                    reason: err.to_string(),
                };
                return NodeRun {
                    report,
                    secret: None,
                };
            }
        };
        if let Some(generated) = &secret {
            node.apply_coinbase(&generated.address);
            report.generated_address = Some(generated.address.clone());
        }

        let plan = self.compiler.compile(&node);
        debug!(
            node = %node.id(),
            image = %plan.image,
            settings = plan.settings.len(),
            args = ?plan.argv(),
            "plan compiled"
        );

        report.outcome = match self.reconciler.reconcile(&plan).await {
            Ok(deployed) => {
                report.warnings = deployed.warnings;
                NodeOutcome::Succeeded {
                    container_id: deployed.container_id,
                    status: deployed.status,
                }
            }
            Err(e) => NodeOutcome::Failed {
                kind: e.kind(),
                reason: e.to_string(),
            },
        };
        NodeRun { report, secret }
    }
}
