//! Reconciler: brings one container in line with its plan.
//!
//! ```text
//! Start → ConflictCheck → NetworkEnsure → Execute → Verify → Succeeded
//!              │               │             │
//!              └── cleanup     └── create    └──────────────→ Failed
//!                  warnings        (exists = ok)
//! ```
//!
//! Conflict cleanup is best-effort and never fails the node. Verify only
//! records what the runtime reports after the settle delay.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use berth_backend::{BackendError, ContainerStatus, RuntimeBackend};
use berth_core::RuntimePlan;

use crate::error::{DeployError, DeployResult};

/// Where a node's reconciliation currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcilePhase {
    Start,
    ConflictCheck,
    NetworkEnsure,
    Execute,
    Verify,
    Succeeded,
    Failed { reason: String },
}

impl ReconcilePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcilePhase::Succeeded | ReconcilePhase::Failed { .. })
    }
}

/// Result of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployed {
    pub container_id: String,
    /// Status read back after the settle delay. `None` if it could not be read.
    pub status: Option<ContainerStatus>,
    /// Cleanup problems that were tolerated along the way.
    pub warnings: Vec<String>,
}

/// One node's pass through the state machine.
#[derive(Debug)]
struct Reconciliation<'a> {
    node: &'a str,
    phase: ReconcilePhase,
    warnings: Vec<String>,
}

impl<'a> Reconciliation<'a> {
    fn new(node: &'a str) -> Self {
        Self {
            node,
            phase: ReconcilePhase::Start,
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, next: ReconcilePhase) {
        debug_assert!(!self.phase.is_terminal(), "{} already finished", self.node);
        debug!(node = %self.node, from = ?self.phase, to = ?next, "reconcile phase");
        self.phase = next;
    }

    fn fail(&mut self, err: DeployError) -> DeployError {
        warn!(node = %self.node, phase = ?self.phase, error = %err, "reconcile failed");
        self.phase = ReconcilePhase::Failed {
            reason: err.to_string(),
        };
        err
    }

    /// Record a tolerated cleanup failure. Only an unreachable runtime stops
    /// the node here.
    fn tolerate(&mut self, source: BackendError) -> DeployResult<()> {
        if source.is_unavailable() {
            return Err(self.fail(DeployError::execution(self.node, source)));
        }
        let err = DeployError::ConflictResolution {
            node: self.node.to_string(),
            source,
        };
        warn!(node = %self.node, error = %err, "continuing after cleanup failure");
        self.warnings.push(err.to_string());
        Ok(())
    }
}

#[derive(Clone)]
pub struct Reconciler {
    backend: Arc<dyn RuntimeBackend>,
    settle_delay: Duration,
}

impl Reconciler {
    pub fn new(backend: Arc<dyn RuntimeBackend>, settle_delay: Duration) -> Self {
        Self {
            backend,
            settle_delay,
        }
    }

    /// Reconcile the container named by `plan`.
    ///
    /// Steps run strictly in order; Execute is attempted once.
    pub async fn reconcile(&self, plan: &RuntimePlan) -> DeployResult<Deployed> {
        let mut run = Reconciliation::new(&plan.name);

        run.enter(ReconcilePhase::ConflictCheck);
        self.resolve_conflict(&mut run).await?;

        run.enter(ReconcilePhase::NetworkEnsure);
        for network in plan.networks() {
            self.ensure_network(&mut run, network).await?;
        }

        run.enter(ReconcilePhase::Execute);
        let handle = match self.backend.create_and_start_container(plan).await {
            Ok(handle) => handle,
            Err(e) => return Err(run.fail(DeployError::execution(&plan.name, e))),
        };
        info!(node = %plan.name, container = %handle.id, "container started");

        run.enter(ReconcilePhase::Verify);
        let status = self.verify(&plan.name).await;

        run.enter(ReconcilePhase::Succeeded);
        Ok(Deployed {
            container_id: handle.id,
            status,
            warnings: run.warnings,
        })
    }

    async fn resolve_conflict(&self, run: &mut Reconciliation<'_>) -> DeployResult<()> {
        let name = run.node;
        let exists = match self.backend.container_exists(name).await {
            Ok(exists) => exists,
            Err(e) => {
                run.tolerate(e)?;
                return Ok(());
            }
        };
        if !exists {
            return Ok(());
        }

        info!(node = %name, "container already exists, stopping and removing");
        if let Err(e) = self.backend.stop_container(name).await {
            run.tolerate(e)?;
        }
        if let Err(e) = self.backend.remove_container(name).await {
            run.tolerate(e)?;
        }
        Ok(())
    }

    async fn ensure_network(
        &self,
        run: &mut Reconciliation<'_>,
        network: &str,
    ) -> DeployResult<()> {
        let exists = match self.backend.network_exists(network).await {
            Ok(exists) => exists,
            Err(e) => return Err(run.fail(DeployError::execution(run.node, e))),
        };
        if exists {
            debug!(node = %run.node, %network, "network exists");
            return Ok(());
        }

        match self.backend.create_network(network).await {
            Ok(()) => {
                info!(node = %run.node, %network, "network created");
                Ok(())
            }
            Err(BackendError::AlreadyExists(_)) => {
                debug!(node = %run.node, %network, "network created concurrently");
                Ok(())
            }
            Err(e) => Err(run.fail(DeployError::execution(run.node, e))),
        }
    }

    async fn verify(&self, name: &str) -> Option<ContainerStatus> {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        match self.backend.container_status(name).await {
            Ok(raw) => {
                let status = ContainerStatus::parse(&raw);
                if status.is_running() {
                    info!(node = %name, %status, "container running");
                } else if status.is_transient() {
                    info!(node = %name, %status, "container still starting");
                } else {
                    warn!(node = %name, %status, "container not running after start");
                }
                Some(status)
            }
            Err(e) => {
                warn!(node = %name, error = %e, "could not read container status");
                None
            }
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}
