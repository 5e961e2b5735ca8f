//! berth-deploy — the deployment reconciliation engine.
//!
//! Turns a [`ClusterSpec`](berth_core::ClusterSpec) into running containers:
//!
//! ```text
//!  ClusterSpec
//!      │
//!      ▼
//!  validate ──✗──► Failed(Validation)
//!      │
//!      ▼
//!  SecretProvisioner ──✗──► Failed(Provision)
//!      │  (address written back into the node)
//!      ▼
//!  PlanCompiler ──► RuntimePlan
//!      │
//!      ▼
//!  Reconciler: ConflictCheck → NetworkEnsure → Execute → Verify
//!      │                                        │
//!      ▼                                        ✗──► Failed(Execution)
//!  ClusterDeploymentReport (declaration order)
//! ```
//!
//! # Components
//!
//! - **`validate`**: required fields, identifier syntax, role config, advisories
//! - **`compile`**: pure node → [`RuntimePlan`](berth_core::RuntimePlan) mapping
//! - **`reconciler`**: per-node state machine against a
//!   [`RuntimeBackend`](berth_backend::RuntimeBackend)
//! - **`orchestrator`**: sequential or parallel dispatch, report aggregation
//! - **`image`**: make the node image available before deploying

pub mod compile;
pub mod error;
pub mod image;
pub mod orchestrator;
pub mod reconciler;
pub mod report;
pub mod validate;

pub use compile::{PlanCompiler, ProcessEnv, SecretLookup};
pub use error::{DeployError, DeployResult, FailureKind, ValidationError};
pub use image::{ImagePreparation, ImagePreparer};
pub use orchestrator::{DeployOptions, Orchestrator};
pub use reconciler::{Deployed, ReconcilePhase, Reconciler};
pub use report::{ClusterDeploymentReport, NodeOutcome, NodeReport, ProvisionedSecret};
pub use validate::{Advisory, ValidatedNode, validate, validate_cluster};
