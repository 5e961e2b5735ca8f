//! berth-backend — the narrow interface the deploy engine uses to talk to
//! a container runtime.
//!
//! # Contract
//!
//! ```text
//! RuntimeBackend
//!   ├── ping                         reachability preflight
//!   ├── container_exists / status    observed state, always live
//!   ├── stop / remove                Ok when the container is already gone
//!   ├── create_and_start_container   one request per RuntimePlan
//!   ├── network_exists / create      create → AlreadyExists on a lost race
//!   └── image_available / load_image
//! ```
//!
//! [`DockerCli`] drives the `docker` binary. With the `test-support`
//! feature, [`mock::RecordingBackend`] records every call in order.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use berth_core::RuntimePlan;

pub mod docker;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use docker::DockerCli;
pub use error::{BackendError, BackendResult};

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

/// Operations on an external container runtime.
///
/// Implementations must be safe to call from concurrent node workflows;
/// individual operations are expected to be atomic on the runtime side.
pub trait RuntimeBackend: Send + Sync {
    /// Fails with [`BackendError::Unavailable`] when the runtime is unreachable.
    fn ping(&self) -> BackendFuture<'_, ()>;

    fn container_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool>;

    /// Stop a container. Absent or already-stopped containers are `Ok`.
    fn stop_container<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()>;

    /// Remove a container. Absent containers are `Ok`.
    fn remove_container<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()>;

    fn create_and_start_container<'a>(
        &'a self,
        plan: &'a RuntimePlan,
    ) -> BackendFuture<'a, ContainerHandle>;

    /// Raw runtime status text. Empty when the container does not exist.
    fn container_status<'a>(&'a self, name: &'a str) -> BackendFuture<'a, String>;

    fn network_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool>;

    /// Create a network. Reports [`BackendError::AlreadyExists`] if another
    /// caller created it first.
    fn create_network<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()>;

    fn image_available<'a>(&'a self, reference: &'a str) -> BackendFuture<'a, bool>;

    /// Load an image archive from a local path.
    fn load_image<'a>(&'a self, archive: &'a Path) -> BackendFuture<'a, ()>;
}

/// Handle to a started container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
}

/// Container status as observed after start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Running,
    Created,
    Restarting,
    Paused,
    Exited,
    Dead,
    Missing,
    Unknown(String),
}

impl ContainerStatus {
    /// Interpret either a state word (`running`) or a `docker ps` status
    /// line (`Up 3 seconds`, `Exited (1) 2 minutes ago`).
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase();
        if s.is_empty() {
            ContainerStatus::Missing
        } else if s.contains("(paused)") || s == "paused" {
            ContainerStatus::Paused
        } else if s.starts_with("restarting") {
            ContainerStatus::Restarting
        } else if s == "running" || s.starts_with("up") {
            ContainerStatus::Running
        } else if s == "created" {
            ContainerStatus::Created
        } else if s.starts_with("exited") {
            ContainerStatus::Exited
        } else if s == "dead" {
            ContainerStatus::Dead
        } else {
            ContainerStatus::Unknown(raw.trim().to_string())
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }

    /// States a freshly started container may pass through on its way up.
    pub fn is_transient(&self) -> bool {
        matches!(self, ContainerStatus::Created | ContainerStatus::Restarting)
    }

    pub fn label(&self) -> &str {
        match self {
            ContainerStatus::Running => "running",
            ContainerStatus::Created => "created",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Missing => "missing",
            ContainerStatus::Unknown(s) => s,
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_words() {
        assert_eq!(ContainerStatus::parse("running"), ContainerStatus::Running);
        assert_eq!(ContainerStatus::parse("created\n"), ContainerStatus::Created);
        assert_eq!(ContainerStatus::parse("exited"), ContainerStatus::Exited);
        assert_eq!(ContainerStatus::parse(""), ContainerStatus::Missing);
    }

    #[test]
    fn parses_ps_status_lines() {
        assert_eq!(ContainerStatus::parse("Up 2 seconds"), ContainerStatus::Running);
        assert_eq!(
            ContainerStatus::parse("Up 5 minutes (Paused)"),
            ContainerStatus::Paused
        );
        assert_eq!(
            ContainerStatus::parse("Restarting (1) 3 seconds ago"),
            ContainerStatus::Restarting
        );
        assert_eq!(
            ContainerStatus::parse("Exited (137) 1 hour ago"),
            ContainerStatus::Exited
        );
    }

    #[test]
    fn unknown_keeps_raw_text() {
        let status = ContainerStatus::parse("Removal In Progress");
        assert_eq!(status, ContainerStatus::Unknown("Removal In Progress".to_string()));
        assert!(!status.is_running());
        assert!(!status.is_transient());
        assert!(ContainerStatus::Restarting.is_transient());
    }
}
