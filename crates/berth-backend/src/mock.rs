//! In-memory backend that records every call, for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use berth_core::RuntimePlan;

use crate::error::{BackendError, BackendResult};
use crate::{BackendFuture, ContainerHandle, RuntimeBackend};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Ping,
    ContainerExists(String),
    StopContainer(String),
    RemoveContainer(String),
    CreateAndStart(String),
    ContainerStatus(String),
    NetworkExists(String),
    CreateNetwork(String),
    ImageAvailable(String),
    LoadImage(PathBuf),
}

impl BackendCall {
    /// The container, network, or image the call targets.
    pub fn target(&self) -> Option<&str> {
        match self {
            BackendCall::Ping | BackendCall::LoadImage(_) => None,
            BackendCall::ContainerExists(n)
            | BackendCall::StopContainer(n)
            | BackendCall::RemoveContainer(n)
            | BackendCall::CreateAndStart(n)
            | BackendCall::ContainerStatus(n)
            | BackendCall::NetworkExists(n)
            | BackendCall::CreateNetwork(n)
            | BackendCall::ImageAvailable(n) => Some(n),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<BackendCall>,
    plans: Vec<RuntimePlan>,
    /// name → status text
    containers: HashMap<String, String>,
    networks: HashSet<String>,
    images: HashSet<String>,
    fail_create: HashSet<String>,
    fail_stop: HashSet<String>,
    racing_networks: HashSet<String>,
    start_status: Option<String>,
    unavailable: bool,
}

/// Backend double: containers, networks, and images live in memory.
///
/// `create_and_start_container` fails when a container with the same name
/// already exists, like a real runtime would.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    state: Mutex<MockState>,
    latency: Option<Duration>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, name: &str, status: &str) -> Self {
        self.lock().containers.insert(name.to_string(), status.to_string());
        self
    }

    pub fn with_network(self, name: &str) -> Self {
        self.lock().networks.insert(name.to_string());
        self
    }

    pub fn with_image(self, reference: &str) -> Self {
        self.lock().images.insert(reference.to_string());
        self
    }

    /// Reject plan submission for this container.
    pub fn fail_create(self, name: &str) -> Self {
        self.lock().fail_create.insert(name.to_string());
        self
    }

    /// Make `stop_container` fail for a reason other than absence.
    pub fn fail_stop(self, name: &str) -> Self {
        self.lock().fail_stop.insert(name.to_string());
        self
    }

    /// Report the network as absent, then answer create with
    /// `AlreadyExists`, as if another node created it in between.
    pub fn race_network(self, name: &str) -> Self {
        self.lock().racing_networks.insert(name.to_string());
        self
    }

    /// Status text new containers report (defaults to `running`).
    pub fn start_status(self, status: &str) -> Self {
        self.lock().start_status = Some(status.to_string());
        self
    }

    /// Every call fails with `Unavailable`.
    pub fn unavailable(self) -> Self {
        self.lock().unavailable = true;
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// Calls targeting one container or network name, in order.
    pub fn calls_for(&self, name: &str) -> Vec<BackendCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.target() == Some(name))
            .cloned()
            .collect()
    }

    pub fn submitted_plans(&self) -> Vec<RuntimePlan> {
        self.lock().plans.clone()
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.lock().containers.contains_key(name)
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.lock().networks.contains(name)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the call and apply latency / availability.
    async fn enter(&self, call: BackendCall) -> BackendResult<()> {
        let unavailable = {
            let mut state = self.lock();
            state.calls.push(call);
            state.unavailable
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if unavailable {
            return Err(BackendError::Unavailable("mock runtime is down".to_string()));
        }
        Ok(())
    }
}

impl RuntimeBackend for RecordingBackend {
    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(self.enter(BackendCall::Ping))
    }

    fn container_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.enter(BackendCall::ContainerExists(name.to_string())).await?;
            Ok(self.lock().containers.contains_key(name))
        })
    }

    fn stop_container<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.enter(BackendCall::StopContainer(name.to_string())).await?;
            let mut state = self.lock();
            if state.fail_stop.contains(name) {
                return Err(BackendError::CommandFailed {
                    command: format!("stop {name}"),
                    code: Some(1),
                    stderr: "permission denied".to_string(),
                });
            }
            if let Some(status) = state.containers.get_mut(name) {
                *status = "exited".to_string();
            }
            Ok(())
        })
    }

    fn remove_container<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.enter(BackendCall::RemoveContainer(name.to_string())).await?;
            self.lock().containers.remove(name);
            Ok(())
        })
    }

    fn create_and_start_container<'a>(
        &'a self,
        plan: &'a RuntimePlan,
    ) -> BackendFuture<'a, ContainerHandle> {
        Box::pin(async move {
            self.enter(BackendCall::CreateAndStart(plan.name.clone())).await?;
            let mut state = self.lock();
            state.plans.push(plan.clone());

            if state.fail_create.contains(&plan.name) {
                return Err(BackendError::CommandFailed {
                    command: format!("run {}", plan.name),
                    code: Some(125),
                    stderr: format!("unable to find image '{}'", plan.image),
                });
            }
            if state.containers.contains_key(&plan.name) {
                return Err(BackendError::CommandFailed {
                    command: format!("run {}", plan.name),
                    code: Some(125),
                    stderr: format!(
                        "Conflict. The container name \"/{}\" is already in use",
                        plan.name
                    ),
                });
            }

            let status = state
                .start_status
                .clone()
                .unwrap_or_else(|| "running".to_string());
            state.containers.insert(plan.name.clone(), status);
            Ok(ContainerHandle {
                id: format!("mock-{}", plan.name),
            })
        })
    }

    fn container_status<'a>(&'a self, name: &'a str) -> BackendFuture<'a, String> {
        Box::pin(async move {
            self.enter(BackendCall::ContainerStatus(name.to_string())).await?;
            Ok(self.lock().containers.get(name).cloned().unwrap_or_default())
        })
    }

    fn network_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.enter(BackendCall::NetworkExists(name.to_string())).await?;
            let state = self.lock();
            Ok(state.networks.contains(name) && !state.racing_networks.contains(name))
        })
    }

    fn create_network<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.enter(BackendCall::CreateNetwork(name.to_string())).await?;
            let mut state = self.lock();
            if state.racing_networks.contains(name) || !state.networks.insert(name.to_string()) {
                state.networks.insert(name.to_string());
                return Err(BackendError::AlreadyExists(format!("network {name}")));
            }
            Ok(())
        })
    }

    fn image_available<'a>(&'a self, reference: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            self.enter(BackendCall::ImageAvailable(reference.to_string())).await?;
            Ok(self.lock().images.contains(reference))
        })
    }

    fn load_image<'a>(&'a self, archive: &'a Path) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.enter(BackendCall::LoadImage(archive.to_path_buf())).await?;
            let name = archive
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.lock().images.insert(name);
            Ok(())
        })
    }
}
