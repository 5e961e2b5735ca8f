//! Docker CLI adapter.
//!
//! Each operation spawns the configured runtime binary (`docker` by
//! default; anything CLI-compatible such as `podman` works) and classifies
//! its exit status and stderr into the backend contract.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use berth_core::plan::{PlanSetting, RuntimePlan};

use crate::error::{BackendError, BackendResult};
use crate::{BackendFuture, ContainerHandle, RuntimeBackend};

/// Runtime backend that shells out to a Docker-compatible CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    timeout: Option<Duration>,
}

/// Captured output of one CLI invocation.
#[derive(Debug)]
struct CliOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Bound every CLI call. Without this a hung daemon hangs the caller.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn run(&self, args: &[String]) -> BackendResult<CliOutput> {
        self.run_shown(args, args).await
    }

    /// Run `args`, logging and reporting `shown` in their place. `shown`
    /// is the same invocation with secret values masked.
    async fn run_shown(&self, args: &[String], shown: &[String]) -> BackendResult<CliOutput> {
        let command = format!("{} {}", self.binary, shown.join(" "));
        debug!(%command, "running runtime command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(after) => tokio::time::timeout(after, cmd.output())
                .await
                .map_err(|_| BackendError::Timeout {
                    command: command.clone(),
                    after,
                })?,
            None => cmd.output().await,
        };

        let output = output.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                BackendError::Unavailable(format!("{} is not installed", self.binary))
            } else {
                BackendError::Spawn {
                    program: self.binary.clone(),
                    source,
                }
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() && is_daemon_down(&stderr) {
            return Err(BackendError::Unavailable(stderr));
        }

        Ok(CliOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr,
        })
    }

    /// Run and require success.
    async fn run_ok(&self, args: &[String]) -> BackendResult<CliOutput> {
        self.run_shown_ok(args, args).await
    }

    async fn run_shown_ok(&self, args: &[String], shown: &[String]) -> BackendResult<CliOutput> {
        let out = self.run_shown(args, shown).await?;
        if out.success {
            Ok(out)
        } else {
            Err(failed(&self.binary, shown, &out))
        }
    }

    /// Run a command whose "not found" failure means there is nothing to do.
    async fn run_idempotent(&self, args: &[String]) -> BackendResult<()> {
        let out = self.run(args).await?;
        if out.success || is_missing(&out.stderr) {
            Ok(())
        } else {
            Err(failed(&self.binary, args, &out))
        }
    }

    /// Run an inspect-style probe: success → true, "no such" → false.
    async fn probe(&self, args: &[String]) -> BackendResult<bool> {
        let out = self.run(args).await?;
        if out.success {
            Ok(true)
        } else if is_missing(&out.stderr) {
            Ok(false)
        } else {
            Err(failed(&self.binary, args, &out))
        }
    }
}

impl RuntimeBackend for DockerCli {
    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let args = strings(&["info", "--format", "{{.ServerVersion}}"]);
            let out = self.run(&args).await?;
            if out.success {
                debug!(version = %out.stdout, "container runtime reachable");
                Ok(())
            } else {
                Err(BackendError::Unavailable(out.stderr))
            }
        })
    }

    fn container_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let filter = format!("name=^/{name}$");
            let args = strings(&["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"]);
            let out = self.run_ok(&args).await?;
            Ok(out.stdout.lines().any(|line| line.trim() == name))
        })
    }

    fn stop_container<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.run_idempotent(&strings(&["stop", name])).await })
    }

    fn remove_container<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.run_idempotent(&strings(&["rm", name])).await })
    }

    fn create_and_start_container<'a>(
        &'a self,
        plan: &'a RuntimePlan,
    ) -> BackendFuture<'a, ContainerHandle> {
        Box::pin(async move {
            let args = docker_run_args(plan);
            let out = self.run_shown_ok(&args, &masked_run_args(plan)).await?;
            if !out.stderr.is_empty() {
                warn!(container = %plan.name, stderr = %out.stderr, "runtime reported warnings");
            }
            Ok(ContainerHandle { id: out.stdout })
        })
    }

    fn container_status<'a>(&'a self, name: &'a str) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let args = strings(&["inspect", "--format", "{{.State.Status}}", name]);
            let out = self.run(&args).await?;
            if out.success {
                Ok(out.stdout)
            } else if is_missing(&out.stderr) {
                Ok(String::new())
            } else {
                Err(failed(&self.binary, &args, &out))
            }
        })
    }

    fn network_exists<'a>(&'a self, name: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move { self.probe(&strings(&["network", "inspect", name])).await })
    }

    fn create_network<'a>(&'a self, name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let args = strings(&["network", "create", name]);
            let out = self.run(&args).await?;
            if out.success {
                Ok(())
            } else if out.stderr.contains("already exists") {
                Err(BackendError::AlreadyExists(format!("network {name}")))
            } else {
                Err(failed(&self.binary, &args, &out))
            }
        })
    }

    fn image_available<'a>(&'a self, reference: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move { self.probe(&strings(&["image", "inspect", reference])).await })
    }

    fn load_image<'a>(&'a self, archive: &'a Path) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let path = archive.display().to_string();
            let out = self.run_ok(&strings(&["load", "-i", &path])).await?;
            debug!(output = %out.stdout, "image loaded");
            Ok(())
        })
    }
}

// ── Plan serialization ───────────────────────────────────────────────

/// Full argv for `docker run` (without the binary itself).
pub fn docker_run_args(plan: &RuntimePlan) -> Vec<String> {
    let mut args = strings(&["run", "-d"]);
    args.extend(flag_groups(plan, false).into_iter().flatten());
    args
}

/// `docker_run_args` with secret-sourced values replaced by `***`.
fn masked_run_args(plan: &RuntimePlan) -> Vec<String> {
    let mut args = strings(&["run", "-d"]);
    args.extend(flag_groups(plan, true).into_iter().flatten());
    args
}

/// Human-readable multi-line rendering of the invocation for a plan.
/// Secret-sourced environment values are masked.
pub fn render_command(binary: &str, plan: &RuntimePlan) -> String {
    let mut lines = vec![format!("{binary} run -d")];
    for group in flag_groups(plan, true) {
        let quoted: Vec<String> = group.iter().map(|t| shell_quote(t)).collect();
        lines.push(quoted.join(" "));
    }
    lines.join(" \\\n  ")
}

/// Tokens grouped per flag, in plan order: one group renders as one line.
fn flag_groups(plan: &RuntimePlan, mask_secrets: bool) -> Vec<Vec<String>> {
    let mut groups = vec![strings(&["--name", &plan.name])];

    for setting in &plan.settings {
        match setting {
            PlanSetting::Restart { policy } => {
                groups.push(strings(&["--restart", policy.as_str()]));
            }
            PlanSetting::User { user, group } => {
                groups.push(vec!["--user".to_string(), format!("{user}:{group}")]);
            }
            PlanSetting::ReadOnlyRootfs => groups.push(strings(&["--read-only"])),
            PlanSetting::CapDrop { capability } => {
                groups.push(vec![format!("--cap-drop={capability}")]);
            }
            PlanSetting::CpuLimit { cores } => groups.push(vec![format!("--cpus={cores}")]),
            PlanSetting::MemoryLimit { mib } => groups.push(vec![format!("--memory={mib}m")]),
            PlanSetting::Network { name, aliases } => {
                groups.push(strings(&["--network", name]));
                for alias in aliases {
                    groups.push(strings(&["--network-alias", alias]));
                }
            }
            PlanSetting::Publish(mapping) => {
                groups.push(vec![
                    "-p".to_string(),
                    format!("{}:{}", mapping.host, mapping.container),
                ]);
            }
            PlanSetting::Volume(mount) => {
                let source = mount.source.as_str();
                let suffix = if mount.read_only { ":ro" } else { "" };
                groups.push(vec![
                    "-v".to_string(),
                    format!("{source}:{}{suffix}", mount.target),
                ]);
            }
            PlanSetting::Env { name, value } => {
                let shown = if mask_secrets && value.is_secret() {
                    "***"
                } else {
                    value.expose()
                };
                groups.push(vec!["-e".to_string(), format!("{name}={shown}")]);
            }
            PlanSetting::LogDriver { driver } => {
                groups.push(strings(&["--log-driver", driver]));
            }
            PlanSetting::LogOpt { key, value } => {
                groups.push(vec!["--log-opt".to_string(), format!("{key}={value}")]);
            }
        }
    }

    groups.push(vec![plan.image.clone()]);
    for arg in &plan.args {
        let mut group = vec![arg.flag.clone()];
        if let Some(value) = &arg.value {
            group.push(value.clone());
        }
        groups.push(group);
    }
    groups
}

// ── Helpers ──────────────────────────────────────────────────────────

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn failed(binary: &str, args: &[String], out: &CliOutput) -> BackendError {
    BackendError::CommandFailed {
        command: format!("{binary} {}", args.join(" ")),
        code: out.code,
        stderr: out.stderr.clone(),
    }
}

/// stderr patterns for "the object you named does not exist".
fn is_missing(stderr: &str) -> bool {
    let s = stderr.to_ascii_lowercase();
    s.contains("no such") || s.contains("not found")
}

fn is_daemon_down(stderr: &str) -> bool {
    stderr.contains("Cannot connect to the Docker daemon")
        || stderr.contains("Is the docker daemon running")
        || stderr.contains("error during connect")
}

fn shell_quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r"'\''"))
    }
}
