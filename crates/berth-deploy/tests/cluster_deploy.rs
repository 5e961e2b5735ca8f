//! Cluster deployment tests.
//!
//! Drive the orchestrator end to end against the in-memory recording
//! backend: provisioning policy, conflict handling, network races, and
//! both dispatch strategies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use berth_backend::mock::{BackendCall, RecordingBackend};
use berth_core::{ClusterSpec, DeploymentStrategy, NodeSpec, ProvisioningMode};
use berth_deploy::{DeployError, DeployOptions, FailureKind, NodeOutcome, Orchestrator};
use berth_provision::{
    GenerateFuture, GeneratedSecret, KeyMaterial, SecretGenerator, SecretProvisioner,
};

struct FixedGenerator {
    address: &'static str,
    calls: AtomicUsize,
}

impl FixedGenerator {
    fn new(address: &'static str) -> Arc<Self> {
        Arc::new(Self {
            address,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SecretGenerator for FixedGenerator {
    fn generate<'a>(&'a self, _node_id: &'a str) -> GenerateFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeneratedSecret {
                address: self.address.to_string(),
                key_material: Some(KeyMaterial::new("abandon abandon art")),
            })
        })
    }
}

fn miner(id: &str, coinbase: Option<&str>) -> NodeSpec {
    let coinbase = coinbase
        .map(|c| format!(r#", "coinbase": "{c}""#))
        .unwrap_or_default();
    serde_json::from_str(&format!(
        r#"{{
            "id": "{id}",
            "role": "blockchain-miner",
            "image": {{ "repository": "boundless-bls-platform-blockchain", "tag": "latest" }},
            "hubConnection": {{ "endpoint": "wss://hub.example.com" }},
            "networks": [ {{ "name": "boundless-net", "aliases": ["{id}"] }} ],
            "blockchainConfig": {{
                "mining": {{ "enabled": true{coinbase}, "threads": 2 }},
                "network": {{ "p2pPort": 30333, "rpcPort": 9933 }}
            }}
        }}"#
    ))
    .unwrap()
}

fn generic(id: &str) -> NodeSpec {
    serde_json::from_str(&format!(
        r#"{{
            "id": "{id}",
            "role": "generic",
            "image": {{ "repository": "nginx", "tag": "1.27" }},
            "hubConnection": {{}},
            "networks": [ {{ "name": "boundless-net" }} ]
        }}"#
    ))
    .unwrap()
}

fn cluster(strategy: DeploymentStrategy, nodes: Vec<NodeSpec>) -> ClusterSpec {
    let mut cluster: ClusterSpec = serde_json::from_str(
        r#"{
            "clusterId": "boundless-test",
            "environment": "test",
            "hub": { "protocol": "wss", "host": "hub.example.com", "port": 443 }
        }"#,
    )
    .unwrap();
    cluster.orchestration.deployment_strategy = strategy;
    cluster.nodes = nodes;
    cluster
}

fn options(stop_on_failure: bool) -> DeployOptions {
    DeployOptions {
        stop_on_failure,
        settle_delay: Duration::ZERO,
    }
}

fn orchestrator(
    backend: &Arc<RecordingBackend>,
    provisioner: SecretProvisioner,
    stop_on_failure: bool,
) -> Orchestrator {
    Orchestrator::new(backend.clone(), provisioner, options(stop_on_failure))
}

fn submitted_args(backend: &RecordingBackend, name: &str) -> Vec<String> {
    backend
        .submitted_plans()
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.argv())
        .unwrap_or_default()
}

fn contains_seq(haystack: &[String], needle: &[&str]) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w.iter().zip(needle).all(|(a, b)| a == b))
}

// ── Provisioning scenarios ────────────────────────────────────────

#[tokio::test]
async fn configured_address_skips_provisioning() {
    let backend = Arc::new(RecordingBackend::new());
    let generator = FixedGenerator::new("addrXYZ");
    let provisioner = SecretProvisioner::new(
        ProvisioningMode::Strict,
        Some(generator.clone() as Arc<dyn SecretGenerator>),
    );
    let mut spec = cluster(
        DeploymentStrategy::Sequential,
        vec![miner("n1", Some("addr123"))],
    );

    let report = orchestrator(&backend, provisioner, false)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(generator.calls(), 0);
    assert!(report.provisioned.is_empty());
    assert!(contains_seq(
        &submitted_args(&backend, "n1"),
        &["--mining", "--coinbase", "addr123"]
    ));
}

#[tokio::test]
async fn strict_mode_placeholder_fails_before_backend_work() {
    let backend = Arc::new(RecordingBackend::new());
    let mut spec = cluster(
        DeploymentStrategy::Sequential,
        vec![miner("n1", Some("YOUR_ADDRESS_HERE"))],
    );

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .deploy(&mut spec)
        .await
        .unwrap();

    let node = report.node("n1").unwrap();
    assert_eq!(node.failure(), Some(FailureKind::Provision));
    match &node.outcome {
        NodeOutcome::Failed { reason, .. } => assert!(reason.contains("node n1")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(backend.calls(), vec![BackendCall::Ping]);
    assert!(backend.calls_for("n1").is_empty());
}

#[tokio::test]
async fn auto_mode_generates_and_writes_back_address() {
    let backend = Arc::new(RecordingBackend::new());
    let generator = FixedGenerator::new("addrXYZ");
    let mut spec = cluster(DeploymentStrategy::Sequential, vec![miner("n1", None)]);

    let report = orchestrator(
        &backend,
        SecretProvisioner::auto_generate(generator.clone()),
        false,
    )
    .deploy(&mut spec)
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(generator.calls(), 1);
    assert!(contains_seq(
        &submitted_args(&backend, "n1"),
        &["--coinbase", "addrXYZ"]
    ));
    assert_eq!(
        spec.nodes[0].mining().unwrap().coinbase.as_deref(),
        Some("addrXYZ")
    );
    assert_eq!(report.provisioned.len(), 1);
    assert_eq!(report.provisioned[0].node_id, "n1");
    assert_eq!(
        report.node("n1").unwrap().generated_address.as_deref(),
        Some("addrXYZ")
    );
}

#[tokio::test]
async fn provisioning_runs_once_per_node_and_only_when_needed() {
    let backend = Arc::new(RecordingBackend::new());
    let generator = FixedGenerator::new("addrXYZ");
    let mut spec = cluster(
        DeploymentStrategy::Parallel,
        vec![
            miner("m1", None),
            generic("g1"),
            miner("m2", Some("addr123")),
            miner("m3", Some("YOUR_ADDRESS_HERE")),
        ],
    );

    let report = orchestrator(
        &backend,
        SecretProvisioner::auto_generate(generator.clone()),
        false,
    )
    .deploy(&mut spec)
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(generator.calls(), 2);
    let generated: Vec<&str> = report
        .provisioned
        .iter()
        .map(|p| p.node_id.as_str())
        .collect();
    assert_eq!(generated, vec!["m1", "m3"]);
    assert_eq!(
        spec.nodes[2].mining().unwrap().coinbase.as_deref(),
        Some("addr123")
    );
}

#[tokio::test]
async fn secret_is_kept_when_execute_fails() {
    let backend = Arc::new(RecordingBackend::new().fail_create("n1"));
    let mut spec = cluster(DeploymentStrategy::Sequential, vec![miner("n1", None)]);

    let report = orchestrator(
        &backend,
        SecretProvisioner::auto_generate(FixedGenerator::new("addrXYZ")),
        false,
    )
    .deploy(&mut spec)
    .await
    .unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.provisioned.len(), 1);
    assert_eq!(
        spec.nodes[0].mining().unwrap().coinbase.as_deref(),
        Some("addrXYZ")
    );
}

// ── Sequential failure policy ─────────────────────────────────────

fn three_nodes() -> ClusterSpec {
    cluster(
        DeploymentStrategy::Sequential,
        vec![generic("n1"), generic("n2"), generic("n3")],
    )
}

#[tokio::test]
async fn sequential_continues_after_failure_by_default() {
    let backend = Arc::new(RecordingBackend::new().fail_create("n2"));
    let mut spec = three_nodes();

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert!(report.node("n1").unwrap().is_success());
    assert_eq!(
        report.node("n2").unwrap().failure(),
        Some(FailureKind::Execution)
    );
    assert!(report.node("n3").unwrap().is_success());
    assert_eq!((report.succeeded(), report.failed(), report.skipped()), (2, 1, 0));
}

#[tokio::test]
async fn sequential_stop_on_failure_skips_the_rest() {
    let backend = Arc::new(RecordingBackend::new().fail_create("n2"));
    let mut spec = three_nodes();

    let report = orchestrator(&backend, SecretProvisioner::strict(), true)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert!(report.node("n1").unwrap().is_success());
    assert_eq!(
        report.node("n2").unwrap().failure(),
        Some(FailureKind::Execution)
    );
    assert_eq!(report.node("n3").unwrap().outcome, NodeOutcome::Skipped);
    assert!(backend.calls_for("n3").is_empty());
    assert_eq!((report.succeeded(), report.failed(), report.skipped()), (1, 1, 1));
}

#[tokio::test]
async fn parallel_ignores_stop_on_failure() {
    let backend = Arc::new(RecordingBackend::new().fail_create("n2"));
    let mut spec = three_nodes();
    spec.orchestration.deployment_strategy = DeploymentStrategy::Parallel;

    let report = orchestrator(&backend, SecretProvisioner::strict(), true)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert_eq!((report.succeeded(), report.failed(), report.skipped()), (2, 1, 0));
}

// ── Reconciliation ────────────────────────────────────────────────

#[tokio::test]
async fn running_container_is_replaced_in_order() {
    let backend = Arc::new(RecordingBackend::new().with_container("n1", "Up 3 hours"));
    let mut spec = cluster(DeploymentStrategy::Sequential, vec![generic("n1")]);

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        backend.calls_for("n1"),
        vec![
            BackendCall::ContainerExists("n1".into()),
            BackendCall::StopContainer("n1".into()),
            BackendCall::RemoveContainer("n1".into()),
            BackendCall::CreateAndStart("n1".into()),
            BackendCall::ContainerStatus("n1".into()),
        ]
    );
}

#[tokio::test]
async fn redeploying_unchanged_cluster_succeeds() {
    let backend = Arc::new(RecordingBackend::new());
    let orch = orchestrator(&backend, SecretProvisioner::strict(), false);
    let mut spec = cluster(
        DeploymentStrategy::Sequential,
        vec![miner("n1", Some("addr123")), generic("n2")],
    );

    assert!(orch.deploy(&mut spec).await.unwrap().is_success());
    let second = orch.deploy(&mut spec).await.unwrap();

    assert!(second.is_success());
    assert_eq!(
        backend
            .calls_for("n1")
            .iter()
            .filter(|c| matches!(c, BackendCall::RemoveContainer(_)))
            .count(),
        1
    );
    assert_eq!(
        backend
            .calls_for("boundless-net")
            .iter()
            .filter(|c| matches!(c, BackendCall::CreateNetwork(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn parallel_nodes_share_a_network_safely() {
    let backend = Arc::new(
        RecordingBackend::new()
            .race_network("boundless-net")
            .with_latency(Duration::from_millis(5)),
    );
    let mut spec = cluster(
        DeploymentStrategy::Parallel,
        vec![generic("n1"), generic("n2"), generic("n3")],
    );

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(backend.has_network("boundless-net"));
}

#[tokio::test]
async fn parallel_report_keeps_declaration_order() {
    let backend = Arc::new(RecordingBackend::new().with_latency(Duration::from_millis(2)));
    let ids = ["n5", "n1", "n4", "n2", "n3"];
    let mut spec = cluster(
        DeploymentStrategy::Parallel,
        ids.iter().map(|id| generic(id)).collect(),
    );

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert_eq!(report.strategy, DeploymentStrategy::Parallel);
    let order: Vec<&str> = report.nodes.iter().map(|n| n.node_id.as_str()).collect();
    assert_eq!(order, ids);
}

// ── Validation and preflight ──────────────────────────────────────

#[tokio::test]
async fn invalid_nodes_never_reach_the_backend() {
    let backend = Arc::new(RecordingBackend::new());
    let mut missing_image = generic("bad");
    missing_image.image = None;
    let mut spec = cluster(
        DeploymentStrategy::Sequential,
        vec![generic("n1"), missing_image, generic("n1")],
    );

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .deploy(&mut spec)
        .await
        .unwrap();

    assert!(report.nodes[0].is_success());
    assert_eq!(report.nodes[1].failure(), Some(FailureKind::Validation));
    assert_eq!(report.nodes[2].failure(), Some(FailureKind::Validation));
    assert!(backend.calls_for("bad").is_empty());
    assert_eq!(
        backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::CreateAndStart(_)))
            .count(),
        1
    );
}

#[tokio::test]
async fn unreachable_runtime_aborts_the_run() {
    let backend = Arc::new(RecordingBackend::new().unavailable());
    let mut spec = three_nodes();

    let err = orchestrator(&backend, SecretProvisioner::strict(), false)
        .deploy(&mut spec)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::BackendUnavailable(_)));
    assert_eq!(backend.calls(), vec![BackendCall::Ping]);
}

#[tokio::test]
async fn caller_checked_runtime_skips_preflight() {
    let backend = Arc::new(RecordingBackend::new());
    let mut spec = cluster(DeploymentStrategy::Sequential, vec![generic("n1")]);

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .assume_reachable()
        .deploy(&mut spec)
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(!backend.calls().contains(&BackendCall::Ping));
}

#[tokio::test]
async fn unreachable_runtime_without_preflight_fails_per_node() {
    let backend = Arc::new(RecordingBackend::new().unavailable());
    let mut spec = three_nodes();

    let report = orchestrator(&backend, SecretProvisioner::strict(), false)
        .assume_reachable()
        .deploy(&mut spec)
        .await
        .unwrap();

    assert_eq!(report.nodes[0].failure(), Some(FailureKind::BackendUnavailable));
    assert_eq!(report.skipped(), 2);
}

// ── Secret handling against a CLI runtime ─────────────────────────

/// Write an executable stand-in for the runtime CLI that accepts every
/// command except `run`, which it rejects.
#[cfg(unix)]
fn rejecting_runtime(dir: &std::path::Path) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("runtime");
    std::fs::write(
        &path,
        "#!/bin/sh\n\
         case \"$1\" in\n\
           run) echo 'docker: Error response from daemon: invalid mount config' >&2; exit 125 ;;\n\
         esac\n\
         exit 0\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[cfg(unix)]
#[tokio::test]
async fn failed_create_reason_masks_secret_env() {
    use std::collections::HashMap;

    use berth_backend::DockerCli;
    use berth_deploy::PlanCompiler;

    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(DockerCli::new(rejecting_runtime(dir.path())));
    let secrets: HashMap<String, String> =
        [("BERTH_HUB_TOKEN".to_string(), "s3cr3t-token".to_string())].into();

    let mut node = generic("n1");
    node.env = serde_json::from_str(
        r#"[{ "name": "HUB_TOKEN", "valueFromSecret": "BERTH_HUB_TOKEN" }]"#,
    )
    .unwrap();
    let mut spec = cluster(DeploymentStrategy::Sequential, vec![node]);

    let report = Orchestrator::new(backend, SecretProvisioner::strict(), options(false))
        .with_compiler(PlanCompiler::new(Arc::new(secrets)))
        .deploy(&mut spec)
        .await
        .unwrap();

    let node = report.node("n1").unwrap();
    assert_eq!(node.failure(), Some(FailureKind::Execution));
    let NodeOutcome::Failed { reason, .. } = &node.outcome else {
        panic!("expected failure, got {:?}", node.outcome);
    };
    assert!(reason.contains("HUB_TOKEN=***"), "{reason}");
    assert!(reason.contains("invalid mount config"), "{reason}");
    assert!(!reason.contains("s3cr3t-token"), "{reason}");

    let json = serde_json::to_string(&report).unwrap();
    assert!(!json.contains("s3cr3t-token"));
}
