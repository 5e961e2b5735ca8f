//! Cluster and node descriptors.
//!
//! These mirror the `cluster.json` format: camelCase keys, most blocks
//! optional. Required node fields are modelled as `Option` so that the
//! validator can report exactly which one is missing instead of failing
//! at parse time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder written into templates where an operator is expected to
/// fill in a mining address. Treated the same as an absent value.
pub const COINBASE_PLACEHOLDER: &str = "YOUR_ADDRESS_HERE";

// ── Cluster ───────────────────────────────────────────────────────

/// A declarative cluster: metadata, strategy, and the nodes to run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub cluster_id: String,
    #[serde(default)]
    pub environment: String,
    pub hub: HubEndpoint,
    #[serde(default)]
    pub orchestration: Orchestration,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl ClusterSpec {
    /// The strategy declared for this cluster (sequential when unset).
    pub fn strategy(&self) -> DeploymentStrategy {
        self.orchestration.deployment_strategy
    }
}

/// Where nodes phone home.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HubEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Orchestration {
    #[serde(default)]
    pub deployment_strategy: DeploymentStrategy,
}

/// How the nodes of a cluster are dispatched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStrategy {
    /// One node at a time, in declaration order.
    #[default]
    Sequential,
    /// All nodes concurrently.
    Parallel,
}

impl DeploymentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStrategy::Sequential => "sequential",
            DeploymentStrategy::Parallel => "parallel",
        }
    }
}

impl fmt::Display for DeploymentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// One workload to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub id: Option<String>,
    pub role: Option<NodeRole>,
    pub image: Option<ImageRef>,
    pub hub_connection: Option<HubConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkAttachment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_policy: Option<UpdatePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_config: Option<BlockchainConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

impl NodeSpec {
    /// Identifier for log lines and errors, even when the id is missing.
    pub fn label(&self) -> &str {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => "<unnamed>",
        }
    }

    pub fn mining(&self) -> Option<&MiningConfig> {
        self.blockchain_config.as_ref()?.mining.as_ref()
    }

    pub fn mining_mut(&mut self) -> Option<&mut MiningConfig> {
        self.blockchain_config.as_mut()?.mining.as_mut()
    }

    pub fn chain_network(&self) -> Option<&ChainNetwork> {
        self.blockchain_config.as_ref()?.network.as_ref()
    }

    /// Metrics port, when metrics are enabled and a port is declared.
    pub fn metrics_port(&self) -> Option<u16> {
        self.metrics.as_ref().filter(|m| m.enabled).and_then(|m| m.port)
    }
}

/// The job a node performs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    Generic,
    BlockchainMiner,
    /// Any role this engine has no special handling for.
    #[serde(untagged)]
    Other(String),
}

impl NodeRole {
    pub fn as_str(&self) -> &str {
        match self {
            NodeRole::Generic => "generic",
            NodeRole::BlockchainMiner => "blockchain-miner",
            NodeRole::Other(name) => name,
        }
    }

    /// Roles that cannot run without a `blockchainConfig` block.
    pub fn requires_blockchain_config(&self) -> bool {
        matches!(self, NodeRole::BlockchainMiner)
    }

    /// Roles that accept mining arguments and may need a provisioned address.
    pub fn is_mining_capable(&self) -> bool {
        matches!(self, NodeRole::BlockchainMiner)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container image reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// How a node reaches the hub. Only its presence is checked here.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HubConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub run_as_user: Option<u32>,
    pub run_as_group: Option<u32>,
    #[serde(default)]
    pub read_only_root_filesystem: bool,
    #[serde(default)]
    pub capabilities: Option<Capabilities>,
    #[serde(default)]
    pub allow_privilege_escalation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    #[serde(default)]
    pub drop: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Resources {
    pub cpu: Option<CpuResources>,
    pub memory: Option<MemoryResources>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuResources {
    /// Fractional cores.
    pub limit: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryResources {
    #[serde(rename = "limitMiB")]
    pub limit_mib: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkAttachment {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    pub name: Option<String>,
    pub host_path: Option<String>,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    pub value: Option<String>,
    /// Name of a process environment variable holding the value.
    pub value_from_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingPolicy {
    pub driver: Option<String>,
    pub max_size: Option<String>,
    pub max_files: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePolicy {
    #[serde(default)]
    pub auto_restart_on_failure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BlockchainConfig {
    pub mining: Option<MiningConfig>,
    pub network: Option<ChainNetwork>,
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MiningConfig {
    #[serde(default)]
    pub enabled: bool,
    pub coinbase: Option<String>,
    pub threads: Option<u32>,
}

impl MiningConfig {
    /// The configured coinbase, ignoring empty values and the placeholder.
    pub fn configured_coinbase(&self) -> Option<&str> {
        self.coinbase
            .as_deref()
            .filter(|c| !c.is_empty() && *c != COINBASE_PLACEHOLDER)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainNetwork {
    pub p2p_port: u16,
    pub rpc_port: u16,
    pub rpc_host: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub base_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub port: Option<u16>,
    pub path: Option<String>,
}
