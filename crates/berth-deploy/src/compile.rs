//! Command plan compiler: [`ValidatedNode`] → [`RuntimePlan`].
//!
//! Compilation is pure apart from secret-sourced environment values, which
//! are read through a [`SecretLookup`] at compile time. Settings are emitted
//! in a fixed order so that rendered plans are stable.

use std::collections::HashMap;
use std::sync::Arc;

use berth_core::plan::{
    EnvValue, Mount, MountSource, PlanSetting, PortMapping, RestartPolicy, TrailingArg,
};
use berth_core::{NodeSpec, RuntimePlan};

use crate::validate::ValidatedNode;

/// Source of values for `valueFromSecret` environment entries.
pub trait SecretLookup: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Reads secrets from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl SecretLookup for ProcessEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl SecretLookup for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Clone)]
pub struct PlanCompiler {
    secrets: Arc<dyn SecretLookup>,
}

impl Default for PlanCompiler {
    fn default() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }
}

impl std::fmt::Debug for PlanCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCompiler").finish_non_exhaustive()
    }
}

impl PlanCompiler {
    pub fn new(secrets: Arc<dyn SecretLookup>) -> Self {
        Self { secrets }
    }

    pub fn compile(&self, node: &ValidatedNode) -> RuntimePlan {
        let spec = node.spec();
        let mut settings = Vec::new();

        if spec.update_policy.as_ref().is_some_and(|u| u.auto_restart_on_failure) {
            settings.push(PlanSetting::Restart {
                policy: RestartPolicy::UnlessStopped,
            });
        }

        if let Some(security) = &spec.security {
            if let Some(user) = security.run_as_user {
                settings.push(PlanSetting::User {
                    user,
                    group: security.run_as_group.unwrap_or(user),
                });
            }
            if security.read_only_root_filesystem {
                settings.push(PlanSetting::ReadOnlyRootfs);
            }
            if let Some(caps) = &security.capabilities {
                settings.extend(caps.drop.iter().map(|cap| PlanSetting::CapDrop {
                    capability: cap.clone(),
                }));
            }
        }

        if let Some(resources) = &spec.resources {
            if let Some(cores) = resources.cpu.as_ref().and_then(|c| c.limit) {
                settings.push(PlanSetting::CpuLimit { cores });
            }
            if let Some(mib) = resources.memory.as_ref().and_then(|m| m.limit_mib) {
                settings.push(PlanSetting::MemoryLimit { mib });
            }
        }

        settings.extend(spec.networks.iter().map(|n| PlanSetting::Network {
            name: n.name.clone(),
            aliases: n.aliases.clone(),
        }));

        if let Some(net) = spec.chain_network() {
            settings.push(PlanSetting::Publish(PortMapping::same(net.p2p_port)));
            settings.push(PlanSetting::Publish(PortMapping::same(net.rpc_port)));
            if let Some(port) = spec.metrics_port() {
                settings.push(PlanSetting::Publish(PortMapping::same(port)));
            }
        }

        settings.extend(spec.volumes.iter().map(|v| {
            let source = match (&v.host_path, &v.name) {
                (Some(path), _) => MountSource::HostPath(path.clone()),
                (None, Some(name)) => MountSource::Named(name.clone()),
                (None, None) => MountSource::Named(String::new()),
            };
            PlanSetting::Volume(Mount {
                source,
                target: v.mount_path.clone(),
                read_only: v.read_only,
            })
        }));

        settings.extend(spec.env.iter().map(|var| {
            let literal = var.value.as_deref().filter(|v| !v.is_empty());
            let value = match (literal, &var.value_from_secret) {
                (Some(literal), _) => EnvValue::Literal(literal.to_string()),
                (None, Some(key)) => EnvValue::Secret {
                    key: key.clone(),
                    value: self.secrets.lookup(key).unwrap_or_default(),
                },
                (None, None) => EnvValue::Literal(String::new()),
            };
            PlanSetting::Env {
                name: var.name.clone(),
                value,
            }
        }));

        if let Some(logging) = &spec.logging {
            if let Some(driver) = &logging.driver {
                settings.push(PlanSetting::LogDriver {
                    driver: driver.clone(),
                });
            }
            if let Some(size) = &logging.max_size {
                settings.push(PlanSetting::LogOpt {
                    key: "max-size".to_string(),
                    value: size.clone(),
                });
            }
            if let Some(files) = logging.max_files {
                settings.push(PlanSetting::LogOpt {
                    key: "max-file".to_string(),
                    value: files.to_string(),
                });
            }
        }

        RuntimePlan {
            name: node.id().to_string(),
            settings,
            image: spec
                .image
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            args: trailing_args(node, spec),
        }
    }
}

/// Role arguments, always in the order: base path, mining, RPC host.
fn trailing_args(node: &ValidatedNode, spec: &NodeSpec) -> Vec<TrailingArg> {
    let Some(chain) = &spec.blockchain_config else {
        return Vec::new();
    };
    let mut args = Vec::new();

    if let Some(base) = chain.storage.as_ref().and_then(|s| s.base_path.as_ref()) {
        args.push(TrailingArg::with_value("--base-path", base.clone()));
    }

    if node.role().is_mining_capable() {
        if let Some(mining) = chain.mining.as_ref().filter(|m| m.enabled) {
            args.push(TrailingArg::flag("--mining"));
            if let Some(coinbase) = mining.configured_coinbase() {
                args.push(TrailingArg::with_value("--coinbase", coinbase));
            }
            if let Some(threads) = mining.threads {
                args.push(TrailingArg::with_value("--mining-threads", threads.to_string()));
            }
        }
    }

    if let Some(host) = chain.network.as_ref().and_then(|n| n.rpc_host.as_ref()) {
        args.push(TrailingArg::with_value("--rpc-host", host.clone()));
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    const MINER: &str = r#"{
        "id": "miner-1",
        "role": "blockchain-miner",
        "image": { "repository": "boundless-bls-platform-blockchain", "tag": "v1" },
        "hubConnection": { "endpoint": "wss://hub.example.com" },
        "updatePolicy": { "autoRestartOnFailure": true },
        "security": {
            "runAsUser": 1000,
            "readOnlyRootFilesystem": true,
            "capabilities": { "drop": ["ALL", "NET_RAW"] }
        },
        "resources": { "cpu": { "limit": 1.5 }, "memory": { "limitMiB": 2048 } },
        "networks": [ { "name": "chain", "aliases": ["miner", "m1"] } ],
        "volumes": [
            { "name": "chain-data", "mountPath": "/data" },
            { "hostPath": "/etc/boundless", "mountPath": "/config", "readOnly": true }
        ],
        "env": [
            { "name": "RUST_LOG", "value": "info" },
            { "name": "HUB_TOKEN", "valueFromSecret": "BERTH_TEST_HUB_TOKEN" }
        ],
        "logging": { "driver": "json-file", "maxSize": "10m", "maxFiles": 3 },
        "blockchainConfig": {
            "mining": { "enabled": true, "coinbase": "addr123", "threads": 4 },
            "network": { "p2pPort": 30333, "rpcPort": 9933, "rpcHost": "0.0.0.0" },
            "storage": { "basePath": "/data/chain" }
        },
        "metrics": { "enabled": true, "port": 9615, "path": "/metrics" }
    }"#;

    fn compiler() -> PlanCompiler {
        let secrets: HashMap<String, String> =
            [("BERTH_TEST_HUB_TOKEN".to_string(), "s3cr3t".to_string())].into();
        PlanCompiler::new(Arc::new(secrets))
    }

    fn miner() -> ValidatedNode {
        let spec: NodeSpec = serde_json::from_str(MINER).unwrap();
        validate(&spec).unwrap()
    }

    #[test]
    fn settings_follow_declaration_order() {
        let plan = compiler().compile(&miner());
        assert_eq!(plan.name, "miner-1");
        assert_eq!(plan.image, "boundless-bls-platform-blockchain:v1");
        assert_eq!(
            plan.settings,
            vec![
                PlanSetting::Restart {
                    policy: RestartPolicy::UnlessStopped
                },
                PlanSetting::User {
                    user: 1000,
                    group: 1000
                },
                PlanSetting::ReadOnlyRootfs,
                PlanSetting::CapDrop {
                    capability: "ALL".into()
                },
                PlanSetting::CapDrop {
                    capability: "NET_RAW".into()
                },
                PlanSetting::CpuLimit { cores: 1.5 },
                PlanSetting::MemoryLimit { mib: 2048 },
                PlanSetting::Network {
                    name: "chain".into(),
                    aliases: vec!["miner".into(), "m1".into()],
                },
                PlanSetting::Publish(PortMapping::same(30333)),
                PlanSetting::Publish(PortMapping::same(9933)),
                PlanSetting::Publish(PortMapping::same(9615)),
                PlanSetting::Volume(Mount {
                    source: MountSource::Named("chain-data".into()),
                    target: "/data".into(),
                    read_only: false,
                }),
                PlanSetting::Volume(Mount {
                    source: MountSource::HostPath("/etc/boundless".into()),
                    target: "/config".into(),
                    read_only: true,
                }),
                PlanSetting::Env {
                    name: "RUST_LOG".into(),
                    value: EnvValue::Literal("info".into()),
                },
                PlanSetting::Env {
                    name: "HUB_TOKEN".into(),
                    value: EnvValue::Secret {
                        key: "BERTH_TEST_HUB_TOKEN".into(),
                        value: "s3cr3t".into(),
                    },
                },
                PlanSetting::LogDriver {
                    driver: "json-file".into()
                },
                PlanSetting::LogOpt {
                    key: "max-size".into(),
                    value: "10m".into()
                },
                PlanSetting::LogOpt {
                    key: "max-file".into(),
                    value: "3".into()
                },
            ]
        );
    }

    #[test]
    fn trailing_args_in_fixed_order() {
        let plan = compiler().compile(&miner());
        assert_eq!(
            plan.argv(),
            vec![
                "--base-path",
                "/data/chain",
                "--mining",
                "--coinbase",
                "addr123",
                "--mining-threads",
                "4",
                "--rpc-host",
                "0.0.0.0",
            ]
        );
    }

    #[test]
    fn compile_is_deterministic() {
        let node = miner();
        let c = compiler();
        assert_eq!(c.compile(&node), c.compile(&node));
    }

    #[test]
    fn explicit_group_is_kept() {
        let mut spec: NodeSpec = serde_json::from_str(MINER).unwrap();
        if let Some(sec) = spec.security.as_mut() {
            sec.run_as_group = Some(2000);
        }
        let plan = compiler().compile(&validate(&spec).unwrap());
        assert!(plan.settings.contains(&PlanSetting::User {
            user: 1000,
            group: 2000
        }));
    }

    #[test]
    fn metrics_port_needs_network_block() {
        let mut spec: NodeSpec = serde_json::from_str(MINER).unwrap();
        if let Some(chain) = spec.blockchain_config.as_mut() {
            chain.network = None;
        }
        let plan = compiler().compile(&validate(&spec).unwrap());
        assert_eq!(plan.ports().count(), 0);
        assert!(!plan.argv().contains(&"--rpc-host".to_string()));
    }

    #[test]
    fn disabled_metrics_publish_two_ports() {
        let mut spec: NodeSpec = serde_json::from_str(MINER).unwrap();
        if let Some(metrics) = spec.metrics.as_mut() {
            metrics.enabled = false;
        }
        let plan = compiler().compile(&validate(&spec).unwrap());
        let ports: Vec<u16> = plan.ports().map(|p| p.host).collect();
        assert_eq!(ports, vec![30333, 9933]);
    }

    #[test]
    fn missing_secret_compiles_to_empty_value() {
        let plan = PlanCompiler::new(Arc::new(HashMap::<String, String>::new())).compile(&miner());
        let token = plan.settings.iter().find_map(|s| match s {
            PlanSetting::Env { name, value } if name == "HUB_TOKEN" => Some(value.clone()),
            _ => None,
        });
        assert_eq!(
            token,
            Some(EnvValue::Secret {
                key: "BERTH_TEST_HUB_TOKEN".into(),
                value: String::new(),
            })
        );
    }

    #[test]
    fn empty_literal_falls_back_to_secret() {
        let spec: NodeSpec = serde_json::from_str(
            r#"{ "id": "web", "role": "generic",
                 "image": { "repository": "nginx" }, "hubConnection": {},
                 "env": [
                     { "name": "TOKEN", "value": "", "valueFromSecret": "BERTH_TEST_TOKEN" },
                     { "name": "BLANK", "value": "" }
                 ] }"#,
        )
        .unwrap();
        let secrets: HashMap<String, String> =
            [("BERTH_TEST_TOKEN".to_string(), "tok".to_string())].into();
        let plan = PlanCompiler::new(Arc::new(secrets)).compile(&validate(&spec).unwrap());
        assert_eq!(
            plan.settings,
            vec![
                PlanSetting::Env {
                    name: "TOKEN".into(),
                    value: EnvValue::Secret {
                        key: "BERTH_TEST_TOKEN".into(),
                        value: "tok".into(),
                    },
                },
                PlanSetting::Env {
                    name: "BLANK".into(),
                    value: EnvValue::Literal(String::new()),
                },
            ]
        );
    }

    #[test]
    fn mining_args_only_for_mining_roles() {
        let mut spec: NodeSpec = serde_json::from_str(MINER).unwrap();
        spec.role = Some(berth_core::NodeRole::Other("rpc-gateway".into()));
        let plan = compiler().compile(&validate(&spec).unwrap());
        assert_eq!(
            plan.argv(),
            vec!["--base-path", "/data/chain", "--rpc-host", "0.0.0.0"]
        );
    }

    #[test]
    fn placeholder_coinbase_is_never_emitted() {
        let mut spec: NodeSpec = serde_json::from_str(MINER).unwrap();
        if let Some(mining) = spec.mining_mut() {
            mining.coinbase = Some(berth_core::COINBASE_PLACEHOLDER.to_string());
        }
        let plan = compiler().compile(&validate(&spec).unwrap());
        assert!(!plan.argv().contains(&"--coinbase".to_string()));
    }

    #[test]
    fn generic_node_has_no_role_args() {
        let spec: NodeSpec = serde_json::from_str(
            r#"{ "id": "web", "role": "generic",
                 "image": { "repository": "nginx" }, "hubConnection": {} }"#,
        )
        .unwrap();
        let plan = compiler().compile(&validate(&spec).unwrap());
        assert!(plan.settings.is_empty());
        assert!(plan.args.is_empty());
        assert_eq!(plan.image, "nginx:latest");
    }
}
