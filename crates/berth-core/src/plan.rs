//! Runtime plans: the structured form of "run this container like so".
//!
//! A plan is a value: it is derived from a node descriptor and carries no
//! handles or hidden state. Backends decide how to serialize it for their
//! own transport.

use serde::{Deserialize, Serialize};

/// Ordered settings for a single container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimePlan {
    /// Container name (the node id).
    pub name: String,
    pub settings: Vec<PlanSetting>,
    /// `repository:tag`.
    pub image: String,
    /// Arguments passed to the image entrypoint, in order.
    pub args: Vec<TrailingArg>,
}

impl RuntimePlan {
    /// Networks the container joins, in declaration order.
    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.settings.iter().filter_map(|s| match s {
            PlanSetting::Network { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Published ports.
    pub fn ports(&self) -> impl Iterator<Item = &PortMapping> {
        self.settings.iter().filter_map(|s| match s {
            PlanSetting::Publish(mapping) => Some(mapping),
            _ => None,
        })
    }

    /// Trailing arguments flattened to argv tokens.
    pub fn argv(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() * 2);
        for arg in &self.args {
            out.push(arg.flag.clone());
            if let Some(value) = &arg.value {
                out.push(value.clone());
            }
        }
        out
    }
}

/// One declarative container setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanSetting {
    Restart { policy: RestartPolicy },
    User { user: u32, group: u32 },
    ReadOnlyRootfs,
    CapDrop { capability: String },
    CpuLimit { cores: f64 },
    MemoryLimit { mib: u64 },
    Network { name: String, aliases: Vec<String> },
    Publish(PortMapping),
    Volume(Mount),
    Env { name: String, value: EnvValue },
    LogDriver { driver: String },
    LogOpt { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// Host port → container port. Nodes publish ports 1:1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl PortMapping {
    pub fn same(port: u16) -> Self {
        Self {
            host: port,
            container: port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: MountSource,
    pub target: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountSource {
    HostPath(String),
    Named(String),
}

impl MountSource {
    pub fn as_str(&self) -> &str {
        match self {
            MountSource::HostPath(p) | MountSource::Named(p) => p,
        }
    }
}

/// An environment value, remembering whether it came from a secret so
/// that rendered output can mask it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvValue {
    Literal(String),
    Secret { key: String, value: String },
}

impl EnvValue {
    /// The value handed to the container.
    pub fn expose(&self) -> &str {
        match self {
            EnvValue::Literal(v) => v,
            EnvValue::Secret { value, .. } => value,
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, EnvValue::Secret { .. })
    }
}

impl std::fmt::Debug for EnvValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvValue::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            EnvValue::Secret { key, .. } => f
                .debug_struct("Secret")
                .field("key", key)
                .field("value", &"***")
                .finish(),
        }
    }
}

/// A flag with an optional value, e.g. `--coinbase addr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingArg {
    pub flag: String,
    pub value: Option<String>,
}

impl TrailingArg {
    pub fn flag(flag: &str) -> Self {
        Self {
            flag: flag.to_string(),
            value: None,
        }
    }

    pub fn with_value(flag: &str, value: impl Into<String>) -> Self {
        Self {
            flag: flag.to_string(),
            value: Some(value.into()),
        }
    }
}
