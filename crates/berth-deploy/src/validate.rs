//! Node descriptor validation.
//!
//! Checks run in a fixed order: required fields, identifier syntax, role
//! configuration, volumes. Security advisories never fail a node; they
//! are logged and carried on the [`ValidatedNode`].

use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use berth_core::{ClusterSpec, NodeRole, NodeSpec};

use crate::error::ValidationError;

/// Container names accepted by the runtime.
const ID_PATTERN: &str = r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$";

static ID_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

/// Non-fatal security findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    RunsAsRoot,
    PrivilegeEscalation,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::RunsAsRoot => f.write_str("running as root (not recommended)"),
            Advisory::PrivilegeEscalation => f.write_str("privilege escalation allowed"),
        }
    }
}

/// A node that passed validation. Only these reach the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedNode {
    spec: NodeSpec,
    id: String,
    role: NodeRole,
    advisories: Vec<Advisory>,
}

impl ValidatedNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> &NodeRole {
        &self.role
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }

    /// Record a provisioned mining address. This is the one field a
    /// deployment run may change.
    pub fn apply_coinbase(&mut self, address: &str) {
        if let Some(mining) = self.spec.mining_mut() {
            mining.coinbase = Some(address.to_string());
        }
    }
}

/// Validate one node descriptor. The descriptor itself is not modified.
pub fn validate(node: &NodeSpec) -> Result<ValidatedNode, ValidationError> {
    let label = node.label().to_string();
    let missing = |field| ValidationError::MissingField {
        node: label.clone(),
        field,
    };

    let id = node
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| missing("id"))?;
    let role = node.role.as_ref().ok_or_else(|| missing("role"))?;
    if node.image.is_none() {
        return Err(missing("image"));
    }
    if node.hub_connection.is_none() {
        return Err(missing("hubConnection"));
    }

    check_id(id)?;

    if role.requires_blockchain_config() && node.blockchain_config.is_none() {
        return Err(ValidationError::MissingRoleConfig {
            node: id.to_string(),
            role: role.to_string(),
        });
    }

    for (idx, volume) in node.volumes.iter().enumerate() {
        if volume.name.is_none() && volume.host_path.is_none() {
            return Err(ValidationError::InvalidField {
                node: id.to_string(),
                field: "volumes",
                reason: format!(
                    "volume {idx} ({}) has neither name nor hostPath",
                    volume.mount_path
                ),
            });
        }
    }

    let advisories = advisories(node);
    for advisory in &advisories {
        warn!(node = %id, "{advisory}");
    }
    debug!(node = %id, role = %role, "node validated");

    Ok(ValidatedNode {
        spec: node.clone(),
        id: id.to_string(),
        role: role.clone(),
        advisories,
    })
}

/// Validate every node of a cluster, in declaration order.
///
/// Besides the per-node checks, a node whose id was already used by an
/// earlier node fails with [`ValidationError::DuplicateId`].
pub fn validate_cluster(cluster: &ClusterSpec) -> Vec<Result<ValidatedNode, ValidationError>> {
    let mut seen = HashSet::new();
    cluster
        .nodes
        .iter()
        .map(|node| {
            let validated = validate(node)?;
            if !seen.insert(validated.id().to_string()) {
                return Err(ValidationError::DuplicateId(validated.id().to_string()));
            }
            Ok(validated)
        })
        .collect()
}

fn check_id(id: &str) -> Result<(), ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidField {
        node: id.to_string(),
        field: "id",
        reason,
    };
    match ID_RE.get_or_init(|| Regex::new(ID_PATTERN)) {
        Ok(re) if re.is_match(id) => Ok(()),
        Ok(_) => Err(invalid(format!("{id:?} does not match {ID_PATTERN}"))),
        Err(e) => Err(invalid(e.to_string())),
    }
}

fn advisories(node: &NodeSpec) -> Vec<Advisory> {
    let Some(security) = &node.security else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if security.run_as_user.unwrap_or(0) == 0 {
        out.push(Advisory::RunsAsRoot);
    }
    if security.allow_privilege_escalation {
        out.push(Advisory::PrivilegeEscalation);
    }
    out
}
