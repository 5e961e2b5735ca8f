//! Secret resolution policy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use berth_core::{NodeSpec, ProvisioningMode};

use crate::SecretGenerator;
use crate::error::{ProvisionError, ProvisionResult};

/// Recovery material for a generated credential. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn new(material: impl Into<String>) -> Self {
        Self(material.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(***)")
    }
}

/// A freshly generated credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSecret {
    pub address: String,
    pub key_material: Option<KeyMaterial>,
}

/// What a node needs from provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement<'a> {
    /// The node's role configuration does not ask for a secret.
    NotRequired,
    /// A usable value is already configured.
    Configured(&'a str),
    /// A value is required and absent (or still the placeholder).
    Missing,
}

impl<'a> Requirement<'a> {
    pub fn of(node: &'a NodeSpec) -> Self {
        let mining_role = node.role.as_ref().is_some_and(|r| r.is_mining_capable());
        match node.mining() {
            Some(mining) if mining_role && mining.enabled => match mining.configured_coinbase() {
                Some(address) => Requirement::Configured(address),
                None => Requirement::Missing,
            },
            _ => Requirement::NotRequired,
        }
    }
}

/// Resolves node secrets according to a fixed [`ProvisioningMode`].
#[derive(Clone)]
pub struct SecretProvisioner {
    mode: ProvisioningMode,
    generator: Option<Arc<dyn SecretGenerator>>,
}

impl SecretProvisioner {
    pub fn new(mode: ProvisioningMode, generator: Option<Arc<dyn SecretGenerator>>) -> Self {
        Self { mode, generator }
    }

    /// Never generates; missing secrets fail the node.
    pub fn strict() -> Self {
        Self::new(ProvisioningMode::Strict, None)
    }

    pub fn auto_generate(generator: Arc<dyn SecretGenerator>) -> Self {
        Self::new(ProvisioningMode::Auto, Some(generator))
    }

    pub fn mode(&self) -> ProvisioningMode {
        self.mode
    }

    /// Resolve the secret for one node.
    ///
    /// Returns `Ok(None)` when nothing has to be provisioned (not required,
    /// or already configured) and `Ok(Some(_))` with a freshly generated
    /// secret in auto mode.
    pub async fn resolve(&self, node: &NodeSpec) -> ProvisionResult<Option<GeneratedSecret>> {
        let node_id = node.label();
        match Requirement::of(node) {
            Requirement::NotRequired => Ok(None),
            Requirement::Configured(address) => {
                debug!(node = %node_id, address = %abbreviate(address), "using configured address");
                Ok(None)
            }
            Requirement::Missing => match (self.mode, &self.generator) {
                (ProvisioningMode::Strict, _) => {
                    Err(ProvisionError::UnconfiguredSecret(node_id.to_string()))
                }
                (ProvisioningMode::Auto, None) => Err(ProvisionError::GeneratorMissing(
                    "automatic generation enabled without a generator".to_string(),
                )),
                (ProvisioningMode::Auto, Some(generator)) => {
                    info!(node = %node_id, "mining address not configured, generating one");
                    let secret = generator.generate(node_id).await?;
                    info!(node = %node_id, address = %secret.address, "address generated");
                    Ok(Some(secret))
                }
            },
        }
    }
}

impl std::fmt::Debug for SecretProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretProvisioner")
            .field("mode", &self.mode)
            .field("generator", &self.generator.is_some())
            .finish()
    }
}

fn abbreviate(address: &str) -> String {
    match address.char_indices().nth(16) {
        Some((idx, _)) => format!("{}...", &address[..idx]),
        None => address.to_string(),
    }
}
