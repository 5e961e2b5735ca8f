//! berth-provision — obtain per-node secrets such as mining addresses.
//!
//! A [`SecretProvisioner`] is built once per run with an explicit
//! [`ProvisioningMode`]:
//!
//! - **Strict**: a node that needs an address and has none fails with
//!   [`ProvisionError::UnconfiguredSecret`].
//! - **Auto**: the address is produced by a [`SecretGenerator`], by
//!   default the external keygen wrapped by [`KeygenGenerator`].
//!
//! Generation is a single attempt; failures surface to the caller.

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod keygen;
pub mod resolver;

pub use berth_core::ProvisioningMode;
pub use error::{ProvisionError, ProvisionResult};
pub use keygen::KeygenGenerator;
pub use resolver::{GeneratedSecret, KeyMaterial, Requirement, SecretProvisioner};

/// Boxed future returned by [`SecretGenerator::generate`].
pub type GenerateFuture<'a> =
    Pin<Box<dyn Future<Output = ProvisionResult<GeneratedSecret>> + Send + 'a>>;

/// An external service that mints a fresh credential for a node.
pub trait SecretGenerator: Send + Sync {
    fn generate<'a>(&'a self, node_id: &'a str) -> GenerateFuture<'a>;
}
