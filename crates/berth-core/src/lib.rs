//! berth-core — data model and configuration shared by every berth crate.
//!
//! - **`types`**: `ClusterSpec` / `NodeSpec` as read from `cluster.json`
//! - **`plan`**: `RuntimePlan`, the structured container invocation
//! - **`config`**: `berth.toml` engine settings and spec file loading
//! - **`source`**: image archive source URIs
//! - **`schema`**: named JSON schema documents

pub mod config;
pub mod error;
pub mod plan;
pub mod schema;
pub mod source;
pub mod types;

pub use config::{EngineConfig, ProvisioningMode};
pub use error::{CoreError, CoreResult};
pub use plan::RuntimePlan;
pub use schema::SchemaSet;
pub use source::ImageSource;
pub use types::*;
