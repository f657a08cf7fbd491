//! Plugin system for duokube.
//!
//! Every long-running cluster operation (deploy, health, upgrade, backup,
//! restore, failover, replace-node) is a named, versioned workflow unit
//! implementing the same lifecycle contract: validate → execute → cleanup.
//! Validation runs before any side effect, so malformed calls fail fast.

pub mod backup;
pub mod deploy;
pub mod failover;
pub mod health;
pub mod params;
pub mod replace_node;
pub mod restore;
pub mod upgrade;

pub use backup::BackupPlugin;
pub use deploy::DeployPlugin;
pub use failover::FailoverPlugin;
pub use health::HealthPlugin;
pub use replace_node::ReplaceNodePlugin;
pub use restore::RestorePlugin;
pub use upgrade::UpgradePlugin;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// String-keyed parameter bag passed to a plugin. Each plugin documents its
/// own required keys; `config` is universal. Typed extraction lives in
/// [`params`] and always fails with a validation error, never a panic.
pub type PluginParams = HashMap<String, Value>;

/// Uniform result envelope returned by every plugin execution.
#[derive(Debug, Clone, Default)]
pub struct PluginResult {
    pub success: bool,
    pub message: String,
    pub data: HashMap<String, Value>,
}

impl PluginResult {
    pub fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

/// Contract every workflow unit implements.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Check that all required parameters are present and well-typed.
    /// Must not perform side effects.
    fn validate(&self, params: &PluginParams) -> Result<()>;

    /// Run the workflow.
    async fn execute(&self, params: &PluginParams) -> Result<PluginResult>;

    /// Release any resources held across the execution.
    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
