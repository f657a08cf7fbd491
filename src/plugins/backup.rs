//! Backup workflow plugin.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{params, Plugin, PluginParams, PluginResult};
use crate::domain::services::StorageService;
use crate::error::Result;

/// Snapshots the current leader's database to a destination path.
pub struct BackupPlugin {
    storage_service: Arc<dyn StorageService>,
}

impl BackupPlugin {
    pub fn new(storage_service: Arc<dyn StorageService>) -> Self {
        Self { storage_service }
    }
}

#[async_trait]
impl Plugin for BackupPlugin {
    fn name(&self) -> &str {
        "backup"
    }

    fn version(&self) -> &str {
        "v0.1.0"
    }

    fn validate(&self, params: &PluginParams) -> Result<()> {
        params::require_keys(params, &["config", "destination"])?;
        params::get_str(params, "destination")?;
        Ok(())
    }

    async fn execute(&self, params: &PluginParams) -> Result<PluginResult> {
        let config = params::get_config(params)?;
        let destination = params::get_str(params, "destination")?;

        info!(cluster = %config.metadata.name, destination, "executing backup plugin");
        self.storage_service.backup(destination).await?;

        Ok(PluginResult::ok(format!(
            "Backup of cluster '{}' created at {}.",
            config.metadata.name, destination
        ))
        .with_data("destination", json!(destination)))
    }
}
