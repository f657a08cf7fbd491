//! Restore workflow plugin.
//!
//! Restore is destructive: concurrent writes during the restore would
//! corrupt state, so the plugin refuses to run unless the cluster has been
//! placed in a quiesced status first.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{params, Plugin, PluginParams, PluginResult};
use crate::domain::entities::ClusterStatus;
use crate::domain::services::{ClusterService, StorageService};
use crate::error::{AppError, Result};

pub struct RestorePlugin {
    cluster_service: Arc<ClusterService>,
    storage_service: Arc<dyn StorageService>,
}

impl RestorePlugin {
    pub fn new(
        cluster_service: Arc<ClusterService>,
        storage_service: Arc<dyn StorageService>,
    ) -> Self {
        Self {
            cluster_service,
            storage_service,
        }
    }
}

#[async_trait]
impl Plugin for RestorePlugin {
    fn name(&self) -> &str {
        "restore"
    }

    fn version(&self) -> &str {
        "v0.1.0"
    }

    fn validate(&self, params: &PluginParams) -> Result<()> {
        params::require_keys(params, &["config", "source"])?;
        params::get_str(params, "source")?;
        Ok(())
    }

    async fn execute(&self, params: &PluginParams) -> Result<PluginResult> {
        let config = params::get_config(params)?;
        let source = params::get_str(params, "source")?;
        let cluster_name = config.metadata.name.clone();

        let cluster = self.cluster_service.get_cluster(&cluster_name).await?;
        if !matches!(
            cluster.status,
            ClusterStatus::Upgrading | ClusterStatus::Reconciling
        ) {
            return Err(AppError::ValidationError(format!(
                "cluster '{}' is {}; restore requires a quiesced cluster (Upgrading or Reconciling)",
                cluster_name, cluster.status
            )));
        }

        info!(cluster = %cluster_name, source, "executing restore plugin");
        self.storage_service.restore(source).await?;

        Ok(PluginResult::ok(format!(
            "Cluster '{}' restored from {}.",
            cluster_name, source
        ))
        .with_data("source", json!(source)))
    }
}
