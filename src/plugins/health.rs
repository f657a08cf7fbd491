//! Health check workflow plugin.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{params, Plugin, PluginParams, PluginResult};
use crate::domain::services::ClusterService;
use crate::error::Result;

/// Evaluates cluster health and reports the resulting status in the result
/// envelope under `data["status"]`.
pub struct HealthPlugin {
    cluster_service: Arc<ClusterService>,
}

impl HealthPlugin {
    pub fn new(cluster_service: Arc<ClusterService>) -> Self {
        Self { cluster_service }
    }
}

#[async_trait]
impl Plugin for HealthPlugin {
    fn name(&self) -> &str {
        "health"
    }

    fn version(&self) -> &str {
        "v0.1.0"
    }

    fn validate(&self, params: &PluginParams) -> Result<()> {
        params::require_keys(params, &["config"])
    }

    async fn execute(&self, params: &PluginParams) -> Result<PluginResult> {
        let config = params::get_config(params)?;
        let cluster_name = config.metadata.name.clone();

        info!(cluster = %cluster_name, "executing health plugin");
        let status = self
            .cluster_service
            .check_cluster_health(&cluster_name)
            .await?;

        Ok(
            PluginResult::ok(format!("Cluster '{}' is {}.", cluster_name, status))
                .with_data("status", json!(status.to_string())),
        )
    }
}
