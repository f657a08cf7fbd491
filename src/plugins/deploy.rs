//! Deployment workflow plugin.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{params, Plugin, PluginParams, PluginResult};
use crate::domain::services::ClusterService;
use crate::error::Result;

/// Drives the full cluster deployment workflow through the cluster service.
pub struct DeployPlugin {
    cluster_service: Arc<ClusterService>,
}

impl DeployPlugin {
    pub fn new(cluster_service: Arc<ClusterService>) -> Self {
        Self { cluster_service }
    }
}

#[async_trait]
impl Plugin for DeployPlugin {
    fn name(&self) -> &str {
        "deploy"
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

        info!(cluster = %cluster_name, "executing deploy plugin");
        self.cluster_service.deploy_cluster(&cluster_name).await?;

        Ok(PluginResult::ok(format!(
            "Cluster '{}' deployed successfully.",
            cluster_name
        )))
    }
}
