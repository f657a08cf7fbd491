//! Upgrade workflow plugin.
//!
//! The rolling strategy upgrades the follower first, fails over to it, then
//! upgrades the old leader, so one node serves throughout. The parallel
//! strategy upgrades both nodes in place without a role change; the cluster
//! is briefly unavailable but no failover occurs.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::{params, Plugin, PluginParams, PluginResult};
use crate::domain::entities::NodeRole;
use crate::domain::services::{NodeService, StorageService};
use crate::error::{AppError, Result};
use crate::infrastructure::SystemOperator;

/// How the two nodes are cycled through the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStrategy {
    Rolling,
    Parallel,
}

impl FromStr for UpgradeStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rolling" => Ok(UpgradeStrategy::Rolling),
            "parallel" => Ok(UpgradeStrategy::Parallel),
            other => Err(AppError::ValidationError(format!(
                "unknown upgrade strategy '{}'",
                other
            ))),
        }
    }
}

pub struct UpgradePlugin {
    node_service: Arc<dyn NodeService>,
    storage_service: Arc<dyn StorageService>,
    system: Arc<dyn SystemOperator>,
}

impl UpgradePlugin {
    pub fn new(
        node_service: Arc<dyn NodeService>,
        storage_service: Arc<dyn StorageService>,
        system: Arc<dyn SystemOperator>,
    ) -> Self {
        Self {
            node_service,
            storage_service,
            system,
        }
    }

    async fn upgrade_node(&self, node_ip: &str, version: &str) -> Result<()> {
        info!(node = node_ip, version, "upgrading node");
        let script = format!(
            "curl -sfL https://get.k3s.io | INSTALL_K3S_VERSION={} sh -",
            version
        );
        self.system
            .run_command("ssh", &[node_ip, &script])
            .await
            .map_err(|e| {
                AppError::OrchestratorError(format!(
                    "failed to upgrade {} to {}: {}",
                    node_ip, version, e
                ))
            })?;

        let healthy = self.node_service.check_node_health(node_ip).await?;
        if !healthy {
            return Err(AppError::OrchestratorError(format!(
                "node {} is unhealthy after upgrading to {}",
                node_ip, version
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Plugin for UpgradePlugin {
    fn name(&self) -> &str {
        "upgrade"
    }

    fn version(&self) -> &str {
        "v0.1.0"
    }

    fn validate(&self, params: &PluginParams) -> Result<()> {
        params::require_keys(params, &["config", "version"])?;
        params::get_str(params, "version")?;
        if params.contains_key("strategy") {
            params::get_str(params, "strategy")?.parse::<UpgradeStrategy>()?;
        }
        Ok(())
    }

    async fn execute(&self, params: &PluginParams) -> Result<PluginResult> {
        let config = params::get_config(params)?;
        let version = params::get_str(params, "version")?;
        let strategy = match params.get("strategy") {
            Some(_) => params::get_str(params, "strategy")?.parse()?,
            None => UpgradeStrategy::Rolling,
        };

        let leader = config.node_with_role(NodeRole::Leader).ok_or_else(|| {
            AppError::ValidationError("cluster config has no leader node".to_string())
        })?;
        let follower = config.node_with_role(NodeRole::Follower).ok_or_else(|| {
            AppError::ValidationError("cluster config has no follower node".to_string())
        })?;

        info!(cluster = %config.metadata.name, version, ?strategy, "executing upgrade plugin");

        // Pre-upgrade safety snapshot of the leader's database.
        let snapshot = format!(
            "/var/lib/duokube/backups/{}-pre-upgrade-{}.dump",
            config.metadata.name, version
        );
        self.storage_service.backup(&snapshot).await?;

        match strategy {
            UpgradeStrategy::Rolling => {
                self.upgrade_node(&follower.ip, version).await?;
                // The upgraded follower takes over before the old leader is
                // touched, so a working control plane survives every step.
                self.node_service.promote_node_to_leader(&follower.ip).await?;
                self.upgrade_node(&leader.ip, version).await?;
            }
            UpgradeStrategy::Parallel => {
                self.upgrade_node(&leader.ip, version).await?;
                self.upgrade_node(&follower.ip, version).await?;
            }
        }

        Ok(PluginResult::ok(format!(
            "Cluster '{}' upgraded to {} successfully.",
            config.metadata.name, version
        ))
        .with_data("version", json!(version))
        .with_data("snapshot", json!(snapshot)))
    }
}
