//! The orchestration engine: the single entry point for every cluster
//! operation.
//!
//! The engine owns no business logic. It sequences domain-service calls and
//! plugin executions, assembles parameter bags, and wraps every error with a
//! domain-specific code before it crosses the boundary. Operations are never
//! retried here; retry policy belongs to the caller.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::registry::PluginRegistry;
use crate::config::{ClusterConfig, Manager as ConfigManager};
use crate::domain::entities::ClusterStatus;
use crate::domain::services::ClusterService;
use crate::error::Result;
use crate::plugins::{params, PluginParams};

/// Public contract of the orchestration engine.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Persist a freshly generated cluster configuration.
    async fn init(&self, config: &ClusterConfig, path: &Path) -> Result<()>;

    /// Create the cluster aggregate and run the deployment workflow.
    async fn deploy(&self, config: &ClusterConfig) -> Result<()>;

    /// Evaluate and return the current cluster status.
    async fn get_status(&self, config: &ClusterConfig) -> Result<ClusterStatus>;

    /// Promote the named follower to leader.
    async fn failover(&self, config: &ClusterConfig, promote_node: &str, force: bool)
        -> Result<()>;

    /// Upgrade the cluster to a new version.
    async fn upgrade(&self, config: &ClusterConfig, version: &str, strategy: &str) -> Result<()>;

    /// Replace a node with a fresh machine.
    async fn replace_node(
        &self,
        config: &ClusterConfig,
        old_node: &str,
        new_node_ip: &str,
    ) -> Result<()>;

    /// Snapshot the leader's database.
    async fn backup(&self, config: &ClusterConfig, destination: &str) -> Result<()>;

    /// Restore the leader's database from a snapshot.
    async fn restore(&self, config: &ClusterConfig, source: &str) -> Result<()>;
}

pub struct Engine {
    registry: Arc<PluginRegistry>,
    config_manager: Arc<ConfigManager>,
    cluster_service: Arc<ClusterService>,
}

impl Engine {
    pub fn new(
        registry: Arc<PluginRegistry>,
        config_manager: Arc<ConfigManager>,
        cluster_service: Arc<ClusterService>,
    ) -> Self {
        Self {
            registry,
            config_manager,
            cluster_service,
        }
    }

    fn base_params(config: &ClusterConfig) -> Result<PluginParams> {
        let mut bag = PluginParams::new();
        bag.insert("config".to_string(), params::config_value(config)?);
        Ok(bag)
    }

    fn operation_id() -> Uuid {
        Uuid::new_v4()
    }
}

#[async_trait]
impl Orchestrator for Engine {
    async fn init(&self, config: &ClusterConfig, path: &Path) -> Result<()> {
        info!(op = %Self::operation_id(), cluster = %config.metadata.name, "init");
        self.config_manager.save(config, path)
    }

    async fn deploy(&self, config: &ClusterConfig) -> Result<()> {
        info!(op = %Self::operation_id(), cluster = %config.metadata.name, "deploy");

        // The aggregate is persisted first; the plugin then drives the
        // deployment workflow against it.
        self.cluster_service.create_cluster(config).await?;

        let bag = Self::base_params(config)?;
        self.registry.execute("deploy", &bag).await?;
        Ok(())
    }

    async fn get_status(&self, config: &ClusterConfig) -> Result<ClusterStatus> {
        let bag = Self::base_params(config)?;
        let result = self.registry.execute("health", &bag).await?;

        // An ambiguous health answer degrades to Unknown instead of failing
        // the status call outright.
        let status = match result.data.get("status") {
            Some(Value::String(s)) => s
                .parse::<ClusterStatus>()
                .unwrap_or(ClusterStatus::Unknown),
            _ => ClusterStatus::Unknown,
        };
        Ok(status)
    }

    async fn failover(
        &self,
        config: &ClusterConfig,
        promote_node: &str,
        force: bool,
    ) -> Result<()> {
        info!(op = %Self::operation_id(), cluster = %config.metadata.name, promote = promote_node, "failover");

        let mut bag = Self::base_params(config)?;
        bag.insert("promote".to_string(), json!(promote_node));
        bag.insert("force".to_string(), json!(force));
        self.registry.execute("failover", &bag).await?;
        Ok(())
    }

    async fn upgrade(&self, config: &ClusterConfig, version: &str, strategy: &str) -> Result<()> {
        info!(op = %Self::operation_id(), cluster = %config.metadata.name, version, strategy, "upgrade");

        self.cluster_service
            .set_cluster_status(&config.metadata.name, ClusterStatus::Upgrading)
            .await?;

        let mut bag = Self::base_params(config)?;
        bag.insert("version".to_string(), json!(version));
        bag.insert("strategy".to_string(), json!(strategy));
        self.registry.execute("upgrade", &bag).await?;

        self.cluster_service
            .set_cluster_status(&config.metadata.name, ClusterStatus::Running)
            .await
    }

    async fn replace_node(
        &self,
        config: &ClusterConfig,
        old_node: &str,
        new_node_ip: &str,
    ) -> Result<()> {
        info!(op = %Self::operation_id(), cluster = %config.metadata.name, old = old_node, new = new_node_ip, "replace-node");

        self.cluster_service
            .set_cluster_status(&config.metadata.name, ClusterStatus::Reconciling)
            .await?;

        let mut bag = Self::base_params(config)?;
        bag.insert("old_node".to_string(), json!(old_node));
        bag.insert("new_node_ip".to_string(), json!(new_node_ip));
        self.registry.execute("replace-node", &bag).await?;

        self.cluster_service
            .set_cluster_status(&config.metadata.name, ClusterStatus::Running)
            .await
    }

    async fn backup(&self, config: &ClusterConfig, destination: &str) -> Result<()> {
        info!(op = %Self::operation_id(), cluster = %config.metadata.name, destination, "backup");

        let mut bag = Self::base_params(config)?;
        bag.insert("destination".to_string(), json!(destination));
        self.registry.execute("backup", &bag).await?;
        Ok(())
    }

    async fn restore(&self, config: &ClusterConfig, source: &str) -> Result<()> {
        info!(op = %Self::operation_id(), cluster = %config.metadata.name, source, "restore");

        // Quiesce before the destructive restore. If the restore fails the
        // cluster stays Reconciling, reflecting the last completed step.
        self.cluster_service
            .set_cluster_status(&config.metadata.name, ClusterStatus::Reconciling)
            .await?;

        let mut bag = Self::base_params(config)?;
        bag.insert("source".to_string(), json!(source));
        match self.registry.execute("restore", &bag).await {
            Ok(_) => {
                self.cluster_service
                    .set_cluster_status(&config.metadata.name, ClusterStatus::Running)
                    .await
            }
            Err(e) => {
                warn!(cluster = %config.metadata.name, error = %e, "restore failed, cluster left quiesced");
                Err(e)
            }
        }
    }
}
