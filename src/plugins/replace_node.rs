//! Node replacement workflow plugin.
//!
//! Replaces a failed or retired follower with a fresh machine: provision the
//! newcomer, re-point replication at it, rewrite the fencing records on both
//! sides, and drop the old node from the control plane. The current leader
//! is never replaced directly; fail over first, then replace.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{params, Plugin, PluginParams, PluginResult};
use crate::domain::entities::{NodeConfig, NodeIdentity, NodeRole};
use crate::domain::services::{NodeService, StorageService};
use crate::error::{AppError, Result};

pub struct ReplaceNodePlugin {
    node_service: Arc<dyn NodeService>,
    storage_service: Arc<dyn StorageService>,
}

impl ReplaceNodePlugin {
    pub fn new(
        node_service: Arc<dyn NodeService>,
        storage_service: Arc<dyn StorageService>,
    ) -> Self {
        Self {
            node_service,
            storage_service,
        }
    }
}

#[async_trait]
impl Plugin for ReplaceNodePlugin {
    fn name(&self) -> &str {
        "replace-node"
    }

    fn version(&self) -> &str {
        "v0.1.0"
    }

    fn validate(&self, params: &PluginParams) -> Result<()> {
        params::require_keys(params, &["config", "old_node", "new_node_ip"])?;
        params::get_str(params, "old_node")?;
        params::get_str(params, "new_node_ip")?;
        Ok(())
    }

    async fn execute(&self, params: &PluginParams) -> Result<PluginResult> {
        let config = params::get_config(params)?;
        let old_node = params::get_str(params, "old_node")?;
        let new_node_ip = params::get_str(params, "new_node_ip")?;

        let leader = config.node_with_role(NodeRole::Leader).ok_or_else(|| {
            AppError::ValidationError("cluster config has no leader node".to_string())
        })?;
        if leader.ip == old_node {
            return Err(AppError::ValidationError(format!(
                "node {} is the current leader and cannot be replaced; fail over first",
                old_node
            )));
        }
        if !config.spec.nodes.iter().any(|n| n.ip == old_node) {
            return Err(AppError::ValidationError(format!(
                "node {} is not part of cluster '{}'",
                old_node, config.metadata.name
            )));
        }

        info!(cluster = %config.metadata.name, old = old_node, new = new_node_ip, "executing replace-node plugin");

        let leader_identity = NodeIdentity::new(&leader.ip, &leader.ip, NodeRole::Leader);
        let newcomer_identity = NodeIdentity::new(new_node_ip, new_node_ip, NodeRole::Follower);

        self.node_service
            .register_node(
                NodeConfig {
                    name: new_node_ip.to_string(),
                    ip: new_node_ip.to_string(),
                    role: NodeRole::Follower,
                },
                leader_identity,
                &config.spec.network.vip,
            )
            .await?;
        self.node_service.initialize_node(new_node_ip).await?;

        self.storage_service
            .configure_replication(&leader.ip, new_node_ip)
            .await?;

        // The surviving leader learns about its new peer.
        self.node_service
            .rebind_peer(&leader.ip, newcomer_identity)
            .await?;

        self.node_service.retire_node(old_node).await?;

        warn!(
            old = old_node,
            new = new_node_ip,
            "node replaced; update spec.nodes in the cluster configuration file"
        );

        Ok(PluginResult::ok(format!(
            "Node '{}' replaced by '{}'.",
            old_node, new_node_ip
        ))
        .with_data("old_node", json!(old_node))
        .with_data("new_node", json!(new_node_ip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type EventLog = Arc<Mutex<Vec<String>>>;

    struct MockNodes {
        log: EventLog,
    }

    #[async_trait]
    impl NodeService for MockNodes {
        async fn register_node(
            &self,
            config: NodeConfig,
            _peer: NodeIdentity,
            _vip: &str,
        ) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("register:{}", config.ip));
            Ok(())
        }

        async fn initialize_node(&self, node_ip: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("init:{}", node_ip));
            Ok(())
        }

        async fn promote_node_to_leader(&self, _node_ip: &str) -> Result<()> {
            Ok(())
        }

        async fn check_node_health(&self, _node_ip: &str) -> Result<bool> {
            Ok(true)
        }

        async fn rebind_peer(&self, node_ip: &str, peer: NodeIdentity) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("rebind:{}->{}", node_ip, peer.ip));
            Ok(())
        }

        async fn retire_node(&self, node_ip: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("retire:{}", node_ip));
            Ok(())
        }
    }

    struct MockStorage {
        log: EventLog,
    }

    #[async_trait]
    impl StorageService for MockStorage {
        async fn configure_replication(&self, leader: &str, follower: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("replication:{}->{}", leader, follower));
            Ok(())
        }

        async fn is_replication_healthy(&self) -> Result<bool> {
            Ok(true)
        }

        async fn backup(&self, _destination: &str) -> Result<()> {
            Ok(())
        }

        async fn restore(&self, _source: &str) -> Result<()> {
            Ok(())
        }
    }

    fn plugin_with_log() -> (ReplaceNodePlugin, EventLog) {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let plugin = ReplaceNodePlugin::new(
            Arc::new(MockNodes { log: log.clone() }),
            Arc::new(MockStorage { log: log.clone() }),
        );
        (plugin, log)
    }

    fn request(old_node: &str) -> PluginParams {
        let config = crate::config::ClusterConfig::new("demo", "10.0.0.1", "10.0.0.2", "10.0.0.9");
        let mut params = PluginParams::new();
        params.insert(
            "config".to_string(),
            params::config_value(&config).unwrap(),
        );
        params.insert("old_node".to_string(), json!(old_node));
        params.insert("new_node_ip".to_string(), json!("10.0.0.3"));
        params
    }

    #[tokio::test]
    async fn test_replace_follower_full_sequence() {
        let (plugin, log) = plugin_with_log();

        let result = plugin.execute(&request("10.0.0.2")).await.unwrap();
        assert!(result.success);

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "register:10.0.0.3",
                "init:10.0.0.3",
                "replication:10.0.0.1->10.0.0.3",
                "rebind:10.0.0.1->10.0.0.3",
                "retire:10.0.0.2",
            ]
        );
    }

    #[tokio::test]
    async fn test_replace_leader_is_refused() {
        let (plugin, log) = plugin_with_log();

        let err = plugin.execute(&request("10.0.0.1")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_unknown_node_is_refused() {
        let (plugin, log) = plugin_with_log();

        let err = plugin.execute(&request("10.9.9.9")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(log.lock().unwrap().is_empty());
    }
}
