//! Failover workflow plugin.
//!
//! Failover detection is external; this plugin performs the safe transition
//! once a promotion has been requested. Promoting a follower whose
//! replication is stale risks serving stale data as authoritative, so the
//! replication gate can only be skipped with an explicit `force`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::{params, Plugin, PluginParams, PluginResult};
use crate::domain::services::{NodeService, StorageService};
use crate::error::{AppError, Result};

pub struct FailoverPlugin {
    node_service: Arc<dyn NodeService>,
    storage_service: Arc<dyn StorageService>,
}

impl FailoverPlugin {
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
impl Plugin for FailoverPlugin {
    fn name(&self) -> &str {
        "failover"
    }

    fn version(&self) -> &str {
        "v0.1.0"
    }

    fn validate(&self, params: &PluginParams) -> Result<()> {
        params::require_keys(params, &["config", "promote"])?;
        params::get_str(params, "promote")?;
        Ok(())
    }

    async fn execute(&self, params: &PluginParams) -> Result<PluginResult> {
        let config = params::get_config(params)?;
        let promote_ip = params::get_str(params, "promote")?;
        let force = params::get_bool_or_false(params, "force")?;

        info!(cluster = %config.metadata.name, promote = promote_ip, force, "executing failover plugin");

        if !force {
            let healthy = self.storage_service.is_replication_healthy().await?;
            if !healthy {
                return Err(AppError::ValidationError(format!(
                    "replication to {} is not healthy; promoting it would risk data loss (pass force to override)",
                    promote_ip
                )));
            }
        } else {
            warn!(promote = promote_ip, "replication health gate bypassed by force");
        }

        self.node_service.promote_node_to_leader(promote_ip).await?;

        Ok(PluginResult::ok(format!(
            "Node '{}' promoted to leader.",
            promote_ip
        ))
        .with_data("new_leader", json!(promote_ip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{NodeConfig, NodeIdentity};
    use std::sync::Mutex;

    struct MockNodes {
        promoted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NodeService for MockNodes {
        async fn register_node(
            &self,
            _config: NodeConfig,
            _peer: NodeIdentity,
            _vip: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn initialize_node(&self, _node_ip: &str) -> Result<()> {
            Ok(())
        }

        async fn promote_node_to_leader(&self, node_ip: &str) -> Result<()> {
            self.promoted.lock().unwrap().push(node_ip.to_string());
            Ok(())
        }

        async fn check_node_health(&self, _node_ip: &str) -> Result<bool> {
            Ok(true)
        }

        async fn rebind_peer(&self, _node_ip: &str, _peer: NodeIdentity) -> Result<()> {
            Ok(())
        }

        async fn retire_node(&self, _node_ip: &str) -> Result<()> {
            Ok(())
        }
    }

    struct MockStorage {
        healthy: bool,
    }

    #[async_trait]
    impl StorageService for MockStorage {
        async fn configure_replication(&self, _leader: &str, _follower: &str) -> Result<()> {
            Ok(())
        }

        async fn is_replication_healthy(&self) -> Result<bool> {
            Ok(self.healthy)
        }

        async fn backup(&self, _destination: &str) -> Result<()> {
            Ok(())
        }

        async fn restore(&self, _source: &str) -> Result<()> {
            Ok(())
        }
    }

    fn request(force: bool) -> PluginParams {
        let config = crate::config::ClusterConfig::new("demo", "10.0.0.1", "10.0.0.2", "10.0.0.9");
        let mut params = PluginParams::new();
        params.insert(
            "config".to_string(),
            params::config_value(&config).unwrap(),
        );
        params.insert("promote".to_string(), json!("10.0.0.2"));
        if force {
            params.insert("force".to_string(), json!(true));
        }
        params
    }

    #[tokio::test]
    async fn test_failover_refuses_stale_replication_without_force() {
        let nodes = Arc::new(MockNodes {
            promoted: Mutex::new(Vec::new()),
        });
        let plugin = FailoverPlugin::new(nodes.clone(), Arc::new(MockStorage { healthy: false }));

        let err = plugin.execute(&request(false)).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert!(nodes.promoted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failover_force_overrides_replication_gate() {
        let nodes = Arc::new(MockNodes {
            promoted: Mutex::new(Vec::new()),
        });
        let plugin = FailoverPlugin::new(nodes.clone(), Arc::new(MockStorage { healthy: false }));

        let result = plugin.execute(&request(true)).await.unwrap();
        assert!(result.success);
        assert_eq!(*nodes.promoted.lock().unwrap(), vec!["10.0.0.2"]);
    }

    #[tokio::test]
    async fn test_failover_promotes_when_replication_healthy() {
        let nodes = Arc::new(MockNodes {
            promoted: Mutex::new(Vec::new()),
        });
        let plugin = FailoverPlugin::new(nodes.clone(), Arc::new(MockStorage { healthy: true }));

        let result = plugin.execute(&request(false)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.data["new_leader"], json!("10.0.0.2"));
    }

    #[test]
    fn test_validate_requires_promote() {
        let nodes = Arc::new(MockNodes {
            promoted: Mutex::new(Vec::new()),
        });
        let plugin = FailoverPlugin::new(nodes, Arc::new(MockStorage { healthy: true }));

        let mut params = PluginParams::new();
        params.insert("config".to_string(), json!({}));
        assert!(plugin.validate(&params).is_err());
    }
}
