//! File-backed HostMeta store.
//!
//! Each node's fencing record is a small YAML file kept per node, not in a
//! central database; this adapter keeps one file per node IP under a state
//! directory, written through the system operator.

use std::sync::Arc;

use async_trait::async_trait;

use super::SystemOperator;
use crate::domain::entities::HostMeta;
use crate::domain::repositories::HostMetaStore;
use crate::error::{AppError, Result};

pub struct FileHostMetaStore {
    system: Arc<dyn SystemOperator>,
    state_dir: String,
}

impl FileHostMetaStore {
    pub fn new(system: Arc<dyn SystemOperator>, state_dir: &str) -> Self {
        Self {
            system,
            state_dir: state_dir.trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, node_ip: &str) -> String {
        format!("{}/{}.yaml", self.state_dir, node_ip)
    }
}

#[async_trait]
impl HostMetaStore for FileHostMetaStore {
    async fn save(&self, node_ip: &str, meta: &HostMeta) -> Result<()> {
        let data = serde_yaml::to_string(meta)
            .map_err(|e| AppError::IoError(format!("failed to serialize hostmeta: {}", e)))?;
        self.system
            .write_file(&self.path_for(node_ip), data.as_bytes())
            .await
    }

    async fn load(&self, node_ip: &str) -> Result<Option<HostMeta>> {
        let data = match self.system.read_file(&self.path_for(node_ip)).await {
            Ok(data) => data,
            Err(AppError::IoError(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let meta = serde_yaml::from_slice(&data)
            .map_err(|e| AppError::IoError(format!("corrupt hostmeta for {}: {}", node_ip, e)))?;
        Ok(Some(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{NodeIdentity, NodeRole};
    use crate::infrastructure::ShellSystemOperator;

    #[tokio::test]
    async fn test_hostmeta_file_roundtrip() {
        let dir = std::env::temp_dir().join("duokube-hostmeta-test");
        let store = FileHostMetaStore::new(
            Arc::new(ShellSystemOperator::new()),
            dir.to_str().unwrap(),
        );

        let meta = HostMeta::new(
            NodeIdentity::new("node-a", "10.0.0.1", NodeRole::Leader),
            NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Follower),
            "10.0.0.9",
        );

        store.save("10.0.0.1", &meta).await.unwrap();
        let loaded = store.load("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(loaded, meta);

        assert!(store.load("10.0.0.99").await.unwrap().is_none());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
