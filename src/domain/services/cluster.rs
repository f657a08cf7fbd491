//! Cluster service: creation, deployment and health evaluation.

use std::sync::Arc;

use tracing::{info, warn};

use super::node::NodeService;
use super::storage::StorageService;
use crate::config::ClusterConfig;
use crate::domain::entities::{
    Cluster, ClusterStatus, NodeConfig, NodeIdentity, NodeRole,
};
use crate::domain::repositories::ClusterRepository;
use crate::error::{AppError, Result};

pub struct ClusterService {
    cluster_repo: Arc<dyn ClusterRepository>,
    node_service: Arc<dyn NodeService>,
    storage_service: Arc<dyn StorageService>,
}

impl ClusterService {
    pub fn new(
        cluster_repo: Arc<dyn ClusterRepository>,
        node_service: Arc<dyn NodeService>,
        storage_service: Arc<dyn StorageService>,
    ) -> Self {
        Self {
            cluster_repo,
            node_service,
            storage_service,
        }
    }

    /// Create the cluster aggregate and register both node aggregates.
    pub async fn create_cluster(&self, config: &ClusterConfig) -> Result<Cluster> {
        let cluster = Cluster::new(config.clone())?;

        self.cluster_repo
            .save(&cluster)
            .await
            .map_err(|e| AppError::DatabaseError(format!("failed to save new cluster: {}", e)))?;

        let vip = &config.spec.network.vip;
        for node in &config.spec.nodes {
            let peer = config
                .spec
                .nodes
                .iter()
                .find(|other| other.ip != node.ip)
                .map(|other| NodeIdentity::new(&other.ip, &other.ip, other.role))
                .unwrap_or_else(|| NodeIdentity::new("", "", NodeRole::Unknown));

            self.node_service
                .register_node(
                    NodeConfig {
                        name: node.ip.clone(),
                        ip: node.ip.clone(),
                        role: node.role,
                    },
                    peer,
                    vip,
                )
                .await?;
        }

        info!(cluster = %cluster.id, "cluster created");
        Ok(cluster)
    }

    /// Deploy a created cluster: initialize the leader, then the follower,
    /// then wire replication between them. Strictly sequential; the first
    /// failure aborts the attempt and nothing is rolled back.
    pub async fn deploy_cluster(&self, cluster_id: &str) -> Result<()> {
        let mut cluster = self.load_cluster(cluster_id).await?;

        let leader = cluster.config.node_with_role(NodeRole::Leader).cloned();
        let follower = cluster.config.node_with_role(NodeRole::Follower).cloned();
        let (leader, follower) = match (leader, follower) {
            (Some(l), Some(f)) => (l, f),
            _ => {
                return Err(AppError::ValidationError(
                    "cluster config must have one leader and one follower".to_string(),
                ))
            }
        };

        info!(cluster = cluster_id, leader = %leader.ip, follower = %follower.ip, "deploying cluster");

        self.node_service
            .initialize_node(&leader.ip)
            .await
            .map_err(|e| {
                AppError::OrchestratorError(format!(
                    "failed to initialize leader node {}: {}",
                    leader.ip, e
                ))
            })?;

        self.node_service
            .initialize_node(&follower.ip)
            .await
            .map_err(|e| {
                AppError::OrchestratorError(format!(
                    "failed to initialize follower node {}: {}",
                    follower.ip, e
                ))
            })?;

        self.storage_service
            .configure_replication(&leader.ip, &follower.ip)
            .await
            .map_err(|e| {
                AppError::OrchestratorError(format!(
                    "failed to configure storage replication: {}",
                    e
                ))
            })?;

        cluster.change_status(ClusterStatus::Running);
        self.cluster_repo.save(&cluster).await
    }

    /// Evaluate cluster health: every node must be healthy and replication
    /// must be healthy for Running, anything less is Degraded. The resulting
    /// status is persisted.
    pub async fn check_cluster_health(&self, cluster_id: &str) -> Result<ClusterStatus> {
        let mut cluster = self.load_cluster(cluster_id).await?;

        let mut all_nodes_healthy = true;
        for node in &cluster.nodes {
            match self.node_service.check_node_health(&node.ip).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(node = %node.ip, "node reported unhealthy");
                    all_nodes_healthy = false;
                    break;
                }
                Err(e) => {
                    warn!(node = %node.ip, error = %e, "node health check failed");
                    all_nodes_healthy = false;
                    break;
                }
            }
        }

        // A failed replication *read* is not a verdict on replication
        // health; only an affirmative unhealthy answer degrades the cluster.
        let replication_healthy = match self.storage_service.is_replication_healthy().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(error = %e, "replication health check failed, ignoring");
                true
            }
        };

        let status = if all_nodes_healthy && replication_healthy {
            ClusterStatus::Running
        } else {
            ClusterStatus::Degraded
        };

        cluster.change_status(status);
        self.cluster_repo.save(&cluster).await?;
        Ok(status)
    }

    /// Fetch a cluster aggregate.
    pub async fn get_cluster(&self, cluster_id: &str) -> Result<Cluster> {
        self.load_cluster(cluster_id).await
    }

    /// Force a status transition, used to quiesce the cluster around
    /// destructive operations and during upgrades.
    pub async fn set_cluster_status(&self, cluster_id: &str, status: ClusterStatus) -> Result<()> {
        let mut cluster = self.load_cluster(cluster_id).await?;
        cluster.change_status(status);
        self.cluster_repo.save(&cluster).await
    }

    async fn load_cluster(&self, cluster_id: &str) -> Result<Cluster> {
        self.cluster_repo
            .find_by_id(cluster_id)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "could not load cluster with id {}: {}",
                    cluster_id, e
                ))
            })?
            .ok_or_else(|| {
                AppError::DatabaseError(format!("could not find cluster with id {}", cluster_id))
            })
    }
}
