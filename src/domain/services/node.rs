//! Node service: provisioning, role transitions and health checks.
//!
//! Promotion is the safety-critical path here. The sequence is fixed: fence
//! both nodes by stamping their HostMeta records with one shared instant,
//! re-point replication, demote the old leader, and only then move the VIP,
//! add-on-new before remove-from-old. A crash mid-sequence therefore leaves
//! the VIP answering on the old node rather than on no node or on two.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::storage::StorageService;
use crate::domain::entities::{HostMeta, Node, NodeConfig, NodeHealthState, NodeIdentity, NodeRole};
use crate::domain::repositories::{HostMetaStore, NodeRepository};
use crate::error::{AppError, Result};
use crate::infrastructure::{K8sClient, NetworkOperator, SystemOperator, VipAction};

const SSH_PORT: u16 = 22;
const K8S_API_PORT: u16 = 6443;

/// Provisioning steps run over SSH on a node being initialized.
const NODE_SETUP_STEPS: &[(&str, &str)] = &[
    (
        "install k3s",
        "curl -sfL https://get.k3s.io | INSTALL_K3S_SKIP_START=true sh -",
    ),
    (
        "install postgresql",
        "apt-get install -y --no-install-recommends postgresql",
    ),
    ("start services", "systemctl enable --now postgresql k3s"),
];

/// Public contract of the node service.
#[async_trait]
pub trait NodeService: Send + Sync {
    /// Create and persist a node aggregate together with its fencing record.
    async fn register_node(
        &self,
        config: NodeConfig,
        peer: NodeIdentity,
        vip: &str,
    ) -> Result<()>;

    /// Provision a registered node: install packages, configure services,
    /// write the HostMeta file. A half-initialized node is left as-is for
    /// the operator to inspect.
    async fn initialize_node(&self, node_ip: &str) -> Result<()>;

    /// Run the full promotion protocol for the follower at `node_ip`.
    async fn promote_node_to_leader(&self, node_ip: &str) -> Result<()>;

    /// Composite health check: node reachability plus API responsiveness.
    /// Collaborator errors are wrapped; callers treat an error as unhealthy.
    async fn check_node_health(&self, node_ip: &str) -> Result<bool>;

    /// Point a node's fencing record at a new peer (node replacement).
    async fn rebind_peer(&self, node_ip: &str, peer: NodeIdentity) -> Result<()>;

    /// Remove a node aggregate from the control plane's records.
    async fn retire_node(&self, node_ip: &str) -> Result<()>;
}

pub struct NodeManager {
    node_repo: Arc<dyn NodeRepository>,
    hostmeta_store: Arc<dyn HostMetaStore>,
    system: Arc<dyn SystemOperator>,
    network: Arc<dyn NetworkOperator>,
    k8s: Arc<dyn K8sClient>,
    storage: Arc<dyn StorageService>,
}

impl NodeManager {
    pub fn new(
        node_repo: Arc<dyn NodeRepository>,
        hostmeta_store: Arc<dyn HostMetaStore>,
        system: Arc<dyn SystemOperator>,
        network: Arc<dyn NetworkOperator>,
        k8s: Arc<dyn K8sClient>,
        storage: Arc<dyn StorageService>,
    ) -> Self {
        Self {
            node_repo,
            hostmeta_store,
            system,
            network,
            k8s,
            storage,
        }
    }

    async fn find_node(&self, node_ip: &str) -> Result<Node> {
        self.node_repo
            .find_by_ip(node_ip)
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError(format!("could not find node with ip {}", node_ip))
            })
    }
}

#[async_trait]
impl NodeService for NodeManager {
    async fn register_node(
        &self,
        config: NodeConfig,
        peer: NodeIdentity,
        vip: &str,
    ) -> Result<()> {
        let my_id = NodeIdentity::new(&config.name, &config.ip, config.role);
        let meta = HostMeta::new(my_id, peer, vip);
        let node = Node::new(config, meta)?;
        self.node_repo.save(&node).await
    }

    async fn initialize_node(&self, node_ip: &str) -> Result<()> {
        let mut node = self.find_node(node_ip).await?;
        info!(node = node_ip, "initializing node");

        self.network
            .check_connectivity(node_ip, SSH_PORT)
            .await
            .map_err(|e| {
                AppError::OrchestratorError(format!("node {} is unreachable: {}", node_ip, e))
            })?;

        for &(step, script) in NODE_SETUP_STEPS {
            self.system
                .run_command("ssh", &[node_ip, script])
                .await
                .map_err(|e| {
                    AppError::OrchestratorError(format!(
                        "failed to {} on {}: {}",
                        step, node_ip, e
                    ))
                })?;
        }

        self.hostmeta_store.save(node_ip, &node.host_meta).await?;

        node.update_health(NodeHealthState::Healthy, "initialization complete");
        self.node_repo.save(&node).await
    }

    async fn promote_node_to_leader(&self, node_ip: &str) -> Result<()> {
        let mut node = self.find_node(node_ip).await?;
        let peer_ip = node.host_meta.peer_id.ip.clone();
        let vip = node.host_meta.vip.clone();

        info!(node = node_ip, old_leader = %peer_ip, "starting promotion");

        // Fence first: both records carry the same transition instant so the
        // winner of any later reconciliation is unambiguous.
        let stamp = Utc::now();
        node.promote_at(stamp)?;
        node.host_meta.peer_id.role = NodeRole::Follower;

        let mut old_leader = self.find_node(&peer_ip).await?;
        old_leader.demote_at(stamp)?;
        old_leader.host_meta.peer_id.role = NodeRole::Leader;

        self.node_repo.save(&node).await?;
        self.node_repo.save(&old_leader).await?;

        self.hostmeta_store.save(node_ip, &node.host_meta).await?;
        if let Err(e) = self
            .hostmeta_store
            .save(&peer_ip, &old_leader.host_meta)
            .await
        {
            // The old leader may be partitioned away; the newer stamp on the
            // promoted node wins reconciliation once it comes back.
            warn!(node = %peer_ip, error = %e, "could not update old leader's fencing record");
        }

        // Replication now flows from the new leader to the old one.
        self.storage
            .configure_replication(node_ip, &peer_ip)
            .await
            .map_err(|e| {
                AppError::OrchestratorError(format!(
                    "failed to re-point replication to {}: {}",
                    node_ip, e
                ))
            })?;

        // VIP moves last: add on the new leader, then remove from the old.
        self.network
            .manage_vip(node_ip, VipAction::Add, &vip)
            .await?;
        self.network
            .manage_vip(&peer_ip, VipAction::Del, &vip)
            .await?;

        info!(node = node_ip, "promotion complete");
        Ok(())
    }

    async fn check_node_health(&self, node_ip: &str) -> Result<bool> {
        if let Err(e) = self.network.check_connectivity(node_ip, K8S_API_PORT).await {
            warn!(node = node_ip, error = %e, "node unreachable");
            if let Ok(Some(mut node)) = self.node_repo.find_by_ip(node_ip).await {
                node.update_health(NodeHealthState::Unhealthy, "unreachable");
                self.node_repo.save(&node).await.ok();
            }
            return Ok(false);
        }

        let healthy = self.k8s.check_api_health().await.map_err(|e| {
            AppError::KubernetesError(format!(
                "failed to probe kubernetes api for {}: {}",
                node_ip, e
            ))
        })?;

        if let Ok(Some(mut node)) = self.node_repo.find_by_ip(node_ip).await {
            let (state, message) = if healthy {
                (NodeHealthState::Healthy, "api responsive")
            } else {
                (NodeHealthState::Unhealthy, "api unresponsive")
            };
            node.update_health(state, message);
            self.node_repo.save(&node).await.ok();
        }

        Ok(healthy)
    }

    async fn rebind_peer(&self, node_ip: &str, peer: NodeIdentity) -> Result<()> {
        let mut node = self.find_node(node_ip).await?;
        node.host_meta.peer_id = peer;
        node.host_meta.last_modified = Utc::now();
        self.node_repo.save(&node).await?;
        self.hostmeta_store.save(node_ip, &node.host_meta).await
    }

    async fn retire_node(&self, node_ip: &str) -> Result<()> {
        info!(node = node_ip, "retiring node");
        self.node_repo.delete(node_ip).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::NodeRepository;
    use crate::infrastructure::InMemoryNodeRepository;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::RwLock;

    /// Shared, ordered record of every side effect the mocks perform.
    type EventLog = Arc<Mutex<Vec<String>>>;

    struct MockSystem {
        log: EventLog,
    }

    #[async_trait]
    impl SystemOperator for MockSystem {
        async fn run_command(&self, command: &str, args: &[&str]) -> Result<String> {
            self.log
                .lock()
                .unwrap()
                .push(format!("cmd:{} {}", command, args.join(" ")));
            Ok(String::new())
        }

        async fn write_file(&self, _path: &str, _content: &[u8]) -> Result<()> {
            Ok(())
        }

        async fn read_file(&self, _path: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    struct MockNetwork {
        log: EventLog,
    }

    #[async_trait]
    impl NetworkOperator for MockNetwork {
        async fn check_connectivity(&self, _host: &str, _port: u16) -> Result<()> {
            Ok(())
        }

        async fn manage_vip(&self, node_ip: &str, action: VipAction, vip: &str) -> Result<()> {
            let verb = match action {
                VipAction::Add => "add",
                VipAction::Del => "del",
            };
            self.log
                .lock()
                .unwrap()
                .push(format!("vip:{}:{}:{}", verb, node_ip, vip));
            Ok(())
        }
    }

    struct MockK8s;

    #[async_trait]
    impl K8sClient for MockK8s {
        async fn get_nodes(&self) -> Result<Vec<NodeIdentity>> {
            Ok(Vec::new())
        }

        async fn check_api_health(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct MockStorage {
        log: EventLog,
    }

    #[async_trait]
    impl StorageService for MockStorage {
        async fn configure_replication(&self, leader_ip: &str, follower_ip: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("replication:{}->{}", leader_ip, follower_ip));
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

    struct MemoryHostMetaStore {
        log: EventLog,
        records: RwLock<HashMap<String, HostMeta>>,
    }

    #[async_trait]
    impl HostMetaStore for MemoryHostMetaStore {
        async fn save(&self, node_ip: &str, meta: &HostMeta) -> Result<()> {
            self.log.lock().unwrap().push(format!("hostmeta:{}", node_ip));
            self.records
                .write()
                .await
                .insert(node_ip.to_string(), meta.clone());
            Ok(())
        }

        async fn load(&self, node_ip: &str) -> Result<Option<HostMeta>> {
            Ok(self.records.read().await.get(node_ip).cloned())
        }
    }

    struct Fixture {
        manager: NodeManager,
        repo: Arc<InMemoryNodeRepository>,
        store: Arc<MemoryHostMetaStore>,
        log: EventLog,
    }

    fn fixture() -> Fixture {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let repo = Arc::new(InMemoryNodeRepository::new());
        let store = Arc::new(MemoryHostMetaStore {
            log: log.clone(),
            records: RwLock::new(HashMap::new()),
        });
        let manager = NodeManager::new(
            repo.clone(),
            store.clone(),
            Arc::new(MockSystem { log: log.clone() }),
            Arc::new(MockNetwork { log: log.clone() }),
            Arc::new(MockK8s),
            Arc::new(MockStorage { log: log.clone() }),
        );
        Fixture {
            manager,
            repo,
            store,
            log,
        }
    }

    async fn register_pair(fixture: &Fixture) {
        fixture
            .manager
            .register_node(
                NodeConfig {
                    name: "node-a".to_string(),
                    ip: "10.0.0.1".to_string(),
                    role: NodeRole::Leader,
                },
                NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Follower),
                "10.0.0.9",
            )
            .await
            .unwrap();
        fixture
            .manager
            .register_node(
                NodeConfig {
                    name: "node-b".to_string(),
                    ip: "10.0.0.2".to_string(),
                    role: NodeRole::Follower,
                },
                NodeIdentity::new("node-a", "10.0.0.1", NodeRole::Leader),
                "10.0.0.9",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_initialize_node_runs_setup_and_writes_hostmeta() {
        let fixture = fixture();
        register_pair(&fixture).await;

        fixture.manager.initialize_node("10.0.0.1").await.unwrap();

        let log = fixture.log.lock().unwrap();
        assert_eq!(
            log.iter().filter(|e| e.starts_with("cmd:ssh")).count(),
            NODE_SETUP_STEPS.len()
        );
        assert!(log.iter().any(|e| e == "hostmeta:10.0.0.1"));
        drop(log);

        let node = fixture.repo.find_by_ip("10.0.0.1").await.unwrap().unwrap();
        assert!(node.is_healthy());
    }

    #[tokio::test]
    async fn test_initialize_unknown_node_fails() {
        let fixture = fixture();
        let err = fixture.manager.initialize_node("10.0.0.7").await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
    }

    #[tokio::test]
    async fn test_promotion_orders_fencing_before_replication_before_vip() {
        let fixture = fixture();
        register_pair(&fixture).await;

        fixture
            .manager
            .promote_node_to_leader("10.0.0.2")
            .await
            .unwrap();

        let log = fixture.log.lock().unwrap();
        let pos = |needle: &str| log.iter().position(|e| e == needle).unwrap();

        let fence_new = pos("hostmeta:10.0.0.2");
        let fence_old = pos("hostmeta:10.0.0.1");
        let replication = pos("replication:10.0.0.2->10.0.0.1");
        let vip_add = pos("vip:add:10.0.0.2:10.0.0.9");
        let vip_del = pos("vip:del:10.0.0.1:10.0.0.9");

        assert!(fence_new < replication && fence_old < replication);
        assert!(replication < vip_add);
        // VIP is the last step, add-on-new before remove-from-old.
        assert!(vip_add < vip_del);
        assert_eq!(vip_del, log.len() - 1);
    }

    #[tokio::test]
    async fn test_promotion_stamps_both_records_with_one_instant() {
        let fixture = fixture();
        register_pair(&fixture).await;

        fixture
            .manager
            .promote_node_to_leader("10.0.0.2")
            .await
            .unwrap();

        let new_leader = fixture.store.load("10.0.0.2").await.unwrap().unwrap();
        let old_leader = fixture.store.load("10.0.0.1").await.unwrap().unwrap();

        assert_eq!(new_leader.my_id.role, NodeRole::Leader);
        assert_eq!(new_leader.peer_id.role, NodeRole::Follower);
        assert_eq!(old_leader.my_id.role, NodeRole::Follower);
        assert_eq!(old_leader.peer_id.role, NodeRole::Leader);
        assert_eq!(new_leader.last_modified, old_leader.last_modified);
    }

    #[tokio::test]
    async fn test_promoting_current_leader_fails() {
        let fixture = fixture();
        register_pair(&fixture).await;

        let err = fixture
            .manager
            .promote_node_to_leader("10.0.0.1")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        // No side effects reached the infrastructure.
        assert!(fixture.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_check_node_health_updates_record() {
        let fixture = fixture();
        register_pair(&fixture).await;

        let healthy = fixture.manager.check_node_health("10.0.0.1").await.unwrap();
        assert!(healthy);

        let node = fixture.repo.find_by_ip("10.0.0.1").await.unwrap().unwrap();
        assert!(node.is_healthy());
    }

    #[tokio::test]
    async fn test_rebind_peer_rewrites_fencing_record() {
        let fixture = fixture();
        register_pair(&fixture).await;

        fixture
            .manager
            .rebind_peer(
                "10.0.0.1",
                NodeIdentity::new("node-c", "10.0.0.3", NodeRole::Follower),
            )
            .await
            .unwrap();

        let meta = fixture.store.load("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(meta.peer_id.ip, "10.0.0.3");
    }
}
