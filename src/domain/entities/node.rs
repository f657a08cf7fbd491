//! Node domain entity, role transitions and the HostMeta fencing record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Role a node holds within the two-node cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Serves writes and owns the VIP.
    Leader,
    /// Replicates state and stands by for promotion.
    Follower,
    Unknown,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRole::Leader => "Leader",
            NodeRole::Follower => "Follower",
            NodeRole::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Health classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeHealthState {
    Healthy,
    Unhealthy,
    Unknown,
}

/// Status of one service running on the node (k3s, postgresql, kine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a single health check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub check_name: String,
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Observed health of a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeHealth {
    pub status: NodeHealthState,
    pub message: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub services: Vec<ServiceStatus>,
    pub checks: Vec<HealthCheckResult>,
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self {
            status: NodeHealthState::Unknown,
            message: String::new(),
            last_heartbeat: None,
            services: Vec::new(),
            checks: Vec::new(),
        }
    }
}

/// Declared configuration of a node. The role field is the only mutable
/// part, and only through [`Node::promote_at`] / [`Node::demote_at`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
    pub ip: String,
    pub role: NodeRole,
}

/// Identity of a node as recorded in a HostMeta file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub name: String,
    pub ip: String,
    pub role: NodeRole,
}

impl NodeIdentity {
    pub fn new(name: &str, ip: &str, role: NodeRole) -> Self {
        Self {
            name: name.to_string(),
            ip: ip.to_string(),
            role,
        }
    }
}

/// Per-node fencing record describing the cluster topology from this node's
/// own point of view. Stored on the node itself, never centrally.
///
/// Invariant: every role transition must stamp `last_modified` with the
/// transition instant. During a partition the record with the more recent
/// stamp is authoritative when two copies disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMeta {
    pub my_id: NodeIdentity,
    pub peer_id: NodeIdentity,
    pub vip: String,
    pub last_modified: DateTime<Utc>,
}

impl HostMeta {
    pub fn new(my_id: NodeIdentity, peer_id: NodeIdentity, vip: &str) -> Self {
        Self {
            my_id,
            peer_id,
            vip: vip.to_string(),
            last_modified: Utc::now(),
        }
    }

    /// Last-writer-wins reconciliation of two conflicting records.
    ///
    /// The newer `last_modified` stamp wins outright. On an exact tie the
    /// record whose owner claims Leader wins, so a partitioned follower can
    /// never take the tie from a functioning leader.
    pub fn reconcile<'a>(a: &'a HostMeta, b: &'a HostMeta) -> &'a HostMeta {
        match a.last_modified.cmp(&b.last_modified) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => {
                if b.my_id.role == NodeRole::Leader {
                    b
                } else {
                    a
                }
            }
        }
    }
}

/// The node aggregate. Owned exclusively by the cluster containing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier; the IP doubles as the ID.
    pub id: String,
    pub config: NodeConfig,
    pub health: NodeHealth,
    pub host_meta: HostMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn new(config: NodeConfig, host_meta: HostMeta) -> Result<Self> {
        if config.ip.is_empty() {
            return Err(AppError::ValidationError(
                "node IP cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: config.ip.clone(),
            config,
            health: NodeHealth::default(),
            host_meta,
            created_at: now,
            updated_at: now,
        })
    }

    /// Promote this node to Leader, stamping the fencing record with `at`.
    ///
    /// Promoting a node that is already Leader is illegal; the caller must
    /// know the current role.
    pub fn promote_at(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.config.role == NodeRole::Leader {
            return Err(AppError::ValidationError(format!(
                "node {} is already a leader",
                self.id
            )));
        }
        self.config.role = NodeRole::Leader;
        self.host_meta.my_id.role = NodeRole::Leader;
        self.host_meta.last_modified = at;
        self.updated_at = at;
        Ok(())
    }

    /// Promote this node to Leader at the current instant.
    pub fn promote(&mut self) -> Result<()> {
        self.promote_at(Utc::now())
    }

    /// Demote this node to Follower, stamping the fencing record with `at`.
    pub fn demote_at(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.config.role == NodeRole::Follower {
            return Err(AppError::ValidationError(format!(
                "node {} is already a follower",
                self.id
            )));
        }
        self.config.role = NodeRole::Follower;
        self.host_meta.my_id.role = NodeRole::Follower;
        self.host_meta.last_modified = at;
        self.updated_at = at;
        Ok(())
    }

    /// Demote this node to Follower at the current instant.
    pub fn demote(&mut self) -> Result<()> {
        self.demote_at(Utc::now())
    }

    /// Record a fresh health observation.
    pub fn update_health(&mut self, status: NodeHealthState, message: &str) {
        self.health.status = status;
        self.health.message = message.to_string();
        self.health.last_heartbeat = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn is_healthy(&self) -> bool {
        self.health.status == NodeHealthState::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn follower_node() -> Node {
        let config = NodeConfig {
            name: "node-b".to_string(),
            ip: "10.0.0.2".to_string(),
            role: NodeRole::Follower,
        };
        let meta = HostMeta::new(
            NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Follower),
            NodeIdentity::new("node-a", "10.0.0.1", NodeRole::Leader),
            "10.0.0.9",
        );
        Node::new(config, meta).unwrap()
    }

    #[test]
    fn test_new_node_rejects_empty_ip() {
        let config = NodeConfig {
            name: "node-a".to_string(),
            ip: String::new(),
            role: NodeRole::Leader,
        };
        let meta = HostMeta::new(
            NodeIdentity::new("node-a", "", NodeRole::Leader),
            NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Follower),
            "10.0.0.9",
        );
        assert!(matches!(
            Node::new(config, meta),
            Err(AppError::ValidationError(_))
        ));
    }

    #[test]
    fn test_promote_follower_flips_role_and_fencing_record() {
        let mut node = follower_node();
        let before = node.updated_at;

        node.promote().unwrap();

        assert_eq!(node.config.role, NodeRole::Leader);
        assert_eq!(node.host_meta.my_id.role, NodeRole::Leader);
        assert!(node.updated_at >= before);
        assert_eq!(node.host_meta.last_modified, node.updated_at);
    }

    #[test]
    fn test_promote_leader_fails_and_leaves_role_unchanged() {
        let mut node = follower_node();
        node.promote().unwrap();
        let stamped = node.host_meta.last_modified;

        let err = node.promote().unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(node.config.role, NodeRole::Leader);
        assert_eq!(node.host_meta.last_modified, stamped);
    }

    #[test]
    fn test_demote_follower_fails() {
        let mut node = follower_node();
        assert!(matches!(
            node.demote(),
            Err(AppError::ValidationError(_))
        ));
        assert_eq!(node.config.role, NodeRole::Follower);
    }

    #[test]
    fn test_update_health() {
        let mut node = follower_node();
        assert!(!node.is_healthy());

        node.update_health(NodeHealthState::Healthy, "all services up");
        assert!(node.is_healthy());
        assert!(node.health.last_heartbeat.is_some());
    }

    #[test]
    fn test_reconcile_newer_record_wins() {
        let older = HostMeta::new(
            NodeIdentity::new("node-a", "10.0.0.1", NodeRole::Leader),
            NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Follower),
            "10.0.0.9",
        );
        let mut newer = HostMeta::new(
            NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Leader),
            NodeIdentity::new("node-a", "10.0.0.1", NodeRole::Follower),
            "10.0.0.9",
        );
        newer.last_modified = older.last_modified + Duration::seconds(3);

        let winner = HostMeta::reconcile(&older, &newer);
        assert_eq!(winner.my_id.ip, "10.0.0.2");
    }

    #[test]
    fn test_reconcile_tie_prefers_claimed_leader() {
        let stamp = Utc::now();
        let mut follower_view = HostMeta::new(
            NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Follower),
            NodeIdentity::new("node-a", "10.0.0.1", NodeRole::Leader),
            "10.0.0.9",
        );
        follower_view.last_modified = stamp;
        let mut leader_view = HostMeta::new(
            NodeIdentity::new("node-a", "10.0.0.1", NodeRole::Leader),
            NodeIdentity::new("node-b", "10.0.0.2", NodeRole::Follower),
            "10.0.0.9",
        );
        leader_view.last_modified = stamp;

        let winner = HostMeta::reconcile(&follower_view, &leader_view);
        assert_eq!(winner.my_id.role, NodeRole::Leader);

        // Symmetric argument order, same outcome.
        let winner = HostMeta::reconcile(&leader_view, &follower_view);
        assert_eq!(winner.my_id.role, NodeRole::Leader);
    }
}
