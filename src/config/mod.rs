//! Cluster configuration schema and file management.
//!
//! The `ClusterConfig` is the declared desired state of a duokube cluster,
//! loaded from a `cluster.yaml` file. The [`Manager`] handles loading,
//! validating and saving that file.

pub mod manager;

pub use manager::Manager;

use serde::{Deserialize, Serialize};

use crate::domain::entities::NodeRole;

/// The apiVersion written into newly generated configuration files.
pub const API_VERSION: &str = "duokube.io/v1alpha1";

/// The kind written into newly generated configuration files.
pub const CONFIG_KIND: &str = "ClusterConfig";

/// Complete declared configuration for a duokube cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    pub spec: ClusterSpec,
}

/// Cluster metadata. The name doubles as the cluster identity and is
/// immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
}

/// Desired state of the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub network: NetworkConfig,
    pub nodes: Vec<NodeInfo>,
    pub storage: StorageSpec,
}

/// Network configuration. The VIP floats to whichever node is Leader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub vip: String,
}

/// Declared node: the IP is the node's unique key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub ip: String,
    pub role: NodeRole,
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSpec {
    /// Backend type, e.g. "postgresql".
    #[serde(rename = "type")]
    pub kind: String,
}

impl ClusterConfig {
    /// Build a fresh two-node configuration, leader first.
    pub fn new(name: &str, leader_ip: &str, follower_ip: &str, vip: &str) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: Metadata {
                name: name.to_string(),
            },
            spec: ClusterSpec {
                network: NetworkConfig {
                    vip: vip.to_string(),
                },
                nodes: vec![
                    NodeInfo {
                        ip: leader_ip.to_string(),
                        role: NodeRole::Leader,
                    },
                    NodeInfo {
                        ip: follower_ip.to_string(),
                        role: NodeRole::Follower,
                    },
                ],
                storage: StorageSpec {
                    kind: "postgresql".to_string(),
                },
            },
        }
    }

    /// The declared node holding the given role, if any.
    pub fn node_with_role(&self, role: NodeRole) -> Option<&NodeInfo> {
        self.spec.nodes.iter().find(|n| n.role == role)
    }
}
