//! Cluster domain entity and its status state machine.
//!
//! The `Cluster` aggregate is the runtime counterpart of a declared
//! [`ClusterConfig`]: it owns the config it was created from, the current
//! lifecycle status and a lightweight view of its two nodes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::NodeRole;
use crate::config::ClusterConfig;
use crate::error::{AppError, Result};

/// Lifecycle status of the whole cluster.
///
/// Creating → Running → {Degraded, Failed, Upgrading, Reconciling} → Running.
/// There is no terminal state; Failed is recoverable by operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterStatus {
    Creating,
    Running,
    Degraded,
    Failed,
    Unknown,
    Upgrading,
    Reconciling,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterStatus::Creating => "Creating",
            ClusterStatus::Running => "Running",
            ClusterStatus::Degraded => "Degraded",
            ClusterStatus::Failed => "Failed",
            ClusterStatus::Unknown => "Unknown",
            ClusterStatus::Upgrading => "Upgrading",
            ClusterStatus::Reconciling => "Reconciling",
        };
        f.write_str(s)
    }
}

impl FromStr for ClusterStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Creating" => Ok(ClusterStatus::Creating),
            "Running" => Ok(ClusterStatus::Running),
            "Degraded" => Ok(ClusterStatus::Degraded),
            "Failed" => Ok(ClusterStatus::Failed),
            "Unknown" => Ok(ClusterStatus::Unknown),
            "Upgrading" => Ok(ClusterStatus::Upgrading),
            "Reconciling" => Ok(ClusterStatus::Reconciling),
            other => Err(AppError::ValidationError(format!(
                "unknown cluster status '{}'",
                other
            ))),
        }
    }
}

/// Lightweight node view carried by the cluster aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    /// Node identifier; the IP doubles as the ID.
    pub id: String,
    pub ip: String,
    pub role: NodeRole,
}

/// The cluster aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster identifier; the configured name doubles as the ID.
    pub id: String,
    /// The configuration this cluster was created from. Immutable.
    pub config: ClusterConfig,
    pub status: ClusterStatus,
    pub nodes: Vec<ClusterNode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    /// Create a new cluster aggregate from a validated configuration.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        if config.metadata.name.is_empty() {
            return Err(AppError::ValidationError(
                "cluster name cannot be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let nodes = config
            .spec
            .nodes
            .iter()
            .map(|n| ClusterNode {
                id: n.ip.clone(),
                ip: n.ip.clone(),
                role: n.role,
            })
            .collect();

        Ok(Self {
            id: config.metadata.name.clone(),
            config,
            status: ClusterStatus::Creating,
            nodes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Transition the cluster to a new status, stamping the update time.
    pub fn change_status(&mut self, new_status: ClusterStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Whether the cluster is in a healthy, running state.
    pub fn is_healthy(&self) -> bool {
        self.status == ClusterStatus::Running
    }
}
