//! Storage domain entity: Postgres/Kine configuration and replication state.
//!
//! Storage is a sibling aggregate of the cluster, referenced by ID rather
//! than nested, because replication topology can be reconfigured
//! independently of cluster metadata (e.g. during node replacement).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Status of logical replication between the two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationStatus {
    Active,
    Inactive,
    Error,
    Unknown,
}

/// Connection parameters for a PostgreSQL instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub sslmode: String,
}

impl PostgresConfig {
    /// libpq-compatible keyword/value connection string.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={} sslmode={}",
            self.host, self.port, self.user, self.password, self.database, self.sslmode
        )
    }

    /// The same parameters pointed at a different host, used when building
    /// subscription connection info for the replica side.
    pub fn for_host(&self, host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..self.clone()
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            user: "duokube".to_string(),
            password: String::new(),
            database: "kine".to_string(),
            sslmode: "disable".to_string(),
        }
    }
}

/// Configuration for the Kine shim that backs the Kubernetes API with
/// PostgreSQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KineConfig {
    /// Endpoint Kine listens on, e.g. "tcp://127.0.0.1:2379".
    pub endpoint: String,
}

/// State of logical replication from the leader to the follower.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replication {
    pub master_node_id: String,
    pub replica_node_id: String,
    pub status: ReplicationStatus,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub lag: Duration,
}

impl Default for Replication {
    fn default() -> Self {
        Self {
            master_node_id: String::new(),
            replica_node_id: String::new(),
            status: ReplicationStatus::Unknown,
            last_sync_time: None,
            lag: Duration::ZERO,
        }
    }
}

/// The storage aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub id: String,
    pub postgres: PostgresConfig,
    pub kine: KineConfig,
    pub replication: Replication,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub fn new(id: &str, postgres: PostgresConfig, kine: KineConfig) -> Result<Self> {
        if id.is_empty() {
            return Err(AppError::ValidationError(
                "storage id cannot be empty".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: id.to_string(),
            postgres,
            kine,
            replication: Replication::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Record a fresh replication observation.
    pub fn update_replication_status(&mut self, status: ReplicationStatus, lag: Duration) {
        self.replication.status = status;
        self.replication.lag = lag;
        self.replication.last_sync_time = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    /// Replication is healthy iff it is Active and the lag is within the
    /// given tolerance. A Follower with unhealthy replication must never be
    /// promoted without an explicit override.
    pub fn is_replication_healthy(&self, tolerance: Duration) -> bool {
        self.replication.status == ReplicationStatus::Active && self.replication.lag <= tolerance
    }
}
