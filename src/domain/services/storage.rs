//! Storage service: replication management, backup and restore.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::domain::entities::{KineConfig, PostgresConfig, ReplicationStatus, Storage};
use crate::domain::repositories::StorageRepository;
use crate::error::{AppError, Result};
use crate::infrastructure::{DbClient, SystemOperator};

/// Maximum replication lag still considered healthy. Policy, not a property
/// of the entity.
pub const REPLICATION_LAG_TOLERANCE: Duration = Duration::from_secs(5);

/// The single storage aggregate a two-node cluster owns.
pub const STORAGE_ID: &str = "default";

const PUBLICATION: &str = "duokube_pub";
const SUBSCRIPTION: &str = "duokube_sub";

/// Public contract of the storage service.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Establish logical replication from the leader to the follower.
    /// Idempotent: re-running with the same pair reconciles to the same
    /// state, and it is also how replication is re-pointed during failover.
    async fn configure_replication(&self, leader_ip: &str, follower_ip: &str) -> Result<()>;

    /// Whether the persisted replication record is Active and within the lag
    /// tolerance.
    async fn is_replication_healthy(&self) -> Result<bool>;

    /// Snapshot the current leader's database to `destination`.
    async fn backup(&self, destination: &str) -> Result<()>;

    /// Restore the current leader's database from `source`. Destructive; the
    /// caller must quiesce the cluster first.
    async fn restore(&self, source: &str) -> Result<()>;
}

pub struct StorageManager {
    storage_repo: Arc<dyn StorageRepository>,
    db: Arc<dyn DbClient>,
    system: Arc<dyn SystemOperator>,
    postgres: PostgresConfig,
    kine: KineConfig,
}

impl StorageManager {
    pub fn new(
        storage_repo: Arc<dyn StorageRepository>,
        db: Arc<dyn DbClient>,
        system: Arc<dyn SystemOperator>,
        postgres: PostgresConfig,
        kine: KineConfig,
    ) -> Self {
        Self {
            storage_repo,
            db,
            system,
            postgres,
            kine,
        }
    }

    async fn load_or_create(&self) -> Result<Storage> {
        match self.storage_repo.find_by_id(STORAGE_ID).await? {
            Some(storage) => Ok(storage),
            None => Storage::new(STORAGE_ID, self.postgres.clone(), self.kine.clone()),
        }
    }

    async fn load_master(&self) -> Result<(Storage, String)> {
        let storage = self
            .storage_repo
            .find_by_id(STORAGE_ID)
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError("could not find storage configuration".to_string())
            })?;
        let master = storage.replication.master_node_id.clone();
        if master.is_empty() {
            return Err(AppError::ValidationError(
                "replication has no recorded leader; deploy the cluster first".to_string(),
            ));
        }
        Ok((storage, master))
    }
}

#[async_trait]
impl StorageService for StorageManager {
    async fn configure_replication(&self, leader_ip: &str, follower_ip: &str) -> Result<()> {
        info!(leader = leader_ip, follower = follower_ip, "configuring replication");

        // Recreate the publication on the leader. DROP first keeps the call
        // idempotent and lets the same path re-point replication after a
        // promotion.
        self.db
            .execute_on(leader_ip, &format!("DROP PUBLICATION IF EXISTS {}", PUBLICATION))
            .await?;
        self.db
            .execute_on(
                leader_ip,
                &format!("CREATE PUBLICATION {} FOR ALL TABLES", PUBLICATION),
            )
            .await?;

        // Recreate the subscription on the follower, pointed at the leader.
        self.db
            .execute_on(
                follower_ip,
                &format!("DROP SUBSCRIPTION IF EXISTS {}", SUBSCRIPTION),
            )
            .await?;
        let conninfo = self.postgres.for_host(leader_ip).connection_string();
        self.db
            .execute_on(
                follower_ip,
                &format!(
                    "CREATE SUBSCRIPTION {} CONNECTION '{}' PUBLICATION {}",
                    SUBSCRIPTION, conninfo, PUBLICATION
                ),
            )
            .await?;

        let mut storage = self.load_or_create().await?;
        storage.update_replication_status(ReplicationStatus::Active, Duration::ZERO);
        storage.replication.master_node_id = leader_ip.to_string();
        storage.replication.replica_node_id = follower_ip.to_string();

        self.storage_repo.save(&storage).await.map_err(|e| {
            AppError::DatabaseError(format!("failed to save storage configuration: {}", e))
        })
    }

    async fn is_replication_healthy(&self) -> Result<bool> {
        let storage = self
            .storage_repo
            .find_by_id(STORAGE_ID)
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError("could not find storage configuration".to_string())
            })?;
        Ok(storage.is_replication_healthy(REPLICATION_LAG_TOLERANCE))
    }

    async fn backup(&self, destination: &str) -> Result<()> {
        let (_, master) = self.load_master().await?;
        let port = self.postgres.port.to_string();

        info!(leader = %master, destination, "starting backup");
        self.system
            .run_command(
                "pg_dump",
                &[
                    "-h",
                    &master,
                    "-p",
                    &port,
                    "-U",
                    &self.postgres.user,
                    "-Fc",
                    "-f",
                    destination,
                    &self.postgres.database,
                ],
            )
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("backup to {} failed: {}", destination, e))
            })?;

        info!(destination, "backup complete");
        Ok(())
    }

    async fn restore(&self, source: &str) -> Result<()> {
        let (_, master) = self.load_master().await?;
        let port = self.postgres.port.to_string();

        info!(leader = %master, source, "starting restore");
        self.system
            .run_command(
                "pg_restore",
                &[
                    "-h",
                    &master,
                    "-p",
                    &port,
                    "-U",
                    &self.postgres.user,
                    "--clean",
                    "--if-exists",
                    "-d",
                    &self.postgres.database,
                    source,
                ],
            )
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("restore from {} failed: {}", source, e))
            })?;

        info!(source, "restore complete");
        Ok(())
    }
}
