//! Repository interfaces for the domain aggregates.
//!
//! The backing store is unspecified at this layer; implementations live in
//! the infrastructure layer and are injected into the domain services.

use async_trait::async_trait;

use crate::domain::entities::{Cluster, HostMeta, Node, Storage};
use crate::error::Result;

/// Persistence for the cluster aggregate.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    async fn save(&self, cluster: &Cluster) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Cluster>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Cluster>>;
}

/// Persistence for node aggregates.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn save(&self, node: &Node) -> Result<()>;

    async fn find_by_ip(&self, ip: &str) -> Result<Option<Node>>;

    async fn delete(&self, ip: &str) -> Result<()>;
}

/// Persistence for the storage aggregate.
#[async_trait]
pub trait StorageRepository: Send + Sync {
    async fn save(&self, storage: &Storage) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Storage>>;
}

/// Per-node persistence of the HostMeta fencing record.
///
/// Each record conceptually lives on the physical node it describes, as a
/// local file, never in a central store.
#[async_trait]
pub trait HostMetaStore: Send + Sync {
    async fn save(&self, node_ip: &str, meta: &HostMeta) -> Result<()>;

    async fn load(&self, node_ip: &str) -> Result<Option<HostMeta>>;
}
