//! Repository implementations.
//!
//! The repository contract is deliberately narrow and the backing store is
//! unspecified at the domain layer. Two families live here: map-backed
//! repositories for tests and embedding, and YAML-file-backed repositories
//! that give the CLI durable state across invocations.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::entities::{Cluster, Node, Storage};
use crate::domain::repositories::{ClusterRepository, NodeRepository, StorageRepository};
use crate::error::{AppError, Result};

#[derive(Default)]
pub struct InMemoryClusterRepository {
    clusters: RwLock<HashMap<String, Cluster>>,
}

impl InMemoryClusterRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterRepository for InMemoryClusterRepository {
    async fn save(&self, cluster: &Cluster) -> Result<()> {
        let mut clusters = self.clusters.write().await;
        clusters.insert(cluster.id.clone(), cluster.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Cluster>> {
        let clusters = self.clusters.read().await;
        Ok(clusters.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Cluster>> {
        // The cluster name doubles as the ID.
        self.find_by_id(name).await
    }
}

#[derive(Default)]
pub struct InMemoryNodeRepository {
    nodes: RwLock<HashMap<String, Node>>,
}

impl InMemoryNodeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeRepository for InMemoryNodeRepository {
    async fn save(&self, node: &Node) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn find_by_ip(&self, ip: &str) -> Result<Option<Node>> {
        let nodes = self.nodes.read().await;
        Ok(nodes.get(ip).cloned())
    }

    async fn delete(&self, ip: &str) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        nodes.remove(ip);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryStorageRepository {
    storages: RwLock<HashMap<String, Storage>>,
}

impl InMemoryStorageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageRepository for InMemoryStorageRepository {
    async fn save(&self, storage: &Storage) -> Result<()> {
        let mut storages = self.storages.write().await;
        storages.insert(storage.id.clone(), storage.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Storage>> {
        let storages = self.storages.read().await;
        Ok(storages.get(id).cloned())
    }
}

/// One YAML file per aggregate under a state directory.
struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    fn new(dir: PathBuf, kind: &str) -> Self {
        Self {
            dir: dir.join(kind),
        }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", id))
    }

    async fn put<T: Serialize>(&self, id: &str, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            AppError::IoError(format!("failed to create state dir {:?}: {}", self.dir, e))
        })?;
        let data = serde_yaml::to_string(value)
            .map_err(|e| AppError::DatabaseError(format!("failed to encode {}: {}", id, e)))?;
        tokio::fs::write(self.path_for(id), data).await.map_err(|e| {
            AppError::DatabaseError(format!("failed to persist {}: {}", id, e))
        })
    }

    async fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        let path = self.path_for(id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::DatabaseError(format!(
                    "failed to read {:?}: {}",
                    path, e
                )))
            }
        };
        let value = serde_yaml::from_str(&data)
            .map_err(|e| AppError::DatabaseError(format!("corrupt record {}: {}", id, e)))?;
        Ok(Some(value))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::DatabaseError(format!(
                "failed to delete {}: {}",
                id, e
            ))),
        }
    }
}

pub struct FileClusterRepository {
    store: FileStore,
}

impl FileClusterRepository {
    pub fn new(state_dir: &str) -> Self {
        Self {
            store: FileStore::new(PathBuf::from(state_dir), "clusters"),
        }
    }
}

#[async_trait]
impl ClusterRepository for FileClusterRepository {
    async fn save(&self, cluster: &Cluster) -> Result<()> {
        self.store.put(&cluster.id, cluster).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Cluster>> {
        self.store.get(id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Cluster>> {
        self.store.get(name).await
    }
}

pub struct FileNodeRepository {
    store: FileStore,
}

impl FileNodeRepository {
    pub fn new(state_dir: &str) -> Self {
        Self {
            store: FileStore::new(PathBuf::from(state_dir), "nodes"),
        }
    }
}

#[async_trait]
impl NodeRepository for FileNodeRepository {
    async fn save(&self, node: &Node) -> Result<()> {
        self.store.put(&node.id, node).await
    }

    async fn find_by_ip(&self, ip: &str) -> Result<Option<Node>> {
        self.store.get(ip).await
    }

    async fn delete(&self, ip: &str) -> Result<()> {
        self.store.remove(ip).await
    }
}

pub struct FileStorageRepository {
    store: FileStore,
}

impl FileStorageRepository {
    pub fn new(state_dir: &str) -> Self {
        Self {
            store: FileStore::new(PathBuf::from(state_dir), "storage"),
        }
    }
}

#[async_trait]
impl StorageRepository for FileStorageRepository {
    async fn save(&self, storage: &Storage) -> Result<()> {
        self.store.put(&storage.id, storage).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Storage>> {
        self.store.get(id).await
    }
}
