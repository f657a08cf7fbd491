//! Infrastructure capability contracts and their concrete adapters.
//!
//! The domain layer only ever sees these traits; the adapters at the bottom
//! of this module tree do the actual command execution, SQL, HTTP and file
//! I/O. Tests substitute in-memory fakes.

pub mod database;
pub mod hostmeta;
pub mod kubernetes;
pub mod network;
pub mod repositories;
pub mod system;

pub use database::PsqlDbClient;
pub use hostmeta::FileHostMetaStore;
pub use kubernetes::HttpK8sClient;
pub use network::IpNetworkOperator;
pub use repositories::{
    FileClusterRepository, FileNodeRepository, FileStorageRepository, InMemoryClusterRepository,
    InMemoryNodeRepository, InMemoryStorageRepository,
};
pub use system::ShellSystemOperator;

use async_trait::async_trait;

use crate::domain::entities::NodeIdentity;
use crate::error::Result;

/// System-level operations against a node: command execution and file I/O.
#[async_trait]
pub trait SystemOperator: Send + Sync {
    /// Execute a command and return its combined output. A non-zero exit
    /// status is an error carrying the output.
    async fn run_command(&self, command: &str, args: &[&str]) -> Result<String>;

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;
}

/// VIP manipulation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VipAction {
    Add,
    Del,
}

/// Network-level operations: reachability probes and VIP ownership.
#[async_trait]
pub trait NetworkOperator: Send + Sync {
    async fn check_connectivity(&self, host: &str, port: u16) -> Result<()>;

    /// Add or remove the VIP on the given node's interface.
    async fn manage_vip(&self, node_ip: &str, action: VipAction, vip: &str) -> Result<()>;
}

/// SQL execution against the PostgreSQL instance on a specific node.
///
/// The wire protocol is not this crate's concern; implementations may shell
/// out or speak libpq, the domain only needs statements to run somewhere.
#[async_trait]
pub trait DbClient: Send + Sync {
    async fn execute_on(&self, host: &str, sql: &str) -> Result<()>;

    async fn query_on(&self, host: &str, sql: &str) -> Result<String>;
}

/// Minimal view of the Kubernetes API needed for health checking.
#[async_trait]
pub trait K8sClient: Send + Sync {
    /// List the nodes registered with the API server.
    async fn get_nodes(&self) -> Result<Vec<NodeIdentity>>;

    /// Probe the API server's healthz endpoint.
    async fn check_api_health(&self) -> Result<bool>;
}
