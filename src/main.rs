//! duokube command-line interface.
//!
//! Every command loads the cluster configuration, invokes exactly one
//! orchestrator operation and exits non-zero on error.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use duokube::config::{ClusterConfig, Manager as ConfigManager};
use duokube::domain::entities::{KineConfig, PostgresConfig};
use duokube::domain::services::{ClusterService, NodeManager, StorageManager};
use duokube::infrastructure::{
    FileClusterRepository, FileHostMetaStore, FileNodeRepository, FileStorageRepository,
    HttpK8sClient, IpNetworkOperator, PsqlDbClient, ShellSystemOperator,
};
use duokube::orchestrator::{Engine, Orchestrator, PluginRegistry};
use duokube::plugins::{
    BackupPlugin, DeployPlugin, FailoverPlugin, HealthPlugin, ReplaceNodePlugin, RestorePlugin,
    UpgradePlugin,
};

/// duokube: cost-effective high availability for Kubernetes on two nodes.
#[derive(Parser)]
#[command(name = "duokube")]
#[command(about = "Manage dual-node HA Kubernetes clusters")]
#[command(version)]
struct Cli {
    /// Cluster configuration file
    #[arg(long, global = true, default_value = "cluster.yaml")]
    config: PathBuf,

    /// Directory for persisted runtime state
    #[arg(long, global = true, default_value = ".duokube")]
    state_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new cluster configuration file
    Init {
        /// Cluster name
        #[arg(long)]
        name: String,

        /// IP address of the first node (leader)
        #[arg(long)]
        node1_ip: String,

        /// IP address of the second node (follower)
        #[arg(long)]
        node2_ip: String,

        /// Virtual IP for the cluster
        #[arg(long)]
        vip: String,
    },

    /// Deploy the cluster described by the configuration file
    Deploy,

    /// Show the current cluster status
    Status {
        /// Output format (table, json, yaml)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Promote a follower node to leader
    Failover {
        /// IP of the follower node to promote
        #[arg(long)]
        promote: String,

        /// Promote even if replication is not healthy
        #[arg(long)]
        force: bool,
    },

    /// Upgrade the cluster to a new version
    Upgrade {
        /// Target version, e.g. v1.29.0+k3s1
        #[arg(long)]
        version: String,

        /// Upgrade strategy (rolling, parallel)
        #[arg(long, default_value = "rolling")]
        strategy: String,
    },

    /// Replace a node with a fresh machine
    ReplaceNode {
        /// IP of the node being replaced
        #[arg(long)]
        old_node: String,

        /// IP of the replacement node
        #[arg(long)]
        new_node_ip: String,
    },

    /// Back up the leader's database
    Backup {
        /// Destination path for the backup archive
        #[arg(long)]
        destination: String,
    },

    /// Restore the leader's database from a backup
    Restore {
        /// Source path of the backup archive
        #[arg(long)]
        source: String,
    },

    /// Print version information
    Version,
}

/// Wire adapters, repositories, services, plugins and the engine together.
async fn build_engine(state_dir: &str, vip: &str) -> anyhow::Result<Engine> {
    let system = Arc::new(ShellSystemOperator::new());
    let network = Arc::new(IpNetworkOperator::new(system.clone()));
    let k8s = Arc::new(
        HttpK8sClient::new(&format!("https://{}:6443", vip), None)
            .context("failed to build kubernetes client")?,
    );
    let postgres = PostgresConfig::default();
    let kine = KineConfig {
        endpoint: "tcp://127.0.0.1:2379".to_string(),
    };
    let db = Arc::new(PsqlDbClient::new(system.clone(), postgres.clone()));

    let cluster_repo = Arc::new(FileClusterRepository::new(state_dir));
    let node_repo = Arc::new(FileNodeRepository::new(state_dir));
    let storage_repo = Arc::new(FileStorageRepository::new(state_dir));
    let hostmeta_store = Arc::new(FileHostMetaStore::new(
        system.clone(),
        &format!("{}/hostmeta", state_dir),
    ));

    let storage_service = Arc::new(StorageManager::new(
        storage_repo,
        db,
        system.clone(),
        postgres,
        kine,
    ));
    let node_service = Arc::new(NodeManager::new(
        node_repo,
        hostmeta_store,
        system.clone(),
        network,
        k8s,
        storage_service.clone(),
    ));
    let cluster_service = Arc::new(ClusterService::new(
        cluster_repo,
        node_service.clone(),
        storage_service.clone(),
    ));

    let registry = Arc::new(PluginRegistry::new());
    registry
        .register(Arc::new(DeployPlugin::new(cluster_service.clone())))
        .await?;
    registry
        .register(Arc::new(HealthPlugin::new(cluster_service.clone())))
        .await?;
    registry
        .register(Arc::new(FailoverPlugin::new(
            node_service.clone(),
            storage_service.clone(),
        )))
        .await?;
    registry
        .register(Arc::new(UpgradePlugin::new(
            node_service.clone(),
            storage_service.clone(),
            system,
        )))
        .await?;
    registry
        .register(Arc::new(BackupPlugin::new(storage_service.clone())))
        .await?;
    registry
        .register(Arc::new(RestorePlugin::new(
            cluster_service.clone(),
            storage_service.clone(),
        )))
        .await?;
    registry
        .register(Arc::new(ReplaceNodePlugin::new(
            node_service,
            storage_service,
        )))
        .await?;

    Ok(Engine::new(
        registry,
        Arc::new(ConfigManager::new()),
        cluster_service,
    ))
}

fn print_status(cluster_name: &str, status: &str, output: &str) -> anyhow::Result<()> {
    let printable = json!({
        "clusterName": cluster_name,
        "status": status,
    });
    match output {
        "json" => println!("{}", serde_json::to_string_pretty(&printable)?),
        "yaml" => print!("{}", serde_yaml::to_string(&printable)?),
        _ => {
            println!("Cluster: {}", cluster_name);
            println!("Status:  {}", status);
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_manager = ConfigManager::new();

    match cli.command {
        Commands::Init {
            name,
            node1_ip,
            node2_ip,
            vip,
        } => {
            let config = ClusterConfig::new(&name, &node1_ip, &node2_ip, &vip);
            let engine = build_engine(&cli.state_dir, &vip).await?;
            engine.init(&config, &cli.config).await?;
            println!("Created cluster configuration at {}", cli.config.display());
        }
        Commands::Deploy => {
            let config = config_manager.load(&cli.config)?;
            let engine = build_engine(&cli.state_dir, &config.spec.network.vip).await?;
            engine.deploy(&config).await?;
            println!("Cluster '{}' deployed.", config.metadata.name);
        }
        Commands::Status { output } => {
            let config = config_manager.load(&cli.config)?;
            let engine = build_engine(&cli.state_dir, &config.spec.network.vip).await?;
            let status = engine.get_status(&config).await?;
            print_status(&config.metadata.name, &status.to_string(), &output)?;
        }
        Commands::Failover { promote, force } => {
            let config = config_manager.load(&cli.config)?;
            let engine = build_engine(&cli.state_dir, &config.spec.network.vip).await?;
            engine.failover(&config, &promote, force).await?;
            println!("Node '{}' is the new leader.", promote);
        }
        Commands::Upgrade { version, strategy } => {
            let config = config_manager.load(&cli.config)?;
            let engine = build_engine(&cli.state_dir, &config.spec.network.vip).await?;
            engine.upgrade(&config, &version, &strategy).await?;
            println!(
                "Cluster '{}' upgraded to {}.",
                config.metadata.name, version
            );
        }
        Commands::ReplaceNode {
            old_node,
            new_node_ip,
        } => {
            let config = config_manager.load(&cli.config)?;
            let engine = build_engine(&cli.state_dir, &config.spec.network.vip).await?;
            engine.replace_node(&config, &old_node, &new_node_ip).await?;
            println!("Node '{}' replaced by '{}'.", old_node, new_node_ip);
        }
        Commands::Backup { destination } => {
            let config = config_manager.load(&cli.config)?;
            let engine = build_engine(&cli.state_dir, &config.spec.network.vip).await?;
            engine.backup(&config, &destination).await?;
            println!("Backup written to {}.", destination);
        }
        Commands::Restore { source } => {
            let config = config_manager.load(&cli.config)?;
            let engine = build_engine(&cli.state_dir, &config.spec.network.vip).await?;
            engine.restore(&config, &source).await?;
            println!("Cluster restored from {}.", source);
        }
        Commands::Version => {
            println!("duokube {}", env!("CARGO_PKG_VERSION"));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
