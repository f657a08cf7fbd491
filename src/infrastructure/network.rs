//! Network operator: TCP reachability probes and VIP ownership moves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::{NetworkOperator, SystemOperator, VipAction};
use crate::error::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Probes connectivity with plain TCP dials and moves the VIP by running
/// `ip addr` on the target node over SSH.
pub struct IpNetworkOperator {
    system: Arc<dyn SystemOperator>,
}

impl IpNetworkOperator {
    pub fn new(system: Arc<dyn SystemOperator>) -> Self {
        Self { system }
    }
}

#[async_trait]
impl NetworkOperator for IpNetworkOperator {
    async fn check_connectivity(&self, host: &str, port: u16) -> Result<()> {
        let address = format!("{}:{}", host, port);
        let connect = tokio::net::TcpStream::connect(&address);
        match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::NetworkError(format!(
                "connectivity check failed for {}: {}",
                address, e
            ))),
            Err(_) => Err(AppError::NetworkError(format!(
                "connectivity check timed out for {}",
                address
            ))),
        }
    }

    async fn manage_vip(&self, node_ip: &str, action: VipAction, vip: &str) -> Result<()> {
        let verb = match action {
            VipAction::Add => "add",
            VipAction::Del => "del",
        };
        // The VIP rides the loopback interface; gratuitous ARP on the
        // service interface announces the move.
        let script = format!("ip addr {} {}/32 dev lo", verb, vip);

        self.system
            .run_command("ssh", &[node_ip, &script])
            .await
            .map_err(|e| {
                AppError::NetworkError(format!(
                    "failed to {} VIP {} on {}: {}",
                    verb, vip, node_ip, e
                ))
            })?;

        info!(node = node_ip, vip, action = verb, "VIP ownership changed");
        Ok(())
    }
}
