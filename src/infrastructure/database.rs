//! PostgreSQL adapter that runs statements through `psql` on the control
//! host, targeting whichever node the caller names.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{DbClient, SystemOperator};
use crate::domain::entities::PostgresConfig;
use crate::error::{AppError, Result};

/// Runs SQL against a node's PostgreSQL instance via the `psql` binary.
pub struct PsqlDbClient {
    system: Arc<dyn SystemOperator>,
    postgres: PostgresConfig,
}

impl PsqlDbClient {
    pub fn new(system: Arc<dyn SystemOperator>, postgres: PostgresConfig) -> Self {
        Self { system, postgres }
    }

    fn base_args<'a>(&'a self, host: &'a str, port: &'a str) -> Vec<&'a str> {
        vec![
            "-h",
            host,
            "-p",
            port,
            "-U",
            &self.postgres.user,
            "-d",
            &self.postgres.database,
            "-v",
            "ON_ERROR_STOP=1",
        ]
    }
}

#[async_trait]
impl DbClient for PsqlDbClient {
    async fn execute_on(&self, host: &str, sql: &str) -> Result<()> {
        debug!(host, sql, "executing statement");
        let port = self.postgres.port.to_string();
        let mut args = self.base_args(host, &port);
        args.extend_from_slice(&["-c", sql]);

        self.system
            .run_command("psql", &args)
            .await
            .map_err(|e| AppError::DatabaseError(format!("statement failed on {}: {}", host, e)))?;
        Ok(())
    }

    async fn query_on(&self, host: &str, sql: &str) -> Result<String> {
        debug!(host, sql, "running query");
        let port = self.postgres.port.to_string();
        let mut args = self.base_args(host, &port);
        args.extend_from_slice(&["-t", "-A", "-c", sql]);

        let out = self
            .system
            .run_command("psql", &args)
            .await
            .map_err(|e| AppError::DatabaseError(format!("query failed on {}: {}", host, e)))?;
        Ok(out.trim().to_string())
    }
}
