//! Shell-based implementation of the system operator.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::SystemOperator;
use crate::error::{AppError, Result};

/// Executes commands as local child processes and does file I/O through
/// tokio's fs layer.
#[derive(Debug, Default)]
pub struct ShellSystemOperator;

impl ShellSystemOperator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SystemOperator for ShellSystemOperator {
    async fn run_command(&self, command: &str, args: &[&str]) -> Result<String> {
        debug!(command, ?args, "running command");

        let output = Command::new(command)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                AppError::OrchestratorError(format!("failed to spawn {}: {}", command, e))
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(AppError::OrchestratorError(format!(
                "command failed: {} {:?}: {}",
                command,
                args,
                combined.trim()
            )));
        }
        Ok(combined)
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::IoError(format!("failed to create {:?}: {}", parent, e)))?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| AppError::IoError(format!("failed to write file {}: {}", path, e)))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| AppError::IoError(format!("failed to read file {}: {}", path, e)))
    }
}
