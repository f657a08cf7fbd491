//! Configuration file manager: load, validate, save and render.

use std::path::Path;

use tracing::{debug, info};

use super::ClusterConfig;
use crate::error::{AppError, Result};

/// Manages the cluster configuration file on disk.
///
/// Every public operation validates the configuration, so a config that made
/// it past the manager is structurally sound by the time the orchestrator
/// sees it.
#[derive(Debug, Default)]
pub struct Manager;

impl Manager {
    pub fn new() -> Self {
        Self
    }

    /// Read and validate a cluster configuration file.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<ClusterConfig> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading cluster configuration");

        let data = std::fs::read_to_string(path).map_err(|e| {
            AppError::IoError(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let cfg: ClusterConfig = serde_yaml::from_str(&data).map_err(|e| {
            AppError::ConfigError(format!(
                "failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        self.validate(&cfg)?;
        Ok(cfg)
    }

    /// Validate and write a cluster configuration file.
    pub fn save<P: AsRef<Path>>(&self, cfg: &ClusterConfig, path: P) -> Result<()> {
        let path = path.as_ref();
        self.validate(cfg)?;

        let data = serde_yaml::to_string(cfg)
            .map_err(|e| AppError::ConfigError(format!("failed to serialize config: {}", e)))?;

        std::fs::write(path, data).map_err(|e| {
            AppError::IoError(format!(
                "failed to write config file {}: {}",
                path.display(),
                e
            ))
        })?;

        info!(path = %path.display(), cluster = %cfg.metadata.name, "cluster configuration saved");
        Ok(())
    }

    /// Check the structural invariants of a cluster configuration.
    pub fn validate(&self, cfg: &ClusterConfig) -> Result<()> {
        if cfg.api_version.is_empty() || cfg.kind.is_empty() {
            return Err(AppError::ValidationError(
                "apiVersion and kind must be set".to_string(),
            ));
        }
        if cfg.metadata.name.is_empty() {
            return Err(AppError::ValidationError(
                "metadata.name must be set".to_string(),
            ));
        }
        if cfg.spec.nodes.len() != 2 {
            return Err(AppError::ValidationError(
                "exactly two nodes must be defined in spec.nodes".to_string(),
            ));
        }
        if cfg.spec.network.vip.is_empty() {
            return Err(AppError::ValidationError(
                "spec.network.vip must be set".to_string(),
            ));
        }
        Ok(())
    }

    /// Render a `{{key}}` template against string data, used to produce
    /// node-local service configuration files during provisioning.
    pub fn render(&self, template: &str, data: &[(&str, &str)]) -> String {
        let mut out = template.to_string();
        for (key, value) in data {
            out = out.replace(&format!("{{{{{}}}}}", key), value);
        }
        out
    }
}
