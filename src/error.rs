//! Error types shared across all layers of duokube.
//!
//! Every failure is tagged with a code at the point of detection and wrapped
//! as it crosses a layer boundary, so the caller can always tell a bad config
//! from a bad plugin from a broken node.

use serde::{Deserialize, Serialize};

/// Broad error taxonomy used for reporting and by callers that only need to
/// distinguish failure classes, not individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    Validation,
    Persistence,
    Infrastructure,
    Workflow,
    Unknown,
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Plugin error: {0}")]
    PluginError(String),

    #[error("Orchestrator error: {0}")]
    OrchestratorError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Map the concrete variant onto the coarse error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ConfigError(_) => ErrorKind::Configuration,
            AppError::ValidationError(_) => ErrorKind::Validation,
            AppError::DatabaseError(_) => ErrorKind::Persistence,
            AppError::NetworkError(_)
            | AppError::KubernetesError(_)
            | AppError::OrchestratorError(_)
            | AppError::IoError(_) => ErrorKind::Infrastructure,
            AppError::PluginError(_) => ErrorKind::Workflow,
            AppError::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(format!("IO error: {}", err))
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::ConfigError(format!("YAML error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Unknown(format!("JSON error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
