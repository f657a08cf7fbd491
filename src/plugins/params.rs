//! Typed extraction from plugin parameter bags.
//!
//! Every accessor returns a validation error on a missing key or a type
//! mismatch; nothing in the plugin layer ever panics on caller input.

use serde_json::Value;

use super::PluginParams;
use crate::config::ClusterConfig;
use crate::error::{AppError, Result};

/// Fail validation if any of the given keys is absent.
pub fn require_keys(params: &PluginParams, keys: &[&str]) -> Result<()> {
    for key in keys {
        if !params.contains_key(*key) {
            return Err(AppError::ValidationError(format!(
                "missing '{}' parameter",
                key
            )));
        }
    }
    Ok(())
}

/// Extract a required string parameter.
pub fn get_str<'a>(params: &'a PluginParams, key: &str) -> Result<&'a str> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(AppError::ValidationError(format!(
            "'{}' parameter is not a string",
            key
        ))),
        None => Err(AppError::ValidationError(format!(
            "missing '{}' parameter",
            key
        ))),
    }
}

/// Extract an optional boolean parameter, defaulting to false when absent.
pub fn get_bool_or_false(params: &PluginParams, key: &str) -> Result<bool> {
    match params.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(AppError::ValidationError(format!(
            "'{}' parameter is not a boolean",
            key
        ))),
        None => Ok(false),
    }
}

/// Extract and deserialize the universal `config` parameter.
pub fn get_config(params: &PluginParams) -> Result<ClusterConfig> {
    let value = params.get("config").ok_or_else(|| {
        AppError::ValidationError("missing 'config' parameter".to_string())
    })?;
    serde_json::from_value(value.clone()).map_err(|e| {
        AppError::ValidationError(format!(
            "'config' parameter is not a valid cluster config: {}",
            e
        ))
    })
}

/// Serialize a cluster config into a parameter bag value.
pub fn config_value(config: &ClusterConfig) -> Result<Value> {
    serde_json::to_value(config).map_err(|e| {
        AppError::ValidationError(format!("failed to encode cluster config: {}", e))
    })
}
