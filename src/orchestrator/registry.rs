//! Plugin registry: named lookup and two-phase execution.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::plugins::{Plugin, PluginParams, PluginResult};

/// Holds the registered workflow plugins.
///
/// Registration is append-only; there is no update-in-place and no
/// unregister. Lookups vastly outnumber registrations, hence the
/// reader/writer lock.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own name. Registering a second plugin
    /// with the same name fails and leaves the first registration intact.
    pub async fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        let mut plugins = self.plugins.write().await;

        if plugins.contains_key(&name) {
            return Err(AppError::PluginError(format!(
                "plugin with name '{}' already registered",
                name
            )));
        }

        info!(plugin = %name, version = plugin.version(), "registered plugin");
        plugins.insert(name, plugin);
        Ok(())
    }

    /// Look up a plugin by name.
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Plugin>> {
        let plugins = self.plugins.read().await;
        plugins.get(name).cloned().ok_or_else(|| {
            AppError::PluginError(format!("plugin with name '{}' not found", name))
        })
    }

    /// Look up a plugin, validate the parameters, then execute. The two
    /// phases fail with distinct error kinds so a malformed call never
    /// reaches the side-effecting phase.
    pub async fn execute(&self, name: &str, params: &PluginParams) -> Result<PluginResult> {
        let plugin = self.get(name).await?;

        plugin.validate(params).map_err(|e| {
            AppError::ValidationError(format!("plugin '{}' validation failed: {}", name, e))
        })?;

        debug!(plugin = name, "executing plugin");
        let result = plugin.execute(params).await.map_err(|e| {
            AppError::PluginError(format!("plugin '{}' execution failed: {}", name, e))
        })?;

        plugin.cleanup().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubPlugin {
        name: &'static str,
        version: &'static str,
        required: &'static [&'static str],
    }

    #[async_trait]
    impl Plugin for StubPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn version(&self) -> &str {
            self.version
        }

        fn validate(&self, params: &PluginParams) -> Result<()> {
            crate::plugins::params::require_keys(params, self.required)
        }

        async fn execute(&self, _params: &PluginParams) -> Result<PluginResult> {
            Ok(PluginResult::ok("done".to_string()))
        }
    }

    fn stub(name: &'static str, version: &'static str) -> Arc<dyn Plugin> {
        Arc::new(StubPlugin {
            name,
            version,
            required: &["config"],
        })
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_first() {
        let registry = PluginRegistry::new();
        registry.register(stub("deploy", "v1")).await.unwrap();

        let err = registry.register(stub("deploy", "v2")).await.unwrap_err();
        assert!(matches!(err, AppError::PluginError(_)));

        let kept = registry.get("deploy").await.unwrap();
        assert_eq!(kept.version(), "v1");
    }

    #[tokio::test]
    async fn test_get_unknown_plugin_fails() {
        let registry = PluginRegistry::new();
        let err = match registry.get("ghost").await {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(matches!(err, AppError::PluginError(_)));
    }

    #[tokio::test]
    async fn test_execute_validates_before_running() {
        let registry = PluginRegistry::new();
        registry.register(stub("deploy", "v1")).await.unwrap();

        let err = registry
            .execute("deploy", &PluginParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let mut params = PluginParams::new();
        params.insert("config".to_string(), json!({}));
        let result = registry.execute("deploy", &params).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_concurrent_register_and_get() {
        let registry = Arc::new(PluginRegistry::new());

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let name: &'static str = Box::leak(format!("plugin-{}", i).into_boxed_str());
                registry
                    .register(Arc::new(StubPlugin {
                        name,
                        version: "v1",
                        required: &[],
                    }))
                    .await
                    .unwrap();
                registry.get(name).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
