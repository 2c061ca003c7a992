//! Plugin system for modular architecture

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use crate::config::Config;
use crate::error::{Result, SplotError};
use crate::event::EventBus;
use crate::gateway::LocalGateway;
use crate::renderer::RendererRegistry;
use crate::store::DocumentStore;

/// Core plugin trait that all plugins must implement
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Get the plugin name
    fn name(&self) -> &str;

    /// Get the plugin version
    fn version(&self) -> &str;

    /// Get plugin dependencies (other plugin names)
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Initialize the plugin with the given context
    async fn initialize(&mut self, context: &PluginContext) -> Result<()>;

    /// Shutdown the plugin gracefully
    async fn shutdown(&mut self) -> Result<()>;

    /// Get plugin status
    fn status(&self) -> PluginStatus {
        PluginStatus::Active
    }

    /// Get services provided by this plugin
    fn provided_services(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Context provided to plugins during initialization
#[derive(Clone)]
pub struct PluginContext {
    pub event_bus: Arc<dyn EventBus>,
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub gateway: Arc<LocalGateway>,
    pub renderers: Arc<RendererRegistry>,
}

impl PluginContext {
    /// Create a new plugin context
    pub fn new(
        event_bus: Arc<dyn EventBus>,
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        gateway: Arc<LocalGateway>,
        renderers: Arc<RendererRegistry>,
    ) -> Self {
        Self {
            event_bus,
            config,
            store,
            gateway,
            renderers,
        }
    }
}

/// Plugin registry for managing loaded plugins
pub struct PluginRegistry {
    plugins: HashMap<String, Box<dyn Plugin>>,
    plugin_info: HashMap<String, PluginInfo>,
    load_order: Vec<String>,
}

impl PluginRegistry {
    /// Create a new plugin registry
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            plugin_info: HashMap::new(),
            load_order: Vec::new(),
        }
    }

    /// Shutdown all plugins in reverse load order
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down plugins");

        for plugin_name in self.load_order.iter().rev() {
            if let Some(plugin) = self.plugins.get_mut(plugin_name) {
                if let Err(e) = plugin.shutdown().await {
                    tracing::error!("Failed to shutdown plugin {}: {}", plugin_name, e);
                }
            }
        }

        self.plugins.clear();
        self.plugin_info.clear();
        self.load_order.clear();

        Ok(())
    }

    /// Register and initialize a plugin
    pub async fn register_plugin(
        &mut self,
        mut plugin: Box<dyn Plugin>,
        context: &PluginContext,
    ) -> Result<()> {
        let name = plugin.name().to_string();
        let version = plugin.version().to_string();

        if self.plugins.contains_key(&name) {
            return Err(SplotError::Plugin(format!(
                "Plugin {} is already registered",
                name
            )));
        }

        tracing::info!("Registering plugin: {} v{}", name, version);

        for dep in plugin.dependencies() {
            if !self.plugins.contains_key(dep) {
                return Err(SplotError::Plugin(format!(
                    "Plugin {} depends on {}, which is not loaded",
                    name, dep
                )));
            }
        }

        plugin.initialize(context).await?;

        let info = PluginInfo {
            name: name.clone(),
            version,
            status: plugin.status(),
            load_time: SystemTime::now(),
            dependencies: plugin
                .dependencies()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            provided_services: plugin
                .provided_services()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };

        self.plugin_info.insert(name.clone(), info);
        self.plugins.insert(name.clone(), plugin);
        self.load_order.push(name);

        Ok(())
    }

    /// List all loaded plugins in load order
    pub fn list_plugins(&self) -> Vec<&PluginInfo> {
        self.load_order
            .iter()
            .filter_map(|name| self.plugin_info.get(name))
            .collect()
    }

    /// Check if a plugin is loaded
    pub fn is_plugin_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a loaded plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub status: PluginStatus,
    pub load_time: SystemTime,
    pub dependencies: Vec<String>,
    pub provided_services: Vec<String>,
}

/// Plugin status enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginStatus {
    Loading,
    Active,
    Error(String),
    Shutting,
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InMemoryEventBus;
    use crate::security::{ConfiguredAccessPolicy, NonceManager};
    use crate::store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_context() -> PluginContext {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
        let gateway = LocalGateway::new(
            store.clone(),
            NonceManager::new("plugin-test-secret-value", 3600),
            Arc::new(ConfiguredAccessPolicy::allow_all()),
        );
        PluginContext::new(
            Arc::new(InMemoryEventBus::new()),
            Arc::new(Config::default()),
            store,
            Arc::new(gateway),
            Arc::new(RendererRegistry::new()),
        )
    }

    struct MockPlugin {
        name: String,
        deps: Vec<&'static str>,
        shutdowns: Arc<AtomicUsize>,
    }

    impl MockPlugin {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                deps: Vec::new(),
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Plugin for MockPlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn dependencies(&self) -> Vec<&str> {
            self.deps.clone()
        }

        async fn initialize(&mut self, _context: &PluginContext) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&mut self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_and_shutdown() {
        let mut registry = PluginRegistry::new();
        let context = create_test_context();
        let plugin = MockPlugin::new("a");
        let shutdowns = plugin.shutdowns.clone();

        registry
            .register_plugin(Box::new(plugin), &context)
            .await
            .unwrap();
        assert!(registry.is_plugin_loaded("a"));
        let loaded = registry.list_plugins();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "a");
        assert_eq!(loaded[0].status, PluginStatus::Active);

        registry.shutdown().await.unwrap();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
        assert!(registry.list_plugins().is_empty());
    }

    #[tokio::test]
    async fn test_missing_dependency_is_rejected() {
        let mut registry = PluginRegistry::new();
        let context = create_test_context();
        let mut plugin = MockPlugin::new("b");
        plugin.deps = vec!["a"];

        assert!(registry
            .register_plugin(Box::new(plugin), &context)
            .await
            .is_err());
        assert!(!registry.is_plugin_loaded("b"));
    }

    #[tokio::test]
    async fn test_duplicate_plugin_is_rejected() {
        let mut registry = PluginRegistry::new();
        let context = create_test_context();
        registry
            .register_plugin(Box::new(MockPlugin::new("a")), &context)
            .await
            .unwrap();
        assert!(registry
            .register_plugin(Box::new(MockPlugin::new("a")), &context)
            .await
            .is_err());
    }
}
