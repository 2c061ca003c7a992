//! Splot Core - shared engine for embedding pasted HTML documents
//!
//! This crate holds the pieces both sides of the paste/render protocol agree on:
//! block ids and placeholder tokens, document id resolution, the document store,
//! anti-replay tokens, the persistence gateway and the plugin/event plumbing.

pub mod block;
pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod gateway;
pub mod plugin;
pub mod renderer;
pub mod security;
pub mod store;

// Re-export commonly used types
pub use block::{scan_placeholders, BlockId, PlaceholderMatch};
pub use config::{Config, EmbedConfig, SecurityConfig, ServerConfig, StorageBackend, StorageConfig};
pub use document::{DocumentContext, DocumentId, DocumentIdSource};
pub use error::{Result, SplotError};
pub use event::{EventBus, InMemoryEventBus, SubscriptionId, SystemEvent, SystemEventHandler};
pub use gateway::{
    BootstrapData, LocalGateway, PersistenceGateway, StoreRequest, StoreResponse,
};
pub use plugin::{Plugin, PluginContext, PluginInfo, PluginRegistry, PluginStatus};
pub use renderer::{ContentRenderer, RenderContext, RenderResult, RendererRegistry};
pub use security::{AccessPolicy, ConfiguredAccessPolicy, NonceManager};
pub use store::DocumentStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

/// Core engine that owns shared services and the loaded plugins
pub struct SplotEngine {
    plugin_registry: PluginRegistry,
    context: PluginContext,
    shutdown_signal: Option<tokio::sync::oneshot::Sender<()>>,
}

impl SplotEngine {
    /// Create an engine, opening the configured store
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = store::open_store(&config.storage).await?;
        Self::with_store(config, store)
    }

    /// Create an engine on top of an existing store
    pub fn with_store(config: Config, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let event_bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
        let gateway = LocalGateway::new(
            store.clone(),
            NonceManager::from_config(&config.security),
            Arc::new(ConfiguredAccessPolicy::from_config(&config.security)),
        )
        .with_event_bus(event_bus.clone());

        let context = PluginContext::new(
            event_bus,
            Arc::new(config),
            store,
            Arc::new(gateway),
            Arc::new(RendererRegistry::new()),
        );

        Ok(Self {
            plugin_registry: PluginRegistry::new(),
            context,
            shutdown_signal: None,
        })
    }

    /// Register a plugin with the core engine
    pub async fn register_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        self.plugin_registry
            .register_plugin(plugin, &self.context)
            .await
    }

    /// Context shared with plugins
    pub fn context(&self) -> &PluginContext {
        &self.context
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        self.context.event_bus.clone()
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.context.store.clone()
    }

    pub fn gateway(&self) -> Arc<LocalGateway> {
        self.context.gateway.clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.context.config.clone()
    }

    /// Get a reference to the plugin registry
    pub fn plugin_registry(&self) -> &PluginRegistry {
        &self.plugin_registry
    }

    /// Run until Ctrl+C, SIGTERM or [`SplotEngine::request_shutdown`]
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting splot engine");

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_signal = Some(shutdown_tx);

        let shutdown_signal = async {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        tracing::error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("Received Ctrl+C signal");
                },
                _ = terminate => {
                    tracing::info!("Received terminate signal");
                },
            }
        };

        tokio::select! {
            _ = shutdown_signal => {
                tracing::info!("Shutdown signal received");
            }
            _ = &mut shutdown_rx => {
                tracing::info!("Shutdown requested programmatically");
            }
        }

        self.shutdown().await?;

        tracing::info!("Splot engine stopped");
        Ok(())
    }

    /// Request shutdown of a running engine
    pub fn request_shutdown(&mut self) {
        if let Some(sender) = self.shutdown_signal.take() {
            if sender.send(()).is_err() {
                tracing::warn!("Failed to send shutdown signal (receiver may have been dropped)");
            }
        }
    }

    /// Shutdown the plugins with a timeout
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down splot engine");

        let shutdown_timeout = Duration::from_secs(30);

        match tokio::time::timeout(shutdown_timeout, self.plugin_registry.shutdown()).await {
            Ok(Err(e)) => tracing::error!("Plugin registry shutdown failed: {}", e),
            Ok(Ok(())) => {}
            Err(_) => tracing::error!(
                "Plugin registry shutdown timed out after {:?}",
                shutdown_timeout
            ),
        }

        Ok(())
    }
}
