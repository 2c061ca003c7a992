//! Placeholder resolver plugin for Splot
//!
//! Turns `[placeholder id="..."]` tokens back into the documents they stand
//! for, each inlined into a sandboxed `<iframe srcdoc>`.

pub mod embed;
pub mod escape;
pub mod resolver;

pub use embed::{render_iframe, EmbedOptions};
pub use escape::escape_srcdoc;
pub use resolver::{PlaceholderResolver, Resolution};

use async_trait::async_trait;
use splot_core::{ContentRenderer, Plugin, PluginContext, PluginStatus, RendererRegistry, Result};
use std::sync::Arc;

/// Resolver plugin: registers a [`PlaceholderResolver`] as a content renderer
pub struct ResolverPlugin {
    name: String,
    version: String,
    status: PluginStatus,
    resolver: Option<Arc<PlaceholderResolver>>,
    renderers: Option<Arc<RendererRegistry>>,
}

impl ResolverPlugin {
    pub fn new() -> Self {
        Self {
            name: "resolver".to_string(),
            version: "0.1.0".to_string(),
            status: PluginStatus::Loading,
            resolver: None,
            renderers: None,
        }
    }

    /// The resolver built during initialization
    pub fn resolver(&self) -> Option<Arc<PlaceholderResolver>> {
        self.resolver.clone()
    }
}

impl Default for ResolverPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for ResolverPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn initialize(&mut self, context: &PluginContext) -> Result<()> {
        tracing::info!("Initializing resolver plugin");

        let resolver = Arc::new(
            PlaceholderResolver::new(
                context.store.clone(),
                EmbedOptions::from(&context.config.embed),
            )
            .with_event_bus(context.event_bus.clone()),
        );

        if let Err(e) = context.renderers.register_renderer(resolver.clone()).await {
            self.status = PluginStatus::Error(e.to_string());
            return Err(e);
        }

        self.resolver = Some(resolver);
        self.renderers = Some(context.renderers.clone());
        self.status = PluginStatus::Active;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down resolver plugin");
        self.status = PluginStatus::Shutting;

        if let (Some(renderers), Some(resolver)) = (self.renderers.take(), self.resolver.take()) {
            if let Err(e) = renderers.unregister_renderer(resolver.name()).await {
                tracing::warn!("Failed to unregister placeholder resolver: {}", e);
            }
        }

        self.status = PluginStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        self.status.clone()
    }

    fn provided_services(&self) -> Vec<&str> {
        vec!["placeholder-resolution"]
    }
}
