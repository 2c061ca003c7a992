//! Paste interceptor plugin for Splot
//!
//! Watches an editing surface for pasted full HTML documents, stores them
//! through a [`PersistenceGateway`] and leaves a placeholder token behind.

pub mod classifier;
pub mod http_gateway;
pub mod interceptor;
pub mod paste;
pub mod surface;

pub use classifier::{classify, is_full_html_document, Classification, ClipboardPayload};
pub use http_gateway::HttpGateway;
pub use interceptor::{
    AttachState, Interception, InterceptorSettings, PasteInterceptor, PasteOutcome, PendingStore,
};
pub use paste::PasteEvent;
pub use surface::{EditorSurface, TextSelection};

use async_trait::async_trait;
use std::sync::Arc;

use splot_core::security::STORE_ACTION;
use splot_core::{
    DocumentContext, EventBus, LocalGateway, PersistenceGateway, Plugin, PluginContext,
    PluginStatus, Result, SplotError,
};

/// Interceptor plugin: hands out interceptors wired to the in-process gateway
pub struct InterceptorPlugin {
    name: String,
    version: String,
    status: PluginStatus,
    gateway: Option<Arc<LocalGateway>>,
    event_bus: Option<Arc<dyn EventBus>>,
    placeholder_tag: String,
}

impl InterceptorPlugin {
    pub fn new() -> Self {
        Self {
            name: "interceptor".to_string(),
            version: "0.1.0".to_string(),
            status: PluginStatus::Loading,
            gateway: None,
            event_bus: None,
            placeholder_tag: splot_core::block::PLACEHOLDER_TAG.to_string(),
        }
    }

    /// Build an interceptor for one editing session, issuing its nonce
    pub fn create_interceptor(
        &self,
        context: DocumentContext,
        principal: Option<String>,
    ) -> Result<PasteInterceptor> {
        let gateway = self
            .gateway
            .clone()
            .ok_or_else(|| SplotError::plugin("Interceptor plugin is not initialized"))?;

        let nonce = gateway.nonces().create(STORE_ACTION, principal.as_deref());
        let mut settings =
            InterceptorSettings::new(nonce, context).with_placeholder_tag(&self.placeholder_tag);
        settings.principal = principal;

        let gateway: Arc<dyn PersistenceGateway> = gateway;
        let mut interceptor = PasteInterceptor::new(gateway, settings);
        if let Some(event_bus) = &self.event_bus {
            interceptor = interceptor.with_event_bus(event_bus.clone());
        }
        Ok(interceptor)
    }
}

impl Default for InterceptorPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for InterceptorPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn initialize(&mut self, context: &PluginContext) -> Result<()> {
        tracing::info!("Initializing interceptor plugin");
        self.gateway = Some(context.gateway.clone());
        self.event_bus = Some(context.event_bus.clone());
        self.placeholder_tag = context.config.embed.placeholder_tag.clone();
        self.status = PluginStatus::Active;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("Shutting down interceptor plugin");
        self.gateway = None;
        self.event_bus = None;
        self.status = PluginStatus::Stopped;
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        self.status.clone()
    }

    fn provided_services(&self) -> Vec<&str> {
        vec!["paste-interception"]
    }
}
