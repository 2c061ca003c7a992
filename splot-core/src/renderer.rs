//! Content renderer system for pluggable render passes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::document::DocumentId;
use crate::error::{Result, SplotError};

/// Metadata about the rendering process and renderer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderMetadata {
    /// Name of the renderer that processed the content
    pub renderer_name: String,
    /// Version of the renderer
    pub renderer_version: String,
    /// Time taken to render (in milliseconds)
    pub render_time_ms: Option<u64>,
    /// Additional renderer-specific metadata
    pub custom_metadata: HashMap<String, serde_json::Value>,
}

impl Default for RenderMetadata {
    fn default() -> Self {
        Self {
            renderer_name: "unknown".to_string(),
            renderer_version: "0.0.0".to_string(),
            render_time_ms: None,
            custom_metadata: HashMap::new(),
        }
    }
}

/// Trait for renderers that transform stored text on its way to a reader
#[async_trait]
pub trait ContentRenderer: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str;

    /// Check if this renderer can handle the given content type
    fn can_render(&self, content_type: &str) -> bool;

    /// Render content with the given context
    async fn render(&self, content: &str, context: &RenderContext) -> Result<RenderResult>;

    /// Get the priority of this renderer (higher priority = preferred)
    fn priority(&self) -> u32 {
        100
    }
}

/// Context of one render pass
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Document whose content is being rendered, lookups never leave it
    pub document: Option<DocumentId>,
    /// Content type being rendered
    pub content_type: String,
}

impl RenderContext {
    /// Create a render context for the given document
    pub fn new(document: Option<DocumentId>) -> Self {
        Self {
            document,
            content_type: "text/html".to_string(),
        }
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: String) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Result of content rendering
#[derive(Debug, Clone)]
pub struct RenderResult {
    /// Rendered HTML content
    pub html: String,
    /// Metadata about the rendering process
    pub metadata: RenderMetadata,
}

impl RenderResult {
    /// Create a new render result
    pub fn new(html: String) -> Self {
        Self {
            html,
            metadata: RenderMetadata::default(),
        }
    }

    /// Add metadata to the result
    pub fn with_metadata(mut self, metadata: RenderMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Registry for managing content renderers
pub struct RendererRegistry {
    renderers: RwLock<HashMap<String, Arc<dyn ContentRenderer>>>,
    render_pipeline: RwLock<Vec<String>>,
}

impl RendererRegistry {
    /// Create a new renderer registry
    pub fn new() -> Self {
        Self {
            renderers: RwLock::new(HashMap::new()),
            render_pipeline: RwLock::new(Vec::new()),
        }
    }

    /// Register a content renderer
    pub async fn register_renderer(&self, renderer: Arc<dyn ContentRenderer>) -> Result<()> {
        let name = renderer.name().to_string();

        {
            let mut renderers = self.renderers.write().await;

            if renderers.contains_key(&name) {
                return Err(SplotError::Plugin(format!(
                    "Renderer '{}' is already registered",
                    name
                )));
            }

            renderers.insert(name.clone(), renderer);
        }

        self.update_pipeline_order().await;

        tracing::info!("Registered content renderer: {}", name);
        Ok(())
    }

    /// Unregister a content renderer
    pub async fn unregister_renderer(&self, name: &str) -> Result<()> {
        let removed = self.renderers.write().await.remove(name).is_some();

        if removed {
            self.update_pipeline_order().await;
            tracing::info!("Unregistered content renderer: {}", name);
            Ok(())
        } else {
            Err(SplotError::Plugin(format!(
                "Renderer '{}' is not registered",
                name
            )))
        }
    }

    /// Find the best renderer for the given content type
    pub async fn find_renderer(&self, content_type: &str) -> Option<Arc<dyn ContentRenderer>> {
        let renderers = self.renderers.read().await;
        let pipeline = self.render_pipeline.read().await;

        pipeline
            .iter()
            .filter_map(|name| renderers.get(name))
            .find(|renderer| renderer.can_render(content_type))
            .cloned()
    }

    /// Render content using the appropriate renderer
    pub async fn render_content(
        &self,
        content: &str,
        context: &RenderContext,
    ) -> Result<RenderResult> {
        let renderer = self
            .find_renderer(&context.content_type)
            .await
            .ok_or_else(|| {
                SplotError::Plugin(format!(
                    "No renderer found for content type: {}",
                    context.content_type
                ))
            })?;

        let start_time = std::time::Instant::now();
        let mut result = renderer.render(content, context).await?;
        let render_time = start_time.elapsed().as_millis() as u64;

        result.metadata.render_time_ms = Some(render_time);
        result.metadata.renderer_name = renderer.name().to_string();
        result.metadata.renderer_version = renderer.version().to_string();

        Ok(result)
    }

    /// Get all registered renderers
    pub async fn list_renderers(&self) -> Vec<String> {
        self.render_pipeline.read().await.clone()
    }

    /// Update the pipeline order based on renderer priorities
    async fn update_pipeline_order(&self) {
        let renderers = self.renderers.read().await;
        let mut pipeline: Vec<(String, u32)> = renderers
            .iter()
            .map(|(name, renderer)| (name.clone(), renderer.priority()))
            .collect();

        // Sort by priority (higher first)
        pipeline.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut render_pipeline = self.render_pipeline.write().await;
        *render_pipeline = pipeline.into_iter().map(|(name, _)| name).collect();
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new()
    }
}
