//! Placeholder resolution at render time

use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;

use splot_core::block::scan_placeholders;
use splot_core::event::UnresolvedReason;
use splot_core::renderer::RenderMetadata;
use splot_core::{
    BlockId, ContentRenderer, DocumentId, DocumentStore, EventBus, RenderContext, RenderResult,
    Result, SystemEvent,
};

use crate::embed::{render_iframe, EmbedOptions};
use crate::escape::escape_comment_text;

const MARKER_PREFIX: &str = "CogDog Splot HTML";

/// Outcome of resolving one placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Stored document found, rendered as a sandboxed frame
    Embed { block_id: BlockId, html: String },
    /// Inert comment standing in for the placeholder
    Diagnostic {
        reason: UnresolvedReason,
        marker: String,
    },
}

impl Resolution {
    pub fn as_html(&self) -> &str {
        match self {
            Resolution::Embed { html, .. } => html,
            Resolution::Diagnostic { marker, .. } => marker,
        }
    }

    pub fn into_html(self) -> String {
        match self {
            Resolution::Embed { html, .. } => html,
            Resolution::Diagnostic { marker, .. } => marker,
        }
    }

    pub fn is_embed(&self) -> bool {
        matches!(self, Resolution::Embed { .. })
    }
}

fn diagnostic(reason: UnresolvedReason, detail: String) -> Resolution {
    Resolution::Diagnostic {
        reason,
        marker: format!("<!-- {}: {} -->", MARKER_PREFIX, detail),
    }
}

fn not_found(reason: UnresolvedReason, raw_id: &str) -> Resolution {
    diagnostic(
        reason,
        format!("No HTML found for ID {}", escape_comment_text(raw_id)),
    )
}

/// Expands placeholder tokens into frames around the documents they name.
///
/// Lookups are scoped to the document passed with each call, the resolver keeps
/// no ambient notion of a current document.
pub struct PlaceholderResolver {
    store: Arc<dyn DocumentStore>,
    options: EmbedOptions,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl PlaceholderResolver {
    pub fn new(store: Arc<dyn DocumentStore>, options: EmbedOptions) -> Self {
        Self {
            store,
            options,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn options(&self) -> &EmbedOptions {
        &self.options
    }

    /// Resolve a single placeholder. Never fails: anything that prevents a
    /// frame from being built degrades to a diagnostic comment.
    pub async fn resolve(&self, raw_id: Option<&str>, document: Option<DocumentId>) -> Resolution {
        let resolution = self.lookup(raw_id, document).await;

        match &resolution {
            Resolution::Embed { block_id, .. } => {
                if let Some(document) = document {
                    self.publish(SystemEvent::placeholder_resolved(document, block_id.clone()))
                        .await;
                }
            }
            Resolution::Diagnostic { reason, .. } => {
                self.publish(SystemEvent::placeholder_unresolved(document, *reason))
                    .await;
            }
        }

        resolution
    }

    async fn lookup(&self, raw_id: Option<&str>, document: Option<DocumentId>) -> Resolution {
        let raw_id = raw_id.map(str::trim).unwrap_or("");
        if raw_id.is_empty() {
            return diagnostic(UnresolvedReason::MissingId, "No ID provided".to_string());
        }

        let Some(document) = document else {
            return diagnostic(
                UnresolvedReason::NoDocumentContext,
                "No post context".to_string(),
            );
        };

        let Some(block_id) = BlockId::parse(raw_id) else {
            tracing::debug!("Placeholder id outside the block id alphabet: {:?}", raw_id);
            return not_found(UnresolvedReason::NotFound, raw_id);
        };

        match self.store.get_meta(document, &block_id.meta_key()).await {
            Ok(Some(html)) if !html.is_empty() => {
                tracing::debug!("Resolved {} in document {}", block_id, document);
                Resolution::Embed {
                    html: render_iframe(&html, &self.options),
                    block_id,
                }
            }
            Ok(_) => {
                tracing::warn!("No stored HTML for {} in document {}", block_id, document);
                not_found(UnresolvedReason::NotFound, raw_id)
            }
            Err(e) => {
                tracing::warn!(
                    "Store lookup for {} in document {} failed: {}",
                    block_id,
                    document,
                    e
                );
                not_found(UnresolvedReason::StoreError, raw_id)
            }
        }
    }

    /// Replace every placeholder in `text` with its resolution.
    ///
    /// Lookups run concurrently, text outside the tokens is copied unchanged.
    pub async fn expand(&self, text: &str, document: Option<DocumentId>) -> String {
        let matches = scan_placeholders(text);
        if matches.is_empty() {
            return text.to_string();
        }

        let resolutions = join_all(
            matches
                .iter()
                .map(|m| self.resolve(m.raw_id.as_deref(), document)),
        )
        .await;

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for (m, resolution) in matches.iter().zip(resolutions) {
            output.push_str(&text[last..m.range.start]);
            output.push_str(resolution.as_html());
            last = m.range.end;
        }
        output.push_str(&text[last..]);
        output
    }

    async fn publish(&self, event: SystemEvent) {
        if let Some(event_bus) = &self.event_bus {
            if let Err(e) = event_bus.publish_system_event(event).await {
                tracing::warn!("Failed to publish resolver event: {}", e);
            }
        }
    }
}

#[async_trait]
impl ContentRenderer for PlaceholderResolver {
    fn name(&self) -> &str {
        "placeholder-resolver"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn can_render(&self, content_type: &str) -> bool {
        matches!(content_type, "text/html" | "text/plain")
    }

    async fn render(&self, content: &str, context: &RenderContext) -> Result<RenderResult> {
        let placeholders = scan_placeholders(content).len();
        let html = self.expand(content, context.document).await;

        let mut metadata = RenderMetadata::default();
        metadata
            .custom_metadata
            .insert("placeholders".to_string(), serde_json::json!(placeholders));

        Ok(RenderResult::new(html).with_metadata(metadata))
    }

    fn priority(&self) -> u32 {
        200
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splot_core::event::RecordingHandler;
    use splot_core::store::InMemoryStore;
    use splot_core::{InMemoryEventBus, SplotError};

    fn doc(raw: u64) -> DocumentId {
        DocumentId::new(raw).unwrap()
    }

    async fn resolver_with(entries: &[(u64, &BlockId, &str)]) -> PlaceholderResolver {
        let store = InMemoryStore::with_documents([doc(1), doc(2)]).await;
        for (document, id, html) in entries {
            store
                .insert_meta(doc(*document), &id.meta_key(), html)
                .await
                .unwrap();
        }
        PlaceholderResolver::new(Arc::new(store), EmbedOptions::default())
    }

    #[tokio::test]
    async fn test_stored_document_becomes_escaped_frame() {
        let id = BlockId::parse("splot_html_abc123").unwrap();
        let resolver = resolver_with(&[(1, &id, r#"<body>Hi & "quote"</body>"#)]).await;

        let resolution = resolver.resolve(Some("splot_html_abc123"), Some(doc(1))).await;
        assert!(resolution.is_embed());
        let html = resolution.into_html();
        assert!(html.starts_with("<iframe srcdoc=\""));
        assert!(html.contains("Hi &amp; &quot;quote&quot;"));
        assert!(html.contains(r#"sandbox="allow-scripts allow-same-origin""#));
    }

    #[tokio::test]
    async fn test_repeated_renders_escape_once() {
        let id = BlockId::parse("splot_html_1").unwrap();
        let resolver = resolver_with(&[(1, &id, "a &amp; b")]).await;

        let first = resolver.expand(r#"[placeholder id="splot_html_1"]"#, Some(doc(1))).await;
        let second = resolver.expand(r#"[placeholder id="splot_html_1"]"#, Some(doc(1))).await;
        assert_eq!(first, second);
        assert!(first.contains("a &amp;amp; b"));
        assert!(!first.contains("&amp;amp;amp;"));
    }

    #[tokio::test]
    async fn test_diagnostics() {
        let id = BlockId::parse("splot_html_1").unwrap();
        let resolver = resolver_with(&[(1, &id, "<body>x</body>")]).await;

        assert_eq!(
            resolver.resolve(None, Some(doc(1))).await.into_html(),
            "<!-- CogDog Splot HTML: No ID provided -->"
        );
        assert_eq!(
            resolver.resolve(Some("  "), Some(doc(1))).await.into_html(),
            "<!-- CogDog Splot HTML: No ID provided -->"
        );
        assert_eq!(
            resolver.resolve(Some("splot_html_1"), None).await.into_html(),
            "<!-- CogDog Splot HTML: No post context -->"
        );
        assert_eq!(
            resolver
                .resolve(Some("nonexistent-token"), Some(doc(1)))
                .await
                .into_html(),
            "<!-- CogDog Splot HTML: No HTML found for ID nonexistent-token -->"
        );
        // Lookups never cross documents
        assert_eq!(
            resolver
                .resolve(Some("splot_html_1"), Some(doc(2)))
                .await
                .into_html(),
            "<!-- CogDog Splot HTML: No HTML found for ID splot_html_1 -->"
        );
    }

    #[tokio::test]
    async fn test_unparseable_id_is_escaped_in_marker() {
        let resolver = resolver_with(&[]).await;
        let html = resolver
            .resolve(Some("<b>-->"), Some(doc(1)))
            .await
            .into_html();
        assert!(html.starts_with("<!-- CogDog Splot HTML: No HTML found for ID &lt;b&gt;"));
        assert_eq!(html.matches("-->").count(), 1);
    }

    #[tokio::test]
    async fn test_expand_replaces_every_token_in_place() {
        let a = BlockId::parse("splot_html_a").unwrap();
        let b = BlockId::parse("splot_html_b").unwrap();
        let resolver = resolver_with(&[(1, &a, "A"), (1, &b, "B")]).await;

        let text = r#"intro [placeholder id="splot_html_a"] middle [splot-html id='splot_html_b'] [placeholder id=missing] end"#;
        let expanded = resolver.expand(text, Some(doc(1))).await;

        assert_eq!(
            expanded,
            format!(
                "intro {} middle {} {} end",
                render_iframe("A", resolver.options()),
                render_iframe("B", resolver.options()),
                "<!-- CogDog Splot HTML: No HTML found for ID missing -->"
            )
        );
    }

    #[tokio::test]
    async fn test_text_without_tokens_is_unchanged() {
        let resolver = resolver_with(&[]).await;
        let text = "Hello [world] & \"friends\"";
        assert_eq!(resolver.expand(text, Some(doc(1))).await, text);
    }

    #[tokio::test]
    async fn test_resolution_events() {
        let id = BlockId::parse("splot_html_1").unwrap();
        let bus = Arc::new(InMemoryEventBus::new());
        let recorder = Arc::new(RecordingHandler::new());
        bus.subscribe_system_events(recorder.clone()).await.unwrap();

        let resolver = resolver_with(&[(1, &id, "x")])
            .await
            .with_event_bus(bus);
        resolver.resolve(Some("splot_html_1"), Some(doc(1))).await;
        resolver.resolve(Some("splot_html_2"), Some(doc(1))).await;

        assert_eq!(
            recorder.event_types().await,
            vec!["placeholder_resolved", "placeholder_unresolved"]
        );
    }

    #[tokio::test]
    async fn test_renderer_reports_placeholder_count() {
        let resolver = resolver_with(&[]).await;
        let context = RenderContext::new(Some(doc(1)));
        let result = resolver
            .render("[placeholder id=a] [placeholder id=b]", &context)
            .await
            .unwrap();
        assert_eq!(
            result.metadata.custom_metadata.get("placeholders"),
            Some(&serde_json::json!(2))
        );
        assert!(resolver.can_render("text/plain"));
        assert!(!resolver.can_render("text/markdown"));
    }

    struct UnavailableStore;

    #[async_trait]
    impl DocumentStore for UnavailableStore {
        async fn document_exists(&self, _document: DocumentId) -> Result<bool> {
            Ok(true)
        }

        async fn create_document(&self, _document: DocumentId) -> Result<()> {
            Ok(())
        }

        async fn insert_meta(&self, _document: DocumentId, _key: &str, _value: &str) -> Result<()> {
            Err(SplotError::storage("store offline"))
        }

        async fn get_meta(&self, _document: DocumentId, _key: &str) -> Result<Option<String>> {
            Err(SplotError::storage("store offline"))
        }

        async fn meta_keys(&self, _document: DocumentId) -> Result<Vec<String>> {
            Err(SplotError::storage("store offline"))
        }

        fn backend_name(&self) -> &str {
            "unavailable"
        }
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_diagnostic() {
        let bus = Arc::new(InMemoryEventBus::new());
        let recorder = Arc::new(RecordingHandler::new());
        bus.subscribe_system_events(recorder.clone()).await.unwrap();

        let resolver = PlaceholderResolver::new(Arc::new(UnavailableStore), EmbedOptions::default())
            .with_event_bus(bus);

        let expanded = resolver
            .expand(r#"before [placeholder id="splot_html_1"] after"#, Some(doc(1)))
            .await;
        assert_eq!(
            expanded,
            "before <!-- CogDog Splot HTML: No HTML found for ID splot_html_1 --> after"
        );

        let context = RenderContext::new(Some(doc(1)));
        let result = resolver
            .render(r#"[placeholder id="splot_html_1"]"#, &context)
            .await;
        assert!(result.is_ok());

        let events = recorder.events().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| matches!(
            event,
            SystemEvent::PlaceholderUnresolved {
                reason: UnresolvedReason::StoreError,
                ..
            }
        )));
    }
}
