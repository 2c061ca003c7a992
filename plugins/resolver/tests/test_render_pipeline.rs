use splot_core::{
    Config, DocumentId, PersistenceGateway, RenderContext, SplotEngine, StoreRequest,
};
use splot_resolver::ResolverPlugin;

fn doc(raw: u64) -> DocumentId {
    DocumentId::new(raw).unwrap()
}

async fn engine() -> SplotEngine {
    let mut config = Config::default();
    config.storage.documents = vec![7];
    let mut engine = SplotEngine::new(config).await.unwrap();
    engine
        .register_plugin(Box::new(ResolverPlugin::new()))
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn test_stored_block_renders_through_registry() {
    let engine = engine().await;
    let gateway = engine.gateway();
    let nonce = gateway.nonces().create("cogdog_splot_html", None);

    let id = gateway
        .store(StoreRequest::encoded(nonce, doc(7), r#"<body>Hi & "quote"</body>"#))
        .await
        .unwrap();

    let text = format!("Before\n{}\nAfter", id.placeholder());
    let result = engine
        .context()
        .renderers
        .render_content(&text, &RenderContext::new(Some(doc(7))))
        .await
        .unwrap();

    assert!(result.html.starts_with("Before\n<iframe srcdoc=\""));
    assert!(result.html.contains("Hi &amp; &quot;quote&quot;"));
    assert!(result.html.ends_with("</iframe>\nAfter"));
    assert_eq!(result.metadata.renderer_name, "placeholder-resolver");
}

#[tokio::test]
async fn test_render_without_document_context_is_inert() {
    let engine = engine().await;
    let result = engine
        .context()
        .renderers
        .render_content(
            r#"[placeholder id="splot_html_abc123"]"#,
            &RenderContext::new(None),
        )
        .await
        .unwrap();
    assert_eq!(result.html, "<!-- CogDog Splot HTML: No post context -->");
}

#[tokio::test]
async fn test_shutdown_unregisters_renderer() {
    let mut engine = engine().await;
    assert_eq!(
        engine.context().renderers.list_renderers().await,
        vec!["placeholder-resolver"]
    );
    engine.shutdown().await.unwrap();
    assert!(engine.context().renderers.list_renderers().await.is_empty());
}
