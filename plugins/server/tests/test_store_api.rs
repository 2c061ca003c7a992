use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum_test::TestServer;
use splot_core::gateway::{encode_payload, PRINCIPAL_HEADER};
use splot_core::security::STORE_ACTION;
use splot_core::{BlockId, Config, DocumentId, DocumentStore, SplotEngine};
use splot_resolver::ResolverPlugin;
use splot_server::handlers::{BootstrapHandler, RenderHandler, StoreBlockHandler};
use splot_server::{build_router, HandlerRegistry, HttpHandler, HttpRequest};
use std::sync::Arc;

const DOCUMENT: &str = "<html><head><title>x</title></head><body>Hi & \"quote\"</body></html>";

fn doc(raw: u64) -> DocumentId {
    DocumentId::new(raw).unwrap()
}

async fn engine_with(config: Config) -> SplotEngine {
    let mut engine = SplotEngine::new(config).await.unwrap();
    engine
        .register_plugin(Box::new(ResolverPlugin::new()))
        .await
        .unwrap();
    engine
}

async fn engine() -> SplotEngine {
    let mut config = Config::default();
    config.storage.documents = vec![5];
    engine_with(config).await
}

async fn test_server(engine: &SplotEngine) -> TestServer {
    let context = engine.context();
    let config = &context.config.server;
    let registry = Arc::new(HandlerRegistry::new(context.event_bus.clone()));

    registry
        .register_http_handler(Arc::new(StoreBlockHandler::new(
            config.store_path.clone(),
            context.gateway.clone(),
        )))
        .await
        .unwrap();
    registry
        .register_http_handler(Arc::new(BootstrapHandler::new(
            config.nonce_path.clone(),
            config.store_path.clone(),
            context.gateway.nonces().clone(),
        )))
        .await
        .unwrap();
    registry
        .register_http_handler(Arc::new(RenderHandler::new(
            config.render_path.clone(),
            context.renderers.clone(),
        )))
        .await
        .unwrap();

    TestServer::new(build_router(registry, config)).unwrap()
}

fn store_form(nonce: &str, post_id: &str, html: &str) -> Vec<(&'static str, String)> {
    vec![
        ("action", "cogdog_splot_save_html".to_string()),
        ("nonce", nonce.to_string()),
        ("post_id", post_id.to_string()),
        ("html_content", encode_payload(html)),
        ("is_encoded", "1".to_string()),
    ]
}

#[tokio::test]
async fn test_store_handler_direct_call() {
    let engine = engine().await;
    let handler = StoreBlockHandler::new("/api/splot-html".to_string(), engine.gateway());
    let nonce = engine.gateway().nonces().create(STORE_ACTION, None);

    let body = format!(
        "nonce={}&post_id=5&html_content={}&is_encoded=0",
        nonce, "%3Cbody%3Ex%3C%2Fbody%3E"
    );
    let request = HttpRequest::new(Method::POST, "/api/splot-html").with_body(body);
    let response = handler.handle(request).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(json["success"], true);

    let id = BlockId::parse(json["data"]["block_id"].as_str().unwrap()).unwrap();
    assert_eq!(
        engine.gateway().fetch(doc(5), &id).await.unwrap().as_deref(),
        Some("<body>x</body>")
    );
}

#[tokio::test]
async fn test_store_then_render_over_http() {
    let engine = engine().await;
    let server = test_server(&engine).await;

    let bootstrap = server
        .get("/api/bootstrap")
        .add_query_param("post", "5")
        .await;
    assert_eq!(bootstrap.status_code(), StatusCode::OK);
    let bootstrap: serde_json::Value = bootstrap.json();
    assert_eq!(bootstrap["ajaxUrl"], "/api/splot-html");
    assert_eq!(bootstrap["postId"], 5);
    let nonce = bootstrap["nonce"].as_str().unwrap().to_string();

    let stored = server
        .post("/api/splot-html")
        .form(&store_form(&nonce, "5", DOCUMENT))
        .await;
    assert_eq!(stored.status_code(), StatusCode::OK);
    let stored: serde_json::Value = stored.json();
    let block_id = stored["data"]["block_id"].as_str().unwrap().to_string();
    assert!(block_id.starts_with("splot_html_"));

    let rendered = server
        .post("/api/render")
        .json(&serde_json::json!({
            "document_id": 5,
            "content": format!("<p>Above</p>\n[placeholder id=\"{}\"]", block_id),
        }))
        .await;
    assert_eq!(rendered.status_code(), StatusCode::OK);
    let rendered: serde_json::Value = rendered.json();
    let html = rendered["html"].as_str().unwrap();
    assert!(html.starts_with("<p>Above</p>\n<iframe srcdoc=\""));
    assert!(html.contains("Hi &amp; &quot;quote&quot;"));
    assert!(html.contains(r#"sandbox="allow-scripts allow-same-origin""#));
}

#[tokio::test]
async fn test_invalid_nonce_is_forbidden() {
    let engine = engine().await;
    let server = test_server(&engine).await;

    let response = server
        .post("/api/splot-html")
        .form(&store_form("0123456789abcdef0123", "5", DOCUMENT))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    let json: serde_json::Value = response.json();
    assert_eq!(
        json,
        serde_json::json!({
            "success": false,
            "data": "Invalid nonce",
            "code": "invalid_authorization"
        })
    );
    assert!(engine.store().meta_keys(doc(5)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_input_and_bad_payload() {
    let engine = engine().await;
    let server = test_server(&engine).await;
    let nonce = engine.gateway().nonces().create(STORE_ACTION, None);

    let missing = server
        .post("/api/splot-html")
        .form(&store_form(&nonce, "", DOCUMENT))
        .await;
    assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = missing.json();
    assert_eq!(json["code"], "missing_input");

    let mut form = store_form(&nonce, "5", DOCUMENT);
    form[3].1 = "***not base64***".to_string();
    let bad = server.post("/api/splot-html").form(&form).await;
    assert_eq!(bad.status_code(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = bad.json();
    assert_eq!(json["code"], "decode");
}

#[tokio::test]
async fn test_permission_is_checked_per_caller() {
    let mut config = Config::default();
    config.storage.documents = vec![5];
    config.security.allow_any_editor = false;
    config
        .security
        .editors
        .insert("alice".to_string(), vec![5]);
    let engine = engine_with(config).await;
    let server = test_server(&engine).await;
    let header = HeaderName::from_static(PRINCIPAL_HEADER);

    let bob_nonce = engine.gateway().nonces().create(STORE_ACTION, Some("bob"));
    let denied = server
        .post("/api/splot-html")
        .add_header(header.clone(), HeaderValue::from_static("bob"))
        .form(&store_form(&bob_nonce, "5", DOCUMENT))
        .await;
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
    let json: serde_json::Value = denied.json();
    assert_eq!(json["code"], "insufficient_permission");

    // A token issued to one caller is not valid for another
    let replayed = server
        .post("/api/splot-html")
        .add_header(header.clone(), HeaderValue::from_static("alice"))
        .form(&store_form(&bob_nonce, "5", DOCUMENT))
        .await;
    let json: serde_json::Value = replayed.json();
    assert_eq!(json["code"], "invalid_authorization");

    let alice_nonce = engine.gateway().nonces().create(STORE_ACTION, Some("alice"));
    let allowed = server
        .post("/api/splot-html")
        .add_header(header, HeaderValue::from_static("alice"))
        .form(&store_form(&alice_nonce, "5", DOCUMENT))
        .await;
    assert_eq!(allowed.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_render_diagnostics_and_errors() {
    let engine = engine().await;
    let server = test_server(&engine).await;

    let missing = server
        .post("/api/render")
        .json(&serde_json::json!({
            "document_id": 5,
            "content": "[placeholder id=\"nonexistent-token\"]"
        }))
        .await;
    let json: serde_json::Value = missing.json();
    assert_eq!(json["success"], true);
    assert_eq!(
        json["html"],
        "<!-- CogDog Splot HTML: No HTML found for ID nonexistent-token -->"
    );

    let invalid = server.post("/api/render").text("not json").await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    let json: serde_json::Value = invalid.json();
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_unknown_routes_and_methods() {
    let engine = engine().await;
    let server = test_server(&engine).await;

    assert_eq!(
        server.get("/nowhere").await.status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        server.get("/api/splot-html").await.status_code(),
        StatusCode::METHOD_NOT_ALLOWED
    );
}

#[tokio::test]
async fn test_blocks_survive_restart_with_json_dir_store() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.backend = splot_core::StorageBackend::JsonDir;
    config.storage.directory = Some(temp_dir.path().to_path_buf());
    config.storage.documents = vec![9];

    let block_id = {
        let engine = engine_with(config.clone()).await;
        let server = test_server(&engine).await;
        let nonce = engine.gateway().nonces().create(STORE_ACTION, None);

        let stored = server
            .post("/api/splot-html")
            .form(&store_form(&nonce, "9", DOCUMENT))
            .await;
        assert_eq!(stored.status_code(), StatusCode::OK);
        let stored: serde_json::Value = stored.json();
        stored["data"]["block_id"].as_str().unwrap().to_string()
    };

    let engine = engine_with(config).await;
    let server = test_server(&engine).await;
    let rendered = server
        .post("/api/render")
        .json(&serde_json::json!({
            "document_id": 9,
            "content": format!("[placeholder id=\"{}\"]", block_id),
        }))
        .await;
    let rendered: serde_json::Value = rendered.json();
    let html = rendered["html"].as_str().unwrap();
    assert!(html.starts_with("<iframe srcdoc=\""));
    assert!(html.contains("Hi &amp; &quot;quote&quot;"));
}
