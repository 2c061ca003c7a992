//! Server plugin for HTTP handling
//!
//! This plugin provides a small web server with pluggable handlers. Routes are
//! dispatched dynamically through a [`HandlerRegistry`], so handlers can be
//! added after the server is listening.

pub mod handlers;

use async_trait::async_trait;
use axum::{
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use serde::Serialize;
use splot_core::{
    config::ServerConfig,
    error::{Result, SplotError},
    event::{EventBus, SystemEvent},
    plugin::{Plugin, PluginContext, PluginStatus},
};
use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::RwLock};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::handlers::{BootstrapHandler, RenderHandler, StoreBlockHandler};

/// Largest request body accepted, pasted documents can be big
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// HTTP handler trait for processing HTTP requests
#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Get the path pattern this handler matches
    fn path_pattern(&self) -> &str;

    /// Get the HTTP method this handler supports
    fn method(&self) -> Method;

    /// Handle the HTTP request
    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Get handler priority (lower numbers = higher priority)
    fn priority(&self) -> i32 {
        0
    }

    /// Check if this handler can process the given request
    fn can_handle(&self, path: &str, method: &Method) -> bool {
        self.method() == *method && self.matches_path(path)
    }

    /// Check if the path matches this handler's pattern
    fn matches_path(&self, path: &str) -> bool {
        let pattern = self.path_pattern();

        if pattern == "/" {
            return path == "/";
        }

        path == pattern || path.starts_with(&format!("{}/", pattern))
    }
}

/// HTTP request wrapper
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query_params: HashMap::new(),
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        use axum::http::header::{HeaderName, HeaderValue};
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Header value as text, `None` when absent or not visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Decode an `application/x-www-form-urlencoded` body
    pub fn form_params(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }
}

/// HTTP response wrapper
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a new HTTP response
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Set response body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set response status
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set response header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        use axum::http::header::{HeaderName, HeaderValue};
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Create a JSON response
    pub fn json<T: Serialize>(data: &T) -> Result<Self> {
        let body = serde_json::to_vec(data)
            .map_err(|e| SplotError::Server(format!("JSON serialization failed: {}", e)))?;

        Ok(Self::new(StatusCode::OK)
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    /// Create a text response
    pub fn text(content: &str) -> Self {
        Self::new(StatusCode::OK)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(content.as_bytes())
    }

    /// Create an error response
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::new(status)
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_body(message.as_bytes())
    }
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Handler registry for managing HTTP handlers
pub struct HandlerRegistry {
    http_handlers: RwLock<Vec<Arc<dyn HttpHandler>>>,
    event_bus: Arc<dyn EventBus>,
}

impl HandlerRegistry {
    /// Create a new handler registry
    pub fn new(event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            http_handlers: RwLock::new(Vec::new()),
            event_bus,
        }
    }

    /// Register an HTTP handler
    pub async fn register_http_handler(&self, handler: Arc<dyn HttpHandler>) -> Result<()> {
        let path = handler.path_pattern().to_string();
        let method = handler.method();

        info!("Registering HTTP handler: {} {}", method, path);

        {
            let mut handlers = self.http_handlers.write().await;
            handlers.push(handler);

            // Sort by priority (lower numbers first)
            handlers.sort_by_key(|h| h.priority());
        }

        if let Err(e) = self
            .event_bus
            .publish_system_event(SystemEvent::handler_registered(format!(
                "{} {}",
                method, path
            )))
            .await
        {
            warn!("Failed to publish handler registration event: {}", e);
        }

        Ok(())
    }

    /// Unregister an HTTP handler
    pub async fn unregister_http_handler(&self, path: &str, method: &Method) -> Result<()> {
        let mut handlers = self.http_handlers.write().await;
        let before = handlers.len();
        handlers.retain(|h| !(h.path_pattern() == path && h.method() == *method));

        if handlers.len() == before {
            return Err(SplotError::Server(format!(
                "No handler registered for {} {}",
                method, path
            )));
        }

        info!("Unregistered HTTP handler: {} {}", method, path);
        Ok(())
    }

    /// Find HTTP handler for a request
    pub async fn find_http_handler(
        &self,
        path: &str,
        method: &Method,
    ) -> Option<Arc<dyn HttpHandler>> {
        let handlers = self.http_handlers.read().await;
        handlers
            .iter()
            .find(|handler| handler.can_handle(path, method))
            .cloned()
    }

    /// Whether any handler serves `path`, regardless of method
    pub async fn has_path(&self, path: &str) -> bool {
        let handlers = self.http_handlers.read().await;
        handlers.iter().any(|handler| handler.matches_path(path))
    }

    /// List all registered HTTP handlers
    pub async fn list_http_handlers(&self) -> Vec<(String, Method, i32)> {
        let handlers = self.http_handlers.read().await;
        handlers
            .iter()
            .map(|h| (h.path_pattern().to_string(), h.method(), h.priority()))
            .collect()
    }

    /// Clear all handlers
    pub async fn clear_all_handlers(&self) {
        self.http_handlers.write().await.clear();
    }

    /// Publish a server-side failure on the event bus
    pub async fn report_error(&self, message: impl Into<String>) {
        publish_server_error(self.event_bus.as_ref(), message).await;
    }
}

async fn publish_server_error(event_bus: &dyn EventBus, message: impl Into<String>) {
    if let Err(e) = event_bus
        .publish_system_event(SystemEvent::error("server", message))
        .await
    {
        warn!("Failed to publish server error event: {}", e);
    }
}

/// Build the Axum router that dispatches every request through `registry`
pub fn build_router(registry: Arc<HandlerRegistry>, config: &ServerConfig) -> Router {
    let router = Router::new().fallback(move |req| {
        let registry = registry.clone();
        async move { handle_http_request(req, registry).await }
    });

    let router = match config.request_timeout_secs {
        Some(secs) => router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(secs))),
        ),
        None => router.layer(TraceLayer::new_for_http()),
    };

    if config.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Handle HTTP request
async fn handle_http_request(
    req: axum::extract::Request,
    registry: Arc<HandlerRegistry>,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path().to_string();
    let headers = req.headers().clone();

    let query_params: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let (_parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            warn!("Rejected request body for {} {}: {}", method, path, e);
            return HttpResponse::error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                .into_response();
        }
    };

    let http_request = HttpRequest {
        method: method.clone(),
        path: path.clone(),
        query_params,
        headers,
        body,
    };

    match registry.find_http_handler(&path, &method).await {
        Some(handler) => match handler.handle(http_request).await {
            Ok(response) => response.into_response(),
            Err(e) => {
                error!("Handler error for {} {}: {}", method, path, e);
                registry
                    .report_error(format!("{} {}: {}", method, path, e))
                    .await;
                HttpResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    .into_response()
            }
        },
        None if registry.has_path(&path).await => {
            HttpResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
                .into_response()
        }
        None => {
            tracing::debug!("No handler found for {} {}", method, path);
            HttpResponse::error(StatusCode::NOT_FOUND, "Not found").into_response()
        }
    }
}

/// Server plugin implementation
pub struct ServerPlugin {
    name: String,
    version: String,
    status: PluginStatus,
    config: Option<ServerConfig>,
    handler_registry: Option<Arc<HandlerRegistry>>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ServerPlugin {
    /// Create a server plugin that reads its settings from the engine config
    pub fn new() -> Self {
        Self {
            name: "server".to_string(),
            version: "0.1.0".to_string(),
            status: PluginStatus::Loading,
            config: None,
            handler_registry: None,
            local_addr: None,
            shutdown_tx: None,
            server_handle: None,
        }
    }

    /// Create a server plugin with explicit settings
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::new()
        }
    }

    /// Get the handler registry
    pub fn handler_registry(&self) -> Option<Arc<HandlerRegistry>> {
        self.handler_registry.clone()
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Register the store, bootstrap and render handlers
    async fn register_core_handlers(
        registry: &HandlerRegistry,
        context: &PluginContext,
        config: &ServerConfig,
    ) -> Result<()> {
        registry
            .register_http_handler(Arc::new(StoreBlockHandler::new(
                config.store_path.clone(),
                context.gateway.clone(),
            )))
            .await?;

        registry
            .register_http_handler(Arc::new(BootstrapHandler::new(
                config.nonce_path.clone(),
                config.store_path.clone(),
                context.gateway.nonces().clone(),
            )))
            .await?;

        registry
            .register_http_handler(Arc::new(RenderHandler::new(
                config.render_path.clone(),
                context.renderers.clone(),
            )))
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Plugin for ServerPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn initialize(&mut self, context: &PluginContext) -> Result<()> {
        info!("Initializing server plugin");

        let config = self
            .config
            .clone()
            .unwrap_or_else(|| context.config.server.clone());

        let registry = Arc::new(HandlerRegistry::new(context.event_bus.clone()));
        Self::register_core_handlers(&registry, context, &config).await?;
        self.handler_registry = Some(registry.clone());

        let router = build_router(registry, &config);
        let addr = format!("{}:{}", config.hostname, config.port);

        info!("Starting HTTP server on {}", addr);

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| SplotError::Server(format!("Failed to bind to {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SplotError::Server(format!("Failed to read bound address: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let event_bus = context.event_bus.clone();
        let server_handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Server error: {}", e);
                publish_server_error(event_bus.as_ref(), format!("Server error: {}", e)).await;
            }
        });

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.server_handle = Some(server_handle);
        self.status = PluginStatus::Active;

        context
            .event_bus
            .publish_system_event(SystemEvent::server_started(local_addr.to_string()))
            .await?;

        info!("Server plugin listening on {}", local_addr);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down server plugin");

        self.status = PluginStatus::Shutting;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.server_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Err(e)) => warn!("Server task ended abnormally: {}", e),
                Err(_) => warn!("Server did not stop within 5s"),
                Ok(Ok(())) => {}
            }
        }

        if let Some(registry) = self.handler_registry.take() {
            registry.clear_all_handlers().await;
        }

        self.local_addr = None;
        self.status = PluginStatus::Stopped;

        info!("Server plugin shutdown complete");
        Ok(())
    }

    fn status(&self) -> PluginStatus {
        self.status.clone()
    }

    fn provided_services(&self) -> Vec<&str> {
        vec!["http_server", "handler_registry"]
    }
}

impl Default for ServerPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splot_core::event::RecordingHandler;
    use splot_core::InMemoryEventBus;

    struct EchoHandler {
        path: &'static str,
        method: Method,
        priority: i32,
    }

    #[async_trait]
    impl HttpHandler for EchoHandler {
        fn path_pattern(&self) -> &str {
            self.path
        }

        fn method(&self) -> Method {
            self.method.clone()
        }

        async fn handle(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Ok(HttpResponse::text(&format!("{}:{}", self.path, self.priority)))
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    #[tokio::test]
    async fn test_handler_registry_dispatch() {
        let bus = Arc::new(InMemoryEventBus::new());
        let recorder = Arc::new(RecordingHandler::new());
        bus.subscribe_system_events(recorder.clone()).await.unwrap();

        let registry = HandlerRegistry::new(bus);
        assert!(registry.list_http_handlers().await.is_empty());

        registry
            .register_http_handler(Arc::new(EchoHandler {
                path: "/api",
                method: Method::GET,
                priority: 5,
            }))
            .await
            .unwrap();
        registry
            .register_http_handler(Arc::new(EchoHandler {
                path: "/api",
                method: Method::GET,
                priority: 1,
            }))
            .await
            .unwrap();

        let handler = registry.find_http_handler("/api/x", &Method::GET).await.unwrap();
        assert_eq!(handler.priority(), 1);
        assert!(registry.find_http_handler("/apix", &Method::GET).await.is_none());
        assert!(registry.find_http_handler("/api", &Method::POST).await.is_none());
        assert!(registry.has_path("/api").await);

        assert_eq!(
            recorder.event_types().await,
            vec!["handler_registered", "handler_registered"]
        );

        registry.unregister_http_handler("/api", &Method::GET).await.unwrap();
        assert!(registry.list_http_handlers().await.is_empty());
        assert!(registry
            .unregister_http_handler("/api", &Method::GET)
            .await
            .is_err());
    }

    struct BrokenHandler;

    #[async_trait]
    impl HttpHandler for BrokenHandler {
        fn path_pattern(&self) -> &str {
            "/broken"
        }

        fn method(&self) -> Method {
            Method::GET
        }

        async fn handle(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Err(SplotError::storage("disk full"))
        }
    }

    #[tokio::test]
    async fn test_handler_failure_is_published_as_error_event() {
        let bus = Arc::new(InMemoryEventBus::new());
        let recorder = Arc::new(RecordingHandler::new());
        bus.subscribe_system_events(recorder.clone()).await.unwrap();

        let registry = Arc::new(HandlerRegistry::new(bus));
        registry
            .register_http_handler(Arc::new(BrokenHandler))
            .await
            .unwrap();

        let server =
            axum_test::TestServer::new(build_router(registry, &ServerConfig::default())).unwrap();
        let response = server.get("/broken").await;
        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let events = recorder.events().await;
        let error = events
            .iter()
            .find(|event| event.event_type() == "error")
            .expect("error event");
        match error {
            SystemEvent::Error {
                source, message, ..
            } => {
                assert_eq!(source, "server");
                assert!(message.contains("GET /broken"));
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_request_helpers() {
        let request = HttpRequest::new(Method::POST, "/x")
            .with_header("x-splot-user", "alice")
            .with_body("a=1&b=two+words&c=%26");
        assert_eq!(request.header("x-splot-user"), Some("alice"));

        let form = request.form_params();
        assert_eq!(form.get("a").map(String::as_str), Some("1"));
        assert_eq!(form.get("b").map(String::as_str), Some("two words"));
        assert_eq!(form.get("c").map(String::as_str), Some("&"));
    }

    #[test]
    fn test_http_response_creation() {
        let response = HttpResponse::text("Hello, World!");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, b"Hello, World!");

        let response = HttpResponse::error(StatusCode::NOT_FOUND, "missing");
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }
}
