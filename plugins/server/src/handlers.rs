//! Concrete handler implementations for the server plugin

use crate::{HttpHandler, HttpRequest, HttpResponse};
use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use splot_core::document::POST_ID_FIELD;
use splot_core::gateway::{fields, PRINCIPAL_HEADER};
use splot_core::security::STORE_ACTION;
use splot_core::{
    BootstrapData, DocumentContext, DocumentId, NonceManager, PersistenceGateway, RenderContext,
    RendererRegistry, Result, SplotError, StoreRequest, StoreResponse,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Status code reported alongside a failed store
fn status_for(error: &SplotError) -> StatusCode {
    match error {
        SplotError::InvalidAuthorization(_) | SplotError::InsufficientPermission(_) => {
            StatusCode::FORBIDDEN
        }
        SplotError::MissingInput(_) | SplotError::Decode(_) => StatusCode::BAD_REQUEST,
        SplotError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Accepts form-encoded store requests from an editor
pub struct StoreBlockHandler {
    path_pattern: String,
    gateway: Arc<dyn PersistenceGateway>,
}

impl StoreBlockHandler {
    pub fn new(path_pattern: String, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            path_pattern,
            gateway,
        }
    }

    fn parse_request(request: &HttpRequest) -> StoreRequest {
        let mut form = request.form_params();

        StoreRequest {
            nonce: form.remove(fields::NONCE),
            document: form
                .get(fields::POST_ID)
                .and_then(|raw| DocumentId::parse(raw)),
            html_content: form.remove(fields::HTML_CONTENT).unwrap_or_default(),
            is_encoded: form.get(fields::IS_ENCODED).map(String::as_str) == Some("1"),
            principal: request.header(PRINCIPAL_HEADER).map(str::to_string),
        }
    }
}

#[async_trait]
impl HttpHandler for StoreBlockHandler {
    fn path_pattern(&self) -> &str {
        &self.path_pattern
    }

    fn method(&self) -> Method {
        Method::POST
    }

    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse> {
        let store_request = Self::parse_request(&request);
        debug!(
            "Store request for document {:?} ({} bytes, encoded: {})",
            store_request.document.map(|d| d.get()),
            store_request.html_content.len(),
            store_request.is_encoded
        );

        match self.gateway.store(store_request).await {
            Ok(block_id) => HttpResponse::json(&StoreResponse::stored(block_id)),
            Err(e) => {
                if e.is_rejection() {
                    debug!("Store request rejected: {}", e);
                } else {
                    warn!("Store request failed: {}", e);
                }
                let status = status_for(&e);
                Ok(HttpResponse::json(&StoreResponse::failed(&e))?.with_status(status))
            }
        }
    }
}

/// Issues the data an editing session needs: store URL, nonce and document id
pub struct BootstrapHandler {
    path_pattern: String,
    store_path: String,
    nonces: NonceManager,
}

impl BootstrapHandler {
    pub fn new(path_pattern: String, store_path: String, nonces: NonceManager) -> Self {
        Self {
            path_pattern,
            store_path,
            nonces,
        }
    }
}

#[async_trait]
impl HttpHandler for BootstrapHandler {
    fn path_pattern(&self) -> &str {
        &self.path_pattern
    }

    fn method(&self) -> Method {
        Method::GET
    }

    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut context = DocumentContext::from_params(&request.query_params);
        if let Some(field) = request.query_params.get(POST_ID_FIELD) {
            context = context.with_form_field(field.clone());
        }

        let principal = request.header(PRINCIPAL_HEADER);
        let data = BootstrapData {
            ajax_url: self.store_path.clone(),
            nonce: self.nonces.create(STORE_ACTION, principal),
            post_id: context.resolve(),
        };

        HttpResponse::json(&data)
    }
}

/// Render request body
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub content: String,
    #[serde(default)]
    pub document_id: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Render response body
#[derive(Debug, Serialize, Deserialize)]
pub struct RenderResponse {
    pub html: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Expands placeholders in submitted text through the renderer registry
pub struct RenderHandler {
    path_pattern: String,
    renderers: Arc<RendererRegistry>,
}

impl RenderHandler {
    pub fn new(path_pattern: String, renderers: Arc<RendererRegistry>) -> Self {
        Self {
            path_pattern,
            renderers,
        }
    }

    fn failure(status: StatusCode, error: String) -> Result<HttpResponse> {
        let response = RenderResponse {
            html: String::new(),
            success: false,
            error: Some(error),
        };
        Ok(HttpResponse::json(&response)?.with_status(status))
    }
}

#[async_trait]
impl HttpHandler for RenderHandler {
    fn path_pattern(&self) -> &str {
        &self.path_pattern
    }

    fn method(&self) -> Method {
        Method::POST
    }

    async fn handle(&self, request: HttpRequest) -> Result<HttpResponse> {
        let render_request: RenderRequest = match serde_json::from_slice(&request.body) {
            Ok(req) => req,
            Err(e) => return Self::failure(StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)),
        };

        let mut context = RenderContext::new(render_request.document_id.and_then(DocumentId::new));
        if let Some(content_type) = render_request.content_type {
            context = context.with_content_type(content_type);
        }

        match self
            .renderers
            .render_content(&render_request.content, &context)
            .await
        {
            Ok(result) => HttpResponse::json(&RenderResponse {
                html: result.html,
                success: true,
                error: None,
            }),
            Err(e) => {
                warn!("Render failed: {}", e);
                Self::failure(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
        }
    }
}
