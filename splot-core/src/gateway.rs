//! Persistence gateway: turns a pasted document into a stored block
//!
//! The gateway is the seam between the paste interceptor and storage. The
//! interceptor talks to it through [`PersistenceGateway`], either in process
//! ([`LocalGateway`]) or over HTTP through the server plugin.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::block::BlockId;
use crate::document::DocumentId;
use crate::error::{Result, SplotError};
use crate::event::{EventBus, SystemEvent};
use crate::security::{AccessPolicy, NonceManager, STORE_ACTION};
use crate::store::DocumentStore;

/// Form field names of the store operation
pub mod fields {
    pub const ACTION: &str = "action";
    pub const NONCE: &str = "nonce";
    pub const POST_ID: &str = "post_id";
    pub const HTML_CONTENT: &str = "html_content";
    pub const IS_ENCODED: &str = "is_encoded";
}

/// Value of the `action` field sent with store requests
pub const AJAX_ACTION: &str = "cogdog_splot_save_html";

/// Header carrying the authenticated caller over HTTP
pub const PRINCIPAL_HEADER: &str = "x-splot-user";

/// Encode a payload so it survives a text-only form channel
pub fn encode_payload(html: &str) -> String {
    BASE64.encode(html.as_bytes())
}

/// Reverse [`encode_payload`]
pub fn decode_payload(encoded: &str) -> Result<String> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| SplotError::decode(format!("Invalid base64 payload: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| SplotError::decode(format!("Payload is not valid UTF-8: {}", e)))
}

/// One request to persist a pasted document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreRequest {
    pub nonce: Option<String>,
    pub document: Option<DocumentId>,
    pub html_content: String,
    pub is_encoded: bool,
    /// Authenticated caller, resolved by the host
    pub principal: Option<String>,
}

impl StoreRequest {
    /// Request carrying the payload transport-encoded
    pub fn encoded(nonce: impl Into<String>, document: DocumentId, html: &str) -> Self {
        Self {
            nonce: Some(nonce.into()),
            document: Some(document),
            html_content: encode_payload(html),
            is_encoded: true,
            principal: None,
        }
    }

    /// Request carrying the payload verbatim
    pub fn plain(nonce: impl Into<String>, document: DocumentId, html: &str) -> Self {
        Self {
            nonce: Some(nonce.into()),
            document: Some(document),
            html_content: html.to_string(),
            is_encoded: false,
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }
}

/// Wire body returned by the store operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub success: bool,
    pub data: StoreResponseData,
    /// Error category, present on failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreResponseData {
    Stored { block_id: BlockId },
    Message(String),
}

impl StoreResponse {
    pub fn stored(block_id: BlockId) -> Self {
        Self {
            success: true,
            data: StoreResponseData::Stored { block_id },
            code: None,
        }
    }

    pub fn failed(error: &SplotError) -> Self {
        let message = match error {
            SplotError::InvalidAuthorization(msg)
            | SplotError::MissingInput(msg)
            | SplotError::InsufficientPermission(msg)
            | SplotError::Decode(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self {
            success: false,
            data: StoreResponseData::Message(message),
            code: Some(error.kind().to_string()),
        }
    }

    /// The stored block id, `None` unless the response reports success
    pub fn block_id(&self) -> Option<&BlockId> {
        match (&self.data, self.success) {
            (StoreResponseData::Stored { block_id }, true) => Some(block_id),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<BlockId> {
        match (self.success, self.data) {
            (true, StoreResponseData::Stored { block_id }) => Ok(block_id),
            (_, StoreResponseData::Message(msg)) => Err(error_from_code(self.code.as_deref(), msg)),
            (false, StoreResponseData::Stored { .. }) => {
                Err(SplotError::transport("Malformed store response"))
            }
        }
    }
}

fn error_from_code(code: Option<&str>, msg: String) -> SplotError {
    match code {
        Some("invalid_authorization") => SplotError::InvalidAuthorization(msg),
        Some("missing_input") => SplotError::MissingInput(msg),
        Some("insufficient_permission") => SplotError::InsufficientPermission(msg),
        Some("decode") => SplotError::Decode(msg),
        Some("not_found") => SplotError::NotFound(msg),
        _ => SplotError::Storage(msg),
    }
}

/// Data an editing session needs before it can store pastes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapData {
    /// Where store requests go
    pub ajax_url: String,
    pub nonce: String,
    /// Document being edited, when the page already knows it
    pub post_id: Option<DocumentId>,
}

/// Persists documents and returns the id they were stored under
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn store(&self, request: StoreRequest) -> Result<BlockId>;
}

/// Read a stored block back, `None` when nothing is stored under it
pub async fn fetch_block(
    store: &dyn DocumentStore,
    document: DocumentId,
    block: &BlockId,
) -> Result<Option<String>> {
    store.get_meta(document, &block.meta_key()).await
}

/// Gateway writing straight into a [`DocumentStore`]
pub struct LocalGateway {
    store: Arc<dyn DocumentStore>,
    nonces: NonceManager,
    access: Arc<dyn AccessPolicy>,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl LocalGateway {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        nonces: NonceManager,
        access: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            store,
            nonces,
            access,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn store_backend(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn nonces(&self) -> &NonceManager {
        &self.nonces
    }

    /// Read a block of a document
    pub async fn fetch(&self, document: DocumentId, block: &BlockId) -> Result<Option<String>> {
        fetch_block(self.store.as_ref(), document, block).await
    }

    async fn can_edit(&self, principal: Option<&str>, document: DocumentId) -> Result<bool> {
        Ok(self.store.document_exists(document).await?
            && self.access.can_edit(principal, document))
    }
}

#[async_trait]
impl PersistenceGateway for LocalGateway {
    async fn store(&self, request: StoreRequest) -> Result<BlockId> {
        let principal = request.principal.as_deref();

        let nonce_ok = request
            .nonce
            .as_deref()
            .is_some_and(|nonce| self.nonces.verify(nonce, STORE_ACTION, principal));
        if !nonce_ok {
            tracing::warn!("Rejected store request: invalid nonce");
            return Err(SplotError::invalid_authorization("Invalid nonce"));
        }

        let document = match request.document {
            Some(document) if !request.html_content.is_empty() => document,
            _ => {
                return Err(SplotError::missing_input(
                    "Missing post ID or HTML content",
                ))
            }
        };

        let html = if request.is_encoded {
            decode_payload(&request.html_content)?
        } else {
            request.html_content
        };
        if html.is_empty() {
            return Err(SplotError::missing_input("Missing post ID or HTML content"));
        }

        if !self.can_edit(principal, document).await? {
            tracing::warn!(
                "Rejected store request for document {}: insufficient permissions",
                document
            );
            return Err(SplotError::insufficient_permission(
                "Insufficient permissions",
            ));
        }

        let block_id = BlockId::generate();
        self.store
            .insert_meta(document, &block_id.meta_key(), &html)
            .await?;

        tracing::debug!(
            "Stored {} bytes for document {} as {}",
            html.len(),
            document,
            block_id
        );

        if let Some(event_bus) = &self.event_bus {
            let event = SystemEvent::block_stored(document, block_id.clone(), html.len());
            if let Err(e) = event_bus.publish_system_event(event).await {
                tracing::warn!("Failed to publish block stored event: {}", e);
            }
        }

        Ok(block_id)
    }
}
