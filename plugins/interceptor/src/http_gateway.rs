//! Persistence gateway reached over HTTP

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use splot_core::gateway::{fields, AJAX_ACTION, PRINCIPAL_HEADER};
use splot_core::{
    BlockId, BootstrapData, PersistenceGateway, Result, SplotError, StoreRequest, StoreResponse,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts store requests as form data to a remote store endpoint
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    endpoint: Url,
}

impl HttpGateway {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SplotError::transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, endpoint })
    }

    /// Gateway for the store endpoint named in bootstrap data, relative URLs
    /// are resolved against `base`
    pub fn from_bootstrap(base: &Url, data: &BootstrapData) -> Result<Self> {
        let endpoint = base.join(&data.ajax_url).map_err(|e| {
            SplotError::config(format!("Invalid store URL {}: {}", data.ajax_url, e))
        })?;
        Self::new(endpoint)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch bootstrap data for an editing session
    pub async fn fetch_bootstrap(&self, url: Url) -> Result<BootstrapData> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SplotError::transport(format!("Bootstrap request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SplotError::transport(format!(
                "Bootstrap request failed, status: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SplotError::transport(format!("Invalid bootstrap response: {}", e)))
    }
}

#[async_trait]
impl PersistenceGateway for HttpGateway {
    async fn store(&self, request: StoreRequest) -> Result<BlockId> {
        let nonce = request.nonce.unwrap_or_default();
        let document = request
            .document
            .map(|document| document.to_string())
            .unwrap_or_default();
        let is_encoded = if request.is_encoded { "1" } else { "0" };

        let form = [
            (fields::ACTION, AJAX_ACTION),
            (fields::NONCE, nonce.as_str()),
            (fields::POST_ID, document.as_str()),
            (fields::HTML_CONTENT, request.html_content.as_str()),
            (fields::IS_ENCODED, is_encoded),
        ];

        let mut builder = self.client.post(self.endpoint.clone()).form(&form);
        if let Some(principal) = &request.principal {
            builder = builder.header(PRINCIPAL_HEADER, principal);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SplotError::transport(format!("Store request failed: {}", e)))?;
        let status = response.status();

        let body: StoreResponse = response.json().await.map_err(|e| {
            SplotError::transport(format!("Unexpected store response ({}): {}", status, e))
        })?;

        tracing::debug!("Store endpoint answered {} (success: {})", status, body.success);
        body.into_result()
    }
}
