use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::backend::types::*;
use crate::backend::Backend;
use crate::config::AppConfig;
use crate::error::{AppError, Result};

/// `Backend` speaking JSON over HTTP to the analysis service.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self::with_client(client, &config.backend.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn submit(&self, endpoint: Endpoint, body: serde_json::Value) -> Result<SubmitResponse> {
        tracing::debug!(endpoint = %endpoint, "Submitting backend job");

        let response = self
            .client
            .post(self.url(endpoint.path()))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint = %endpoint, status = %status, body = %body, "Backend rejected job");
            return Err(AppError::Request {
                action: endpoint.action().to_string(),
                status: status.to_string(),
            });
        }

        let body = response.json::<SubmitResponse>().await?;
        Ok(body)
    }

    async fn status(&self, handle: &OperationHandle) -> Result<StatusReply> {
        let path = format!("/status/{}", urlencoding::encode(handle.as_str()));
        let response = self.client.get(self.url(&path)).send().await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(StatusReply::NotFound);
        }
        if !status.is_success() {
            return Err(AppError::StatusCheck(status.to_string()));
        }

        let envelope = response.json::<serde_json::Value>().await?;
        Ok(StatusReply::Envelope(envelope))
    }
}
