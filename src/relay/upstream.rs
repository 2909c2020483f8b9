use axum::body::Bytes;
use reqwest::Client;
use serde::de::IgnoredAny;
use tracing::{debug, error};

use super::error::RelayError;
use crate::llm::models::MessageRequest;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Client for the provider's messages endpoint. One request, no retries.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    url: String,
}

impl UpstreamClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    /// Returns the upstream success body byte-for-byte, after checking it is JSON.
    pub async fn create_message(&self, prompt: &str, api_key: &str) -> Result<Bytes, RelayError> {
        let request = MessageRequest::user_prompt(prompt);

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach upstream: {}", e);
                RelayError::Internal("Failed to reach upstream provider".to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Upstream returned {}", status.as_u16());
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Upstream returned {}", status.as_u16());
        let body = response.bytes().await.map_err(|e| {
            error!("Failed to read upstream body: {}", e);
            RelayError::Internal("Malformed response from upstream provider".to_string())
        })?;

        serde_json::from_slice::<IgnoredAny>(&body).map_err(|e| {
            error!("Malformed upstream body: {}", e);
            RelayError::Internal("Malformed response from upstream provider".to_string())
        })?;

        Ok(body)
    }
}
