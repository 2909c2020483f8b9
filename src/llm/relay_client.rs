use reqwest::Client;
use thiserror::Error;
use tracing::{debug, error};

use super::models::{MessageResponse, RelayRequest};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("No API key configured")]
    MissingApiKey,
    #[error("Failed to reach relay: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Relay { status: u16, body: String },
    #[error("Unexpected upstream response shape: {0}")]
    UnexpectedShape(String),
    #[error("Invalid response format")]
    InvalidFormat,
}

/// HTTP client for the relay's classify endpoint.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    url: String,
}

impl RelayClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    /// Send one prompt through the relay and return the model's text reply.
    pub async fn forward(&self, prompt: &str, api_key: Option<&str>) -> Result<String, ClientError> {
        let body = RelayRequest {
            prompt: Some(prompt.to_string()),
            api_key: api_key.map(str::to_string),
        };

        debug!("Forwarding prompt ({} chars) to {}", prompt.len(), self.url);
        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            error!("Relay responded with status {}", status.as_u16());
            return Err(ClientError::Relay {
                status: status.as_u16(),
                body,
            });
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|e| ClientError::UnexpectedShape(e.to_string()))?;

        message
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| ClientError::UnexpectedShape("missing content[0].text".to_string()))
    }
}
