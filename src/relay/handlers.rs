use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use super::error::RelayError;
use super::SharedState;
use crate::llm::models::RelayRequest;

/// Validate the request locally, then forward the prompt upstream once.
pub async fn classify(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Response, RelayError> {
    let request: RelayRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Rejecting malformed body: {}", e);
        RelayError::BadRequest("Invalid JSON body".to_string())
    })?;

    let api_key = state.key_policy.resolve(request.api_key.as_deref())?;

    let prompt = request
        .prompt
        .as_deref()
        .filter(|prompt| !prompt.trim().is_empty())
        .ok_or_else(|| RelayError::BadRequest("Prompt is required".to_string()))?;

    info!("Forwarding prompt ({} chars)", prompt.len());
    let reply = state.upstream.create_message(prompt, api_key).await?;
    Ok(([(CONTENT_TYPE, "application/json")], reply).into_response())
}

pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn not_found() -> RelayError {
    RelayError::NotFound
}
