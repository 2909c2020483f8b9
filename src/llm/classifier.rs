use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::config::ClassifierConfig;
use super::prompt::build_prompt;
use super::relay_client::{ClientError, RelayClient};

/// Pause after every batch item to stay under provider rate limits.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

pub const ERROR_INTENT: &str = "error";
const UNKNOWN_INTENT: &str = "unknown";

lazy_static! {
    static ref JSON_SPAN: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub utterance: String,
    pub intent: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

impl ClassificationResult {
    pub fn error(utterance: &str, reasoning: impl Into<String>) -> Self {
        Self {
            utterance: utterance.to_string(),
            intent: ERROR_INTENT.to_string(),
            confidence: 0.0,
            reasoning: Some(reasoning.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.intent == ERROR_INTENT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
}

/// Parse a model reply into a result for `utterance`.
///
/// The whole trimmed reply is tried as JSON first. Models often wrap the object
/// in prose, so the first `{ ... }` span is tried next.
pub fn parse_response(utterance: &str, text: &str) -> Result<ClassificationResult, ClientError> {
    let trimmed = text.trim();

    let object = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => value,
        _ => JSON_SPAN
            .find(trimmed)
            .and_then(|span| serde_json::from_str::<Value>(span.as_str()).ok())
            .filter(Value::is_object)
            .ok_or(ClientError::InvalidFormat)?,
    };

    Ok(ClassificationResult {
        utterance: utterance.to_string(),
        intent: object["intent"].as_str().unwrap_or(UNKNOWN_INTENT).to_string(),
        confidence: object["confidence"].as_f64().unwrap_or(0.0),
        reasoning: Some(object["reasoning"].as_str().unwrap_or_default().to_string()),
    })
}

async fn try_classify(
    relay: &RelayClient,
    utterance: &str,
    config: &ClassifierConfig,
) -> Result<ClassificationResult, ClientError> {
    if !config.has_key_path() {
        return Err(ClientError::MissingApiKey);
    }

    let prompt = build_prompt(config, utterance);
    let text = relay.forward(&prompt, config.usable_api_key()).await?;
    parse_response(utterance, &text)
}

/// Classify one utterance. Every failure is folded into an `"error"` result.
pub async fn classify(
    relay: &RelayClient,
    utterance: &str,
    config: &ClassifierConfig,
) -> ClassificationResult {
    match try_classify(relay, utterance, config).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Classification failed for {:?}: {}", utterance, e);
            ClassificationResult::error(utterance, e.to_string())
        }
    }
}

/// A classification session: configuration and result history.
pub struct Classifier {
    config: ClassifierConfig,
    relay: RelayClient,
    delay: Duration,
    history: Vec<ClassificationResult>,
}

impl Classifier {
    pub fn new(config: ClassifierConfig, relay: RelayClient) -> Self {
        Self {
            config,
            relay,
            delay: DEFAULT_BATCH_DELAY,
            history: Vec::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Accumulated results, most recent first.
    pub fn results(&self) -> &[ClassificationResult] {
        &self.history
    }

    pub async fn classify(&mut self, utterance: &str) -> ClassificationResult {
        let result = classify(&self.relay, utterance, &self.config).await;
        self.history.insert(0, result.clone());
        result
    }

    /// Classify `utterances` one at a time, in order, sleeping after each item.
    ///
    /// `on_progress` sees the updated progress before the next item starts. The
    /// returned results keep input order and are added to the history as one
    /// block once the whole batch is done.
    pub async fn classify_batch<F>(
        &mut self,
        utterances: &[String],
        mut on_progress: F,
    ) -> Vec<ClassificationResult>
    where
        F: FnMut(BatchProgress),
    {
        let total = utterances.len();
        info!("Starting batch of {} utterances", total);

        let mut results = Vec::with_capacity(total);
        for (index, utterance) in utterances.iter().enumerate() {
            results.push(classify(&self.relay, utterance, &self.config).await);

            on_progress(BatchProgress {
                current: index + 1,
                total,
            });

            tokio::time::sleep(self.delay).await;
        }

        let failed = results.iter().filter(|r| r.is_error()).count();
        info!("Batch finished: {} classified, {} failed", total - failed, failed);

        let older = std::mem::take(&mut self.history);
        self.history = results.iter().cloned().chain(older).collect();
        results
    }
}
