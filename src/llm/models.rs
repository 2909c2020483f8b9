use serde::{Deserialize, Serialize};

/// Messages API model the relay always requests.
pub const MODEL: &str = "claude-3-5-sonnet-20241022";
pub const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

impl MessageRequest {
    /// Single user-role message, no system prompt and no history.
    pub fn user_prompt(prompt: &str) -> Self {
        Self {
            model: MODEL.to_string(),
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    pub text: Option<String>,
}

/// The part of a Messages API reply the classifier depends on.
#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

impl MessageResponse {
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().and_then(|block| block.text.as_deref())
    }
}

/// Body the relay accepts on its classify endpoint.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RelayRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}
