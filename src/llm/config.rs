use serde::{Deserialize, Serialize};

/// Placeholder substituted with [`ClassifierConfig::context`] when building prompts.
pub const CONTEXT_PLACEHOLDER: &str = "{{context}}";

pub const DEFAULT_SYSTEM_PROMPT_TEMPLATE: &str = "You are an intent classification assistant. \
The utterances you receive come from the following domain: {{context}}

Assign each utterance the single intent label that best fits this domain. \
Respond with a JSON object only, with no other text or explanation, using this schema:
{\"intent\": \"<intent label>\", \"confidence\": <number between 0 and 1>, \"reasoning\": \"<one short sentence>\"}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub api_key: Option<String>,
    pub context: String,
    pub system_prompt_template: String,
    /// The relay injects its own provider key, so no client key is needed.
    pub relay_holds_key: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            context: String::new(),
            system_prompt_template: DEFAULT_SYSTEM_PROMPT_TEMPLATE.to_string(),
            relay_holds_key: false,
        }
    }
}

impl ClassifierConfig {
    pub fn new(api_key: Option<String>, context: String, system_prompt_template: String) -> Self {
        Self {
            api_key,
            context,
            system_prompt_template,
            relay_holds_key: false,
        }
    }

    pub fn with_relay_holds_key(mut self, relay_holds_key: bool) -> Self {
        self.relay_holds_key = relay_holds_key;
        self
    }

    /// Key to send along with a request, if one is configured and non-blank.
    pub fn usable_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Whether any path exists that can reach the provider with a key.
    pub fn has_key_path(&self) -> bool {
        self.relay_holds_key || self.usable_api_key().is_some()
    }
}
