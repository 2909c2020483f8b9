use super::config::{ClassifierConfig, CONTEXT_PLACEHOLDER};

/// Fill the system template with the configured context and append the utterance.
pub fn build_prompt(config: &ClassifierConfig, utterance: &str) -> String {
    let system = config
        .system_prompt_template
        .replace(CONTEXT_PLACEHOLDER, &config.context);

    format!(
        "{}\n\nClassify the following utterance and respond with the JSON object only.\nUtterance: \"{}\"",
        system, utterance
    )
}
