use crate::llm::{BatchProgress, ClassificationResult};

/// Confidence as a whole percentage clamped to 0..=100.
pub fn confidence_percent(confidence: f64) -> u8 {
    if confidence.is_nan() {
        return 0;
    }
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u8
}

pub fn format_result(result: &ClassificationResult) -> String {
    let intent_color = if result.is_error() { "1;31" } else { "1;32" };
    let mut line = format!(
        "\x1b[1;36m{}\x1b[0m -> \x1b[{}m{}\x1b[0m ({}%)",
        result.utterance,
        intent_color,
        result.intent,
        confidence_percent(result.confidence)
    );

    if let Some(reasoning) = result.reasoning.as_deref().filter(|r| !r.is_empty()) {
        line.push_str(&format!("\n    \x1b[2m{}\x1b[0m", reasoning));
    }
    line
}

pub fn format_progress(progress: BatchProgress) -> String {
    format!("\x1b[1;34m[{}/{}]\x1b[0m", progress.current, progress.total)
}
