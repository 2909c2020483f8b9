use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::Serialize;
use tracing::info;

use crate::llm::ClassificationResult;

pub const CSV_HEADER: &str = "Utterance,Intent,Confidence,Reasoning";

#[derive(Serialize)]
struct ExportRow<'a> {
    utterance: &'a str,
    intent: &'a str,
    confidence: f64,
    reasoning: &'a str,
}

impl<'a> From<&'a ClassificationResult> for ExportRow<'a> {
    fn from(result: &'a ClassificationResult) -> Self {
        Self {
            utterance: &result.utterance,
            intent: &result.intent,
            confidence: result.confidence,
            reasoning: result.reasoning.as_deref().unwrap_or_default(),
        }
    }
}

/// Write the header line, then one row per result. Text fields are quoted;
/// confidence is written as its raw value.
pub fn write_results<W: Write>(mut out: W, results: &[ClassificationResult]) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER)?;

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::NonNumeric)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);

    for result in results {
        writer.serialize(ExportRow::from(result))?;
    }

    writer.flush()?;
    Ok(())
}

pub fn to_csv(results: &[ClassificationResult]) -> Result<String> {
    let mut buffer = Vec::new();
    write_results(&mut buffer, results)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn write_csv(path: &Path, results: &[ClassificationResult]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_results(file, results)
        .with_context(|| format!("Failed to write results to {}", path.display()))?;
    info!("Exported {} results to {}", results.len(), path.display());
    Ok(())
}
