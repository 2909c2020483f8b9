use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unsupported input file (expected .csv or .txt): {0}")]
    UnsupportedExtension(String),
    #[error("Invalid glob pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },
    #[error("No input files matched: {0}")]
    NoMatches(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Text,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(InputFormat::Csv),
            "txt" => Ok(InputFormat::Text),
            _ => Err(IngestError::UnsupportedExtension(path.display().to_string())),
        }
    }
}

fn is_header(line: &str) -> bool {
    let line = line.to_lowercase();
    line.contains("utterance") || line.contains("text")
}

/// Split uploaded content into utterances, one per non-blank line.
///
/// CSV content drops its first non-blank line when it looks like a header.
/// Delimiters and quotes are not interpreted.
pub fn parse_utterances(content: &str, format: InputFormat) -> Vec<String> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .peekable();

    if format == InputFormat::Csv {
        if let Some(first) = lines.peek() {
            if is_header(first) {
                lines.next();
            }
        }
    }

    lines.map(str::to_string).collect()
}

fn has_supported_extension(path: &Path) -> bool {
    InputFormat::from_path(path).is_ok()
}

/// Expand CLI inputs into concrete files. Each input may be a file, a
/// directory (searched recursively) or a glob pattern.
pub fn collect_input_files(inputs: &[String]) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for input in inputs {
        let path = Path::new(input);
        let mut matched: BTreeSet<PathBuf> = BTreeSet::new();

        if path.is_file() {
            matched.insert(path.to_path_buf());
        } else if path.is_dir() {
            matched.extend(
                walkdir::WalkDir::new(path)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().is_file() && has_supported_extension(e.path()))
                    .map(|e| e.path().to_path_buf()),
            );
        } else {
            let entries = glob::glob(input).map_err(|e| IngestError::Pattern {
                pattern: input.clone(),
                message: e.to_string(),
            })?;
            matched.extend(
                entries
                    .filter_map(|e| e.ok())
                    .filter(|p| p.is_file() && has_supported_extension(p)),
            );
        }

        if matched.is_empty() {
            return Err(IngestError::NoMatches(input.clone()));
        }
        files.extend(matched);
    }

    Ok(files)
}

/// Read every file and concatenate their utterances in order.
pub fn load_utterances(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut utterances = Vec::new();

    for path in paths {
        let format = InputFormat::from_path(path)?;
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path.display()))?;

        let parsed = parse_utterances(&content, format);
        if parsed.is_empty() {
            warn!("No utterances found in {}", path.display());
        } else {
            info!("Loaded {} utterances from {}", parsed.len(), path.display());
        }
        utterances.extend(parsed);
    }

    Ok(utterances)
}
