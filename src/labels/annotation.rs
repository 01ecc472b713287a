// Annotation intervals
// Reads time-interval action annotations exported by the labeling tool

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Annotation file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid annotation JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Annotation #{index} has no label")]
    MissingLabel { index: usize },
}

/// A labeled time span `[start_s, end_s]` in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelInterval {
    pub start_s: f64,
    pub end_s: f64,
    pub label: String,
}

impl LabelInterval {
    pub fn new(start_s: f64, end_s: f64, label: impl Into<String>) -> Self {
        LabelInterval {
            start_s,
            end_s,
            label: label.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnnotatedClip {
    #[serde(default)]
    tricks: Vec<Trick>,
}

#[derive(Debug, Deserialize)]
struct Trick {
    start: f64,
    end: f64,
    #[serde(default)]
    labels: Vec<String>,
}

/// Parse the labeling tool's export: `[{"tricks": [{"start", "end", "labels"}]}]`
///
/// Only the first clip is read and each trick contributes its first label.
pub fn parse_annotations(text: &str) -> Result<Vec<LabelInterval>, AnnotationError> {
    let clips: Vec<AnnotatedClip> = serde_json::from_str(text)?;

    let Some(clip) = clips.into_iter().next() else {
        return Ok(Vec::new());
    };

    clip.tricks
        .into_iter()
        .enumerate()
        .map(|(index, trick)| {
            let label = trick
                .labels
                .into_iter()
                .next()
                .ok_or(AnnotationError::MissingLabel { index })?;
            Ok(LabelInterval::new(trick.start, trick.end, label))
        })
        .collect()
}

/// Load annotations from a file
pub fn load_annotations(path: &Path) -> Result<Vec<LabelInterval>, AnnotationError> {
    if !path.exists() {
        return Err(AnnotationError::NotFound(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_annotations(&text)
}
