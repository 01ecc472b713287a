// Accuracy metrics
// Raw, smoothed and top-k accuracy plus the keep-best merge rule for stored results

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::labels::LabelId;
use crate::smoothing::rank_descending;

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("Prediction has {predicted} entries but truth has {truth}")]
    LengthMismatch { predicted: usize, truth: usize },
}

/// Metrics persisted per experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Accuracy,
    SmoothedAccuracy,
    TopKAccuracy,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Accuracy, Metric::SmoothedAccuracy, Metric::TopKAccuracy];

    /// Key used in result files
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::SmoothedAccuracy => "smoothed_accuracy",
            Metric::TopKAccuracy => "top_k_accuracy",
        }
    }

    /// Misspelled keys written by older result files
    pub fn legacy_key(&self) -> Option<&'static str> {
        match self {
            Metric::Accuracy => None,
            Metric::SmoothedAccuracy => Some("smoothed_accurary"),
            Metric::TopKAccuracy => Some("top_k_accurary"),
        }
    }
}

/// Fraction of equal entries over the first `min(len)` positions
///
/// Lengths are truncated to the shorter input rather than rejected, so a
/// smoothed sequence can be scored against the full truth. Empty input scores 0.0.
pub fn accuracy(predicted: &[LabelId], truth: &[LabelId]) -> f64 {
    let n = predicted.len().min(truth.len());
    if n == 0 {
        return 0.0;
    }
    let hits = predicted
        .iter()
        .zip(truth)
        .filter(|(p, t)| p == t)
        .count();
    hits as f64 / n as f64
}

/// Like [`accuracy`] but requires equal lengths
pub fn accuracy_strict(predicted: &[LabelId], truth: &[LabelId]) -> Result<f64, EvalError> {
    if predicted.len() != truth.len() {
        return Err(EvalError::LengthMismatch {
            predicted: predicted.len(),
            truth: truth.len(),
        });
    }
    Ok(accuracy(predicted, truth))
}

/// The `k` highest-scoring class ids of one row, ties in ascending id order
pub fn top_k_classes(scores: &[f64], k: usize) -> Vec<LabelId> {
    let mut ranked = rank_descending(scores);
    ranked.truncate(k);
    ranked
}

/// Fraction of rows whose true class is among the `k` highest probabilities
///
/// Rows and truth are truncated to the shorter input; empty input scores 0.0.
pub fn top_k_accuracy(probabilities: &[Vec<f64>], truth: &[LabelId], k: usize) -> f64 {
    let n = probabilities.len().min(truth.len());
    if n == 0 {
        return 0.0;
    }
    let hits = probabilities
        .iter()
        .zip(truth)
        .filter(|&(row, &actual)| top_k_classes(row, k).contains(&actual))
        .count();
    hits as f64 / n as f64
}

/// Keep-best merge: a stored metric never regresses
pub fn best_of(stored: Option<f64>, new: f64) -> f64 {
    match stored {
        Some(old) if old >= new => old,
        _ => new,
    }
}
