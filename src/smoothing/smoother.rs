// Temporal probability smoothing
// Sums class probabilities over a sliding window and emits the best class or a full ranking per position

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use crate::labels::{LabelId, OTHER_ID};

#[derive(Debug, Error, PartialEq)]
pub enum SmoothingError {
    #[error("Probability row {index} has {found} classes, expected {expected}")]
    RaggedRows {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Smoothing window must be positive")]
    ZeroWindow,
}

/// How ground truth lines up with a smoothed sequence
///
/// A smoothed sequence is `window` entries shorter than its input, so truth
/// must be cut to the matching offsets before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    /// Compare against the first `len - window` truth frames
    #[default]
    Leading,

    /// Drop `window / 2` frames from both ends of the truth
    Centered,

    /// Drop the first `window` truth frames
    Trailing,
}

impl Alignment {
    /// Slice `truth` to the range matching a sequence smoothed with `window`
    pub fn slice<'a, T>(&self, truth: &'a [T], window: usize) -> &'a [T] {
        let len = truth.len();
        let (start, end) = match self {
            Alignment::Leading => (0, len.saturating_sub(window)),
            Alignment::Centered => (window / 2, len.saturating_sub(window / 2)),
            Alignment::Trailing => (window.min(len), len),
        };
        if start >= end {
            return &truth[..0];
        }
        &truth[start..end]
    }
}

/// Smoothing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Window length in probability rows
    pub window_size: usize,

    /// Candidate count for top-k evaluation
    pub top_k: usize,

    #[serde(default)]
    pub alignment: Alignment,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig {
            window_size: 360,
            top_k: 3,
            alignment: Alignment::Leading,
        }
    }
}

/// Check every row has the same number of classes; returns that width
pub fn validate_probabilities(probabilities: &[Vec<f64>]) -> Result<usize, SmoothingError> {
    let expected = probabilities.first().map_or(0, Vec::len);
    for (index, row) in probabilities.iter().enumerate() {
        if row.len() != expected {
            return Err(SmoothingError::RaggedRows {
                index,
                expected,
                found: row.len(),
            });
        }
    }
    Ok(expected)
}

/// Component-wise sums of every full window, one per start `0 .. len - window`
fn window_sums(probabilities: &[Vec<f64>], window: usize) -> Result<Vec<Vec<f64>>, SmoothingError> {
    if window == 0 {
        return Err(SmoothingError::ZeroWindow);
    }
    let classes = validate_probabilities(probabilities)?;
    let positions = probabilities.len().saturating_sub(window);

    let sums = (0..positions)
        .map(|start| {
            let mut acc = vec![0.0; classes];
            for row in &probabilities[start..start + window] {
                for (a, p) in acc.iter_mut().zip(row) {
                    *a += p;
                }
            }
            acc
        })
        .collect();
    Ok(sums)
}

/// Index of the largest score; the first maximum wins
pub fn argmax(scores: &[f64]) -> LabelId {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate() {
        if s > scores[best] {
            best = i;
        }
    }
    best as LabelId
}

/// Class ids by descending score, equal scores in ascending id order
pub fn rank_descending(scores: &[f64]) -> Vec<LabelId> {
    let mut ids: Vec<usize> = (0..scores.len()).collect();
    ids.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
    ids.into_iter().map(|i| i as LabelId).collect()
}

/// Best class per window position; output length is `len - window`
pub fn smooth_top1(probabilities: &[Vec<f64>], window: usize) -> Result<Vec<LabelId>, SmoothingError> {
    Ok(window_sums(probabilities, window)?
        .iter()
        .map(|acc| argmax(acc))
        .collect())
}

/// Full descending class ranking per window position
pub fn smooth_topk(
    probabilities: &[Vec<f64>],
    window: usize,
) -> Result<Vec<Vec<LabelId>>, SmoothingError> {
    Ok(window_sums(probabilities, window)?
        .iter()
        .map(|acc| rank_descending(acc))
        .collect())
}

/// Oracle-assisted selection: the true class when it is among the top `k`, else rank 1
///
/// This leaks ground truth into the output. Use it for diagnostics and plots;
/// the result is not an unbiased prediction. `truth` must already be aligned;
/// the output has the length of the shorter input. An empty ranking
/// yields the "other" id.
pub fn select_top_k_or_truth(ranked: &[Vec<LabelId>], truth: &[LabelId], k: usize) -> Vec<LabelId> {
    ranked
        .iter()
        .zip(truth)
        .map(|(ranks, &actual)| {
            if ranks.iter().take(k).any(|&c| c == actual) {
                actual
            } else {
                ranks.first().copied().unwrap_or(OTHER_ID)
            }
        })
        .collect()
}

/// Smoother bound to one configuration
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    config: SmoothingConfig,
}

impl TemporalSmoother {
    pub fn new(config: SmoothingConfig) -> Result<Self, SmoothingError> {
        if config.window_size == 0 {
            return Err(SmoothingError::ZeroWindow);
        }
        Ok(TemporalSmoother { config })
    }

    pub fn config(&self) -> &SmoothingConfig {
        &self.config
    }

    pub fn smooth(&self, probabilities: &[Vec<f64>]) -> Result<Vec<LabelId>, SmoothingError> {
        smooth_top1(probabilities, self.config.window_size)
    }

    pub fn rank(&self, probabilities: &[Vec<f64>]) -> Result<Vec<Vec<LabelId>>, SmoothingError> {
        smooth_topk(probabilities, self.config.window_size)
    }

    /// Truth slice matching this smoother's output
    pub fn align<'a>(&self, truth: &'a [LabelId]) -> &'a [LabelId] {
        self.config.alignment.slice(truth, self.config.window_size)
    }

    /// Oracle-assisted top-k sequence over `probabilities`, aligned to `truth`
    pub fn oracle_top_k(
        &self,
        probabilities: &[Vec<f64>],
        truth: &[LabelId],
    ) -> Result<Vec<LabelId>, SmoothingError> {
        let ranked = self.rank(probabilities)?;
        Ok(select_top_k_or_truth(&ranked, self.align(truth), self.config.top_k))
    }
}
