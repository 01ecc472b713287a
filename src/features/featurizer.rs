// Sliding-window feature extraction
// Turns runs of motion frames into per-window statistics rows tagged with the majority label

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::labels::LabelId;
use crate::segment::Run;

/// Name of the label column appended after the statistic columns
pub const LABEL_COLUMN: &str = "label";

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Window size and gap must be positive (window {window_size}, gap {gap_size})")]
    InvalidWindow { window_size: usize, gap_size: usize },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Run has {frames} frames but {labels} labels")]
    LengthMismatch { frames: usize, labels: usize },
}

/// Windowing parameters for feature extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturizerConfig {
    /// Frames per window
    pub window_size: usize,

    /// Frames between consecutive window starts
    pub gap_size: usize,

    /// Channel subset to summarise (all channels when `None`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
}

impl Default for FeaturizerConfig {
    fn default() -> Self {
        FeaturizerConfig {
            window_size: 240,
            gap_size: 1,
            channels: None,
        }
    }
}

/// Per-channel statistics, in column order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Variance,
    StdDev,
    Range,
}

impl Statistic {
    pub const ALL: [Statistic; 4] = [
        Statistic::Mean,
        Statistic::Variance,
        Statistic::StdDev,
        Statistic::Range,
    ];

    /// Column name suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            Statistic::Mean => "avg",
            Statistic::Variance => "var",
            Statistic::StdDev => "std",
            Statistic::Range => "range",
        }
    }
}

/// One window's statistics and its majority label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub values: Vec<f64>,
    pub label: LabelId,
}

/// Sliding-window featurizer with a fixed window and step
#[derive(Debug, Clone)]
pub struct WindowFeaturizer {
    config: FeaturizerConfig,
}

impl WindowFeaturizer {
    pub fn new(config: FeaturizerConfig) -> Result<Self, FeatureError> {
        if config.window_size == 0 || config.gap_size == 0 {
            return Err(FeatureError::InvalidWindow {
                window_size: config.window_size,
                gap_size: config.gap_size,
            });
        }
        Ok(WindowFeaturizer { config })
    }

    pub fn config(&self) -> &FeaturizerConfig {
        &self.config
    }

    /// Number of windows a run of `run_len` frames yields
    ///
    /// A run no longer than the window yields nothing; otherwise windows start
    /// at `0, gap, 2*gap, ...` while they fit entirely inside the run.
    pub fn window_count(&self, run_len: usize) -> usize {
        if run_len <= self.config.window_size {
            return 0;
        }
        (run_len - self.config.window_size) / self.config.gap_size + 1
    }

    /// Start offsets of every window over a run of `run_len` frames
    pub fn window_starts(&self, run_len: usize) -> impl Iterator<Item = usize> {
        let gap = self.config.gap_size;
        (0..self.window_count(run_len)).map(move |i| i * gap)
    }

    /// Positions of the summarised channels within `schema`
    pub fn channel_indices(&self, schema: &[String]) -> Result<Vec<usize>, FeatureError> {
        match &self.config.channels {
            None => Ok((0..schema.len()).collect()),
            Some(subset) => subset
                .iter()
                .map(|name| {
                    schema
                        .iter()
                        .position(|c| c == name)
                        .ok_or_else(|| FeatureError::UnknownChannel(name.clone()))
                })
                .collect(),
        }
    }

    /// Feature column names for `schema`, grouped by statistic kind
    ///
    /// The label column is not included; see [`LABEL_COLUMN`].
    pub fn column_names(&self, schema: &[String]) -> Result<Vec<String>, FeatureError> {
        let indices = self.channel_indices(schema)?;
        Ok(Statistic::ALL
            .iter()
            .flat_map(|stat| {
                indices
                    .iter()
                    .map(move |&i| format!("{}-{}", schema[i], stat.suffix()))
            })
            .collect())
    }

    /// Extract one row per window from a run's frames and per-frame labels
    pub fn extract(
        &self,
        frames: &[Vec<f64>],
        labels: &[LabelId],
        channels: &[usize],
    ) -> Result<Vec<FeatureRow>, FeatureError> {
        if frames.len() != labels.len() {
            return Err(FeatureError::LengthMismatch {
                frames: frames.len(),
                labels: labels.len(),
            });
        }

        let window = self.config.window_size;
        let rows = self
            .window_starts(frames.len())
            .filter_map(|start| {
                let end = start + window;
                let label = majority_label(&labels[start..end])?;
                Some(FeatureRow {
                    values: window_statistics(&frames[start..end], channels),
                    label,
                })
            })
            .collect();

        Ok(rows)
    }

    /// Extract rows from a segmented run
    pub fn extract_run(
        &self,
        run: &Run<'_>,
        channels: &[usize],
    ) -> Result<Vec<FeatureRow>, FeatureError> {
        self.extract(run.frames(), run.labels(), channels)
    }
}

/// Statistics of one window: all means, then variances, std-devs and ranges
///
/// Variance is the population variance (divides by N).
pub fn window_statistics(frames: &[Vec<f64>], channels: &[usize]) -> Vec<f64> {
    let n = channels.len();
    let mut out = vec![0.0; n * Statistic::ALL.len()];

    if frames.is_empty() {
        return out;
    }

    let count = frames.len() as f64;
    for (slot, &ch) in channels.iter().enumerate() {
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for frame in frames {
            let v = frame[ch];
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let mean = sum / count;
        let variance = frames
            .iter()
            .map(|frame| (frame[ch] - mean).powi(2))
            .sum::<f64>()
            / count;

        out[slot] = mean;
        out[n + slot] = variance;
        out[2 * n + slot] = variance.sqrt();
        out[3 * n + slot] = max - min;
    }

    out
}

/// Most frequent label; ties go to the lowest label id
pub fn majority_label(labels: &[LabelId]) -> Option<LabelId> {
    let mut counts: BTreeMap<LabelId, usize> = BTreeMap::new();
    for &label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut best: Option<(LabelId, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label)
}
