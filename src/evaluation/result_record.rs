// Result records
// Three accuracy figures persisted as `key: value` lines, merged keep-best before every write

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::evaluation::metrics::{best_of, Metric};

/// Result file name inside an experiment directory
pub const RESULT_FILE: &str = "result.txt";

#[derive(Debug, Error)]
pub enum ResultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed result line {line}: {text}")]
    Malformed { line: usize, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultRecord {
    pub accuracy: f64,
    pub smoothed_accuracy: f64,
    pub top_k_accuracy: f64,
}

impl ResultRecord {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Accuracy => self.accuracy,
            Metric::SmoothedAccuracy => self.smoothed_accuracy,
            Metric::TopKAccuracy => self.top_k_accuracy,
        }
    }

    fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::Accuracy => self.accuracy = value,
            Metric::SmoothedAccuracy => self.smoothed_accuracy = value,
            Metric::TopKAccuracy => self.top_k_accuracy = value,
        }
    }

    /// Keep the larger of each stored and new metric
    pub fn merge_best(&self, stored: &BTreeMap<String, f64>) -> ResultRecord {
        let mut merged = *self;
        for metric in Metric::ALL {
            let previous = stored.get(metric.key()).copied().or_else(|| {
                metric
                    .legacy_key()
                    .and_then(|legacy| stored.get(legacy).copied())
            });
            merged.set(metric, best_of(previous, self.get(metric)));
        }
        merged
    }

    pub fn to_text(&self) -> String {
        Metric::ALL
            .iter()
            .map(|m| format!("{}: {}\n", m.key(), self.get(*m)))
            .collect()
    }

    /// Merge with whatever is stored at `path`, then overwrite it
    pub fn save_merged(&self, path: &Path) -> Result<ResultRecord, ResultError> {
        let merged = self.merge_best(&load_result(path)?);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, merged.to_text())?;
        Ok(merged)
    }
}

/// Parse `key: value` lines; blank lines are skipped
pub fn parse_result(text: &str) -> Result<BTreeMap<String, f64>, ResultError> {
    let mut values = BTreeMap::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || ResultError::Malformed {
            line: i + 1,
            text: line.to_string(),
        };
        let (key, value) = line.split_once(':').ok_or_else(malformed)?;
        let value: f64 = value.trim().parse().map_err(|_| malformed())?;
        values.insert(key.trim().to_string(), value);
    }
    Ok(values)
}

/// Stored metrics at `path`; a missing file is an empty record
pub fn load_result(path: &Path) -> Result<BTreeMap<String, f64>, ResultError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    parse_result(&std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(a: f64, s: f64, t: f64) -> ResultRecord {
        ResultRecord {
            accuracy: a,
            smoothed_accuracy: s,
            top_k_accuracy: t,
        }
    }

    #[test]
    fn test_text_format() {
        let text = record(0.5, 0.75, 1.0).to_text();
        assert_eq!(text, "accuracy: 0.5\nsmoothed_accuracy: 0.75\ntop_k_accuracy: 1\n");
        let parsed = parse_result(&text).unwrap();
        assert_eq!(parsed["smoothed_accuracy"], 0.75);
    }

    #[test]
    fn test_merge_accepts_legacy_keys() {
        let stored = parse_result("accuracy: 0.9\nsmoothed_accurary: 0.2\ntop_k_accurary: 0.99\n").unwrap();
        let merged = record(0.5, 0.6, 0.7).merge_best(&stored);
        assert_eq!(merged, record(0.9, 0.6, 0.99));
    }

    #[test]
    fn test_save_merged_is_monotonic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exp").join(RESULT_FILE);

        let first = record(0.6, 0.7, 0.8).save_merged(&path).unwrap();
        assert_eq!(first, record(0.6, 0.7, 0.8));

        let second = record(0.5, 0.9, 0.8).save_merged(&path).unwrap();
        assert_eq!(second, record(0.6, 0.9, 0.8));

        let stored = load_result(&path).unwrap();
        assert_eq!(stored["accuracy"], 0.6);
        assert_eq!(stored["smoothed_accuracy"], 0.9);
    }

    #[test]
    fn test_missing_and_malformed() {
        let dir = TempDir::new().unwrap();
        assert!(load_result(&dir.path().join(RESULT_FILE)).unwrap().is_empty());
        assert!(matches!(
            parse_result("accuracy 0.5"),
            Err(ResultError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            parse_result("\naccuracy: high"),
            Err(ResultError::Malformed { line: 2, .. })
        ));
    }
}
