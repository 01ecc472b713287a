// Featurized datasets
// Column-aligned feature tables persisted per recording and merged into train/test splits

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::features::featurizer::{FeatureRow, LABEL_COLUMN};
use crate::labels::LabelId;

/// File extension of persisted datasets
pub const DATASET_EXTENSION: &str = "json";

/// Output files that live next to datasets but are not datasets
const RESERVED_NAMES: [&str; 4] = ["pred", "pred_proba", "smoothed_pred", "smoothed_pred_proba"];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Dataset not found: {0}")]
    NotFound(String),

    #[error("No dataset in {dir} for test recordings: {}", .names.join(", "))]
    MissingRecordings { dir: String, names: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Feature schema of '{name}' does not match the other datasets")]
    SchemaMismatch { name: String },

    #[error("Stored schema fingerprint of '{name}' does not match its columns")]
    CorruptSchema { name: String },

    #[error("Row {index} has {found} values, expected {expected}")]
    RowWidth {
        index: usize,
        expected: usize,
        found: usize,
    },
}

/// Rows of window features with a deterministic column schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDataset {
    /// Feature column names (label column excluded)
    pub columns: Vec<String>,

    /// SHA-256 of the column names, used to check schema alignment
    pub schema_sha256: String,

    pub rows: Vec<FeatureRow>,
}

impl FeatureDataset {
    pub fn new(columns: Vec<String>) -> Self {
        let schema_sha256 = schema_fingerprint(&columns);
        FeatureDataset {
            columns,
            schema_sha256,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<FeatureRow>) -> Result<Self, DatasetError> {
        let mut dataset = Self::new(columns);
        dataset.push_rows(rows)?;
        Ok(dataset)
    }

    /// Append rows, checking each has one value per column
    pub fn push_rows(&mut self, rows: Vec<FeatureRow>) -> Result<(), DatasetError> {
        for (offset, row) in rows.iter().enumerate() {
            if row.values.len() != self.columns.len() {
                return Err(DatasetError::RowWidth {
                    index: self.rows.len() + offset,
                    expected: self.columns.len(),
                    found: row.values.len(),
                });
            }
        }
        self.rows.extend(rows);
        Ok(())
    }

    /// Append another dataset with an identical schema
    pub fn append(&mut self, other: FeatureDataset, name: &str) -> Result<(), DatasetError> {
        if other.schema_sha256 != self.schema_sha256 {
            return Err(DatasetError::SchemaMismatch {
                name: name.to_string(),
            });
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Full header: feature columns followed by the label column
    pub fn header(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(LABEL_COLUMN))
            .collect()
    }

    /// Feature matrix, one row per window
    pub fn features(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|r| r.values.clone()).collect()
    }

    pub fn labels(&self) -> Vec<LabelId> {
        self.rows.iter().map(|r| r.label).collect()
    }

    /// One flat record (column name -> value), label last
    pub fn record(&self, index: usize) -> Option<Vec<(&str, f64)>> {
        let row = self.rows.get(index)?;
        Some(
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.values.iter().copied())
                .chain(std::iter::once((LABEL_COLUMN, row.label as f64)))
                .collect(),
        )
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Write to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_bytes()?)?;
        Ok(())
    }

    /// Read from `path`, verifying the stored fingerprint
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        if !path.exists() {
            return Err(DatasetError::NotFound(path.display().to_string()));
        }
        let data = std::fs::read(path)?;
        let dataset = Self::from_json_bytes(&data)?;

        if dataset.schema_sha256 != schema_fingerprint(&dataset.columns) {
            return Err(DatasetError::CorruptSchema {
                name: path.display().to_string(),
            });
        }
        Ok(dataset)
    }
}

/// SHA-256 over the newline-joined column names
pub fn schema_fingerprint(columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Path of the persisted dataset for a recording
pub fn dataset_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, DATASET_EXTENSION))
}

/// Dataset files in `dir` as (name, path), sorted by name
pub fn list_datasets(dir: &Path) -> Result<Vec<(String, PathBuf)>, DatasetError> {
    if !dir.is_dir() {
        return Err(DatasetError::NotFound(dir.display().to_string()));
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(DATASET_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        if RESERVED_NAMES.contains(&name.as_str()) || name.ends_with("_model") {
            continue;
        }
        found.push((name, path));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found)
}

/// Datasets split into training and test sets by recording name
#[derive(Debug, Clone)]
pub struct DataSplit {
    pub train: FeatureDataset,
    pub test: FeatureDataset,
}

/// Load every dataset in `dir`; recordings named in `test_names` form the test set
///
/// Every named test recording must have a dataset, otherwise the split is
/// refused rather than scored on part of the group.
pub fn load_split(dir: &Path, test_names: &[String]) -> Result<DataSplit, DatasetError> {
    let datasets = list_datasets(dir)?;

    let mut missing: Vec<String> = Vec::new();
    for name in test_names {
        if !datasets.iter().any(|(found, _)| found == name) && !missing.contains(name) {
            missing.push(name.clone());
        }
    }
    if !missing.is_empty() {
        return Err(DatasetError::MissingRecordings {
            dir: dir.display().to_string(),
            names: missing,
        });
    }

    let mut train: Option<FeatureDataset> = None;
    let mut test: Option<FeatureDataset> = None;
    let mut schema: Option<String> = None;

    for (name, path) in datasets {
        let dataset = FeatureDataset::load(&path)?;

        match &schema {
            Some(expected) if *expected != dataset.schema_sha256 => {
                return Err(DatasetError::SchemaMismatch { name });
            }
            Some(_) => {}
            None => schema = Some(dataset.schema_sha256.clone()),
        }

        let target = if test_names.contains(&name) {
            &mut test
        } else {
            &mut train
        };
        if let Some(existing) = target.as_mut() {
            existing.append(dataset, &name)?;
        } else {
            *target = Some(dataset);
        }
    }

    let columns = train
        .as_ref()
        .or(test.as_ref())
        .map(|d| d.columns.clone())
        .unwrap_or_default();

    log::info!(
        "Loaded split from {}: {} train rows, {} test rows",
        dir.display(),
        train.as_ref().map_or(0, |d| d.len()),
        test.as_ref().map_or(0, |d| d.len())
    );

    Ok(DataSplit {
        train: train.unwrap_or_else(|| FeatureDataset::new(columns.clone())),
        test: test.unwrap_or_else(|| FeatureDataset::new(columns)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(values: &[f64], label: LabelId) -> FeatureRow {
        FeatureRow {
            values: values.to_vec(),
            label,
        }
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = schema_fingerprint(&cols(&["x-avg", "y-avg"]));
        let b = schema_fingerprint(&cols(&["y-avg", "x-avg"]));
        assert_ne!(a, b);
        assert_eq!(a, schema_fingerprint(&cols(&["x-avg", "y-avg"])));
    }

    #[test]
    fn test_row_width_checked() {
        let mut dataset = FeatureDataset::new(cols(&["x-avg", "x-var"]));
        assert!(dataset.push_rows(vec![row(&[1.0, 2.0], 1)]).is_ok());
        assert!(matches!(
            dataset.push_rows(vec![row(&[1.0], 1)]),
            Err(DatasetError::RowWidth { index: 1, .. })
        ));
    }

    #[test]
    fn test_header_and_record() {
        let dataset =
            FeatureDataset::with_rows(cols(&["x-avg"]), vec![row(&[0.5], 2)]).unwrap();
        assert_eq!(dataset.header(), vec!["x-avg", "label"]);
        assert_eq!(dataset.record(0).unwrap(), vec![("x-avg", 0.5), ("label", 2.0)]);
        assert!(dataset.record(1).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dataset_path(dir.path(), "rec1");
        let dataset =
            FeatureDataset::with_rows(cols(&["x-avg"]), vec![row(&[0.5], 2), row(&[1.5], 1)])
                .unwrap();

        dataset.save(&path).unwrap();
        let loaded = FeatureDataset::load(&path).unwrap();
        assert_eq!(loaded, dataset);
    }

    #[test]
    fn test_load_detects_tampered_schema() {
        let dir = TempDir::new().unwrap();
        let path = dataset_path(dir.path(), "rec1");
        let mut dataset = FeatureDataset::new(cols(&["x-avg"]));
        dataset.columns.push("y-avg".to_string());
        dataset.save(&path).unwrap();

        assert!(matches!(
            FeatureDataset::load(&path),
            Err(DatasetError::CorruptSchema { .. })
        ));
    }

    #[test]
    fn test_load_split_by_name() {
        let dir = TempDir::new().unwrap();
        for (name, label) in [("1", 1), ("2", 2), ("3", 3)] {
            FeatureDataset::with_rows(cols(&["x-avg"]), vec![row(&[label as f64], label)])
                .unwrap()
                .save(&dataset_path(dir.path(), name))
                .unwrap();
        }
        std::fs::write(dir.path().join("pred.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let split = load_split(dir.path(), &["2".to_string()]).unwrap();
        assert_eq!(split.train.labels(), vec![1, 3]);
        assert_eq!(split.test.labels(), vec![2]);
    }

    #[test]
    fn test_load_split_schema_mismatch() {
        let dir = TempDir::new().unwrap();
        FeatureDataset::new(cols(&["x-avg"]))
            .save(&dataset_path(dir.path(), "a"))
            .unwrap();
        FeatureDataset::new(cols(&["y-avg"]))
            .save(&dataset_path(dir.path(), "b"))
            .unwrap();

        assert!(matches!(
            load_split(dir.path(), &[]),
            Err(DatasetError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_load_split_refuses_partial_test_group() {
        let dir = TempDir::new().unwrap();
        for name in ["1", "5"] {
            FeatureDataset::with_rows(cols(&["x-avg"]), vec![row(&[1.0], 1)])
                .unwrap()
                .save(&dataset_path(dir.path(), name))
                .unwrap();
        }

        let result = load_split(dir.path(), &["4".to_string(), "5".to_string()]);
        match result {
            Err(DatasetError::MissingRecordings { names, .. }) => assert_eq!(names, vec!["4"]),
            other => panic!("expected missing recordings, got {:?}", other.map(|s| s.test.len())),
        }
    }

    #[test]
    fn test_load_split_missing_dir() {
        let dir = TempDir::new().unwrap();
        let result = load_split(&dir.path().join("absent"), &[]);
        assert!(matches!(result, Err(DatasetError::NotFound(_))));
    }
}
