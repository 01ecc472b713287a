//! Configuration Management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::classify::ClassifierKind;
use crate::correction::DEFAULT_ALTERNATIVE_THRESHOLD;
use crate::features::FeaturizerConfig;
use crate::labels::{LabelError, LabelGroup, LabelSet, DEFAULT_OTHER_LABEL, DEFAULT_UNUSED_LABEL};
use crate::pipeline::{collect_annotation_labels, ExperimentConfig, PreprocessError, Recording};
use crate::smoothing::SmoothingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Label catalog error: {0}")]
    Label(#[from] LabelError),

    #[error("Could not read annotations: {0}")]
    Annotations(#[from] PreprocessError),
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Label catalog settings
    pub labels: LabelConfig,
    /// Window featurization
    pub featurizer: FeaturizerConfig,
    /// Temporal smoothing and top-k
    pub smoothing: SmoothingConfig,
    /// Sweep grid and directories
    pub experiment: ExperimentConfig,
    /// Recipe step correction
    pub correction: CorrectionConfig,
}

/// Recipe step correction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Recipe JSON applied by `evaluate`; correction is off when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<PathBuf>,
    /// Minimum probability for a lower-ranked candidate to hold or advance the step
    pub alternative_threshold: f64,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            recipe: None,
            alternative_threshold: DEFAULT_ALTERNATIVE_THRESHOLD,
        }
    }
}

/// Label catalog configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// One-name-per-line catalog; labels are collected from annotations when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
    /// Label for frames outside every interval
    pub other_label: String,
    /// Annotation label whose frames are excluded from datasets
    pub unused_label: String,
    /// Synonym groups merged into one label
    pub groups: Vec<LabelGroup>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            catalog: None,
            other_label: DEFAULT_OTHER_LABEL.to_string(),
            unused_label: DEFAULT_UNUSED_LABEL.to_string(),
            groups: Vec::new(),
        }
    }
}

impl LabelConfig {
    /// Build the label catalog from the configured file or from the recordings' annotations
    pub fn build_label_set(&self, recordings: &[Recording]) -> Result<LabelSet, ConfigError> {
        let set = match &self.catalog {
            Some(path) => LabelSet::load(path, &self.other_label, &self.unused_label, &self.groups)?,
            None => {
                let names = collect_annotation_labels(recordings)?;
                LabelSet::new(names, &self.other_label, &self.unused_label, &self.groups)
            }
        };
        log::info!("Label catalog: {}", set.names().join(", "));
        Ok(set)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

impl Config {
    /// Check values are usable; returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.labels.other_label.trim().is_empty() {
            return Err(invalid("other_label must not be empty"));
        }
        if self.labels.other_label == self.labels.unused_label {
            return Err(invalid("other_label and unused_label must differ"));
        }
        if self.featurizer.window_size == 0 || self.featurizer.gap_size == 0 {
            return Err(invalid(format!(
                "featurizer window and gap must be > 0, got {} / {}",
                self.featurizer.window_size, self.featurizer.gap_size
            )));
        }
        if self.smoothing.window_size == 0 {
            return Err(invalid("smoothing window_size must be > 0"));
        }
        if self.smoothing.top_k == 0 {
            return Err(invalid("top_k must be > 0"));
        }

        let exp = &self.experiment;
        for tag in &exp.models {
            ClassifierKind::from_tag(tag).map_err(|e| invalid(e.to_string()))?;
        }
        if exp.models.is_empty() {
            return Err(invalid("experiment.models must not be empty"));
        }
        if exp.segment_windows.is_empty() || exp.segment_windows.contains(&0) {
            return Err(invalid("segment_windows must be non-empty and positive"));
        }
        if exp.segment_gaps.is_empty() || exp.segment_gaps.contains(&0) {
            return Err(invalid("segment_gaps must be non-empty and positive"));
        }
        if exp.smoothing_windows.is_empty() || exp.smoothing_windows.contains(&0) {
            return Err(invalid("smoothing_windows must be non-empty and positive"));
        }
        if exp.test_groups.is_empty() || exp.test_groups.iter().any(|g| g.is_empty()) {
            return Err(invalid("every test group needs at least one recording"));
        }
        if exp.jobs == 0 {
            return Err(invalid("jobs must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.correction.alternative_threshold) {
            return Err(invalid(format!(
                "correction.alternative_threshold must be within 0..=1, got {}",
                self.correction.alternative_threshold
            )));
        }
        Ok(())
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or the default location, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".mocap_actions").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.labels.other_label, "その他");
        assert_eq!(config.labels.unused_label, "不要");
        assert_eq!(config.featurizer.window_size, 240);
        assert_eq!(config.featurizer.gap_size, 1);
        assert_eq!(config.smoothing.window_size, 360);
        assert_eq!(config.smoothing.top_k, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("config.json");

        let mut config = Config::default();
        config.experiment.models = vec!["nearest-centroid".to_string()];
        config.labels.groups = vec![LabelGroup::new("spin", &["spin-left", "spin-right"])];
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"smoothing": {"window_size": 12, "top_k": 2}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.smoothing.window_size, 12);
        assert_eq!(config.featurizer.window_size, 240);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = Config::default();
        config.smoothing.top_k = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.experiment.models = vec!["svm".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.experiment.test_groups = vec![vec![]];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.labels.unused_label = config.labels.other_label.clone();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.correction.alternative_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_correction_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"correction": {"recipe": "omelet.json"}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.correction.recipe, Some(PathBuf::from("omelet.json")));
        assert_eq!(config.correction.alternative_threshold, 0.2);
        assert!(Config::default().correction.recipe.is_none());
    }

    #[test]
    fn test_label_set_from_catalog_file() {
        let dir = TempDir::new().unwrap();
        let catalog = dir.path().join("labels.txt");
        std::fs::write(&catalog, "walk\n不要\nspin-left\n\njump\n").unwrap();

        let config = LabelConfig {
            catalog: Some(catalog),
            groups: vec![LabelGroup::new("spin", &["spin-left"])],
            ..LabelConfig::default()
        };
        let set = config.build_label_set(&[]).unwrap();
        assert_eq!(set.names(), &["その他", "walk", "spin", "jump"]);
    }
}
