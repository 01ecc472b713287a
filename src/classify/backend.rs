// Classifier backend abstraction
// The pipeline only sees fit / predict / predict_proba / save / load; algorithms live behind adapters

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::classify::centroid::NearestCentroidClassifier;
use crate::classify::knn::KnnClassifier;
use crate::labels::LabelId;

/// Classification backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassifierKind {
    /// k-nearest neighbours on standardized features
    Knn,

    /// Nearest class centroid on standardized features
    NearestCentroid,

    /// Tree ensembles trained by external libraries (not available here)
    RandomForest,
    XgBoost,
    LightGbm,
}

impl ClassifierKind {
    /// Parse a model tag as used in experiment keys
    pub fn from_tag(tag: &str) -> Result<Self, ClassifierError> {
        match tag.to_ascii_lowercase().as_str() {
            "knn" => Ok(ClassifierKind::Knn),
            "nearest-centroid" | "centroid" => Ok(ClassifierKind::NearestCentroid),
            "randomforest" | "random forest" | "random-forest" => Ok(ClassifierKind::RandomForest),
            "xgboost" => Ok(ClassifierKind::XgBoost),
            "lightgbm" => Ok(ClassifierKind::LightGbm),
            _ => Err(ClassifierError::UnknownKind(tag.to_string())),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ClassifierKind::Knn => "knn",
            ClassifierKind::NearestCentroid => "nearest-centroid",
            ClassifierKind::RandomForest => "randomforest",
            ClassifierKind::XgBoost => "xgboost",
            ClassifierKind::LightGbm => "lightgbm",
        }
    }

    /// Whether this build ships an adapter for the backend
    pub fn is_available(&self) -> bool {
        matches!(self, ClassifierKind::Knn | ClassifierKind::NearestCentroid)
    }
}

/// Errors that can occur during training or inference
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Backend not implemented: {0:?}")]
    BackendNotImplemented(ClassifierKind),

    #[error("Unknown classifier kind: {0}")]
    UnknownKind(String),

    #[error("Classifier used before fit")]
    NotFitted,

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("Feature row has {found} values, expected {expected}")]
    FeatureWidth { expected: usize, found: usize },

    #[error("Label {label} is not a class id (0..{num_classes})")]
    InvalidLabel { label: LabelId, num_classes: usize },

    #[error("Model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Opaque classifier capability
///
/// Class ids are label ids `0..num_classes`; probability rows have one column per class.
pub trait Classifier: Send {
    fn kind(&self) -> ClassifierKind;

    fn num_classes(&self) -> usize;

    fn fit(&mut self, features: &[Vec<f64>], labels: &[LabelId]) -> Result<(), ClassifierError>;

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ClassifierError>;

    /// Most probable class per row, lowest id on ties
    fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<LabelId>, ClassifierError> {
        Ok(self
            .predict_proba(features)?
            .iter()
            .map(|row| argmax(row) as LabelId)
            .collect())
    }

    /// Serialized trained state
    fn to_saved(&self) -> SavedModel;

    fn save(&self, path: &Path) -> Result<(), ClassifierError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec(&self.to_saved())?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Persisted trained state of any available adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SavedModel {
    Knn(KnnClassifier),
    NearestCentroid(NearestCentroidClassifier),
}

impl SavedModel {
    pub fn into_classifier(self) -> Box<dyn Classifier> {
        match self {
            SavedModel::Knn(model) => Box::new(model),
            SavedModel::NearestCentroid(model) => Box::new(model),
        }
    }
}

/// Create an untrained classifier for `kind`
pub fn create_classifier(
    kind: ClassifierKind,
    num_classes: usize,
) -> Result<Box<dyn Classifier>, ClassifierError> {
    match kind {
        ClassifierKind::Knn => Ok(Box::new(KnnClassifier::new(num_classes, 5))),
        ClassifierKind::NearestCentroid => Ok(Box::new(NearestCentroidClassifier::new(num_classes))),
        other => Err(ClassifierError::BackendNotImplemented(other)),
    }
}

/// Load a trained classifier saved with [`Classifier::save`]
pub fn load_classifier(path: &Path) -> Result<Box<dyn Classifier>, ClassifierError> {
    if !path.exists() {
        return Err(ClassifierError::ModelNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let saved: SavedModel = serde_json::from_slice(&bytes)?;
    Ok(saved.into_classifier())
}

/// Validate a training set against the class count; returns the feature width
pub(crate) fn check_training_set(
    features: &[Vec<f64>],
    labels: &[LabelId],
    num_classes: usize,
) -> Result<usize, ClassifierError> {
    if features.len() != labels.len() {
        return Err(ClassifierError::LengthMismatch {
            features: features.len(),
            labels: labels.len(),
        });
    }
    let Some(first) = features.first() else {
        return Err(ClassifierError::EmptyTrainingSet);
    };
    let width = first.len();
    check_width(features, width)?;

    if let Some(&label) = labels
        .iter()
        .find(|&&l| l < 0 || l as usize >= num_classes)
    {
        return Err(ClassifierError::InvalidLabel { label, num_classes });
    }
    Ok(width)
}

pub(crate) fn check_width(features: &[Vec<f64>], expected: usize) -> Result<(), ClassifierError> {
    match features.iter().find(|row| row.len() != expected) {
        Some(row) => Err(ClassifierError::FeatureWidth {
            expected,
            found: row.len(),
        }),
        None => Ok(()),
    }
}

fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (i, &p) in row.iter().enumerate() {
        if p > row[best] {
            best = i;
        }
    }
    best
}

/// Per-feature z-score scaling fitted on the training set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Standardizer {
    pub fn fit(features: &[Vec<f64>]) -> Self {
        let Some(width) = features.first().map(Vec::len) else {
            return Standardizer::default();
        };
        let n = features.len() as f64;

        let mut mean = vec![0.0; width];
        for row in features {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut scale = vec![0.0; width];
        for row in features {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        // constant columns keep their offset but are not rescaled
        for s in scale.iter_mut() {
            *s = if *s > 0.0 { s.sqrt() } else { 1.0 };
        }

        Standardizer { mean, scale }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}
