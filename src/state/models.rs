// Ledger data models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parameters identifying one evaluated combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentParams {
    pub key: String,
    pub test_group: String,
    pub model: String,
    pub segment_window: i64,
    pub segment_gap: i64,
    pub smoothing_window: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub id: Uuid,
    #[serde(flatten)]
    pub params: ExperimentParams,
    pub accuracy: f64,
    pub smoothed_accuracy: f64,
    pub top_k_accuracy: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub kind: ArtifactKind,
    pub path: String,
    pub sha256: String,
    pub bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Model,
    Predictions,
    Probabilities,
    SmoothedPredictions,
    Result,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Model => "model",
            ArtifactKind::Predictions => "predictions",
            ArtifactKind::Probabilities => "probabilities",
            ArtifactKind::SmoothedPredictions => "smoothed_predictions",
            ArtifactKind::Result => "result",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model" => Some(ArtifactKind::Model),
            "predictions" => Some(ArtifactKind::Predictions),
            "probabilities" => Some(ArtifactKind::Probabilities),
            "smoothed_predictions" => Some(ArtifactKind::SmoothedPredictions),
            "result" => Some(ArtifactKind::Result),
            _ => None,
        }
    }
}
