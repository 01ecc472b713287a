// Experiment sweep
// Trains, tests and scores every model / window / gap / smoothing combination, keeping the best results

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::classify::{create_classifier, load_classifier, Classifier, ClassifierError, ClassifierKind};
use crate::evaluation::{accuracy, top_k_accuracy, ResultError, ResultRecord, RESULT_FILE};
use crate::features::{load_split, DatasetError, FeatureDataset, FeatureError, FeaturizerConfig, WindowFeaturizer};
use crate::labels::{LabelId, LabelSet};
use crate::pipeline::preprocess::{discover_recordings, preprocess_batch, BatchOptions, PreprocessError};
use crate::pipeline::trace::{Stage, TraceBuilder, TraceWriter};
use crate::smoothing::{smooth_top1, Alignment, SmoothingError};
use crate::state::{self, ArtifactKind, DbConnection, DbError, ExperimentParams, StorageError};

pub const PRED_FILE: &str = "pred.csv";
pub const PRED_PROBA_FILE: &str = "pred_proba.csv";
pub const SMOOTHED_PRED_FILE: &str = "smoothed_pred.csv";

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),

    #[error("Smoothing error: {0}")]
    Smoothing(#[from] SmoothingError),

    #[error("Result error: {0}")]
    Result(#[from] ResultError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No test rows for group {0}")]
    EmptyTestSet(String),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Sweep parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Directory of recording subdirectories
    pub input_dir: PathBuf,

    /// Root for featurized data and per-combination results
    pub output_dir: PathBuf,

    /// Classifier tags to try
    pub models: Vec<String>,

    pub segment_windows: Vec<usize>,
    pub segment_gaps: Vec<usize>,

    /// Smoothing windows in frames; divided by the gap to get rows
    pub smoothing_windows: Vec<usize>,

    /// Each group's recordings are held out together as the test set
    pub test_groups: Vec<Vec<String>>,

    /// Only run combinations whose key is listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_filter: Option<Vec<String>>,

    /// Only preprocess the named recordings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pick: Option<Vec<String>>,

    /// SQLite ledger path; the per-user data dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,

    /// Record results in the ledger
    pub use_ledger: bool,

    /// Recordings featurized concurrently
    pub jobs: usize,

    /// Recompute cached datasets
    pub force: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            input_dir: PathBuf::from("data/input"),
            output_dir: PathBuf::from("data/output"),
            models: vec!["knn".to_string()],
            segment_windows: vec![240],
            segment_gaps: vec![10],
            smoothing_windows: vec![360],
            test_groups: vec![vec!["4".to_string(), "5".to_string()]],
            key_filter: None,
            pick: None,
            ledger_path: None,
            use_ledger: true,
            jobs: 4,
            force: false,
        }
    }
}

/// One point of the parameter grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Combination {
    pub model: ClassifierKind,
    pub segment_window: usize,
    pub segment_gap: usize,
    pub smoothing_window: usize,
}

impl Combination {
    pub fn key(&self) -> String {
        format!(
            "{}_segmentw{}_segmentgap{}_smoothw{}",
            self.model.tag(),
            self.segment_window,
            self.segment_gap,
            self.smoothing_window
        )
    }

    /// Smoothing window in feature rows (one row per `segment_gap` frames)
    pub fn smoothing_rows(&self) -> usize {
        (self.smoothing_window / self.segment_gap.max(1)).max(1)
    }

    pub fn featurizer_config(&self, channels: Option<Vec<String>>) -> FeaturizerConfig {
        FeaturizerConfig {
            window_size: self.segment_window,
            gap_size: self.segment_gap,
            channels,
        }
    }
}

/// Cartesian product models x windows x gaps x smoothing windows, in that nesting order
pub fn all_combinations(config: &ExperimentConfig) -> Result<Vec<Combination>, ExperimentError> {
    let models = config
        .models
        .iter()
        .map(|tag| ClassifierKind::from_tag(tag))
        .collect::<Result<Vec<_>, _>>()?;

    let mut combos = Vec::new();
    for &model in &models {
        for &segment_window in &config.segment_windows {
            for &segment_gap in &config.segment_gaps {
                for &smoothing_window in &config.smoothing_windows {
                    combos.push(Combination {
                        model,
                        segment_window,
                        segment_gap,
                        smoothing_window,
                    });
                }
            }
        }
    }
    Ok(combos)
}

/// Combinations that pass the key filter
pub fn selected_combinations(config: &ExperimentConfig) -> Result<Vec<Combination>, ExperimentError> {
    let combos = all_combinations(config)?;
    Ok(match &config.key_filter {
        Some(keys) => combos.into_iter().filter(|c| keys.contains(&c.key())).collect(),
        None => combos,
    })
}

/// Directory of featurized datasets for one window / gap pair
pub fn segment_dir(output_dir: &Path, window: usize, gap: usize) -> PathBuf {
    output_dir.join(format!("segmentw{}_segmentgap{}", window, gap))
}

pub fn group_name(test_group: &[String]) -> String {
    test_group.join("-")
}

/// Directory holding the model, predictions and result of one combination and test group
pub fn experiment_dir(output_dir: &Path, combo: &Combination, test_group: &[String]) -> PathBuf {
    output_dir.join(combo.key()).join(group_name(test_group))
}

pub fn model_path(exp_dir: &Path, test_group: &[String]) -> PathBuf {
    exp_dir.join(format!("{}_model.json", group_name(test_group)))
}

/// Everything needed to run combinations
#[derive(Clone)]
pub struct SweepContext {
    pub config: ExperimentConfig,
    pub channels: Option<Vec<String>>,
    pub top_k: usize,
    pub alignment: Alignment,
    pub label_set: Arc<LabelSet>,
    pub ledger: Option<DbConnection>,
}

/// Output of testing one classifier
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub record: ResultRecord,
    pub predictions: Vec<LabelId>,
    pub probabilities: Vec<Vec<f64>>,
    pub smoothed: Vec<LabelId>,
}

/// Fit a new classifier on `train`
pub fn train_model(
    kind: ClassifierKind,
    num_classes: usize,
    train: &FeatureDataset,
) -> Result<Box<dyn Classifier>, ExperimentError> {
    let mut classifier = create_classifier(kind, num_classes)?;
    classifier.fit(&train.features(), &train.labels())?;
    Ok(classifier)
}

/// Load the cached model at `path`, or train and cache one
pub fn train_or_load(
    kind: ClassifierKind,
    num_classes: usize,
    train: &FeatureDataset,
    path: &Path,
) -> Result<Box<dyn Classifier>, ExperimentError> {
    match load_classifier(path) {
        Ok(classifier) if classifier.kind() == kind => {
            log::info!("Loaded model {}", path.display());
            return Ok(classifier);
        }
        Ok(classifier) => log::warn!(
            "Cached model {} is {:?}, retraining as {:?}",
            path.display(),
            classifier.kind(),
            kind
        ),
        Err(ClassifierError::ModelNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    log::info!("Training {} on {} rows", kind.tag(), train.len());
    let classifier = train_model(kind, num_classes, train)?;
    classifier.save(path)?;
    Ok(classifier)
}

/// Raw, smoothed and top-k accuracy of `classifier` on `test`
///
/// Smoothed predictions are scored against the truth sliced by `alignment`.
pub fn evaluate(
    classifier: &dyn Classifier,
    test: &FeatureDataset,
    smoothing_rows: usize,
    top_k: usize,
    alignment: Alignment,
) -> Result<Evaluation, ExperimentError> {
    let truth = test.labels();
    let probabilities = classifier.predict_proba(&test.features())?;
    let predictions = classifier.predict(&test.features())?;
    let smoothed = smooth_top1(&probabilities, smoothing_rows)?;

    let record = ResultRecord {
        accuracy: accuracy(&predictions, &truth),
        smoothed_accuracy: accuracy(&smoothed, alignment.slice(&truth, smoothing_rows)),
        top_k_accuracy: top_k_accuracy(&probabilities, &truth, top_k),
    };

    Ok(Evaluation {
        record,
        predictions,
        probabilities,
        smoothed,
    })
}

fn label_column_text(values: &[LabelId]) -> String {
    let mut out = String::from("label\n");
    for v in values {
        let _ = writeln!(out, "{}", v);
    }
    out
}

fn probability_text(header: &[String], rows: &[Vec<f64>]) -> String {
    let mut out = header.join(",");
    out.push('\n');
    for row in rows {
        let line: Vec<String> = row.iter().map(|p| p.to_string()).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Write prediction files; returns (kind, path, sha256, bytes) for each
fn save_predictions(
    exp_dir: &Path,
    evaluation: &Evaluation,
    label_set: &LabelSet,
) -> Result<Vec<(ArtifactKind, PathBuf, String, i64)>, ExperimentError> {
    let files = [
        (ArtifactKind::Predictions, PRED_FILE, label_column_text(&evaluation.predictions)),
        (
            ArtifactKind::Probabilities,
            PRED_PROBA_FILE,
            probability_text(label_set.names(), &evaluation.probabilities),
        ),
        (
            ArtifactKind::SmoothedPredictions,
            SMOOTHED_PRED_FILE,
            label_column_text(&evaluation.smoothed),
        ),
    ];

    let mut stored = Vec::new();
    for (kind, name, text) in files {
        let (path, sha) = state::store_file(exp_dir, name, text.as_bytes())?;
        stored.push((kind, path, sha, text.len() as i64));
    }
    Ok(stored)
}

/// Train (or load), test and record one combination for one test group
///
/// The result file is written only after every metric is computed, merged
/// keep-best with the stored one.
pub fn run_combination(
    combo: &Combination,
    test_group: &[String],
    ctx: &SweepContext,
) -> Result<ResultRecord, ExperimentError> {
    let key = combo.key();
    let group = group_name(test_group);
    let trace = TraceWriter::in_dir(&ctx.config.output_dir);
    trace.record(TraceBuilder::stage(Stage::Evaluate).key(&key).start(format!("test group {}", group)));

    let data_dir = segment_dir(&ctx.config.output_dir, combo.segment_window, combo.segment_gap);
    let split = load_split(&data_dir, test_group)?;
    if split.test.is_empty() {
        return Err(ExperimentError::EmptyTestSet(group));
    }

    let exp_dir = experiment_dir(&ctx.config.output_dir, combo, test_group);
    let model_file = model_path(&exp_dir, test_group);
    let classifier = train_or_load(combo.model, ctx.label_set.len(), &split.train, &model_file)?;

    let evaluation = evaluate(
        classifier.as_ref(),
        &split.test,
        combo.smoothing_rows(),
        ctx.top_k,
        ctx.alignment,
    )?;
    let mut artifacts = save_predictions(&exp_dir, &evaluation, &ctx.label_set)?;

    let result_path = exp_dir.join(RESULT_FILE);
    let merged = evaluation.record.save_merged(&result_path)?;
    for (kind, path) in [(ArtifactKind::Result, result_path), (ArtifactKind::Model, model_file)] {
        let (sha, bytes) = state::file_digest(&path)?;
        artifacts.push((kind, path, sha, bytes));
    }

    log::info!(
        "{} [{}]: accuracy {:.4}, smoothed {:.4}, top-{} {:.4}",
        key,
        group,
        evaluation.record.accuracy,
        evaluation.record.smoothed_accuracy,
        ctx.top_k,
        evaluation.record.top_k_accuracy
    );

    if let Some(db) = &ctx.ledger {
        let params = ExperimentParams {
            key: key.clone(),
            test_group: group.clone(),
            model: combo.model.tag().to_string(),
            segment_window: combo.segment_window as i64,
            segment_gap: combo.segment_gap as i64,
            smoothing_window: combo.smoothing_window as i64,
        };
        let stored = state::upsert_result(db, &params, &evaluation.record)?;
        for (kind, path, sha, bytes) in artifacts {
            state::create_artifact(db, stored.id, kind, path.display().to_string(), sha, bytes)?;
        }
    }

    trace.record(TraceBuilder::stage(Stage::Evaluate).key(&key).complete(
        format!("test group {}", group),
        serde_json::json!({
            "accuracy": merged.accuracy,
            "smoothed_accuracy": merged.smoothed_accuracy,
            "top_k_accuracy": merged.top_k_accuracy,
        }),
    ));
    Ok(merged)
}

#[derive(Debug, Clone, Default)]
pub struct SweepSummary {
    /// (key, test group, merged record)
    pub completed: Vec<(String, String, ResultRecord)>,

    /// (key, test group, error)
    pub failed: Vec<(String, String, String)>,
}

/// Featurize every window / gap pair used by the selected combinations
pub async fn preprocess_for_sweep(ctx: &SweepContext) -> Result<(), ExperimentError> {
    let combos = selected_combinations(&ctx.config)?;
    let pairs: BTreeSet<(usize, usize)> = combos
        .iter()
        .map(|c| (c.segment_window, c.segment_gap))
        .collect();
    let recordings = discover_recordings(&ctx.config.input_dir, ctx.config.pick.as_deref())?;

    for (window, gap) in pairs {
        let featurizer = WindowFeaturizer::new(FeaturizerConfig {
            window_size: window,
            gap_size: gap,
            channels: ctx.channels.clone(),
        })?;
        let options = BatchOptions {
            output_dir: segment_dir(&ctx.config.output_dir, window, gap),
            force: ctx.config.force,
            jobs: ctx.config.jobs,
        };
        log::info!("Preprocessing window {} gap {} into {}", window, gap, options.output_dir.display());

        let summary = preprocess_batch(
            recordings.clone(),
            ctx.label_set.clone(),
            Arc::new(featurizer),
            options,
        )
        .await;
        log::info!(
            "window {} gap {}: {} written, {} cached, {} failed",
            window,
            gap,
            summary.written(),
            summary.cached(),
            summary.failed().len()
        );
    }
    Ok(())
}

/// Preprocess, then run every selected combination against every test group
///
/// A failed combination is logged and recorded; the sweep moves on.
pub async fn run_sweep(ctx: SweepContext) -> Result<SweepSummary, ExperimentError> {
    preprocess_for_sweep(&ctx).await?;

    let combos = selected_combinations(&ctx.config)?;
    let trace = TraceWriter::in_dir(&ctx.config.output_dir);
    let total = combos.len() * ctx.config.test_groups.len();
    let ctx = Arc::new(ctx);
    let mut summary = SweepSummary::default();

    for combo in combos {
        for test_group in ctx.config.test_groups.clone() {
            let key = combo.key();
            let group = group_name(&test_group);
            log::info!("== {} [{}] ==", key, group);

            let worker_ctx = ctx.clone();
            let result = tokio::task::spawn_blocking(move || {
                run_combination(&combo, &test_group, &worker_ctx)
            })
            .await
            .unwrap_or_else(|e| Err(ExperimentError::Worker(e.to_string())));

            match result {
                Ok(record) => summary.completed.push((key.clone(), group, record)),
                Err(e) => {
                    log::warn!("{} [{}] failed: {}", key, group, e);
                    trace.record(TraceBuilder::stage(Stage::Sweep).key(&key).failed(&e));
                    summary.failed.push((key.clone(), group, e.to_string()));
                }
            }

            let done = summary.completed.len() + summary.failed.len();
            trace.record(
                TraceBuilder::stage(Stage::Sweep)
                    .key(&key)
                    .progress(done as f32 / total.max(1) as f32, format!("{}/{}", done, total)),
            );
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{dataset_path, FeatureRow};
    use tempfile::TempDir;

    fn config() -> ExperimentConfig {
        ExperimentConfig {
            models: vec!["knn".to_string(), "nearest-centroid".to_string()],
            segment_windows: vec![60, 120],
            segment_gaps: vec![10],
            smoothing_windows: vec![60, 360],
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_combination_key_and_rows() {
        let combo = Combination {
            model: ClassifierKind::XgBoost,
            segment_window: 120,
            segment_gap: 10,
            smoothing_window: 360,
        };
        assert_eq!(combo.key(), "xgboost_segmentw120_segmentgap10_smoothw360");
        assert_eq!(combo.smoothing_rows(), 36);
    }

    #[test]
    fn test_all_combinations_order() {
        let combos = all_combinations(&config()).unwrap();
        assert_eq!(combos.len(), 8);
        assert_eq!(combos[0].key(), "knn_segmentw60_segmentgap10_smoothw60");
        assert_eq!(combos[1].key(), "knn_segmentw60_segmentgap10_smoothw360");
        assert_eq!(combos[7].key(), "nearest-centroid_segmentw120_segmentgap10_smoothw360");
    }

    #[test]
    fn test_key_filter_and_unknown_model() {
        let mut cfg = config();
        cfg.key_filter = Some(vec!["knn_segmentw120_segmentgap10_smoothw60".to_string()]);
        let combos = selected_combinations(&cfg).unwrap();
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].segment_window, 120);

        cfg.models.push("svm".to_string());
        assert!(matches!(
            all_combinations(&cfg),
            Err(ExperimentError::Classifier(ClassifierError::UnknownKind(_)))
        ));
    }

    fn two_class_dataset(values: &[(f64, LabelId)]) -> FeatureDataset {
        FeatureDataset::with_rows(
            vec!["x-avg".to_string()],
            values
                .iter()
                .map(|&(v, label)| FeatureRow { values: vec![v], label })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_evaluate_metrics() {
        let train = two_class_dataset(&[(0.0, 1), (0.1, 1), (5.0, 2), (5.1, 2)]);
        let test = two_class_dataset(&[(0.05, 1), (0.02, 1), (5.05, 2), (0.0, 2)]);
        let clf = train_model(ClassifierKind::NearestCentroid, 3, &train).unwrap();

        let eval = evaluate(clf.as_ref(), &test, 1, 2, Alignment::Leading).unwrap();
        assert_eq!(eval.predictions, vec![1, 1, 2, 1]);
        assert_eq!(eval.record.accuracy, 0.75);
        assert_eq!(eval.smoothed.len(), 3);
        // class 0 never trained, so the true class is always in the top 2
        assert_eq!(eval.record.top_k_accuracy, 1.0);
    }

    #[test]
    fn test_run_combination_writes_outputs_and_ledger() {
        let dir = TempDir::new().unwrap();
        let combo = Combination {
            model: ClassifierKind::Knn,
            segment_window: 60,
            segment_gap: 10,
            smoothing_window: 20,
        };
        let data_dir = segment_dir(dir.path(), 60, 10);
        two_class_dataset(&[(0.0, 1), (0.1, 1), (0.2, 1), (5.0, 2), (5.1, 2), (5.2, 2)])
            .save(&dataset_path(&data_dir, "1"))
            .unwrap();
        two_class_dataset(&[(0.0, 1), (0.1, 1), (0.1, 1), (5.0, 2), (5.0, 2)])
            .save(&dataset_path(&data_dir, "2"))
            .unwrap();

        let db = state::open_in_memory().unwrap();
        let ctx = SweepContext {
            config: ExperimentConfig {
                output_dir: dir.path().to_path_buf(),
                ..ExperimentConfig::default()
            },
            channels: None,
            top_k: 2,
            alignment: Alignment::Leading,
            label_set: Arc::new(LabelSet::with_defaults(["walk", "jump"])),
            ledger: Some(db.clone()),
        };

        let group = vec!["2".to_string()];
        let record = run_combination(&combo, &group, &ctx).unwrap();
        assert_eq!(record.accuracy, 1.0);

        let exp_dir = experiment_dir(dir.path(), &combo, &group);
        for file in [PRED_FILE, PRED_PROBA_FILE, SMOOTHED_PRED_FILE, RESULT_FILE] {
            assert!(exp_dir.join(file).is_file(), "{}", file);
        }
        assert!(model_path(&exp_dir, &group).is_file());

        let proba = std::fs::read_to_string(exp_dir.join(PRED_PROBA_FILE)).unwrap();
        assert!(proba.starts_with("その他,walk,jump\n"));

        let stored = state::get_result(&db, &combo.key(), "2").unwrap().unwrap();
        assert_eq!(stored.accuracy, 1.0);
        assert_eq!(state::list_artifacts(&db, &stored.id).unwrap().len(), 5);

        // second run loads the cached model and keeps the best metrics
        let again = run_combination(&combo, &group, &ctx).unwrap();
        assert_eq!(again, record);
        assert_eq!(state::list_artifacts(&db, &stored.id).unwrap().len(), 5);
    }

    #[test]
    fn test_run_combination_missing_test_group() {
        let dir = TempDir::new().unwrap();
        let combo = Combination {
            model: ClassifierKind::Knn,
            segment_window: 60,
            segment_gap: 10,
            smoothing_window: 20,
        };
        two_class_dataset(&[(0.0, 1), (5.0, 2)])
            .save(&dataset_path(&segment_dir(dir.path(), 60, 10), "1"))
            .unwrap();

        let ctx = SweepContext {
            config: ExperimentConfig {
                output_dir: dir.path().to_path_buf(),
                ..ExperimentConfig::default()
            },
            channels: None,
            top_k: 3,
            alignment: Alignment::Leading,
            label_set: Arc::new(LabelSet::with_defaults(["walk", "jump"])),
            ledger: None,
        };

        let result = run_combination(&combo, &["9".to_string()], &ctx);
        assert!(matches!(
            result,
            Err(ExperimentError::Dataset(DatasetError::MissingRecordings { .. }))
        ));
        let exp_dir = experiment_dir(dir.path(), &combo, &["9".to_string()]);
        assert!(!exp_dir.join(RESULT_FILE).exists());

        // one recording of the group present is still not a completed run
        two_class_dataset(&[(0.1, 1), (5.1, 2)])
            .save(&dataset_path(&segment_dir(dir.path(), 60, 10), "2"))
            .unwrap();
        let partial = vec!["2".to_string(), "9".to_string()];
        assert!(run_combination(&combo, &partial, &ctx).is_err());
        assert!(!experiment_dir(dir.path(), &combo, &partial).exists());
    }
}
