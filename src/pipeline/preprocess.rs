// Recording preprocessing
// Motion + annotations -> labeled runs -> window features, per recording and as a parallel batch

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::features::{
    dataset_path, DatasetError, FeatureDataset, FeatureError, WindowFeaturizer,
};
use crate::labels::{load_annotations, AnnotationError, LabelInterval, LabelSet};
use crate::motion::{FrameSequence, JsonMotionFile, MotionError, MotionSource};
use crate::pipeline::trace::{Stage, TraceBuilder, TraceWriter};
use crate::segment::{assign_resolved_labels, split_into_runs, LabeledFrames, SegmentError};

/// Annotation file expected in each recording directory
pub const ANNOTATION_FILE: &str = "label.json";

/// Motion table expected in each recording directory
pub const MOTION_FILE: &str = "motion.json";

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Input directory not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Motion error: {0}")]
    Motion(#[from] MotionError),

    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    #[error("Segmentation error: {0}")]
    Segment(#[from] SegmentError),

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// One recording: a directory holding a motion table and its annotations
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub name: String,
    pub motion_path: PathBuf,
    pub annotation_path: PathBuf,
}

impl Recording {
    pub fn from_dir(dir: &Path) -> Option<Self> {
        let name = dir.file_name()?.to_str()?.to_string();
        let motion_path = dir.join(MOTION_FILE);
        let annotation_path = dir.join(ANNOTATION_FILE);
        (motion_path.is_file() && annotation_path.is_file()).then_some(Recording {
            name,
            motion_path,
            annotation_path,
        })
    }
}

/// Recording directories under `input_dir`, sorted by name
///
/// Subdirectories missing either file are skipped. When `pick` is given only
/// the named recordings are returned.
pub fn discover_recordings(
    input_dir: &Path,
    pick: Option<&[String]>,
) -> Result<Vec<Recording>, PreprocessError> {
    if !input_dir.is_dir() {
        return Err(PreprocessError::NotFound(input_dir.to_path_buf()));
    }

    let mut recordings = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        match Recording::from_dir(&path) {
            Some(rec) if pick.map_or(true, |names| names.contains(&rec.name)) => {
                recordings.push(rec)
            }
            Some(_) => {}
            None => log::debug!("Skipping {}: no {} / {}", path.display(), MOTION_FILE, ANNOTATION_FILE),
        }
    }

    recordings.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(recordings)
}

/// Every raw label string used across the recordings' annotations, in first-seen order
pub fn collect_annotation_labels(recordings: &[Recording]) -> Result<Vec<String>, PreprocessError> {
    let mut names: Vec<String> = Vec::new();
    for rec in recordings {
        for interval in load_annotations(&rec.annotation_path)? {
            if !names.contains(&interval.label) {
                names.push(interval.label);
            }
        }
    }
    Ok(names)
}

/// Featurize one recording already in memory
///
/// Frames are labeled, split into runs, runs tagged unused are dropped, and
/// the remaining runs' windows are concatenated in run order.
pub fn preprocess_frames(
    motion: FrameSequence,
    intervals: &[LabelInterval],
    label_set: &LabelSet,
    featurizer: &WindowFeaturizer,
) -> Result<FeatureDataset, PreprocessError> {
    let channels = featurizer.channel_indices(motion.channels())?;
    let columns = featurizer.column_names(motion.channels())?;

    let labels = assign_resolved_labels(motion.len(), motion.frame_rate(), intervals, label_set);
    let labeled = LabeledFrames::new(motion, labels)?;

    let mut dataset = FeatureDataset::new(columns);
    for run in split_into_runs(&labeled) {
        if run.is_unused(label_set) {
            continue;
        }
        dataset.push_rows(featurizer.extract_run(&run, &channels)?)?;
    }
    Ok(dataset)
}

/// Load and featurize one recording from disk
pub fn preprocess_recording(
    recording: &Recording,
    label_set: &LabelSet,
    featurizer: &WindowFeaturizer,
) -> Result<FeatureDataset, PreprocessError> {
    let motion = JsonMotionFile::new(&recording.motion_path).load()?;
    let intervals = load_annotations(&recording.annotation_path)?;
    preprocess_frames(motion, &intervals, label_set, featurizer)
}

/// Batch output settings
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,

    /// Recompute even when an output file already exists
    pub force: bool,

    /// Recordings processed at once
    pub jobs: usize,
}

/// What happened to one recording in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingOutcome {
    Written { rows: usize },
    Cached,
    Failed(String),
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<(String, RecordingOutcome)>,
}

impl BatchSummary {
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, RecordingOutcome::Written { .. }))
    }

    pub fn cached(&self) -> usize {
        self.count(|o| matches!(o, RecordingOutcome::Cached))
    }

    pub fn failed(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(name, o)| match o {
                RecordingOutcome::Failed(e) => Some((name.as_str(), e.as_str())),
                _ => None,
            })
            .collect()
    }

    fn count(&self, pred: impl Fn(&RecordingOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

fn process_one(
    recording: &Recording,
    label_set: &LabelSet,
    featurizer: &WindowFeaturizer,
    options: &BatchOptions,
) -> Result<RecordingOutcome, PreprocessError> {
    let out_path = dataset_path(&options.output_dir, &recording.name);
    if !options.force && out_path.is_file() {
        return Ok(RecordingOutcome::Cached);
    }

    let dataset = preprocess_recording(recording, label_set, featurizer)?;
    dataset.save(&out_path)?;
    Ok(RecordingOutcome::Written { rows: dataset.len() })
}

/// Featurize every recording into `<output_dir>/<name>.json`
///
/// Recordings run on blocking worker threads. A failure is logged and
/// reported in the summary without stopping the others; outcomes keep the
/// input order.
pub async fn preprocess_batch(
    recordings: Vec<Recording>,
    label_set: Arc<LabelSet>,
    featurizer: Arc<WindowFeaturizer>,
    options: BatchOptions,
) -> BatchSummary {
    let trace = TraceWriter::in_dir(&options.output_dir);
    let options = Arc::new(options);
    let semaphore = Arc::new(Semaphore::new(options.jobs.max(1)));
    let mut handles = Vec::new();

    for recording in recordings {
        let label_set = label_set.clone();
        let featurizer = featurizer.clone();
        let options = options.clone();
        let sem = semaphore.clone();
        let trace = trace.clone();

        handles.push(tokio::spawn(async move {
            let _permit = match sem.acquire_owned().await {
                Ok(p) => p,
                Err(e) => return (recording.name, Err(PreprocessError::Worker(e.to_string()))),
            };

            trace.record(TraceBuilder::stage(Stage::Preprocess).key(&recording.name).start("featurizing"));
            let name = recording.name.clone();
            let result = tokio::task::spawn_blocking(move || {
                process_one(&recording, &label_set, &featurizer, &options)
            })
            .await
            .unwrap_or_else(|e| Err(PreprocessError::Worker(e.to_string())));
            (name, result)
        }));
    }

    let mut summary = BatchSummary::default();
    for handle in handles {
        let (name, result) = match handle.await {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("Preprocessing task panicked: {}", e);
                continue;
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => RecordingOutcome::Failed(e.to_string()),
        };

        let builder = TraceBuilder::stage(Stage::Preprocess).key(&name);
        match &outcome {
            RecordingOutcome::Written { rows } => {
                log::info!("{}: {} feature rows", name, rows);
                trace.record(builder.complete("written", serde_json::json!({ "rows": rows })));
            }
            RecordingOutcome::Cached => {
                log::info!("{}: cached, skipping", name);
                trace.record(builder.skipped("cached"));
            }
            RecordingOutcome::Failed(e) => {
                log::warn!("{}: preprocessing failed: {}", name, e);
                trace.record(builder.failed(e));
            }
        }
        summary.outcomes.push((name, outcome));
    }

    summary
}
