// Pipeline execution and monitoring module
// Batch preprocessing, experiment sweeps and their progress trace

pub mod experiment;
pub mod preprocess;
pub mod trace;

pub use experiment::{
    all_combinations, evaluate, experiment_dir, group_name, model_path, preprocess_for_sweep,
    run_combination, run_sweep, segment_dir, selected_combinations, train_model, train_or_load,
    Combination, Evaluation, ExperimentConfig, ExperimentError, SweepContext, SweepSummary,
    PRED_FILE, PRED_PROBA_FILE, SMOOTHED_PRED_FILE,
};
pub use preprocess::{
    collect_annotation_labels, discover_recordings, preprocess_batch, preprocess_frames,
    preprocess_recording, BatchOptions, BatchSummary, PreprocessError, Recording,
    RecordingOutcome, ANNOTATION_FILE, MOTION_FILE,
};
pub use trace::{
    latest_status, read_trace_file, Stage, TraceBuilder, TraceEntry, TraceError, TraceStatus,
    TraceWriter, TRACE_FILE,
};
