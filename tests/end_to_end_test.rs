//! End-to-end tests for the recognition pipeline
//!
//! Annotation painting -> runs -> window features -> classifier -> smoothing
//! -> scoring, plus the batch preprocessing and sweep plumbing on disk.

use mocap_actions::classify::ClassifierKind;
use mocap_actions::correction::{
    actions_from_predictions, correct_actions, Recipe, DEFAULT_ALTERNATIVE_THRESHOLD,
};
use mocap_actions::evaluation::{best_of, top_k_accuracy, ResultRecord, RESULT_FILE};
use mocap_actions::features::{load_split, FeaturizerConfig, WindowFeaturizer};
use mocap_actions::labels::{LabelInterval, LabelSet};
use mocap_actions::motion::FrameSequence;
use mocap_actions::pipeline::{
    discover_recordings, experiment_dir, preprocess_batch, preprocess_frames, read_trace_file,
    run_combination, segment_dir, BatchOptions, Combination, ExperimentConfig, SweepContext,
    TRACE_FILE,
};
use mocap_actions::segment::{assign_labels, split_into_runs, LabeledFrames};
use mocap_actions::smoothing::{smooth_top1, Alignment};
use mocap_actions::state;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn single_channel(values: &[f64]) -> FrameSequence {
    FrameSequence::new(
        vec!["x".to_string()],
        1.0,
        values.iter().map(|&v| vec![v]).collect(),
    )
    .unwrap()
}

fn featurizer(window: usize, gap: usize) -> WindowFeaturizer {
    WindowFeaturizer::new(FeaturizerConfig {
        window_size: window,
        gap_size: gap,
        channels: None,
    })
    .unwrap()
}

#[test]
fn test_jump_interval_becomes_runs_and_rows() {
    let set = LabelSet::with_defaults(["jump"]);
    let motion = single_channel(&[0.0, 0.0, 0.0, 5.0, 5.0, 5.0, 5.0, 0.0, 0.0, 0.0]);
    let intervals = vec![LabelInterval::new(3.0, 6.0, "jump")];

    let labels = assign_labels(motion.len(), motion.frame_rate(), &intervals, &set);
    assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, 1, 0, 0, 0]);

    let labeled = LabeledFrames::new(motion.clone(), labels.clone()).unwrap();
    let runs = split_into_runs(&labeled);
    let shape: Vec<(i32, usize)> = runs.iter().map(|r| (r.label(), r.len())).collect();
    assert_eq!(shape, vec![(0, 3), (1, 4), (0, 3)]);

    let rebuilt: Vec<i32> = runs.iter().flat_map(|r| r.labels().iter().copied()).collect();
    assert_eq!(rebuilt, labels);

    // "other" runs are exactly one window long and yield nothing
    let dataset = preprocess_frames(motion, &intervals, &set, &featurizer(3, 1)).unwrap();
    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.labels(), vec![1, 1]);
    assert_eq!(dataset.features()[0][0], 5.0);
}

#[test]
fn test_window_count_for_long_run() {
    let f = featurizer(60, 10);
    assert_eq!(f.window_count(100), 5);
    assert_eq!(f.window_count(60), 0);
    assert_eq!(f.window_starts(100).collect::<Vec<_>>(), vec![0, 10, 20, 30, 40]);
}

#[test]
fn test_catalog_ignores_duplicate_order() {
    let a = LabelSet::with_defaults(["run", "run", "walk"]);
    let b = LabelSet::with_defaults(["run", "walk", "run"]);
    assert_eq!(a.names(), b.names());
    assert_eq!(a.names(), &["その他", "run", "walk"]);
}

#[test]
fn test_constant_probabilities_smooth_to_argmax() {
    let proba = vec![vec![0.2, 0.5, 0.3]; 8];
    assert_eq!(smooth_top1(&proba, 3).unwrap(), vec![1; 5]);
    assert!(smooth_top1(&proba, 8).unwrap().is_empty());
}

#[test]
fn test_top_k_over_every_class_is_perfect() {
    let proba = vec![vec![0.7, 0.2, 0.1], vec![0.1, 0.1, 0.8], vec![0.3, 0.3, 0.4]];
    assert_eq!(top_k_accuracy(&proba, &[2, 0, 1], 3), 1.0);
}

#[test]
fn test_best_of_is_idempotent() {
    let once = best_of(Some(0.4), 0.6);
    assert_eq!(best_of(Some(once), 0.6), once);
    assert_eq!(best_of(None, 0.3), 0.3);
}

#[test]
fn test_smoothed_runs_follow_recipe_steps() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("recipe.json");
    let recipe = r#"{
        "name": "pancake",
        "ingredients": [{"name": "flour", "quantity": 200, "unit": "g"}],
        "processes": [
            {"id": "whisk", "title": "whisk batter", "time": "0:02:00"},
            {"id": "pour", "title": "pour into pan"},
            {"id": "flip", "title": "flip", "time": "0:00:30"}
        ],
        "steps": [
            {"process": "whisk"},
            {"process": "pour"},
            {"process": "flip"}
        ]
    }"#;
    std::fs::write(&path, recipe).unwrap();
    let recipe = Recipe::load(&path).unwrap();

    let set = LabelSet::with_defaults(["whisk", "pour", "flip"]);
    // whisk, idle, then a pour the classifier reads as flip
    let smoothed = vec![1, 1, 0, 0, 3, 3, 3, 3];
    let proba = vec![
        vec![0.1, 0.9, 0.0, 0.0],
        vec![0.1, 0.9, 0.0, 0.0],
        vec![0.9, 0.1, 0.0, 0.0],
        vec![0.9, 0.1, 0.0, 0.0],
        vec![0.0, 0.0, 0.6, 0.4],
        vec![0.0, 0.0, 0.6, 0.4],
        vec![0.0, 0.0, 0.0, 1.0],
        vec![0.0, 0.0, 0.0, 1.0],
    ];

    let actions = actions_from_predictions(&smoothed, &proba, &set, 1.0);
    assert_eq!(actions.len(), 2);

    let corrected = correct_actions(&actions, &recipe.steps, DEFAULT_ALTERNATIVE_THRESHOLD).unwrap();
    let steps: Vec<(&str, f64, f64)> = corrected
        .iter()
        .map(|a| (a.step.process_id.as_str(), a.start, a.end))
        .collect();
    // the pour candidate (0.3 on average) puts the second run on the next step
    assert_eq!(steps, vec![("whisk", 0.0, 2.0), ("pour", 4.0, 8.0)]);
}

fn write_recording(input: &Path, name: &str) {
    let dir = input.join(name);
    std::fs::create_dir_all(&dir).unwrap();

    let frames: Vec<Vec<f64>> = (0..20)
        .map(|i| vec![if (8..16).contains(&i) { 5.0 } else { 0.0 }])
        .collect();
    let motion = serde_json::json!({
        "frame_rate": 1.0,
        "channels": ["x"],
        "frames": frames,
    });
    std::fs::write(dir.join("motion.json"), motion.to_string()).unwrap();

    let label = r#"[{"tricks": [{"start": 8, "end": 15, "labels": ["jump"]}]}]"#;
    std::fs::write(dir.join("label.json"), label).unwrap();
}

#[tokio::test]
async fn test_preprocess_then_run_combination() {
    let root = TempDir::new().unwrap();
    let input = root.path().join("input");
    let output = root.path().join("output");
    write_recording(&input, "1");
    write_recording(&input, "2");

    let recordings = discover_recordings(&input, None).unwrap();
    assert_eq!(recordings.len(), 2);
    let label_set = Arc::new(LabelSet::with_defaults(["jump"]));

    let summary = preprocess_batch(
        recordings,
        label_set.clone(),
        Arc::new(featurizer(3, 1)),
        BatchOptions {
            output_dir: segment_dir(&output, 3, 1),
            force: false,
            jobs: 2,
        },
    )
    .await;
    assert_eq!(summary.written(), 2);
    assert!(summary.failed().is_empty());

    let split = load_split(&segment_dir(&output, 3, 1), &["2".to_string()]).unwrap();
    assert_eq!(split.train.len(), 14);
    assert_eq!(split.test.len(), 14);

    let db = state::open_in_memory().unwrap();
    let ctx = SweepContext {
        config: ExperimentConfig {
            input_dir: input.clone(),
            output_dir: output.clone(),
            ..ExperimentConfig::default()
        },
        channels: None,
        top_k: 2,
        alignment: Alignment::Leading,
        label_set,
        ledger: Some(db.clone()),
    };
    let combo = Combination {
        model: ClassifierKind::Knn,
        segment_window: 3,
        segment_gap: 1,
        smoothing_window: 2,
    };
    let group = vec!["2".to_string()];

    let record: ResultRecord = run_combination(&combo, &group, &ctx).unwrap();
    assert_eq!(record.accuracy, 1.0);
    assert_eq!(record.top_k_accuracy, 1.0);
    assert!((0.0..=1.0).contains(&record.smoothed_accuracy));

    let result_file = experiment_dir(&output, &combo, &group).join(RESULT_FILE);
    assert!(std::fs::read_to_string(result_file).unwrap().contains("accuracy: 1"));

    let listed = state::list_results(&db, Some("2")).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].params.key, combo.key());

    let trace = read_trace_file(&output.join(TRACE_FILE)).unwrap();
    assert!(!trace.is_empty());
}
