// Evaluation module
// Accuracy metrics and persisted result records

pub mod metrics;
pub mod result_record;

pub use metrics::{
    accuracy, accuracy_strict, best_of, top_k_accuracy, top_k_classes, EvalError, Metric,
};
pub use result_record::{load_result, parse_result, ResultError, ResultRecord, RESULT_FILE};
