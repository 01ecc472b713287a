// Smoothing module
// Sliding-window aggregation of per-frame class probabilities

pub mod smoother;

pub use smoother::{
    argmax, rank_descending, select_top_k_or_truth, smooth_top1, smooth_topk,
    validate_probabilities, Alignment, SmoothingConfig, SmoothingError, TemporalSmoother,
};
