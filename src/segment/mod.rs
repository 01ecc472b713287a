// Segmentation module
// Label propagation over frames and contiguous-run splitting

pub mod segmenter;

pub use segmenter::{
    assign_labels, assign_resolved_labels, run_ranges, split_into_runs, LabeledFrames, Run,
    SegmentError,
};
