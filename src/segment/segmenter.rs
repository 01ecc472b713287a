// Label propagation and run segmentation
// Paints interval annotations onto frames, then splits frames into maximal constant-label runs

use std::ops::Range;
use thiserror::Error;

use crate::labels::{LabelId, LabelInterval, LabelSet};
use crate::motion::FrameSequence;

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("Label sequence has {labels} entries but there are {frames} frames")]
    LengthMismatch { frames: usize, labels: usize },
}

/// Frame sequence with one label id per frame
#[derive(Debug, Clone)]
pub struct LabeledFrames {
    frames: FrameSequence,
    labels: Vec<LabelId>,
}

impl LabeledFrames {
    pub fn new(frames: FrameSequence, labels: Vec<LabelId>) -> Result<Self, SegmentError> {
        if frames.len() != labels.len() {
            return Err(SegmentError::LengthMismatch {
                frames: frames.len(),
                labels: labels.len(),
            });
        }
        Ok(LabeledFrames { frames, labels })
    }

    pub fn frames(&self) -> &FrameSequence {
        &self.frames
    }

    pub fn labels(&self) -> &[LabelId] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A maximal contiguous span of frames sharing one label id
#[derive(Debug, Clone, Copy)]
pub struct Run<'a> {
    label: LabelId,
    start: usize,
    frames: &'a [Vec<f64>],
    labels: &'a [LabelId],
}

impl<'a> Run<'a> {
    pub fn label(&self) -> LabelId {
        self.label
    }

    /// Index of the first frame of this run in the labeled sequence
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.frames.len()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &'a [Vec<f64>] {
        self.frames
    }

    pub fn labels(&self) -> &'a [LabelId] {
        self.labels
    }

    /// Runs marked unused are kept by segmentation but skipped before featurization
    pub fn is_unused(&self, label_set: &LabelSet) -> bool {
        self.label == label_set.unused_id()
    }
}

/// Assign a label id to every frame from interval annotations
///
/// Every frame starts as "other". Each interval paints frames
/// `floor(start_s * fps) ..= floor(end_s * fps)` in input order, so later
/// intervals overwrite earlier ones. Frame indices past the end are clipped.
pub fn assign_labels(
    frame_count: usize,
    frame_rate: f64,
    intervals: &[LabelInterval],
    label_set: &LabelSet,
) -> Vec<LabelId> {
    paint_intervals(frame_count, frame_rate, label_set.other_id(), intervals, |name| {
        label_set.id_of(name)
    })
}

/// Same as [`assign_labels`], resolving names through synonym groups and the unused marker
pub fn assign_resolved_labels(
    frame_count: usize,
    frame_rate: f64,
    intervals: &[LabelInterval],
    label_set: &LabelSet,
) -> Vec<LabelId> {
    paint_intervals(frame_count, frame_rate, label_set.other_id(), intervals, |name| {
        label_set.resolve(name)
    })
}

fn paint_intervals(
    frame_count: usize,
    frame_rate: f64,
    fill: LabelId,
    intervals: &[LabelInterval],
    id_of: impl Fn(&str) -> LabelId,
) -> Vec<LabelId> {
    let mut labels = vec![fill; frame_count];

    if frame_count == 0 {
        return labels;
    }

    for interval in intervals {
        let Some(frames) = frame_span(interval, frame_rate, frame_count) else {
            log::debug!(
                "Interval {:.3}-{:.3}s ({}) covers no frames",
                interval.start_s,
                interval.end_s,
                interval.label
            );
            continue;
        };

        let id = id_of(&interval.label);
        labels[frames].fill(id);
    }

    labels
}

/// Inclusive frame span of an interval, clipped to `0..frame_count`
fn frame_span(
    interval: &LabelInterval,
    frame_rate: f64,
    frame_count: usize,
) -> Option<std::ops::RangeInclusive<usize>> {
    let start = (interval.start_s * frame_rate).floor();
    let end = (interval.end_s * frame_rate).floor();

    if !start.is_finite() || !end.is_finite() || end < 0.0 || end < start {
        return None;
    }

    let start = start.max(0.0) as usize;
    if start >= frame_count {
        return None;
    }
    let end = (end as usize).min(frame_count - 1);

    Some(start..=end)
}

/// Split a labeled sequence into maximal runs of identical label id
///
/// Runs are returned in frame order and partition the sequence exactly.
pub fn split_into_runs(labeled: &LabeledFrames) -> Vec<Run<'_>> {
    let frames = labeled.frames.frames();

    run_ranges(&labeled.labels)
        .into_iter()
        .map(|range| Run {
            label: labeled.labels[range.start],
            start: range.start,
            frames: &frames[range.clone()],
            labels: &labeled.labels[range],
        })
        .collect()
}

/// Index ranges of maximal constant runs in a label sequence
pub fn run_ranges(labels: &[LabelId]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;

    for i in 1..=labels.len() {
        if i == labels.len() || labels[i] != labels[i - 1] {
            ranges.push(start..i);
            start = i;
        }
    }

    ranges
}
