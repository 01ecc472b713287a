// Reporting
// Text summaries of predicted action timelines and sweep results

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::correction::CorrectedAction;
use crate::evaluation::{accuracy, Metric, ResultRecord};
use crate::labels::{LabelId, LabelSet};
use crate::segment::run_ranges;
use crate::state::ExperimentResult;

/// One contiguous stretch of a label sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub label: LabelId,
    pub name: String,
    pub color: String,

    /// Row range `[start, end)`
    pub start: usize,
    pub end: usize,
}

impl TimelineSegment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Collapse a per-row label sequence into segments
pub fn timeline(labels: &[LabelId], label_set: &LabelSet) -> Vec<TimelineSegment> {
    run_ranges(labels)
        .into_iter()
        .map(|range| {
            let label = labels[range.start];
            TimelineSegment {
                label,
                name: label_name(label_set, label),
                color: label_set.color_of(label).to_string(),
                start: range.start,
                end: range.end,
            }
        })
        .collect()
}

fn label_name(label_set: &LabelSet, id: LabelId) -> String {
    label_set
        .name_of(id)
        .map(str::to_string)
        .unwrap_or_else(|_| format!("#{}", id))
}

/// Format a row index as `m:ss` given rows per second
fn clock(row: usize, rows_per_second: f64) -> String {
    if rows_per_second > 0.0 {
        seconds_clock(row as f64 / rows_per_second)
    } else {
        seconds_clock(0.0)
    }
}

fn seconds_clock(seconds: f64) -> String {
    let secs = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// One line per segment: `start-end  name (rows)`
pub fn render_timeline(segments: &[TimelineSegment], rows_per_second: f64) -> String {
    let mut out = String::new();
    for seg in segments {
        let _ = writeln!(
            out,
            "{:>6}-{:<6} {} ({} rows)",
            clock(seg.start, rows_per_second),
            clock(seg.end, rows_per_second),
            seg.name,
            seg.len()
        );
    }
    out
}

/// Predicted vs true timelines for one test sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineComparison {
    pub truth: Vec<TimelineSegment>,
    pub predicted: Vec<TimelineSegment>,
    pub agreement: f64,
}

impl TimelineComparison {
    pub fn new(truth: &[LabelId], predicted: &[LabelId], label_set: &LabelSet) -> Self {
        TimelineComparison {
            truth: timeline(truth, label_set),
            predicted: timeline(predicted, label_set),
            agreement: accuracy(predicted, truth),
        }
    }

    pub fn render(&self, rows_per_second: f64) -> String {
        let mut out = format!("agreement: {:.1}%\n", self.agreement * 100.0);
        out.push_str("-- truth --\n");
        out.push_str(&render_timeline(&self.truth, rows_per_second));
        out.push_str("-- predicted --\n");
        out.push_str(&render_timeline(&self.predicted, rows_per_second));
        out
    }
}

/// One line per corrected recipe step: `start-end  process  title`
pub fn render_steps(actions: &[CorrectedAction]) -> String {
    let mut out = String::new();
    for action in actions {
        let _ = writeln!(
            out,
            "{:>6}-{:<6} {}  {}",
            seconds_clock(action.start),
            seconds_clock(action.end),
            action.step.process_id,
            action.step.title
        );
    }
    out
}

/// Metric lines for one test run, top-k labelled with its `k`
pub fn summary(record: &ResultRecord, top_k: usize) -> String {
    let mut out = String::new();
    for metric in Metric::ALL {
        let name = match metric {
            Metric::Accuracy => "accuracy".to_string(),
            Metric::SmoothedAccuracy => "smoothed accuracy".to_string(),
            Metric::TopKAccuracy => format!("top-{} accuracy", top_k),
        };
        let _ = writeln!(out, "{:<18} {:>6.2}%", name, record.get(metric) * 100.0);
    }
    out
}

/// Table of ledger results in the order given
pub fn render_results(results: &[ExperimentResult]) -> String {
    if results.is_empty() {
        return "no results\n".to_string();
    }

    let key_width = results
        .iter()
        .map(|r| r.params.key.len())
        .max()
        .unwrap_or(0)
        .max(3);

    let mut out = format!(
        "{:<kw$}  {:<8}  {:>8}  {:>8}  {:>8}\n",
        "key",
        "test",
        "acc",
        "smoothed",
        "top-k",
        kw = key_width
    );
    for r in results {
        let _ = writeln!(
            out,
            "{:<kw$}  {:<8}  {:>8.4}  {:>8.4}  {:>8.4}",
            r.params.key,
            r.params.test_group,
            r.accuracy,
            r.smoothed_accuracy,
            r.top_k_accuracy,
            kw = key_width
        );
    }
    out
}
