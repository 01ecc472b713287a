// Step correction
// Maps smoothed action runs onto the ordered steps of a recipe

use crate::correction::recipe::Step;
use crate::labels::{LabelId, LabelSet};
use crate::segment::run_ranges;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Minimum probability for a lower-ranked candidate to confirm the current or next step
pub const DEFAULT_ALTERNATIVE_THRESHOLD: f64 = 0.2;

#[derive(Debug, Error, PartialEq)]
pub enum CorrectionError {
    #[error("No actions to correct")]
    NoActions,

    #[error("Recipe has no steps")]
    NoSteps,

    #[error("The first action has no step")]
    FirstStepMissing,
}

/// One predicted process for an action, with its probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub process_id: String,
    pub label: LabelId,
    pub probability: f64,
}

/// A contiguous stretch of one predicted action, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub start: f64,
    pub end: f64,
    pub candidates: Vec<Candidate>,
}

/// An action before undefined steps are filled in
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub start: f64,
    pub end: f64,
    pub step: Option<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedAction {
    pub start: f64,
    pub end: f64,
    pub step: Step,
}

/// Build actions from a smoothed label sequence and its probability rows
///
/// Each run of one label becomes an action; runs of the "other" or unused
/// label are idle stretches and are left out. Candidates are the classes with
/// a positive mean probability over the run, named after their label.
pub fn actions_from_predictions(
    smoothed: &[LabelId],
    probabilities: &[Vec<f64>],
    label_set: &LabelSet,
    rows_per_second: f64,
) -> Vec<Action> {
    run_ranges(smoothed)
        .into_iter()
        .filter_map(|range| {
            let label = smoothed[range.start];
            if label == label_set.other_id() || label == label_set.unused_id() {
                return None;
            }

            let len = probabilities.len();
            let rows = &probabilities[range.start.min(len)..range.end.min(len)];
            let candidates = if rows.is_empty() {
                vec![Candidate {
                    process_id: label_set.name_of(label).ok()?.to_string(),
                    label,
                    probability: 1.0,
                }]
            } else {
                mean_candidates(rows, label_set)
            };

            Some(Action {
                start: range.start as f64 / rows_per_second,
                end: range.end as f64 / rows_per_second,
                candidates,
            })
        })
        .collect()
}

fn mean_candidates(rows: &[Vec<f64>], label_set: &LabelSet) -> Vec<Candidate> {
    let classes = rows.iter().map(Vec::len).max().unwrap_or(0);

    (0..classes)
        .filter_map(|class| {
            let sum: f64 = rows.iter().filter_map(|row| row.get(class)).sum();
            let probability = sum / rows.len() as f64;
            let label = class as LabelId;
            if probability <= 0.0 || label == label_set.other_id() {
                return None;
            }
            let name = label_set.name_of(label).ok()?;
            Some(Candidate {
                process_id: name.to_string(),
                label,
                probability,
            })
        })
        .collect()
}

/// Assign a recipe step to every action
///
/// The first action starts the recipe. Each later action may stay on the
/// current step, advance to the next one, or skip ahead past as many steps as
/// there are unresolved actions just before it. Unresolved actions are then
/// filled and consecutive equal steps merged.
pub fn correct_actions(
    actions: &[Action],
    steps: &[Step],
    alternative_threshold: f64,
) -> Result<Vec<CorrectedAction>, CorrectionError> {
    let first = actions.first().ok_or(CorrectionError::NoActions)?;
    let first_step = steps.first().ok_or(CorrectionError::NoSteps)?;

    let mut pending = vec![PendingAction {
        start: first.start,
        end: first.end,
        step: Some(first_step.clone()),
    }];
    let mut current = 0;

    for action in &actions[1..] {
        let chosen = correct_current_step(action, steps, current, &pending, alternative_threshold);
        pending.push(PendingAction {
            start: action.start,
            end: action.end,
            step: chosen.map(|i| steps[i].clone()),
        });
        current = chosen.unwrap_or(current);
    }

    let filled = fill_undefined(&pending, steps)?;
    log::debug!(
        "Corrected {} actions into {} filled steps",
        actions.len(),
        filled.len()
    );
    Ok(merge_continuous_steps(&filled))
}

/// Index of the step an action belongs to, or None when it cannot be placed
fn correct_current_step(
    action: &Action,
    steps: &[Step],
    current: usize,
    history: &[PendingAction],
    threshold: f64,
) -> Option<usize> {
    let mut ranked: Vec<&Candidate> = action.candidates.iter().collect();
    ranked.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap_or(Ordering::Equal));
    let best = *ranked.first()?;

    let matches = |index: usize, candidate: &Candidate| {
        steps
            .get(index)
            .is_some_and(|s| s.process_id == candidate.process_id)
    };

    if matches(current, best) {
        return Some(current);
    }
    if matches(current + 1, best) {
        return Some(current + 1);
    }

    let undefined_run = history.iter().rev().take_while(|p| p.step.is_none()).count();
    if let Some(skipped) = (0..undefined_run)
        .map(|i| current + 2 + i)
        .find(|&index| matches(index, best))
    {
        return Some(skipped);
    }

    for &candidate in ranked.iter().filter(|c| c.probability >= threshold) {
        if matches(current, candidate) {
            return Some(current);
        }
        if matches(current + 1, candidate) {
            return Some(current + 1);
        }
    }

    None
}

/// Resolve actions without a step
///
/// An unresolved action takes the first recipe step between the previous and
/// the next resolved steps, or repeats the previous step when none lies
/// between them. Filled actions keep their own times.
pub fn fill_undefined(
    pending: &[PendingAction],
    steps: &[Step],
) -> Result<Vec<CorrectedAction>, CorrectionError> {
    let first = pending.first().ok_or(CorrectionError::NoActions)?;
    let first_step = first.step.clone().ok_or(CorrectionError::FirstStepMissing)?;

    let mut filled = vec![CorrectedAction {
        start: first.start,
        end: first.end,
        step: first_step,
    }];

    for (i, entry) in pending.iter().enumerate().skip(1) {
        let step = match &entry.step {
            Some(step) => step.clone(),
            None => {
                let prev = &filled[filled.len() - 1].step;
                missing_step(prev, &pending[i + 1..], steps).unwrap_or_else(|| prev.clone())
            }
        };
        filled.push(CorrectedAction {
            start: entry.start,
            end: entry.end,
            step,
        });
    }

    Ok(filled)
}

fn missing_step(prev: &Step, after: &[PendingAction], steps: &[Step]) -> Option<Step> {
    let position = |id: &str| steps.iter().position(|s| s.process_id == id);

    let prev_index = position(&prev.process_id)?;
    let next_index = match after.iter().find_map(|p| p.step.as_ref()) {
        Some(next) => position(&next.process_id)?,
        None => steps.len(),
    };

    (prev_index + 1 < next_index).then(|| steps[prev_index + 1].clone())
}

/// Join consecutive actions on the same step
pub fn merge_continuous_steps(actions: &[CorrectedAction]) -> Vec<CorrectedAction> {
    let mut merged: Vec<CorrectedAction> = Vec::with_capacity(actions.len());
    let mut prev: Option<&Step> = None;

    for action in actions {
        match (prev, merged.last_mut()) {
            (Some(p), Some(last)) if p.same_as(&action.step) => last.end = action.end,
            _ => merged.push(action.clone()),
        }
        prev = Some(&action.step);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correction::recipe::StepTime;

    fn candidate(process_id: &str, probability: f64) -> Candidate {
        Candidate {
            process_id: process_id.to_string(),
            label: 1,
            probability,
        }
    }

    fn action(start: f64, candidates: Vec<Candidate>) -> Action {
        Action {
            start,
            end: start + 1.0,
            candidates,
        }
    }

    fn timed_step(id: &str, title: &str) -> Step {
        Step {
            time: Some(StepTime { hour: 0, minute: 0, second: 0 }),
            ..Step::new(id, title)
        }
    }

    fn pending(step: Option<Step>) -> PendingAction {
        PendingAction {
            start: 0.0,
            end: 1.0,
            step,
        }
    }

    fn process_ids(actions: &[CorrectedAction]) -> Vec<&str> {
        actions.iter().map(|a| a.step.process_id.as_str()).collect()
    }

    #[test]
    fn test_correct_actions_follows_recipe() {
        let actions = vec![
            action(0.0, vec![candidate("PROCESS[0]", 0.9), candidate("PROCESS[1]", 0.1)]),
            // next step
            action(1.0, vec![candidate("PROCESS[1]", 0.8), candidate("PROCESS[0]", 0.1)]),
            // second candidate confirms the current step
            action(2.0, vec![candidate("PROCESS[0]", 0.7), candidate("PROCESS[1]", 0.3)]),
            action(3.0, vec![candidate("PROCESS[skip]", 0.7)]),
            action(4.0, vec![candidate("PROCESS[1]", 1.0)]),
            action(5.0, vec![candidate("PROCESS[1]", 1.0)]),
            // misclassified PROCESS[2]
            action(6.0, vec![candidate("PROCESS[skip_error]", 1.0)]),
            action(7.0, vec![candidate("PROCESS[3]", 1.0)]),
        ];
        let steps = vec![
            Step::new("PROCESS[0]", "first"),
            Step::new("PROCESS[1]", "second"),
            Step::new("PROCESS[2]", "third"),
            Step::new("PROCESS[3]", "fourth"),
        ];

        let corrected = correct_actions(&actions, &steps, DEFAULT_ALTERNATIVE_THRESHOLD).unwrap();

        let expected = vec![
            CorrectedAction { start: 0.0, end: 1.0, step: steps[0].clone() },
            CorrectedAction { start: 1.0, end: 6.0, step: steps[1].clone() },
            CorrectedAction { start: 6.0, end: 7.0, step: steps[2].clone() },
            CorrectedAction { start: 7.0, end: 8.0, step: steps[3].clone() },
        ];
        assert_eq!(corrected, expected);
    }

    #[test]
    fn test_skip_ahead_moves_current_step() {
        let actions = vec![
            action(0.0, vec![candidate("A", 1.0)]),
            action(1.0, vec![candidate("noise", 1.0)]),
            action(2.0, vec![candidate("C", 1.0)]),
            action(3.0, vec![candidate("D", 1.0)]),
        ];
        let steps = vec![
            Step::new("A", "a"),
            Step::new("B", "b"),
            Step::new("C", "c"),
            Step::new("D", "d"),
        ];

        let corrected = correct_actions(&actions, &steps, DEFAULT_ALTERNATIVE_THRESHOLD).unwrap();
        assert_eq!(process_ids(&corrected), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_alternative_below_threshold_is_ignored() {
        let actions = vec![
            action(0.0, vec![candidate("A", 1.0)]),
            action(1.0, vec![candidate("X", 0.85), candidate("B", 0.15)]),
        ];
        let steps = vec![Step::new("A", "a"), Step::new("B", "b")];

        // unresolved, then filled with the only step left after A
        let corrected = correct_actions(&actions, &steps, DEFAULT_ALTERNATIVE_THRESHOLD).unwrap();
        assert_eq!(process_ids(&corrected), vec!["A", "B"]);

        let strict = correct_actions(&actions, &steps[..1], DEFAULT_ALTERNATIVE_THRESHOLD).unwrap();
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].end, 2.0);
    }

    #[test]
    fn test_correct_actions_errors() {
        let steps = vec![Step::new("A", "a")];
        assert_eq!(
            correct_actions(&[], &steps, DEFAULT_ALTERNATIVE_THRESHOLD),
            Err(CorrectionError::NoActions)
        );
        assert_eq!(
            correct_actions(&[action(0.0, vec![])], &[], DEFAULT_ALTERNATIVE_THRESHOLD),
            Err(CorrectionError::NoSteps)
        );
    }

    #[test]
    fn test_fill_with_previous_step() {
        let entries = vec![pending(Some(timed_step("PROCESS[1]", "title"))), pending(None)];

        let filled = fill_undefined(&entries, &[]).unwrap();
        assert_eq!(filled[1].step.process_id, "PROCESS[1]");
    }

    #[test]
    fn test_fill_with_skipped_step() {
        let steps = vec![
            timed_step("PROCESS[1]", "title"),
            timed_step("PROCESS[2]", "title"),
            timed_step("PROCESS[3]", "title"),
        ];
        let entries = vec![
            pending(Some(steps[0].clone())),
            pending(None),
            pending(Some(steps[2].clone())),
        ];

        let filled = fill_undefined(&entries, &steps).unwrap();
        assert_eq!(filled[1].step.process_id, "PROCESS[2]");
    }

    #[test]
    fn test_fill_with_consecutive_skipped_steps() {
        let steps: Vec<Step> = (1..=4)
            .map(|i| timed_step(&format!("PROCESS[{}]", i), "title"))
            .collect();
        let entries = vec![
            pending(Some(steps[0].clone())),
            pending(None),
            pending(None),
            pending(Some(steps[3].clone())),
        ];

        let filled = fill_undefined(&entries, &steps).unwrap();
        assert_eq!(process_ids(&filled), vec!["PROCESS[1]", "PROCESS[2]", "PROCESS[3]", "PROCESS[4]"]);
    }

    #[test]
    fn test_fill_requires_first_step() {
        assert_eq!(
            fill_undefined(&[pending(None)], &[]),
            Err(CorrectionError::FirstStepMissing)
        );
        assert_eq!(fill_undefined(&[], &[]), Err(CorrectionError::NoActions));
    }

    #[test]
    fn test_merge_continuous_steps() {
        let same = timed_step("PROCESS[1]", "same");
        let actions = vec![
            CorrectedAction { start: 0.0, end: 1.0, step: same.clone() },
            CorrectedAction { start: 1.0, end: 2.0, step: same.clone() },
            CorrectedAction { start: 2.0, end: 3.0, step: timed_step("PROCESS[1]", "not same") },
        ];

        let merged = merge_continuous_steps(&actions);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start, 0.0);
        assert_eq!(merged[0].end, 2.0);
        assert_eq!(merged[0].step, same);
    }

    #[test]
    fn test_actions_from_predictions() {
        let set = LabelSet::with_defaults(["stir", "pour"]);
        let smoothed = vec![0, 1, 1, 2, 2, 0];
        let proba = vec![
            vec![0.8, 0.1, 0.1],
            vec![0.2, 0.6, 0.2],
            vec![0.0, 0.8, 0.2],
            vec![0.1, 0.0, 0.9],
            vec![0.1, 0.0, 0.9],
            vec![0.9, 0.05, 0.05],
        ];

        let actions = actions_from_predictions(&smoothed, &proba, &set, 2.0);
        assert_eq!(actions.len(), 2);

        assert_eq!((actions[0].start, actions[0].end), (0.5, 1.5));
        let names: Vec<&str> = actions[0].candidates.iter().map(|c| c.process_id.as_str()).collect();
        assert_eq!(names, vec!["stir", "pour"]);
        assert!((actions[0].candidates[0].probability - 0.7).abs() < 1e-9);

        // stir has zero probability during the second run
        assert_eq!(actions[1].candidates.len(), 1);
        assert_eq!(actions[1].candidates[0].process_id, "pour");
    }

    #[test]
    fn test_actions_without_probability_rows_use_run_label() {
        let set = LabelSet::with_defaults(["stir"]);
        let actions = actions_from_predictions(&[1, 1], &[], &set, 1.0);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].candidates, vec![Candidate {
            process_id: "stir".to_string(),
            label: 1,
            probability: 1.0,
        }]);
    }
}
