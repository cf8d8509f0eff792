//! Reconstructs item memory states from the review ledger.
//!
//! Replay applies exactly the same steps as a live review: counters first,
//! then the recorded rating through the model (or the heuristic ladder when
//! the entry was scheduled by it). Model entries carry the settings they were
//! scheduled under, so replaying a learner's ledger from New reproduces the
//! persisted states even after the learner's weights have been refit.
//! Unstamped entries fall back to the parameter set passed in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::heuristic::heuristic_next_state;
use super::model::{self, forgetting_curve, ModelError};
use super::types::{
    ItemMemoryState, LearnerParameterSet, Rating, ReviewLogEntry, ScheduleSource,
};

pub fn apply_entry(
    state: &ItemMemoryState,
    entry: &ReviewLogEntry,
    params: &LearnerParameterSet,
) -> ItemMemoryState {
    let mut counted = state.clone();
    counted.record_attempt(entry.is_correct, entry.response_time_secs);

    match entry.source {
        ScheduleSource::Heuristic => heuristic_next_state(&counted, entry.is_correct, entry.reviewed_at),
        ScheduleSource::Model => {
            let stamped = entry.applied.as_ref().map(|a| a.to_set(params));
            let params = stamped.as_ref().unwrap_or(params);
            model_step(&counted, entry.rating, params, entry.reviewed_at)
                .unwrap_or_else(|_| heuristic_next_state(&counted, entry.is_correct, entry.reviewed_at))
        }
    }
}

/// The model cascade shared with the live scheduler: learner weights, then
/// the default weights when the learner's vector is refused.
pub fn model_step(
    state: &ItemMemoryState,
    rating: Rating,
    params: &LearnerParameterSet,
    now: DateTime<Utc>,
) -> Result<ItemMemoryState, ModelError> {
    match model::next_state(state, rating, params, now) {
        Err(ModelError::InvalidParameters(_)) => {
            let fallback = params.with_weights(Default::default());
            model::next_state(state, rating, &fallback, now)
        }
        other => other,
    }
}

/// Replays one item's entries (any order; sorted chronologically here).
pub fn replay_item(entries: &[ReviewLogEntry], params: &LearnerParameterSet) -> Option<ItemMemoryState> {
    let mut ordered: Vec<&ReviewLogEntry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.reviewed_at);

    let first = ordered.first()?;
    let mut state = ItemMemoryState::new(first.reviewed_at);
    for entry in ordered {
        state = apply_entry(&state, entry, params);
    }
    Some(state)
}

/// Groups a learner's ledger by item, each group oldest first. Ordered by
/// item id so downstream sums are deterministic.
pub fn group_by_item(entries: &[ReviewLogEntry]) -> BTreeMap<String, Vec<ReviewLogEntry>> {
    let mut grouped: BTreeMap<String, Vec<ReviewLogEntry>> = BTreeMap::new();
    for entry in entries {
        grouped
            .entry(entry.item_id.clone())
            .or_default()
            .push(entry.clone());
    }
    for group in grouped.values_mut() {
        group.sort_by_key(|e| e.reviewed_at);
    }
    grouped
}

pub fn replay_learner(
    entries: &[ReviewLogEntry],
    params: &LearnerParameterSet,
) -> BTreeMap<String, ItemMemoryState> {
    group_by_item(entries)
        .into_iter()
        .filter_map(|(item_id, group)| replay_item(&group, params).map(|s| (item_id, s)))
        .collect()
}

/// One recall observation: the model's predicted recall probability at the
/// moment of review, paired with what actually happened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecallSample {
    pub predicted: f64,
    pub recalled: bool,
}

/// Replays `groups` under `params` and collects a prediction for every
/// review that had a prior state. Stamps on the entries are ignored: the
/// point is to score `params`. Fails if the model refuses the weights.
pub fn recall_samples(
    groups: &BTreeMap<String, Vec<ReviewLogEntry>>,
    params: &LearnerParameterSet,
) -> Result<Vec<RecallSample>, ModelError> {
    params.weights.validate()?;
    let mut samples = Vec::new();

    for entries in groups.values() {
        let Some(first) = entries.first() else {
            continue;
        };
        let mut state = ItemMemoryState::new(first.reviewed_at);
        for entry in entries {
            if !state.is_new() {
                let elapsed = model::elapsed_days(state.last_reviewed_at, entry.reviewed_at);
                samples.push(RecallSample {
                    predicted: forgetting_curve(elapsed, state.stability),
                    recalled: entry.is_correct,
                });
            }
            state = match entry.source {
                ScheduleSource::Heuristic => {
                    heuristic_next_state(&state, entry.is_correct, entry.reviewed_at)
                }
                ScheduleSource::Model => {
                    model::next_state(&state, entry.rating, params, entry.reviewed_at)?
                }
            };
        }
    }

    Ok(samples)
}
