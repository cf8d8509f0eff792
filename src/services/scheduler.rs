use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::{LedgerError, ReviewLedger, StoreError};
use crate::services::params::ParameterStore;
use crate::srs::heuristic::heuristic_next_state;
use crate::srs::model::{self, ModelError};
use crate::srs::rating::infer_rating;
use crate::srs::types::{
    AppliedParameters, ItemMemoryState, LearnerParameterSet, ParameterVector, Rating,
    ReviewLogEntry, ReviewOutcome, ScheduleSource,
};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("ledger write failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("item store failed: {0}")]
    Store(#[from] StoreError),
    #[error("review for {learner_id}/{item_id} lost {attempts} version races")]
    Conflict {
        learner_id: String,
        item_id: String,
        attempts: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewResult {
    pub state: ItemMemoryState,
    pub rating: Rating,
    pub interval_days: u32,
    pub source: ScheduleSource,
    pub entry: ReviewLogEntry,
}

pub struct Scheduler {
    params: Arc<ParameterStore>,
    ledger: Arc<dyn ReviewLedger>,
}

impl Scheduler {
    pub fn new(params: Arc<ParameterStore>, ledger: Arc<dyn ReviewLedger>) -> Self {
        Self { params, ledger }
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn ledger(&self) -> &Arc<dyn ReviewLedger> {
        &self.ledger
    }

    /// Processes one review and appends it to the ledger. The returned state
    /// is only meaningful to the caller once this returns `Ok`.
    pub fn review(
        &self,
        state: &ItemMemoryState,
        outcome: &ReviewOutcome,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReviewResult, SchedulerError> {
        let result = self.plan_review(state, outcome, learner_id, item_id, now);
        self.ledger.append(result.entry.clone())?;
        Ok(result)
    }

    /// Computes the review without writing anything.
    pub fn plan_review(
        &self,
        state: &ItemMemoryState,
        outcome: &ReviewOutcome,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> ReviewResult {
        let outcome = ReviewOutcome::new(
            outcome.is_correct,
            outcome.response_time_secs,
            outcome.exercise_kind,
        );

        let mut counted = state.clone();
        counted.record_attempt(outcome.is_correct, outcome.response_time_secs);

        let prior_accuracy = if state.repetition_count > 0 {
            counted.accuracy()
        } else {
            None
        };
        let rating = infer_rating(
            outcome.is_correct,
            outcome.response_time_secs,
            prior_accuracy,
            outcome.exercise_kind,
        );

        let params = self.params.get(learner_id);
        let (next, source, applied) =
            self.advance(&counted, rating, outcome.is_correct, &params, learner_id, now);

        debug!(
            learner_id = %learner_id,
            item_id = %item_id,
            rating = ?rating,
            state = next.state.as_str(),
            stability = next.stability,
            interval_days = next.scheduled_days,
            "Review scheduled"
        );

        let entry = ReviewLogEntry {
            id: Uuid::new_v4(),
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            rating,
            is_correct: outcome.is_correct,
            response_time_secs: outcome.response_time_secs,
            exercise_kind: outcome.exercise_kind,
            reviewed_at: now,
            scheduled_days: next.scheduled_days,
            source,
            applied,
        };

        ReviewResult {
            interval_days: next.scheduled_days,
            state: next,
            rating,
            source,
            entry,
        }
    }

    fn advance(
        &self,
        counted: &ItemMemoryState,
        rating: Rating,
        is_correct: bool,
        params: &LearnerParameterSet,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> (ItemMemoryState, ScheduleSource, Option<AppliedParameters>) {
        let attempt = match model::next_state(counted, rating, params, now) {
            Err(ModelError::InvalidParameters(reason)) => {
                warn!(
                    learner_id = %learner_id,
                    reason = %reason,
                    "Learner parameters refused, using defaults"
                );
                let fallback = params.with_weights(ParameterVector::default());
                model::next_state(counted, rating, &fallback, now)
                    .map(|next| (next, AppliedParameters::from_set(&fallback)))
            }
            other => other.map(|next| (next, AppliedParameters::from_set(params))),
        };

        match attempt {
            Ok((next, applied)) => (next, ScheduleSource::Model, Some(applied)),
            Err(err) => {
                warn!(
                    learner_id = %learner_id,
                    error = %err,
                    "Memory model failed, scheduling with heuristic ladder"
                );
                (
                    heuristic_next_state(counted, is_correct, now),
                    ScheduleSource::Heuristic,
                    None,
                )
            }
        }
    }
}
