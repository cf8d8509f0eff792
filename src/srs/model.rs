//! Memory state model: forgetting curve, stability/difficulty update rules
//! and interval scheduling.
//!
//! Stability is expressed in days until recall probability decays to the
//! reference retention (90%):
//!   R(t, S) = exp(ln(0.9) × t / S)
//!
//! Every function here is pure; the scheduler owns fallbacks and logging.

use chrono::{DateTime, Duration, Utc};

use super::types::{ItemMemoryState, LearnerParameterSet, LearningState, Rating};

pub const REFERENCE_RETENTION: f64 = 0.9;
pub const MIN_STABILITY: f64 = 0.01;
pub const MAX_STABILITY: f64 = 36500.0;
pub const MIN_DIFFICULTY: f64 = 1.0;
pub const MAX_DIFFICULTY: f64 = 10.0;

const NEUTRAL_RATING: f64 = 3.0;
const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("non-finite memory state: stability={stability}, difficulty={difficulty}")]
    NonFiniteState { stability: f64, difficulty: f64 },
}

/// Probability of recall after `elapsed_days` for an item of the given stability.
pub fn forgetting_curve(elapsed_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 0.0;
    }
    if elapsed_days <= 0.0 {
        return 1.0;
    }
    (REFERENCE_RETENTION.ln() * elapsed_days / stability).exp()
}

/// Scales stability-based intervals so that recall at the due date matches
/// the learner's desired retention instead of the reference retention.
pub fn retention_factor(desired_retention: f64) -> f64 {
    let desired = desired_retention.clamp(0.5, 0.99);
    desired.ln() / REFERENCE_RETENTION.ln()
}

pub fn difficulty_factor(difficulty: f64, sensitivity: f64) -> f64 {
    (sensitivity * (5.0 - difficulty) / 5.0).exp()
}

pub fn elapsed_days(last_reviewed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match last_reviewed_at {
        Some(last) => ((now - last).num_milliseconds() as f64 / MS_PER_DAY).max(0.0),
        None => 0.0,
    }
}

/// Candidate intervals in whole days, one per rating tier.
/// `again` is 0: a lapse is rescheduled by a sub-day delay, not by the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalCandidates {
    pub again: u32,
    pub hard: u32,
    pub good: u32,
    pub easy: u32,
}

impl IntervalCandidates {
    pub fn for_rating(&self, rating: Rating) -> u32 {
        match rating {
            Rating::Again => self.again,
            Rating::Hard => self.hard,
            Rating::Good => self.good,
            Rating::Easy => self.easy,
        }
    }
}

pub fn schedule_from_stability(
    stability: f64,
    difficulty: f64,
    params: &LearnerParameterSet,
) -> Result<IntervalCandidates, ModelError> {
    params.weights.validate()?;
    if !stability.is_finite() || !difficulty.is_finite() {
        return Err(ModelError::NonFiniteState {
            stability,
            difficulty,
        });
    }
    let w = params.weights.as_slice();
    let cap = params.maximum_interval_days.max(1) as f64;
    let base = stability.max(MIN_STABILITY)
        * difficulty_factor(difficulty, w[13])
        * retention_factor(params.desired_retention);

    let hard = (base * w[8].exp()).round().max(1.0).min(cap);
    let good = (base * w[9].exp()).round().max(hard).min(cap);
    let easy = (base * w[10].exp()).round().max(good).min(cap);

    Ok(IntervalCandidates {
        again: 0,
        hard: hard as u32,
        good: good as u32,
        easy: easy as u32,
    })
}

/// Advances an item's memory state by one review.
///
/// The returned state has `last_reviewed_at = now`, an incremented
/// repetition count and a `due_at` strictly derived from the new stability,
/// except for lapses and first-exposure failures, which get a fixed short
/// delay.
pub fn next_state(
    current: &ItemMemoryState,
    rating: Rating,
    params: &LearnerParameterSet,
    now: DateTime<Utc>,
) -> Result<ItemMemoryState, ModelError> {
    params.weights.validate()?;
    ensure_finite(current.stability, current.difficulty)?;

    let w = params.weights.as_slice();
    let r = rating.value() as f64;
    let mut next = current.clone();
    next.repetition_count = current.repetition_count.saturating_add(1);

    match (current.state, rating) {
        (LearningState::New, Rating::Again) => {
            next.state = LearningState::Learning;
            next.stability = w[0] * w[12];
            next.difficulty = initial_difficulty(w, r);
        }
        (LearningState::New, _) => {
            next.state = LearningState::Learning;
            next.stability = w[0];
            next.difficulty = initial_difficulty(w, r);
        }
        (_, Rating::Again) => {
            next.state = LearningState::Relearning;
            next.stability = current.stability * w[12];
            next.difficulty = current.difficulty + w[11];
            next.lapse_count = current.lapse_count.saturating_add(1);
        }
        (LearningState::Learning, Rating::Good | Rating::Easy) => {
            next.state = LearningState::Review;
            next.stability = w[1] * (11.0 - current.difficulty) + w[2];
            next.difficulty = next_difficulty(w, current.difficulty, r);
        }
        (LearningState::Learning | LearningState::Relearning, Rating::Hard) => {
            next.stability = current.stability * w[17];
            next.difficulty = next_difficulty(w, current.difficulty, r);
        }
        (LearningState::Relearning, Rating::Good | Rating::Easy) => {
            next.state = LearningState::Review;
            next.stability = current.stability * w[18];
            next.difficulty = next_difficulty(w, current.difficulty, r);
        }
        (LearningState::Review, _) => {
            let elapsed = elapsed_days(current.last_reviewed_at, now);
            next.stability = next_recall_stability(w, current.stability, elapsed, rating);
            next.difficulty = next_difficulty(w, current.difficulty, r);
        }
    }

    next.stability = next.stability.clamp(MIN_STABILITY, MAX_STABILITY);
    next.difficulty = next.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
    ensure_finite(next.stability, next.difficulty)?;

    if rating.is_lapse() {
        let delay_minutes = if current.state == LearningState::New {
            params.learning_delay_minutes
        } else {
            params.relearning_delay_minutes
        };
        next.scheduled_days = 0;
        next.due_at = now + Duration::minutes(delay_minutes.max(1) as i64);
    } else {
        let mut days = schedule_from_stability(next.stability, next.difficulty, params)?
            .for_rating(rating);
        if current.state == LearningState::Review && rating.is_pass() {
            // A passed review never shortens the schedule, even when difficulty drifts up.
            let cap = params.maximum_interval_days.max(1);
            days = days.max(current.scheduled_days.min(cap));
        }
        next.scheduled_days = days;
        next.due_at = now + Duration::days(days as i64);
    }
    next.last_reviewed_at = Some(now);

    Ok(next)
}

fn ensure_finite(stability: f64, difficulty: f64) -> Result<(), ModelError> {
    if stability.is_finite() && difficulty.is_finite() {
        Ok(())
    } else {
        Err(ModelError::NonFiniteState {
            stability,
            difficulty,
        })
    }
}

fn initial_difficulty(w: &[f64], rating: f64) -> f64 {
    (w[3] - (rating - NEUTRAL_RATING) * w[4]).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_difficulty(w: &[f64], difficulty: f64, rating: f64) -> f64 {
    let nudged = difficulty - w[4] * (rating - NEUTRAL_RATING);
    let reverted = w[14] * w[3] + (1.0 - w[14]) * nudged;
    reverted.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn next_recall_stability(w: &[f64], stability: f64, elapsed: f64, rating: Rating) -> f64 {
    let recall = if rating.is_pass() { 1.0 } else { 0.0 };
    let mut growth = w[5] * (w[6] * (1.0 - recall)).exp();
    if rating == Rating::Easy {
        growth *= w[7];
    }
    let retrievability = forgetting_curve(elapsed, stability);
    growth = (growth * (w[16] * (1.0 - retrievability)).exp()).max(1.0);

    let s = stability.max(MIN_STABILITY);
    s * (1.0 + (growth - 1.0) * s.powf(-w[15]))
}
