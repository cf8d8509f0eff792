//! Fixed fallback ladder used when the memory model cannot evaluate a review.
//!
//! Success: New → Learning (+10 min), Learning → Review (+1 day),
//! Review doubles the last interval up to a year, Relearning → Review (+1 day).
//! Failure: Review → Relearning with a lapse; every failure is due in 10 minutes.

use chrono::{DateTime, Duration, Utc};

use super::model::{MIN_STABILITY, MAX_DIFFICULTY, MIN_DIFFICULTY};
use super::types::{ItemMemoryState, LearningState, DEFAULT_DIFFICULTY};

pub const SHORT_DELAY_MINUTES: i64 = 10;
pub const MAX_LADDER_INTERVAL_DAYS: u32 = 365;

pub fn heuristic_next_state(
    current: &ItemMemoryState,
    is_correct: bool,
    now: DateTime<Utc>,
) -> ItemMemoryState {
    let mut next = current.clone();
    next.last_reviewed_at = Some(now);

    // Non-finite values are usually what sent us here; repair them so the
    // model can take over again on the next review.
    if !next.stability.is_finite() {
        next.stability = MIN_STABILITY;
    }
    if !next.difficulty.is_finite() {
        next.difficulty = DEFAULT_DIFFICULTY;
    }
    next.difficulty = next.difficulty.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

    if is_correct {
        match current.state {
            LearningState::New => {
                next.state = LearningState::Learning;
                next.repetition_count = 1;
                next.scheduled_days = 0;
                next.due_at = now + Duration::minutes(SHORT_DELAY_MINUTES);
            }
            LearningState::Learning | LearningState::Relearning => {
                next.state = LearningState::Review;
                next.repetition_count = current.repetition_count.saturating_add(1);
                next.scheduled_days = 1;
                next.due_at = now + Duration::days(1);
            }
            LearningState::Review => {
                let current_interval = current.scheduled_days.max(1);
                let interval = current_interval
                    .saturating_mul(2)
                    .min(MAX_LADDER_INTERVAL_DAYS);
                next.repetition_count = current.repetition_count.saturating_add(1);
                next.scheduled_days = interval;
                next.due_at = now + Duration::days(interval as i64);
            }
        }
        next.stability = next.stability.max(MIN_STABILITY);
    } else {
        if current.state == LearningState::Review {
            next.state = LearningState::Relearning;
            next.lapse_count = current.lapse_count.saturating_add(1);
        }
        next.scheduled_days = 0;
        next.due_at = now + Duration::minutes(SHORT_DELAY_MINUTES);
    }

    next
}
