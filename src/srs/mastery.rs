use chrono::{DateTime, Utc};

use super::types::{ItemMemoryState, LearningState};

pub const LEARNED_MASTERY_THRESHOLD: f64 = 70.0;
pub const LEARNED_MIN_REPETITIONS: u32 = 5;

const STREAK_MIN: u32 = 3;

/// Mastery score (0-100) blending accuracy, stability, difficulty,
/// repetitions and the current success streak.
pub fn mastery_score(state: &ItemMemoryState) -> f64 {
    let Some(accuracy) = state.accuracy() else {
        return 0.0;
    };

    let accuracy_pct = accuracy * 100.0;
    let stability_factor = (state.stability / 365.0).min(1.0) * 20.0;
    let difficulty_factor = ((10.0 - state.difficulty) / 10.0 * 20.0).max(0.0);
    let reps_factor = (state.repetition_count as f64 / 10.0).min(1.0) * 20.0;
    let streak_factor = if state.consecutive_correct >= STREAK_MIN {
        (state.consecutive_correct as f64 / 10.0).min(1.0) * 20.0
    } else {
        0.0
    };

    let score = accuracy_pct * 0.4
        + stability_factor
        + difficulty_factor
        + reps_factor * 0.1
        + streak_factor * 0.1;
    score.clamp(0.0, 100.0)
}

pub fn is_learned(state: &ItemMemoryState) -> bool {
    mastery_score(state) >= LEARNED_MASTERY_THRESHOLD
        && state.repetition_count >= LEARNED_MIN_REPETITIONS
}

/// Review priority (0-10): new items first, then overdue items by how
/// long they have waited, then items coming due soon.
pub fn review_urgency(state: &ItemMemoryState, now: DateTime<Utc>) -> f64 {
    if state.state == LearningState::New {
        return 10.0;
    }

    if state.due_at <= now {
        let hours_overdue = (now - state.due_at).num_seconds() as f64 / 3600.0;
        return (5.0 + hours_overdue / 24.0).min(10.0);
    }

    let hours_until_due = (state.due_at - now).num_seconds() as f64 / 3600.0;
    if hours_until_due < 24.0 {
        5.0
    } else if hours_until_due < 48.0 {
        3.0
    } else {
        1.0
    }
}
