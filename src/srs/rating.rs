use super::types::{sanitize_response_time, ExerciseKind, Rating};

const LOW_ACCURACY: f64 = 0.5;
const HIGH_ACCURACY: f64 = 0.9;
const LOW_ACCURACY_FACTOR: f64 = 1.2;
const HIGH_ACCURACY_FACTOR: f64 = 0.8;

const EASY_RATIO: f64 = 0.5;
const GOOD_RATIO: f64 = 0.8;
const HARD_RATIO: f64 = 1.2;

/// Items the learner usually misses get a more generous time bar; items
/// they almost always get right get a stricter one.
pub fn accuracy_factor(prior_accuracy: Option<f64>) -> f64 {
    match prior_accuracy {
        Some(acc) if acc < LOW_ACCURACY => LOW_ACCURACY_FACTOR,
        Some(acc) if acc > HIGH_ACCURACY => HIGH_ACCURACY_FACTOR,
        _ => 1.0,
    }
}

pub fn adjusted_expected_time(kind: ExerciseKind, prior_accuracy: Option<f64>) -> f64 {
    kind.expected_time_secs() * accuracy_factor(prior_accuracy)
}

/// Maps an observed answer to a rating. Correctness dominates: a wrong
/// answer is always `Again`, and a correct one is never below `Hard`.
pub fn infer_rating(
    is_correct: bool,
    response_time_secs: f64,
    prior_accuracy: Option<f64>,
    kind: ExerciseKind,
) -> Rating {
    if !is_correct {
        return Rating::Again;
    }

    let response_time = sanitize_response_time(response_time_secs);
    let expected = adjusted_expected_time(kind, prior_accuracy);

    if response_time <= expected * EASY_RATIO {
        Rating::Easy
    } else if response_time <= expected * GOOD_RATIO {
        Rating::Good
    } else if response_time <= expected * HARD_RATIO {
        Rating::Hard
    } else {
        // Very slow but correct still counts as forward progress.
        Rating::Hard
    }
}
