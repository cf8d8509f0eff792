use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::ModelError;

pub const PARAM_COUNT: usize = 19;

/// Default model weights, used for every learner until the optimizer has
/// enough review history to fit a personal vector.
pub const DEFAULT_WEIGHTS: [f64; PARAM_COUNT] = [
    0.4, // w0: first-encounter stability (days)
    0.6, 2.4, // w1-w2: learning graduation slope / base
    5.0, 0.6, // w3-w4: initial difficulty, difficulty step per rating
    2.5, -0.7, 1.3, // w5-w7: recall growth, hard exponent, easy bonus
    -0.3, 0.0, 0.35, // w8-w10: hard / good / easy interval log-scale
    0.2, 0.8, // w11-w12: lapse difficulty bump, lapse stability shrink
    0.3, // w13: difficulty interval sensitivity
    0.05, // w14: difficulty mean reversion
    0.1, 0.5, // w15-w16: stability saturation, late-review bonus
    1.2, 1.5, // w17-w18: hard step in learning, relearning recovery
];

pub const DEFAULT_DIFFICULTY: f64 = 5.0;
pub const DEFAULT_DESIRED_RETENTION: f64 = 0.9;
pub const DEFAULT_MAXIMUM_INTERVAL_DAYS: u32 = 36500;
pub const DEFAULT_NEW_CARDS_PER_DAY: u32 = 10;
pub const DEFAULT_MAX_REVIEWS_PER_DAY: u32 = 100;
pub const DEFAULT_LEARNING_DELAY_MINUTES: u32 = 10;
pub const DEFAULT_RELEARNING_DELAY_MINUTES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn value(self) -> i32 {
        self as i32
    }

    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }

    /// Good or Easy: the ratings that graduate an item out of a learning phase.
    pub fn is_pass(self) -> bool {
        self >= Rating::Good
    }

    pub fn is_lapse(self) -> bool {
        self == Rating::Again
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningState {
    New = 0,
    Learning = 1,
    Review = 2,
    Relearning = 3,
}

impl LearningState {
    pub const fn as_str(self) -> &'static str {
        match self {
            LearningState::New => "NEW",
            LearningState::Learning => "LEARNING",
            LearningState::Review => "REVIEW",
            LearningState::Relearning => "RELEARNING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseKind {
    TranslateToNative,
    TranslateToTarget,
    MultipleChoice,
    Matching,
    Writing,
    Listening,
    FillGap,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 7] = [
        ExerciseKind::TranslateToNative,
        ExerciseKind::TranslateToTarget,
        ExerciseKind::MultipleChoice,
        ExerciseKind::Matching,
        ExerciseKind::Writing,
        ExerciseKind::Listening,
        ExerciseKind::FillGap,
    ];

    /// Latency (seconds) a confident learner needs for this kind of exercise.
    pub fn expected_time_secs(self) -> f64 {
        match self {
            ExerciseKind::TranslateToNative => 5.0,
            ExerciseKind::TranslateToTarget => 7.0,
            ExerciseKind::MultipleChoice => 3.0,
            ExerciseKind::Matching => 10.0,
            ExerciseKind::Writing => 15.0,
            ExerciseKind::Listening | ExerciseKind::FillGap => 5.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ExerciseKind::TranslateToNative => "translate_to_native",
            ExerciseKind::TranslateToTarget => "translate_to_target",
            ExerciseKind::MultipleChoice => "multiple_choice",
            ExerciseKind::Matching => "matching",
            ExerciseKind::Writing => "writing",
            ExerciseKind::Listening => "listening",
            ExerciseKind::FillGap => "fill_gap",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exercise kind: {0}")]
pub struct UnknownExerciseKind(pub String);

impl FromStr for ExerciseKind {
    type Err = UnknownExerciseKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Legacy tags from the exercise engine are accepted alongside the canonical names.
        match s.trim() {
            "translate_to_native" | "translation_ru" => Ok(Self::TranslateToNative),
            "translate_to_target" | "translation_cn" => Ok(Self::TranslateToTarget),
            "multiple_choice" => Ok(Self::MultipleChoice),
            "matching" => Ok(Self::Matching),
            "writing" => Ok(Self::Writing),
            "listening" => Ok(Self::Listening),
            "fill_gap" => Ok(Self::FillGap),
            other => Err(UnknownExerciseKind(other.to_string())),
        }
    }
}

/// Memory state of one (learner, item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMemoryState {
    pub due_at: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub lapse_count: u32,
    pub repetition_count: u32,
    pub state: LearningState,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub scheduled_days: u32,
    pub total_attempts: u32,
    pub correct_attempts: u32,
    pub average_response_time: f64,
    pub consecutive_correct: u32,
}

impl ItemMemoryState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            due_at: now,
            stability: 0.0,
            difficulty: DEFAULT_DIFFICULTY,
            lapse_count: 0,
            repetition_count: 0,
            state: LearningState::New,
            last_reviewed_at: None,
            scheduled_days: 0,
            total_attempts: 0,
            correct_attempts: 0,
            average_response_time: 0.0,
            consecutive_correct: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.state == LearningState::New
    }

    pub fn accuracy(&self) -> Option<f64> {
        if self.total_attempts == 0 {
            return None;
        }
        Some(self.correct_attempts as f64 / self.total_attempts as f64)
    }

    /// Updates the running answer statistics. Must run before the memory
    /// model so rating inference sees the current attempt.
    pub fn record_attempt(&mut self, is_correct: bool, response_time_secs: f64) {
        self.total_attempts = self.total_attempts.saturating_add(1);
        if is_correct {
            self.correct_attempts = self.correct_attempts.saturating_add(1);
            self.consecutive_correct = self.consecutive_correct.saturating_add(1);
        } else {
            self.consecutive_correct = 0;
        }

        if self.total_attempts == 1 {
            self.average_response_time = response_time_secs;
        } else {
            let n = self.total_attempts as f64;
            self.average_response_time =
                (self.average_response_time * (n - 1.0) + response_time_secs) / n;
        }
    }
}

/// Fixed-length model weight vector. Construction is unchecked so that
/// persisted or imported vectors can be held as-is; the model validates
/// before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterVector(Vec<f64>);

impl Default for ParameterVector {
    fn default() -> Self {
        Self(DEFAULT_WEIGHTS.to_vec())
    }
}

impl ParameterVector {
    pub fn new(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let w = &self.0;
        if w.len() != PARAM_COUNT {
            return Err(ModelError::InvalidParameters(format!(
                "expected {PARAM_COUNT} weights, got {}",
                w.len()
            )));
        }
        if let Some(idx) = w.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::InvalidParameters(format!(
                "weight w{idx} is not finite"
            )));
        }
        if w[0] <= 0.0 {
            return Err(ModelError::InvalidParameters(
                "w0 (initial stability) must be positive".to_string(),
            ));
        }
        if w[5] < 1.0 || w[6] > 0.0 {
            return Err(ModelError::InvalidParameters(
                "recall growth needs w5 >= 1 and w6 <= 0".to_string(),
            ));
        }
        if w[17] < 1.0 || w[18] < 1.0 {
            return Err(ModelError::InvalidParameters(
                "learning multipliers w17, w18 must be at least 1".to_string(),
            ));
        }
        if !(w[12] > 0.0 && w[12] < 1.0) {
            return Err(ModelError::InvalidParameters(
                "w12 (lapse shrink) must be in (0, 1)".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&w[14]) {
            return Err(ModelError::InvalidParameters(
                "w14 (mean reversion) must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let weights: Vec<f64> = serde_json::from_str(raw)?;
        Ok(Self(weights))
    }
}

impl From<[f64; PARAM_COUNT]> for ParameterVector {
    fn from(weights: [f64; PARAM_COUNT]) -> Self {
        Self(weights.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerParameterSet {
    pub weights: ParameterVector,
    pub desired_retention: f64,
    pub maximum_interval_days: u32,
    pub new_cards_per_day: u32,
    pub max_reviews_per_day: u32,
    pub learning_delay_minutes: u32,
    pub relearning_delay_minutes: u32,
    pub optimized_at: Option<DateTime<Utc>>,
    pub sample_count: usize,
}

impl Default for LearnerParameterSet {
    fn default() -> Self {
        Self {
            weights: ParameterVector::default(),
            desired_retention: DEFAULT_DESIRED_RETENTION,
            maximum_interval_days: DEFAULT_MAXIMUM_INTERVAL_DAYS,
            new_cards_per_day: DEFAULT_NEW_CARDS_PER_DAY,
            max_reviews_per_day: DEFAULT_MAX_REVIEWS_PER_DAY,
            learning_delay_minutes: DEFAULT_LEARNING_DELAY_MINUTES,
            relearning_delay_minutes: DEFAULT_RELEARNING_DELAY_MINUTES,
            optimized_at: None,
            sample_count: 0,
        }
    }
}

impl LearnerParameterSet {
    pub fn is_personalized(&self) -> bool {
        self.optimized_at.is_some()
    }

    pub fn with_weights(&self, weights: ParameterVector) -> Self {
        Self {
            weights,
            ..self.clone()
        }
    }
}

/// What the exercise engine observed for a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub is_correct: bool,
    pub response_time_secs: f64,
    pub exercise_kind: ExerciseKind,
}

impl ReviewOutcome {
    pub fn new(is_correct: bool, response_time_secs: f64, exercise_kind: ExerciseKind) -> Self {
        Self {
            is_correct,
            response_time_secs: sanitize_response_time(response_time_secs),
            exercise_kind,
        }
    }
}

/// Negative or non-finite latencies carry no timing signal and are stored as 0.
pub fn sanitize_response_time(secs: f64) -> f64 {
    if secs.is_finite() {
        secs.max(0.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSource {
    Model,
    Heuristic,
}

/// Model settings a review was scheduled under, kept on its ledger entry
/// so replay does not depend on whatever the learner uses today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedParameters {
    pub weights: ParameterVector,
    pub desired_retention: f64,
    pub maximum_interval_days: u32,
    pub learning_delay_minutes: u32,
    pub relearning_delay_minutes: u32,
}

impl AppliedParameters {
    pub fn from_set(set: &LearnerParameterSet) -> Self {
        Self {
            weights: set.weights.clone(),
            desired_retention: set.desired_retention,
            maximum_interval_days: set.maximum_interval_days,
            learning_delay_minutes: set.learning_delay_minutes,
            relearning_delay_minutes: set.relearning_delay_minutes,
        }
    }

    /// Rebuilds a set for the model; queue limits and fit metadata come from `base`.
    pub fn to_set(&self, base: &LearnerParameterSet) -> LearnerParameterSet {
        LearnerParameterSet {
            weights: self.weights.clone(),
            desired_retention: self.desired_retention,
            maximum_interval_days: self.maximum_interval_days,
            learning_delay_minutes: self.learning_delay_minutes,
            relearning_delay_minutes: self.relearning_delay_minutes,
            ..base.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLogEntry {
    pub id: Uuid,
    pub learner_id: String,
    pub item_id: String,
    pub rating: Rating,
    pub is_correct: bool,
    pub response_time_secs: f64,
    pub exercise_kind: ExerciseKind,
    pub reviewed_at: DateTime<Utc>,
    pub scheduled_days: u32,
    pub source: ScheduleSource,
    /// `None` for heuristic entries and for rows written before stamping.
    #[serde(default)]
    pub applied: Option<AppliedParameters>,
}
