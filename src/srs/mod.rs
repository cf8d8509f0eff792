//! Spaced-repetition core - memory model and derived metrics
//!
//! Contains:
//! - Types - item memory state, ratings, parameter sets, ledger entries
//! - Model - forgetting curve and stability/difficulty transitions
//! - Rating - rating inference from correctness and latency
//! - Heuristic - fallback ladder when the model cannot evaluate
//! - Mastery - mastery score, learned gate, review urgency
//! - Replay - state reconstruction from the review ledger

pub mod heuristic;
pub mod mastery;
pub mod model;
pub mod rating;
pub mod replay;
pub mod types;

pub use heuristic::heuristic_next_state;
pub use mastery::{is_learned, mastery_score, review_urgency};
pub use model::{
    forgetting_curve, next_state, schedule_from_stability, IntervalCandidates, ModelError,
};
pub use rating::infer_rating;
pub use replay::{replay_item, replay_learner};
pub use types::*;
