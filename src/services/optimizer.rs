//! Per-learner refit of the memory model weights.
//!
//! The ledger is replayed under candidate weights and each review after an
//! item's first exposure becomes a recall sample. The fit minimizes the mean
//! squared error between predicted recall and the observed outcome using a
//! bounded coordinate pattern search, restarted from seeded perturbations of
//! the best point. Identical ledgers and seeds give identical results.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::OptimizerConfig;
use crate::db::ReviewLedger;
use crate::services::params::ParameterStore;
use crate::srs::replay::{group_by_item, recall_samples, RecallSample};
use crate::srs::types::{LearnerParameterSet, ParameterVector, ReviewLogEntry, PARAM_COUNT};

/// Reviews that must yield a prediction before a fit is attempted.
pub const MIN_PREDICTIVE_SAMPLES: usize = 10;

const INITIAL_STEP: f64 = 0.125;
const MIN_STEP: f64 = 1.0 / 1024.0;
const RESTART_SPREAD: f64 = 0.1;
const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// Search box per weight. Every point inside passes `ParameterVector::validate`.
pub const WEIGHT_BOUNDS: [(f64, f64); PARAM_COUNT] = [
    (0.05, 10.0), // w0 initial stability
    (0.01, 5.0),  // w1
    (0.01, 20.0), // w2
    (1.0, 10.0),  // w3 initial difficulty
    (0.0, 3.0),   // w4
    (1.0, 6.0),   // w5 growth
    (-3.0, 0.0),  // w6
    (1.0, 4.0),   // w7 easy bonus
    (-2.0, 0.0),  // w8 hard interval
    (-1.0, 1.0),  // w9 good interval
    (0.0, 2.0),   // w10 easy interval
    (0.0, 3.0),   // w11 lapse difficulty
    (0.05, 0.95), // w12 lapse shrink
    (0.0, 2.0),   // w13
    (0.0, 1.0),   // w14 mean reversion
    (0.0, 0.8),   // w15
    (0.0, 3.0),   // w16
    (1.0, 3.0),   // w17
    (1.0, 5.0),   // w18
];

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub weights: ParameterVector,
    pub loss_before: f64,
    pub loss_after: f64,
    pub sample_count: usize,
    pub iterations: usize,
}

enum Halt {
    Interrupted,
    Exhausted,
}

/// Stops the search on deadline, cancellation or iteration budget.
struct SearchGuard<'a> {
    deadline: Instant,
    cancel: &'a AtomicBool,
    iterations: usize,
    max_iterations: usize,
}

impl SearchGuard<'_> {
    fn check(&self) -> Result<(), Halt> {
        if self.cancel.load(Ordering::Relaxed) || Instant::now() >= self.deadline {
            return Err(Halt::Interrupted);
        }
        if self.iterations >= self.max_iterations {
            return Err(Halt::Exhausted);
        }
        Ok(())
    }
}

pub struct ParameterOptimizer {
    ledger: Arc<dyn ReviewLedger>,
    params: Arc<ParameterStore>,
    config: OptimizerConfig,
}

impl ParameterOptimizer {
    pub fn new(
        ledger: Arc<dyn ReviewLedger>,
        params: Arc<ParameterStore>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            ledger,
            params,
            config,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fits new weights for the learner. `None` means "keep what you have":
    /// too little history, nothing better found, or the run was cut short.
    pub fn optimize(
        &self,
        learner_id: &str,
        deadline: Instant,
        cancel: &AtomicBool,
    ) -> Option<OptimizationOutcome> {
        let entries = match self.ledger.fetch_for_learner(learner_id) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    learner_id = %learner_id,
                    error = %e,
                    "Failed to read ledger for optimization"
                );
                return None;
            }
        };
        if entries.len() < self.config.min_samples {
            debug!(
                learner_id = %learner_id,
                entries = entries.len(),
                required = self.config.min_samples,
                "Not enough reviews to optimize"
            );
            return None;
        }

        let current = self.params.get(learner_id);
        self.fit(learner_id, &entries, &current, deadline, cancel)
    }

    /// Runs `optimize` and swaps the result in. Past ledger entries and
    /// existing due dates are left alone.
    pub fn optimize_and_apply(
        &self,
        learner_id: &str,
        cancel: &AtomicBool,
        now: DateTime<Utc>,
    ) -> Option<OptimizationOutcome> {
        let deadline = Instant::now() + self.config.deadline;
        let outcome = self.optimize(learner_id, deadline, cancel)?;

        self.params.replace_weights(
            learner_id,
            outcome.weights.clone(),
            outcome.sample_count,
            now,
        );
        info!(
            learner_id = %learner_id,
            loss_before = outcome.loss_before,
            loss_after = outcome.loss_after,
            samples = outcome.sample_count,
            iterations = outcome.iterations,
            "Learner parameters optimized"
        );
        Some(outcome)
    }

    fn fit(
        &self,
        learner_id: &str,
        entries: &[ReviewLogEntry],
        current: &LearnerParameterSet,
        deadline: Instant,
        cancel: &AtomicBool,
    ) -> Option<OptimizationOutcome> {
        let groups = group_by_item(entries);
        let objective = Objective {
            groups: &groups,
            base: current,
        };

        let baseline = if current.weights.validate().is_ok() {
            current.weights.clone()
        } else {
            ParameterVector::default()
        };
        let (loss_before, sample_count) = objective.evaluate(baseline.as_slice())?;
        if sample_count < MIN_PREDICTIVE_SAMPLES {
            debug!(
                learner_id = %learner_id,
                samples = sample_count,
                "Too few predictive reviews to optimize"
            );
            return None;
        }

        let mut guard = SearchGuard {
            deadline,
            cancel,
            iterations: 0,
            max_iterations: self.config.max_iterations,
        };

        let start = clamp_to_bounds(baseline.as_slice());
        let start_loss = objective.loss(&start);
        let searched = pattern_search(&objective, start, start_loss, &mut guard);
        let (mut best, mut best_loss) = match searched {
            Ok(found) => found,
            Err(()) => {
                debug!(learner_id = %learner_id, "Optimization interrupted");
                return None;
            }
        };

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        for _ in 0..self.config.restarts {
            if guard.iterations >= guard.max_iterations {
                break;
            }
            let seed_point = perturb(&best, &mut rng);
            let seed_loss = objective.loss(&seed_point);
            match pattern_search(&objective, seed_point, seed_loss, &mut guard) {
                Ok((point, loss)) if loss < best_loss => {
                    best = point;
                    best_loss = loss;
                }
                Ok(_) => {}
                Err(()) => {
                    debug!(learner_id = %learner_id, "Optimization interrupted");
                    return None;
                }
            }
        }

        if best_loss >= loss_before - IMPROVEMENT_EPSILON {
            debug!(
                learner_id = %learner_id,
                loss = loss_before,
                "No improvement over current parameters"
            );
            return None;
        }

        let weights = ParameterVector::new(best);
        weights.validate().ok()?;
        Some(OptimizationOutcome {
            weights,
            loss_before,
            loss_after: best_loss,
            sample_count,
            iterations: guard.iterations,
        })
    }
}

struct Objective<'a> {
    groups: &'a BTreeMap<String, Vec<ReviewLogEntry>>,
    base: &'a LearnerParameterSet,
}

impl Objective<'_> {
    /// Mean squared recall error and sample count, or `None` if the weights
    /// are refused or produce no samples.
    fn evaluate(&self, weights: &[f64]) -> Option<(f64, usize)> {
        let candidate = self.base.with_weights(ParameterVector::new(weights.to_vec()));
        let samples = recall_samples(self.groups, &candidate).ok()?;
        let loss = brier(&samples)?;
        loss.is_finite().then_some((loss, samples.len()))
    }

    fn loss(&self, weights: &[f64]) -> f64 {
        self.evaluate(weights).map_or(f64::INFINITY, |(l, _)| l)
    }
}

fn brier(samples: &[RecallSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples
        .iter()
        .map(|s| {
            let y = if s.recalled { 1.0 } else { 0.0 };
            (s.predicted - y).powi(2)
        })
        .sum();
    Some(total / samples.len() as f64)
}

/// One sweep tries a step up and down on every coordinate, keeping the first
/// improving move. The step halves after a sweep without improvement.
/// `Err` means the guard interrupted the search.
fn pattern_search(
    objective: &Objective<'_>,
    start: Vec<f64>,
    start_loss: f64,
    guard: &mut SearchGuard<'_>,
) -> Result<(Vec<f64>, f64), ()> {
    let mut point = start;
    let mut loss = start_loss;
    let mut step = INITIAL_STEP;

    while step >= MIN_STEP {
        match guard.check() {
            Ok(()) => {}
            Err(Halt::Exhausted) => break,
            Err(Halt::Interrupted) => return Err(()),
        }
        guard.iterations += 1;

        let mut improved = false;
        for (i, &(lo, hi)) in WEIGHT_BOUNDS.iter().enumerate() {
            if matches!(guard.check(), Err(Halt::Interrupted)) {
                return Err(());
            }
            let delta = step * (hi - lo);
            for direction in [1.0, -1.0] {
                let moved = (point[i] + direction * delta).clamp(lo, hi);
                if moved == point[i] {
                    continue;
                }
                let mut candidate = point.clone();
                candidate[i] = moved;
                let candidate_loss = objective.loss(&candidate);
                if candidate_loss < loss - IMPROVEMENT_EPSILON {
                    point = candidate;
                    loss = candidate_loss;
                    improved = true;
                    break;
                }
            }
        }

        if !improved {
            step /= 2.0;
        }
    }

    Ok((point, loss))
}

fn clamp_to_bounds(weights: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .zip(WEIGHT_BOUNDS.iter())
        .map(|(w, &(lo, hi))| w.clamp(lo, hi))
        .collect()
}

fn perturb(point: &[f64], rng: &mut ChaCha8Rng) -> Vec<f64> {
    point
        .iter()
        .zip(WEIGHT_BOUNDS.iter())
        .map(|(w, &(lo, hi))| {
            let jitter = rng.gen_range(-RESTART_SPREAD..=RESTART_SPREAD) * (hi - lo);
            (w + jitter).clamp(lo, hi)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srs::types::DEFAULT_WEIGHTS;

    #[test]
    fn test_bounds_contain_defaults() {
        for (i, (w, (lo, hi))) in DEFAULT_WEIGHTS.iter().zip(WEIGHT_BOUNDS.iter()).enumerate() {
            assert!(w >= lo && w <= hi, "w{i}={w} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn test_bound_corners_validate() {
        let low: Vec<f64> = WEIGHT_BOUNDS.iter().map(|b| b.0).collect();
        let high: Vec<f64> = WEIGHT_BOUNDS.iter().map(|b| b.1).collect();
        assert!(ParameterVector::new(low).validate().is_ok());
        assert!(ParameterVector::new(high).validate().is_ok());
    }

    #[test]
    fn test_perturb_is_seeded_and_bounded() {
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let pa = perturb(&DEFAULT_WEIGHTS, &mut a);
        let pb = perturb(&DEFAULT_WEIGHTS, &mut b);
        assert_eq!(pa, pb);
        for (w, (lo, hi)) in pa.iter().zip(WEIGHT_BOUNDS.iter()) {
            assert!(w >= lo && w <= hi);
        }
    }

    #[test]
    fn test_brier() {
        assert_eq!(brier(&[]), None);
        let samples = [
            RecallSample {
                predicted: 0.9,
                recalled: true,
            },
            RecallSample {
                predicted: 0.5,
                recalled: false,
            },
        ];
        let loss = brier(&samples).unwrap();
        assert!((loss - (0.01 + 0.25) / 2.0).abs() < 1e-12);
    }
}
