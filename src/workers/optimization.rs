use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, error, info};

use crate::state::SrsState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub optimized: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Refits every learner who reviewed within the configured activity window.
/// Each fit runs on the blocking pool so live reviews are never starved.
pub async fn run_optimization_cycle(
    state: Arc<SrsState>,
    cancel: Arc<AtomicBool>,
) -> Result<CycleSummary, super::WorkerError> {
    let start = Instant::now();
    info!("Starting parameter optimization cycle");

    let cutoff = Utc::now() - Duration::days(state.config().worker.active_days);
    let learners = state.ledger().learners_active_since(cutoff)?;
    if learners.is_empty() {
        info!("No active learners for optimization");
        return Ok(CycleSummary::default());
    }

    info!(learner_count = learners.len(), "Processing learners for optimization");

    let mut summary = CycleSummary::default();
    for learner_id in learners {
        if cancel.load(Ordering::Relaxed) {
            debug!("Optimization cycle cancelled");
            break;
        }

        let optimizer = state.optimizer();
        let flag = Arc::clone(&cancel);
        let id = learner_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            optimizer.optimize_and_apply(&id, &flag, Utc::now())
        })
        .await;

        match result {
            Ok(Some(_)) => summary.optimized += 1,
            Ok(None) => summary.skipped += 1,
            Err(e) => {
                error!(learner_id = %learner_id, error = %e, "Learner optimization failed");
                summary.errors += 1;
            }
        }
    }

    info!(
        optimized = summary.optimized,
        skipped = summary.skipped,
        errors = summary.errors,
        duration_ms = start.elapsed().as_millis() as u64,
        "Optimization cycle completed"
    );

    Ok(summary)
}
