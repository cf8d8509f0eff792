mod optimization;

pub use optimization::{run_optimization_cycle, CycleSummary};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::db::LedgerError;
use crate::state::SrsState;

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    cancel: Arc<AtomicBool>,
    running: AtomicBool,
    state: Arc<SrsState>,
}

impl WorkerManager {
    pub async fn new(state: Arc<SrsState>) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await.map_err(WorkerError::Scheduler)?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            cancel: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            state,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        if self.is_running() {
            return Ok(());
        }
        let worker = &self.state.config().worker;
        if !worker.leader {
            info!("WORKER_LEADER not set, skipping worker startup");
            return Ok(());
        }
        if !worker.enable_optimization {
            info!("Optimization worker disabled");
            return Ok(());
        }

        let scheduler = self.scheduler.lock().await;
        // A previous stop leaves the flag raised.
        self.cancel.store(false, Ordering::Relaxed);

        let schedule = worker.optimization_schedule.clone();
        let state = Arc::clone(&self.state);
        let cancel = Arc::clone(&self.cancel);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let state = Arc::clone(&state);
            let cancel = Arc::clone(&cancel);
            let mut rx = shutdown_rx.resubscribe();
            Box::pin(async move {
                tokio::select! {
                    _ = rx.recv() => {},
                    result = run_optimization_cycle(state, cancel) => {
                        if let Err(e) = result {
                            error!(error = %e, "Optimization worker error");
                        }
                    }
                }
            })
        })
        .map_err(WorkerError::Scheduler)?;
        scheduler.add(job).await.map_err(WorkerError::Scheduler)?;
        info!(schedule = %schedule, "Optimization worker scheduled");

        scheduler.start().await.map_err(WorkerError::Scheduler)?;
        self.running.store(true, Ordering::Relaxed);
        info!("Workers started");

        Ok(())
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        info!("Stopping workers...");
        self.cancel.store(true, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }
        // A shut down scheduler cannot be started again.
        match JobScheduler::new().await {
            Ok(fresh) => *scheduler = fresh,
            Err(e) => warn!(error = %e, "Failed to prepare scheduler for restart"),
        }

        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
