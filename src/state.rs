use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::{InMemoryItemStore, InMemoryLedger, ItemStateStore, ReviewLedger};
use crate::services::{ParameterOptimizer, ParameterStore, ReviewService, Scheduler};

/// Everything a host process needs to run the scheduling core, wired once.
pub struct SrsState {
    started_at: Instant,
    config: Config,
    params: Arc<ParameterStore>,
    ledger: Arc<dyn ReviewLedger>,
    store: Arc<dyn ItemStateStore>,
    scheduler: Arc<Scheduler>,
    reviews: Arc<ReviewService>,
    optimizer: Arc<ParameterOptimizer>,
}

impl SrsState {
    pub fn new(
        config: Config,
        ledger: Arc<dyn ReviewLedger>,
        store: Arc<dyn ItemStateStore>,
    ) -> Self {
        let params = Arc::new(ParameterStore::new(
            config.scheduler.default_parameter_set(),
        ));
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&params), Arc::clone(&ledger)));
        let reviews = Arc::new(ReviewService::new(
            Arc::clone(&scheduler),
            Arc::clone(&store),
        ));
        let optimizer = Arc::new(ParameterOptimizer::new(
            Arc::clone(&ledger),
            Arc::clone(&params),
            config.optimizer.clone(),
        ));

        Self {
            started_at: Instant::now(),
            config,
            params,
            ledger,
            store,
            scheduler,
            reviews,
            optimizer,
        }
    }

    pub fn in_memory(config: Config) -> Self {
        Self::new(
            config,
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryItemStore::new()),
        )
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn params(&self) -> Arc<ParameterStore> {
        Arc::clone(&self.params)
    }

    pub fn ledger(&self) -> Arc<dyn ReviewLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn store(&self) -> Arc<dyn ItemStateStore> {
        Arc::clone(&self.store)
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn reviews(&self) -> Arc<ReviewService> {
        Arc::clone(&self.reviews)
    }

    pub fn optimizer(&self) -> Arc<ParameterOptimizer> {
        Arc::clone(&self.optimizer)
    }
}
