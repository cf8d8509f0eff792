use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::db::{ItemStateStore, StoreError};
use crate::services::queue::{self, DailyUsage, QueuedItem, ReviewSchedule};
use crate::services::scheduler::{ReviewResult, Scheduler, SchedulerError};
use crate::srs::types::{ItemMemoryState, ReviewOutcome};

pub const MAX_CAS_ATTEMPTS: u32 = 3;

type ItemKey = (String, String);
type ItemLocks = Mutex<HashMap<ItemKey, Arc<Mutex<()>>>>;

/// Holds one (learner, item) lock; the map entry is dropped with the last
/// holder so the map only contains items with a write in flight.
struct ItemLockGuard<'a> {
    locks: &'a ItemLocks,
    key: ItemKey,
    lock: Option<Arc<Mutex<()>>>,
}

impl ItemLockGuard<'_> {
    fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.lock {
            Some(lock) => {
                let _held = lock.lock();
                f()
            }
            None => f(),
        }
    }
}

impl Drop for ItemLockGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        // Release our handle first so the count below only sees other waiters.
        drop(self.lock.take());
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

/// Serializes reviews per (learner, item) and commits them against the
/// versioned item store. Different items proceed in parallel.
pub struct ReviewService {
    scheduler: Arc<Scheduler>,
    store: Arc<dyn ItemStateStore>,
    item_locks: ItemLocks,
}

impl ReviewService {
    pub fn new(scheduler: Arc<Scheduler>, store: Arc<dyn ItemStateStore>) -> Self {
        Self {
            scheduler,
            store,
            item_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    fn item_lock(&self, learner_id: &str, item_id: &str) -> ItemLockGuard<'_> {
        let key = (learner_id.to_string(), item_id.to_string());
        let lock = Arc::clone(self.item_locks.lock().entry(key.clone()).or_default());
        ItemLockGuard {
            locks: &self.item_locks,
            key,
            lock: Some(lock),
        }
    }

    /// Number of (learner, item) locks currently held or awaited.
    pub fn active_item_locks(&self) -> usize {
        self.item_locks.lock().len()
    }

    /// Applies one answer to the item's memory state and records it.
    ///
    /// The state is written first (compare-and-swap on the version read),
    /// then the ledger entry. If the ledger append fails the previous state
    /// is written back, so the store never holds a transition the ledger
    /// does not know about.
    pub fn submit_review(
        &self,
        learner_id: &str,
        item_id: &str,
        outcome: &ReviewOutcome,
        now: DateTime<Utc>,
    ) -> Result<ReviewResult, SchedulerError> {
        self.item_lock(learner_id, item_id)
            .run(|| self.commit_review(learner_id, item_id, outcome, now))
    }

    fn commit_review(
        &self,
        learner_id: &str,
        item_id: &str,
        outcome: &ReviewOutcome,
        now: DateTime<Utc>,
    ) -> Result<ReviewResult, SchedulerError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (previous, version) = match self.store.load(learner_id, item_id)? {
                Some(current) => (current.state, Some(current.version)),
                None => (ItemMemoryState::new(now), None),
            };

            let result = self
                .scheduler
                .plan_review(&previous, outcome, learner_id, item_id, now);

            let written = match self.store.compare_and_swap(
                learner_id,
                item_id,
                version,
                result.state.clone(),
            ) {
                Ok(v) => v,
                Err(StoreError::VersionConflict { expected, actual }) => {
                    debug!(
                        learner_id = %learner_id,
                        item_id = %item_id,
                        attempt,
                        ?expected,
                        ?actual,
                        "Item state changed underneath review, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = self.scheduler.ledger().append(result.entry.clone()) {
                self.roll_back(learner_id, item_id, written, previous);
                return Err(e.into());
            }

            return Ok(result);
        }

        Err(SchedulerError::Conflict {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    fn roll_back(&self, learner_id: &str, item_id: &str, written: u64, previous: ItemMemoryState) {
        match self
            .store
            .compare_and_swap(learner_id, item_id, Some(written), previous)
        {
            Ok(_) => debug!(
                learner_id = %learner_id,
                item_id = %item_id,
                "Ledger write failed, item state restored"
            ),
            Err(e) => error!(
                learner_id = %learner_id,
                item_id = %item_id,
                error = %e,
                "Ledger write failed and item state could not be restored"
            ),
        }
    }

    /// Registers an item for the learner as New. Returns false if it already
    /// exists.
    pub fn add_item(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulerError> {
        self.item_lock(learner_id, item_id).run(|| -> Result<bool, SchedulerError> {
            if self.store.load(learner_id, item_id)?.is_some() {
                return Ok(false);
            }
            match self
                .store
                .compare_and_swap(learner_id, item_id, None, ItemMemoryState::new(now))
            {
                Ok(_) => Ok(true),
                Err(StoreError::VersionConflict { .. }) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Forgets everything about the item: state back to New and its ledger
    /// rows removed. If the rows cannot be removed the previous state is
    /// written back, as for a failed review.
    pub fn reset_progress(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ItemMemoryState, SchedulerError> {
        self.item_lock(learner_id, item_id)
            .run(|| self.commit_reset(learner_id, item_id, now))
    }

    fn commit_reset(
        &self,
        learner_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ItemMemoryState, SchedulerError> {
        let fresh = ItemMemoryState::new(now);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let snapshot = self.store.load(learner_id, item_id)?;
            let version = snapshot.as_ref().map(|v| v.version);
            match self
                .store
                .compare_and_swap(learner_id, item_id, version, fresh.clone())
            {
                Ok(written) => {
                    let removed = match self.scheduler.ledger().delete_for_item(learner_id, item_id)
                    {
                        Ok(removed) => removed,
                        Err(e) => {
                            if let Some(previous) = snapshot {
                                self.roll_back(learner_id, item_id, written, previous.state);
                            }
                            return Err(e.into());
                        }
                    };
                    info!(
                        learner_id = %learner_id,
                        item_id = %item_id,
                        removed,
                        "Item progress reset"
                    );
                    return Ok(fresh);
                }
                Err(StoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(SchedulerError::Conflict {
            learner_id: learner_id.to_string(),
            item_id: item_id.to_string(),
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    pub fn item_state(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> Result<Option<ItemMemoryState>, SchedulerError> {
        Ok(self.store.load(learner_id, item_id)?.map(|v| v.state))
    }

    pub fn learner_items(
        &self,
        learner_id: &str,
    ) -> Result<Vec<(String, ItemMemoryState)>, SchedulerError> {
        Ok(self
            .store
            .list_for_learner(learner_id)?
            .into_iter()
            .map(|(id, v)| (id, v.state))
            .collect())
    }

    pub fn review_queue(
        &self,
        learner_id: &str,
        usage: DailyUsage,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedItem>, SchedulerError> {
        let items = self.learner_items(learner_id)?;
        let params = self.scheduler.params().get(learner_id);
        Ok(queue::build_review_queue(&items, &params, usage, now))
    }

    pub fn review_schedule(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReviewSchedule, SchedulerError> {
        let items = self.learner_items(learner_id)?;
        Ok(queue::review_schedule(&items, now))
    }
}
