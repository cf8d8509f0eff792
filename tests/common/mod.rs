#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use vocab_srs::config::Config;
use vocab_srs::db::{
    InMemoryItemStore, InMemoryLedger, ItemStateStore, LedgerError, ReviewLedger, StoreError,
    VersionedState,
};
use vocab_srs::services::{ParameterStore, ReviewService, Scheduler};
use vocab_srs::srs::{
    ExerciseKind, ItemMemoryState, Rating, ReviewLogEntry, ReviewOutcome, ScheduleSource,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn correct(secs: f64, kind: ExerciseKind) -> ReviewOutcome {
    ReviewOutcome::new(true, secs, kind)
}

pub fn incorrect(kind: ExerciseKind) -> ReviewOutcome {
    ReviewOutcome::new(false, 4.0, kind)
}

pub fn entry(
    learner: &str,
    item: &str,
    rating: Rating,
    at: DateTime<Utc>,
) -> ReviewLogEntry {
    ReviewLogEntry {
        id: Uuid::new_v4(),
        learner_id: learner.to_string(),
        item_id: item.to_string(),
        rating,
        is_correct: rating != Rating::Again,
        response_time_secs: 3.0,
        exercise_kind: ExerciseKind::TranslateToNative,
        reviewed_at: at,
        scheduled_days: 0,
        source: ScheduleSource::Model,
        applied: None,
    }
}

/// A learner who keeps forgetting words the default model expects them to
/// remember: Good, Good, then a lapse, a relearn and another lapse per item.
pub fn forgetful_history(learner: &str, items: usize, start: DateTime<Utc>) -> Vec<ReviewLogEntry> {
    let mut entries = Vec::new();
    for i in 0..items {
        let item = format!("word-{i:03}");
        let base = start + Duration::minutes(i as i64);
        entries.push(entry(learner, &item, Rating::Good, base));
        entries.push(entry(learner, &item, Rating::Good, base + Duration::days(1)));
        entries.push(entry(learner, &item, Rating::Again, base + Duration::days(4)));
        entries.push(entry(learner, &item, Rating::Good, base + Duration::days(5)));
        entries.push(entry(learner, &item, Rating::Again, base + Duration::days(15)));
    }
    entries
}

pub fn seed_ledger(ledger: &dyn ReviewLedger, entries: Vec<ReviewLogEntry>) {
    for e in entries {
        ledger.append(e).unwrap();
    }
}

pub struct Harness {
    pub params: Arc<ParameterStore>,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<InMemoryItemStore>,
    pub scheduler: Arc<Scheduler>,
    pub reviews: ReviewService,
}

pub fn harness() -> Harness {
    let config = Config::default();
    let params = Arc::new(ParameterStore::new(config.scheduler.default_parameter_set()));
    let ledger = Arc::new(InMemoryLedger::new());
    let store = Arc::new(InMemoryItemStore::new());
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&params),
        Arc::clone(&ledger) as Arc<dyn ReviewLedger>,
    ));
    let reviews = ReviewService::new(
        Arc::clone(&scheduler),
        Arc::clone(&store) as Arc<dyn ItemStateStore>,
    );
    Harness {
        params,
        ledger,
        store,
        scheduler,
        reviews,
    }
}

/// Ledger whose writes (appends and deletes) fail while `failing` is set.
#[derive(Default)]
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    pub failing: AtomicBool,
}

impl ReviewLedger for FlakyLedger {
    fn append(&self, entry: ReviewLogEntry) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("disk full".to_string()));
        }
        self.inner.append(entry)
    }

    fn fetch_for_learner(&self, learner_id: &str) -> Result<Vec<ReviewLogEntry>, LedgerError> {
        self.inner.fetch_for_learner(learner_id)
    }

    fn learners_active_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, LedgerError> {
        self.inner.learners_active_since(cutoff)
    }

    fn delete_for_item(&self, learner_id: &str, item_id: &str) -> Result<usize, LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("disk full".to_string()));
        }
        self.inner.delete_for_item(learner_id, item_id)
    }
}

/// Store that reports a version conflict on the first `conflicts` writes,
/// simulating another writer that got there first.
pub struct RacingStore {
    pub inner: InMemoryItemStore,
    pub conflicts: AtomicUsize,
    pub writes: AtomicUsize,
}

impl RacingStore {
    pub fn new(conflicts: usize) -> Self {
        Self {
            inner: InMemoryItemStore::new(),
            conflicts: AtomicUsize::new(conflicts),
            writes: AtomicUsize::new(0),
        }
    }
}

impl ItemStateStore for RacingStore {
    fn load(&self, learner_id: &str, item_id: &str) -> Result<Option<VersionedState>, StoreError> {
        self.inner.load(learner_id, item_id)
    }

    fn compare_and_swap(
        &self,
        learner_id: &str,
        item_id: &str,
        expected: Option<u64>,
        state: ItemMemoryState,
    ) -> Result<u64, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::VersionConflict {
                expected,
                actual: expected.map(|v| v + 1).or(Some(1)),
            });
        }
        self.inner.compare_and_swap(learner_id, item_id, expected, state)
    }

    fn list_for_learner(&self, learner_id: &str) -> Result<Vec<(String, VersionedState)>, StoreError> {
        self.inner.list_for_learner(learner_id)
    }
}
