mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use common::{
    correct, forgetful_history, harness, incorrect, seed_ledger, t0, FlakyLedger, RacingStore,
};
use vocab_srs::config::OptimizerConfig;
use vocab_srs::db::{InMemoryItemStore, ItemStateStore, ReviewLedger};
use vocab_srs::services::{
    DailyUsage, ParameterOptimizer, ParameterStore, ReviewService, Scheduler, SchedulerError,
};
use vocab_srs::srs::{replay_item, replay_learner, ExerciseKind, LearningState, DEFAULT_WEIGHTS};

#[test]
fn first_review_creates_versioned_state() {
    let h = harness();
    let result = h
        .reviews
        .submit_review("u1", "w1", &correct(2.0, ExerciseKind::MultipleChoice), t0())
        .unwrap();

    let stored = h.store.load("u1", "w1").unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.state, result.state);
    assert_eq!(h.ledger.total_entries(), 1);
}

#[test]
fn replaying_the_ledger_reproduces_stored_state() {
    let h = harness();
    let answers = [
        correct(2.0, ExerciseKind::MultipleChoice),
        correct(4.0, ExerciseKind::TranslateToTarget),
        incorrect(ExerciseKind::Writing),
        correct(9.0, ExerciseKind::Writing),
        correct(1.0, ExerciseKind::Matching),
        correct(30.0, ExerciseKind::FillGap),
    ];

    let mut now = t0();
    for outcome in &answers {
        let result = h.reviews.submit_review("u1", "w1", outcome, now).unwrap();
        now = result.state.due_at + Duration::hours(3);
    }
    h.reviews
        .submit_review("u1", "w2", &correct(2.0, ExerciseKind::Listening), t0())
        .unwrap();

    let params = h.params.get("u1");
    let entries = h.ledger.fetch_for_learner("u1").unwrap();
    let replayed = replay_learner(&entries, &params);
    assert_eq!(replayed.len(), 2);

    for (item_id, state) in replayed {
        let stored = h.store.load("u1", &item_id).unwrap().unwrap().state;
        assert_eq!(state.state, stored.state);
        assert_eq!(state.repetition_count, stored.repetition_count);
        assert_eq!(state.lapse_count, stored.lapse_count);
        assert_eq!(state.scheduled_days, stored.scheduled_days);
        assert_eq!(state.due_at, stored.due_at);
        assert!((state.stability - stored.stability).abs() < 1e-9);
        assert!((state.difficulty - stored.difficulty).abs() < 1e-9);
        assert!((state.average_response_time - stored.average_response_time).abs() < 1e-9);
    }

    let single = replay_item(&h.ledger.fetch_for_item("u1", "w1").unwrap(), &params).unwrap();
    assert_eq!(single.total_attempts, answers.len() as u32);
}

#[test]
fn replay_survives_a_refit_between_batches() {
    let h = harness();
    seed_ledger(h.ledger.as_ref(), forgetful_history("u1", 20, t0() - Duration::days(60)));

    let batch = |start: DateTime<Utc>| {
        let mut now = start;
        for (i, outcome) in [
            correct(2.0, ExerciseKind::MultipleChoice),
            correct(6.0, ExerciseKind::Writing),
            incorrect(ExerciseKind::Listening),
            correct(3.0, ExerciseKind::TranslateToNative),
        ]
        .iter()
        .enumerate()
        {
            for item in ["w1", "w2"] {
                h.reviews.submit_review("u1", item, outcome, now).unwrap();
            }
            now += Duration::days(i as i64 + 1);
        }
        now
    };

    let resume = batch(t0());

    let optimizer = ParameterOptimizer::new(
        Arc::clone(&h.ledger) as Arc<dyn ReviewLedger>,
        Arc::clone(&h.params),
        OptimizerConfig {
            max_iterations: 25,
            restarts: 1,
            ..OptimizerConfig::default()
        },
    );
    optimizer
        .optimize_and_apply("u1", &AtomicBool::new(false), resume)
        .expect("forgetful history should produce a refit");
    let params = h.params.get("u1");
    assert_ne!(params.weights.as_slice(), &DEFAULT_WEIGHTS);

    batch(resume + Duration::days(1));

    let entries = h.ledger.fetch_for_learner("u1").unwrap();
    let replayed = replay_learner(&entries, &params);
    for item_id in ["w1", "w2"] {
        let stored = h.store.load("u1", item_id).unwrap().unwrap().state;
        let again = &replayed[item_id];
        assert_eq!(again.state, stored.state);
        assert_eq!(again.due_at, stored.due_at);
        assert_eq!(again.scheduled_days, stored.scheduled_days);
        assert!((again.stability - stored.stability).abs() < 1e-9);
        assert!((again.difficulty - stored.difficulty).abs() < 1e-9);
    }
}

#[test]
fn item_locks_are_released_after_use() {
    let h = harness();
    std::thread::scope(|scope| {
        for i in 0..4 {
            let reviews = &h.reviews;
            scope.spawn(move || {
                for n in 0..25 {
                    let item = format!("w{}", (i * 25 + n) % 10);
                    reviews
                        .submit_review("u1", &item, &correct(2.0, ExerciseKind::Matching), t0())
                        .unwrap();
                }
            });
        }
    });
    h.reviews.add_item("u1", "fresh", t0()).unwrap();
    h.reviews.reset_progress("u1", "w1", t0()).unwrap();

    assert_eq!(h.reviews.active_item_locks(), 0);
    assert_eq!(h.ledger.total_entries(), 100 - 10);
}

#[test]
fn concurrent_reviews_of_one_item_serialize() {
    let h = harness();
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                h.reviews
                    .submit_review("u1", "w1", &correct(2.0, ExerciseKind::Matching), t0())
                    .unwrap();
            });
        }
    });

    let stored = h.store.load("u1", "w1").unwrap().unwrap();
    assert_eq!(stored.version, 8);
    assert_eq!(stored.state.total_attempts, 8);
    assert_eq!(stored.state.repetition_count, 8);
    assert_eq!(h.ledger.total_entries(), 8);
}

#[test]
fn concurrent_reviews_across_items() {
    let h = harness();
    std::thread::scope(|scope| {
        for i in 0..6 {
            let reviews = &h.reviews;
            scope.spawn(move || {
                let item = format!("w{i}");
                for _ in 0..3 {
                    reviews
                        .submit_review("u1", &item, &correct(2.0, ExerciseKind::Matching), t0())
                        .unwrap();
                }
            });
        }
    });

    let items = h.reviews.learner_items("u1").unwrap();
    assert_eq!(items.len(), 6);
    assert!(items.iter().all(|(_, s)| s.total_attempts == 3));
    assert_eq!(h.ledger.total_entries(), 18);
}

fn service_with(
    ledger: Arc<dyn ReviewLedger>,
    store: Arc<dyn ItemStateStore>,
) -> ReviewService {
    let scheduler = Arc::new(Scheduler::new(Arc::new(ParameterStore::default()), ledger));
    ReviewService::new(scheduler, store)
}

#[test]
fn version_conflicts_are_retried() {
    let store = Arc::new(RacingStore::new(2));
    let ledger = Arc::new(FlakyLedger::default());
    let service = service_with(
        Arc::clone(&ledger) as Arc<dyn ReviewLedger>,
        Arc::clone(&store) as Arc<dyn ItemStateStore>,
    );

    service
        .submit_review("u1", "w1", &correct(2.0, ExerciseKind::Matching), t0())
        .unwrap();

    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
    assert_eq!(ledger.inner.total_entries(), 1);
}

#[test]
fn persistent_conflicts_give_up() {
    let store = Arc::new(RacingStore::new(10));
    let ledger = Arc::new(FlakyLedger::default());
    let service = service_with(
        Arc::clone(&ledger) as Arc<dyn ReviewLedger>,
        Arc::clone(&store) as Arc<dyn ItemStateStore>,
    );

    let err = service
        .submit_review("u1", "w1", &correct(2.0, ExerciseKind::Matching), t0())
        .unwrap_err();

    assert!(matches!(err, SchedulerError::Conflict { attempts: 3, .. }));
    assert_eq!(ledger.inner.total_entries(), 0);
    assert!(store.load("u1", "w1").unwrap().is_none());
}

#[test]
fn failed_append_restores_previous_state() {
    let store = Arc::new(InMemoryItemStore::new());
    let ledger = Arc::new(FlakyLedger::default());
    let service = service_with(
        Arc::clone(&ledger) as Arc<dyn ReviewLedger>,
        Arc::clone(&store) as Arc<dyn ItemStateStore>,
    );

    let first = service
        .submit_review("u1", "w1", &correct(2.0, ExerciseKind::Matching), t0())
        .unwrap();

    ledger.failing.store(true, Ordering::SeqCst);
    let err = service
        .submit_review("u1", "w1", &incorrect(ExerciseKind::Matching), t0() + Duration::days(2))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Ledger(_)));

    let stored = store.load("u1", "w1").unwrap().unwrap();
    assert_eq!(stored.state, first.state);
    assert_eq!(ledger.inner.total_entries(), 1);

    ledger.failing.store(false, Ordering::SeqCst);
    let retried = service
        .submit_review("u1", "w1", &incorrect(ExerciseKind::Matching), t0() + Duration::days(2))
        .unwrap();
    assert_eq!(retried.state.total_attempts, 2);
    assert_eq!(ledger.inner.total_entries(), 2);
}

#[test]
fn reset_progress_clears_one_item() {
    let h = harness();
    for item in ["w1", "w2"] {
        h.reviews
            .submit_review("u1", item, &correct(2.0, ExerciseKind::Matching), t0())
            .unwrap();
    }

    let fresh = h.reviews.reset_progress("u1", "w1", t0() + Duration::days(1)).unwrap();

    assert_eq!(fresh.state, LearningState::New);
    assert_eq!(fresh.total_attempts, 0);
    assert_eq!(h.reviews.item_state("u1", "w1").unwrap(), Some(fresh));
    assert!(h.ledger.fetch_for_item("u1", "w1").unwrap().is_empty());
    assert_eq!(h.ledger.fetch_for_item("u1", "w2").unwrap().len(), 1);
}

#[test]
fn added_items_show_up_in_queue_and_schedule() {
    let h = harness();
    for item in ["a", "b", "c"] {
        assert!(h.reviews.add_item("u1", item, t0()).unwrap());
    }
    assert!(!h.reviews.add_item("u1", "a", t0()).unwrap());

    h.reviews
        .submit_review("u1", "c", &correct(2.0, ExerciseKind::Matching), t0())
        .unwrap();

    let queue = h.reviews.review_queue("u1", DailyUsage::default(), t0()).unwrap();
    let ids: Vec<&str> = queue.iter().map(|q| q.item_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);

    let schedule = h.reviews.review_schedule("u1", t0()).unwrap();
    assert_eq!(schedule.today, vec!["a", "b"]);
    assert_eq!(schedule.total(), 3);
}

#[test]
fn failed_reset_keeps_progress() {
    let store = Arc::new(InMemoryItemStore::new());
    let ledger = Arc::new(FlakyLedger::default());
    let service = service_with(
        Arc::clone(&ledger) as Arc<dyn ReviewLedger>,
        Arc::clone(&store) as Arc<dyn ItemStateStore>,
    );
    let reviewed = service
        .submit_review("u1", "w1", &correct(2.0, ExerciseKind::Matching), t0())
        .unwrap();

    ledger.failing.store(true, Ordering::SeqCst);
    let err = service.reset_progress("u1", "w1", t0() + Duration::days(1)).unwrap_err();
    assert!(matches!(err, SchedulerError::Ledger(_)));

    assert_eq!(store.load("u1", "w1").unwrap().unwrap().state, reviewed.state);
    assert_eq!(ledger.inner.fetch_for_item("u1", "w1").unwrap().len(), 1);
}
