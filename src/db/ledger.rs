use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::srs::types::ReviewLogEntry;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate ledger entry: {0}")]
    Duplicate(Uuid),
}

/// Append-only review history keyed by learner.
///
/// Implementations must return entries oldest first. `delete_for_item` exists
/// only for the reset-progress operation.
pub trait ReviewLedger: Send + Sync {
    fn append(&self, entry: ReviewLogEntry) -> Result<(), LedgerError>;

    fn fetch_for_learner(&self, learner_id: &str) -> Result<Vec<ReviewLogEntry>, LedgerError>;

    fn fetch_for_item(
        &self,
        learner_id: &str,
        item_id: &str,
    ) -> Result<Vec<ReviewLogEntry>, LedgerError> {
        Ok(self
            .fetch_for_learner(learner_id)?
            .into_iter()
            .filter(|e| e.item_id == item_id)
            .collect())
    }

    fn count_for_learner(&self, learner_id: &str) -> Result<usize, LedgerError> {
        Ok(self.fetch_for_learner(learner_id)?.len())
    }

    fn learners_active_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, LedgerError>;

    fn delete_for_item(&self, learner_id: &str, item_id: &str) -> Result<usize, LedgerError>;
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: RwLock<HashMap<String, Vec<ReviewLogEntry>>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_entries(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }
}

impl ReviewLedger for InMemoryLedger {
    fn append(&self, entry: ReviewLogEntry) -> Result<(), LedgerError> {
        let mut entries = self.entries.write();
        let learner_entries = entries.entry(entry.learner_id.clone()).or_default();
        if learner_entries.iter().any(|e| e.id == entry.id) {
            return Err(LedgerError::Duplicate(entry.id));
        }
        learner_entries.push(entry);
        Ok(())
    }

    fn fetch_for_learner(&self, learner_id: &str) -> Result<Vec<ReviewLogEntry>, LedgerError> {
        let mut result = self
            .entries
            .read()
            .get(learner_id)
            .cloned()
            .unwrap_or_default();
        // Stable: entries sharing a timestamp keep their append order.
        result.sort_by_key(|e| e.reviewed_at);
        Ok(result)
    }

    fn count_for_learner(&self, learner_id: &str) -> Result<usize, LedgerError> {
        Ok(self.entries.read().get(learner_id).map_or(0, Vec::len))
    }

    fn learners_active_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, LedgerError> {
        let entries = self.entries.read();
        let mut active: Vec<String> = entries
            .iter()
            .filter(|(_, list)| list.iter().any(|e| e.reviewed_at >= cutoff))
            .map(|(learner, _)| learner.clone())
            .collect();
        active.sort();
        Ok(active)
    }

    fn delete_for_item(&self, learner_id: &str, item_id: &str) -> Result<usize, LedgerError> {
        let mut entries = self.entries.write();
        let Some(list) = entries.get_mut(learner_id) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|e| e.item_id != item_id);
        Ok(before - list.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srs::types::{ExerciseKind, Rating, ScheduleSource};
    use chrono::{Duration, TimeZone};

    fn entry(learner: &str, item: &str, at: DateTime<Utc>) -> ReviewLogEntry {
        ReviewLogEntry {
            id: Uuid::new_v4(),
            learner_id: learner.to_string(),
            item_id: item.to_string(),
            rating: Rating::Good,
            is_correct: true,
            response_time_secs: 2.5,
            exercise_kind: ExerciseKind::Matching,
            reviewed_at: at,
            scheduled_days: 1,
            source: ScheduleSource::Model,
            applied: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_fetch_is_oldest_first() {
        let ledger = InMemoryLedger::new();
        ledger.append(entry("u1", "a", t0() + Duration::hours(2))).unwrap();
        ledger.append(entry("u1", "b", t0())).unwrap();
        ledger.append(entry("u2", "a", t0())).unwrap();

        let fetched = ledger.fetch_for_learner("u1").unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].item_id, "b");
        assert_eq!(ledger.count_for_learner("u2").unwrap(), 1);
        assert_eq!(ledger.count_for_learner("nobody").unwrap(), 0);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let ledger = InMemoryLedger::new();
        let e = entry("u1", "a", t0());
        ledger.append(e.clone()).unwrap();
        assert!(matches!(ledger.append(e), Err(LedgerError::Duplicate(_))));
    }

    #[test]
    fn test_delete_is_scoped_to_item() {
        let ledger = InMemoryLedger::new();
        ledger.append(entry("u1", "a", t0())).unwrap();
        ledger.append(entry("u1", "a", t0() + Duration::days(1))).unwrap();
        ledger.append(entry("u1", "b", t0())).unwrap();

        assert_eq!(ledger.delete_for_item("u1", "a").unwrap(), 2);
        assert_eq!(ledger.fetch_for_item("u1", "b").unwrap().len(), 1);
        assert_eq!(ledger.total_entries(), 1);
    }

    #[test]
    fn test_active_learners() {
        let ledger = InMemoryLedger::new();
        ledger.append(entry("old", "a", t0() - Duration::days(30))).unwrap();
        ledger.append(entry("fresh", "a", t0() - Duration::days(1))).unwrap();
        let active = ledger.learners_active_since(t0() - Duration::days(7)).unwrap();
        assert_eq!(active, vec!["fresh".to_string()]);
    }
}
