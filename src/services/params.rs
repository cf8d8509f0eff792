use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::srs::types::{LearnerParameterSet, ParameterVector};

/// Per-learner parameter sets.
///
/// Sets are immutable `Arc` snapshots: readers clone the `Arc` and keep a
/// consistent view for the whole review, writers replace the entry wholesale.
#[derive(Debug)]
pub struct ParameterStore {
    defaults: LearnerParameterSet,
    sets: RwLock<HashMap<String, Arc<LearnerParameterSet>>>,
}

impl ParameterStore {
    pub fn new(defaults: LearnerParameterSet) -> Self {
        Self {
            defaults,
            sets: RwLock::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &LearnerParameterSet {
        &self.defaults
    }

    /// Returns the learner's set, creating it from the defaults on first access.
    pub fn get(&self, learner_id: &str) -> Arc<LearnerParameterSet> {
        if let Some(set) = self.sets.read().get(learner_id) {
            return Arc::clone(set);
        }
        let mut sets = self.sets.write();
        Arc::clone(
            sets.entry(learner_id.to_string())
                .or_insert_with(|| Arc::new(self.defaults.clone())),
        )
    }

    pub fn peek(&self, learner_id: &str) -> Option<Arc<LearnerParameterSet>> {
        self.sets.read().get(learner_id).cloned()
    }

    pub fn put(&self, learner_id: &str, set: LearnerParameterSet) -> Arc<LearnerParameterSet> {
        let set = Arc::new(set);
        self.sets
            .write()
            .insert(learner_id.to_string(), Arc::clone(&set));
        set
    }

    /// Swaps in optimized weights, keeping the learner's scalar settings.
    pub fn replace_weights(
        &self,
        learner_id: &str,
        weights: ParameterVector,
        sample_count: usize,
        now: DateTime<Utc>,
    ) -> Arc<LearnerParameterSet> {
        let mut sets = self.sets.write();
        let current = sets
            .get(learner_id)
            .map(|s| s.as_ref().clone())
            .unwrap_or_else(|| self.defaults.clone());
        let next = Arc::new(LearnerParameterSet {
            weights,
            optimized_at: Some(now),
            sample_count,
            ..current
        });
        sets.insert(learner_id.to_string(), Arc::clone(&next));
        next
    }

    pub fn len(&self) -> usize {
        self.sets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.read().is_empty()
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(LearnerParameterSet::default())
    }
}
