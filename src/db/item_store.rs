use std::collections::HashMap;

use parking_lot::RwLock;

use crate::srs::types::ItemMemoryState;

#[derive(Debug, Clone, PartialEq)]
pub struct VersionedState {
    pub state: ItemMemoryState,
    pub version: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        expected: Option<u64>,
        actual: Option<u64>,
    },
    #[error("item store unavailable: {0}")]
    Unavailable(String),
}

/// Versioned storage for item memory states. Writers must present the
/// version they read; a stale version is rejected instead of overwritten.
pub trait ItemStateStore: Send + Sync {
    fn load(&self, learner_id: &str, item_id: &str) -> Result<Option<VersionedState>, StoreError>;

    /// Writes `state` if the stored version equals `expected` (`None` = absent).
    /// Returns the new version.
    fn compare_and_swap(
        &self,
        learner_id: &str,
        item_id: &str,
        expected: Option<u64>,
        state: ItemMemoryState,
    ) -> Result<u64, StoreError>;

    fn list_for_learner(&self, learner_id: &str) -> Result<Vec<(String, VersionedState)>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryItemStore {
    items: RwLock<HashMap<(String, String), VersionedState>>,
}

impl InMemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl ItemStateStore for InMemoryItemStore {
    fn load(&self, learner_id: &str, item_id: &str) -> Result<Option<VersionedState>, StoreError> {
        let key = (learner_id.to_string(), item_id.to_string());
        Ok(self.items.read().get(&key).cloned())
    }

    fn compare_and_swap(
        &self,
        learner_id: &str,
        item_id: &str,
        expected: Option<u64>,
        state: ItemMemoryState,
    ) -> Result<u64, StoreError> {
        let key = (learner_id.to_string(), item_id.to_string());
        let mut items = self.items.write();
        let actual = items.get(&key).map(|v| v.version);
        if actual != expected {
            return Err(StoreError::VersionConflict { expected, actual });
        }
        let version = actual.unwrap_or(0) + 1;
        items.insert(key, VersionedState { state, version });
        Ok(version)
    }

    fn list_for_learner(&self, learner_id: &str) -> Result<Vec<(String, VersionedState)>, StoreError> {
        let mut result: Vec<(String, VersionedState)> = self
            .items
            .read()
            .iter()
            .filter(|((learner, _), _)| learner == learner_id)
            .map(|((_, item), v)| (item.clone(), v.clone()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(result)
    }
}
