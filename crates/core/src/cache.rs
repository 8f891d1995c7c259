use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use crate::domain::analysis::{AnalysisResult, SourceId};
use crate::ports::{AnalysisStore, StoreError};

/// Keyed analysis cache with per-source serialization.
///
/// Entries never expire; a successful analysis replaces the previous entry.
pub struct AnalysisCache {
    store: Arc<dyn AnalysisStore>,
    locks: Mutex<HashMap<SourceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl AnalysisCache {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self { store, locks: Mutex::new(HashMap::new()) }
    }

    /// Holds the returned guard for the whole analysis of `source_id`.
    pub async fn lock(&self, source_id: &SourceId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Only the map holds an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(source_id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn get(&self, source_id: &SourceId) -> Result<Option<AnalysisResult>, StoreError> {
        self.store.load(source_id).await
    }

    pub async fn put(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        self.store.store(result).await
    }
}
