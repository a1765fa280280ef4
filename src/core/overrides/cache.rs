//! Per-run correlation id cache

use crate::adapters::traits::OverrideApi;
use crate::domain::ids::{CorrelationId, RecordId, ScopeId};
use crate::domain::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Record to correlation id map for one scope
///
/// Populated from a single listing call the first time any record is
/// resolved, then read-only for the rest of the run.
pub struct CorrelationCache {
    scope: ScopeId,
    api: Arc<dyn OverrideApi>,
    ids: OnceCell<HashMap<RecordId, CorrelationId>>,
}

impl CorrelationCache {
    pub fn new(scope: ScopeId, api: Arc<dyn OverrideApi>) -> Self {
        Self {
            scope,
            api,
            ids: OnceCell::new(),
        }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    /// Resolve a record's correlation id, loading the map on first use
    ///
    /// # Errors
    ///
    /// Returns the listing error if the map could not be loaded. A failed load
    /// is retried on the next call.
    pub async fn resolve(&self, record_id: &RecordId) -> Result<Option<CorrelationId>> {
        let ids = self
            .ids
            .get_or_try_init(|| async {
                let ids = self.api.list_correlation_ids(&self.scope).await?;
                tracing::debug!(course_id = %self.scope, count = ids.len(), "Loaded correlation ids");
                Ok::<_, crate::domain::SyncError>(ids)
            })
            .await?;
        Ok(ids.get(record_id).cloned())
    }

    pub fn is_loaded(&self) -> bool {
        self.ids.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLms;
    use crate::domain::Record;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_listing_happens_once() {
        let a = RecordId::from_str("a").unwrap();
        let b = RecordId::from_str("b").unwrap();
        let lms = Arc::new(
            InMemoryLms::new()
                .with_record(Record::new(a.clone()))
                .with_record(Record::new(b.clone()))
                .without_correlation_id(&b),
        );
        let cache = CorrelationCache::new(ScopeId::from_str("101").unwrap(), lms.clone());
        assert!(!cache.is_loaded());

        assert_eq!(cache.resolve(&a).await.unwrap().unwrap().as_str(), "enr-a");
        assert_eq!(cache.resolve(&b).await.unwrap(), None);
        assert_eq!(cache.resolve(&a).await.unwrap().unwrap().as_str(), "enr-a");

        assert!(cache.is_loaded());
        assert_eq!(lms.correlation_listing_count().await, 1);
    }
}
