//! Batch submission
//!
//! Walks the change set once. Each override is fired with a single attempt as
//! the batch is assembled, then every primary value goes out in one bulk
//! request that returns a job handle to poll.

use crate::adapters::traits::{PrimaryApi, WriteTarget};
use crate::core::cancel::CancelToken;
use crate::core::overrides::{OverrideSyncResult, OverrideSynchronizer};
use crate::domain::ids::JobHandle;
use crate::domain::{ChangeSet, DerivedValue, Result};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// `None` when the change set held only override changes
    pub job: Option<JobHandle>,

    /// Primary values included in the bulk request
    pub submitted: usize,

    pub overrides: OverrideSyncResult,
}

pub struct BatchSubmitter {
    primary: Arc<dyn PrimaryApi>,
}

impl BatchSubmitter {
    pub fn new(primary: Arc<dyn PrimaryApi>) -> Self {
        Self { primary }
    }

    /// # Errors
    ///
    /// Fails if the bulk request itself fails; individual override failures
    /// are only tallied.
    pub async fn submit(
        &self,
        target: &WriteTarget,
        change_set: &ChangeSet,
        overrides: Option<&OverrideSynchronizer>,
        cancel: &CancelToken,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut values: Vec<DerivedValue> = Vec::with_capacity(change_set.len());

        for entry in change_set.iter() {
            cancel.check("batch assembly")?;
            if entry.primary_changed {
                values.push(entry.derived());
            }
            if let Some(sync) = overrides.filter(|_| entry.needs_override()) {
                let outcome = sync.submit_once(entry).await;
                report.overrides.record(&entry.record_id, outcome);
            }
        }

        if values.is_empty() {
            tracing::info!("No primary changes; bulk request skipped");
            return Ok(report);
        }

        cancel.check("batch submission")?;
        let job = self.primary.submit_batch(target, &values).await?;
        tracing::info!(job = %job, values = values.len(), "Batch submitted");

        report.submitted = values.len();
        report.job = Some(job);
        Ok(report)
    }
}
