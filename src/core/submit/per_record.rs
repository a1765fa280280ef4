//! Per-record submission
//!
//! Writes one value at a time with a small attempt budget and no delay
//! between attempts. Records that still fail after the first pass get one
//! more pass after a pause; what fails both passes is reported, never thrown.

use crate::adapters::traits::{PrimaryApi, WriteTarget};
use crate::core::cancel::CancelToken;
use crate::core::overrides::{OverrideSyncResult, OverrideSynchronizer};
use crate::domain::{ChangeEntry, ChangeSet, Channel, Result, RetryRecord};
use crate::log_retry_attempt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerRecordPolicy {
    /// Attempts per record per pass
    pub max_attempts: u32,

    /// Pause before the deferred pass
    pub deferred_pass_delay: Duration,
}

impl Default for PerRecordPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            deferred_pass_delay: Duration::from_secs(2),
        }
    }
}

/// Outcome of a per-record submission
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerRecordReport {
    /// One entry per record, attempts accumulated over both passes
    pub records: Vec<RetryRecord>,

    /// Records that failed both passes
    pub failures: Vec<RetryRecord>,

    /// Records that went into the deferred pass
    pub deferred: usize,

    pub overrides: OverrideSyncResult,
}

impl PerRecordReport {
    /// Attempt count to number of records that needed more than one attempt
    pub fn retry_histogram(&self) -> BTreeMap<u32, usize> {
        retry_histogram(&self.records)
    }

    pub fn succeeded(&self) -> usize {
        self.records.len() - self.failures.len()
    }
}

/// Histogram of attempt counts for records that needed more than one attempt
pub fn retry_histogram(records: &[RetryRecord]) -> BTreeMap<u32, usize> {
    let mut histogram = BTreeMap::new();
    for record in records.iter().filter(|r| r.attempts > 1) {
        *histogram.entry(record.attempts).or_insert(0) += 1;
    }
    histogram
}

pub struct PerRecordSubmitter {
    primary: Arc<dyn PrimaryApi>,
    policy: PerRecordPolicy,
}

impl PerRecordSubmitter {
    pub fn new(primary: Arc<dyn PrimaryApi>, policy: PerRecordPolicy) -> Self {
        Self { primary, policy }
    }

    /// Submit every entry, then retry the failures once more
    ///
    /// # Errors
    ///
    /// Only cancellation aborts; it is checked between records so an
    /// in-flight write always completes.
    pub async fn submit(
        &self,
        target: &WriteTarget,
        change_set: &ChangeSet,
        overrides: Option<&OverrideSynchronizer>,
        cancel: &CancelToken,
    ) -> Result<PerRecordReport> {
        let mut report = PerRecordReport::default();
        let mut deferred: Vec<(usize, &ChangeEntry)> = Vec::new();

        for entry in change_set.iter() {
            cancel.check("per-record submission")?;
            let mut retry = RetryRecord::new(entry.record_id.clone(), Channel::Primary);

            if entry.primary_changed && !self.attempt(target, entry, &mut retry).await {
                deferred.push((report.records.len(), entry));
            } else {
                self.sync_override(entry, overrides, &mut report.overrides)
                    .await;
            }
            report.records.push(retry);
        }

        report.deferred = deferred.len();
        if !deferred.is_empty() {
            tracing::info!(
                deferred = deferred.len(),
                delay_ms = self.policy.deferred_pass_delay.as_millis() as u64,
                "Starting deferred pass"
            );
            cancel
                .sleep(self.policy.deferred_pass_delay, "deferred pass")
                .await?;

            for (index, entry) in deferred {
                cancel.check("deferred pass")?;
                let retry = &mut report.records[index];
                if self.attempt(target, entry, retry).await {
                    self.sync_override(entry, overrides, &mut report.overrides)
                        .await;
                } else {
                    tracing::warn!(
                        record_id = %entry.record_id,
                        attempts = retry.attempts,
                        error = retry.last_error.as_deref().unwrap_or(""),
                        "Record failed after deferred pass"
                    );
                    report.failures.push(retry.clone());
                }
            }
        }

        tracing::info!(
            submitted = report.succeeded(),
            failed = report.failures.len(),
            retried = report.records.iter().filter(|r| r.attempts > 1).count(),
            "Per-record submission finished"
        );
        Ok(report)
    }

    async fn attempt(&self, target: &WriteTarget, entry: &ChangeEntry, retry: &mut RetryRecord) -> bool {
        for attempt in 1..=self.policy.max_attempts {
            match self
                .primary
                .write_value(target, &entry.record_id, entry.value)
                .await
            {
                Ok(()) => {
                    retry.record_success();
                    return true;
                }
                Err(e) => {
                    retry.record_failure(e.to_string());
                    if attempt < self.policy.max_attempts {
                        log_retry_attempt!(attempt, self.policy.max_attempts, e);
                    }
                }
            }
        }
        false
    }

    async fn sync_override(
        &self,
        entry: &ChangeEntry,
        overrides: Option<&OverrideSynchronizer>,
        tally: &mut OverrideSyncResult,
    ) {
        let Some(sync) = overrides else { return };
        if !entry.needs_override() {
            return;
        }
        let outcome = sync.submit_with_retry(entry).await;
        tally.record(&entry.record_id, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLms;
    use crate::domain::ids::{RecordId, ResourceId, ScopeId};
    use crate::domain::RemoteError;
    use std::str::FromStr;

    fn rid(s: &str) -> RecordId {
        RecordId::from_str(s).unwrap()
    }

    fn target() -> WriteTarget {
        WriteTarget {
            scope: ScopeId::from_str("101").unwrap(),
            container_id: ResourceId::from_str("a1").unwrap(),
            criterion_id: ResourceId::from_str("c1").unwrap(),
        }
    }

    fn entry(id: &str, value: f64, primary_changed: bool) -> ChangeEntry {
        ChangeEntry {
            record_id: rid(id),
            value,
            previous_value: None,
            primary_changed,
            override_value: None,
            previous_override: None,
        }
    }

    fn submitter(lms: Arc<InMemoryLms>) -> PerRecordSubmitter {
        PerRecordSubmitter::new(
            lms,
            PerRecordPolicy {
                max_attempts: 3,
                deferred_pass_delay: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_third_attempt_success_is_counted() {
        let lms = Arc::new(InMemoryLms::new().with_write_failures(
            &rid("a"),
            2,
            RemoteError::RateLimited("429".into()),
        ));
        let change_set = ChangeSet::new(vec![entry("a", 3.0, true), entry("b", 2.0, true)]);

        let report = submitter(lms.clone())
            .submit(&target(), &change_set, None, &CancelToken::none())
            .await
            .unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.deferred, 0);
        assert_eq!(report.records[0].attempts, 3);
        assert_eq!(report.records[1].attempts, 1);
        assert_eq!(report.retry_histogram(), BTreeMap::from([(3, 1)]));
        assert_eq!(lms.primary_value(&rid("a")).await, Some(3.0));
    }

    #[tokio::test]
    async fn test_deferred_pass_recovers_record() {
        let lms = Arc::new(InMemoryLms::new().with_write_failures(
            &rid("a"),
            4,
            RemoteError::ServerError {
                status: 503,
                message: "busy".into(),
            },
        ));
        let change_set = ChangeSet::new(vec![entry("a", 3.0, true)]);

        let report = submitter(lms.clone())
            .submit(&target(), &change_set, None, &CancelToken::none())
            .await
            .unwrap();

        assert_eq!(report.deferred, 1);
        assert!(report.failures.is_empty());
        assert_eq!(report.records[0].attempts, 5);
        assert_eq!(lms.primary_write_count(&rid("a")).await, 5);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_reported_with_last_error() {
        let lms = Arc::new(
            InMemoryLms::new()
                .with_write_failures(&rid("a"), 5, RemoteError::Timeout("first".into()))
                .with_write_failures(&rid("a"), 1, RemoteError::NotFound("last".into())),
        );
        let change_set = ChangeSet::new(vec![entry("a", 3.0, true), entry("b", 1.0, true)]);

        let report = submitter(lms.clone())
            .submit(&target(), &change_set, None, &CancelToken::none())
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.record_id, rid("a"));
        assert_eq!(failure.attempts, 6);
        assert!(failure.last_error.as_deref().unwrap().contains("last"));
        assert_eq!(report.succeeded(), 1);
        assert_eq!(lms.primary_value(&rid("b")).await, Some(1.0));
    }

    #[tokio::test]
    async fn test_override_only_entry_skips_primary_write() {
        let lms = Arc::new(InMemoryLms::new());
        let change_set = ChangeSet::new(vec![entry("a", 3.0, false)]);

        let report = submitter(lms.clone())
            .submit(&target(), &change_set, None, &CancelToken::none())
            .await
            .unwrap();

        assert_eq!(report.records[0].attempts, 0);
        assert!(report.failures.is_empty());
        assert_eq!(lms.primary_write_count(&rid("a")).await, 0);
    }

    #[tokio::test]
    async fn test_cancellation_between_records() {
        let lms = Arc::new(InMemoryLms::new());
        let (tx, rx) = tokio::sync::watch::channel(true);
        let change_set = ChangeSet::new(vec![entry("a", 3.0, true)]);

        let result = submitter(lms.clone())
            .submit(&target(), &change_set, None, &CancelToken::from_receiver(rx))
            .await;

        assert!(matches!(result, Err(crate::domain::SyncError::Cancelled(_))));
        assert_eq!(lms.primary_write_count(&rid("a")).await, 0);
        drop(tx);
    }
}
