//! Override channel synchronization
//!
//! Writes each changed record's scaled value as a final-grade override on the
//! second remote surface, then verifies it with a short read-back budget.

use super::cache::CorrelationCache;
use crate::adapters::traits::OverrideApi;
use crate::core::cancel::CancelToken;
use crate::core::verification::{Mismatch, OverrideReader, VerificationReport, Verifier, VerifyPolicy};
use crate::domain::ids::{RecordId, ScopeId};
use crate::domain::{ChangeEntry, ChangeSet, Channel, Result, RetryRecord};
use crate::log_retry_attempt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Override write and verification budgets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverridePolicy {
    /// Attempts per write in per-record mode
    pub max_attempts: u32,
    pub verify: VerifyPolicy,
}

impl Default for OverridePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            verify: VerifyPolicy {
                max_attempts: 3,
                wait: Duration::from_secs(2),
                ..VerifyPolicy::default()
            },
        }
    }
}

/// What happened to one record's override write
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideOutcome {
    Submitted { attempts: u32 },
    /// No correlation id; nothing was sent
    Unresolved,
    Failed { attempts: u32, error: String },
}

/// Tallies for the override channel over a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideSyncResult {
    pub succeeded: usize,
    pub failed: usize,

    /// Records a write was sent for, successful or not
    pub attempted: Vec<RecordId>,

    pub unresolved: Vec<RecordId>,
    pub failures: Vec<RetryRecord>,

    /// Filled in after read-back verification
    pub mismatches: Vec<Mismatch>,
}

impl OverrideSyncResult {
    pub fn record(&mut self, record_id: &RecordId, outcome: OverrideOutcome) {
        match outcome {
            OverrideOutcome::Submitted { .. } => {
                self.succeeded += 1;
                self.attempted.push(record_id.clone());
            }
            OverrideOutcome::Unresolved => {
                self.failed += 1;
                self.unresolved.push(record_id.clone());
            }
            OverrideOutcome::Failed { attempts, error } => {
                self.failed += 1;
                if attempts > 0 {
                    self.attempted.push(record_id.clone());
                }
                self.failures.push(RetryRecord {
                    record_id: record_id.clone(),
                    channel: Channel::Override,
                    attempts,
                    last_error: Some(error),
                });
            }
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

pub struct OverrideSynchronizer {
    api: Arc<dyn OverrideApi>,
    cache: CorrelationCache,
    policy: OverridePolicy,
}

impl OverrideSynchronizer {
    /// One synchronizer per run; its correlation cache lives as long as it does
    pub fn new(scope: ScopeId, api: Arc<dyn OverrideApi>, policy: OverridePolicy) -> Self {
        Self {
            cache: CorrelationCache::new(scope, api.clone()),
            api,
            policy,
        }
    }

    pub fn scope(&self) -> &ScopeId {
        self.cache.scope()
    }

    pub fn cache(&self) -> &CorrelationCache {
        &self.cache
    }

    /// Write with the per-record retry budget
    pub async fn submit_with_retry(&self, entry: &ChangeEntry) -> OverrideOutcome {
        self.submit(entry, self.policy.max_attempts).await
    }

    /// Single fire-and-forget write, used while building a batch
    pub async fn submit_once(&self, entry: &ChangeEntry) -> OverrideOutcome {
        self.submit(entry, 1).await
    }

    async fn submit(&self, entry: &ChangeEntry, max_attempts: u32) -> OverrideOutcome {
        let Some(value) = entry.override_value else {
            return OverrideOutcome::Submitted { attempts: 0 };
        };

        let correlation_id = match self.cache.resolve(&entry.record_id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!(record_id = %entry.record_id, "No correlation id; override skipped");
                return OverrideOutcome::Unresolved;
            }
            Err(e) => {
                tracing::warn!(record_id = %entry.record_id, error = %e, "Correlation lookup failed");
                return OverrideOutcome::Failed {
                    attempts: 0,
                    error: e.to_string(),
                };
            }
        };

        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self
                .api
                .write_override(self.scope(), &correlation_id, value)
                .await
            {
                Ok(()) => return OverrideOutcome::Submitted { attempts: attempt },
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        log_retry_attempt!(attempt, max_attempts, last_error);
                    }
                }
            }
        }

        tracing::warn!(
            record_id = %entry.record_id,
            attempts = max_attempts,
            error = %last_error,
            "Override write failed"
        );
        OverrideOutcome::Failed {
            attempts: max_attempts,
            error: last_error,
        }
    }

    /// Read back overrides for the given records
    pub async fn verify(
        &self,
        change_set: &ChangeSet,
        records: &[RecordId],
        cancel: &CancelToken,
    ) -> Result<VerificationReport> {
        let expected: Vec<(RecordId, f64)> = change_set
            .override_entries()
            .filter(|e| records.contains(&e.record_id))
            .filter_map(|e| e.override_value.map(|v| (e.record_id.clone(), v)))
            .collect();

        let reader = OverrideReader {
            api: self.api.as_ref(),
            scope: self.scope(),
        };
        Verifier::new(self.policy.verify)
            .verify(&reader, &expected, cancel)
            .await
    }

    /// Verify the records `result` says were written and fold the mismatches into it
    ///
    /// Closes out the override channel: after this `result` carries the
    /// final `succeeded`, `failed` and `mismatches` tallies.
    pub async fn verify_written(
        &self,
        change_set: &ChangeSet,
        result: &mut OverrideSyncResult,
        cancel: &CancelToken,
    ) -> Result<VerificationReport> {
        let report = self.verify(change_set, &result.attempted, cancel).await?;
        result.mismatches = report.mismatches.clone();

        tracing::info!(
            succeeded = result.succeeded,
            failed = result.failed,
            mismatches = result.mismatches.len(),
            "Override sync finished"
        );
        Ok(report)
    }

    /// Submit every override in the change set with retries, then verify
    ///
    /// Standalone entry point for syncing overrides outside a full run. The
    /// orchestrator interleaves the writes with primary submission and closes
    /// out through [`verify_written`](Self::verify_written).
    ///
    /// Records run one at a time; cancellation is honoured between records.
    pub async fn sync_overrides(
        &self,
        change_set: &ChangeSet,
        cancel: &CancelToken,
    ) -> Result<OverrideSyncResult> {
        let mut result = OverrideSyncResult::default();
        for entry in change_set.override_entries() {
            cancel.check("override sync")?;
            let outcome = self.submit_with_retry(entry).await;
            result.record(&entry.record_id, outcome);
        }

        self.verify_written(change_set, &mut result, cancel).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryLms;
    use crate::core::calculate::{compute, LinearScale};
    use crate::domain::{ExclusionSet, MeasurementId, Record, RemoteError};
    use std::str::FromStr;

    fn rid(s: &str) -> RecordId {
        RecordId::from_str(s).unwrap()
    }

    fn student(id: &str, score: f64) -> Record {
        Record::new(rid(id))
            .with_target_value(Some(score))
            .with_measurement(MeasurementId::from_str("m1").unwrap(), Some(score), "Quiz")
    }

    fn quick_policy() -> OverridePolicy {
        OverridePolicy {
            max_attempts: 3,
            verify: VerifyPolicy {
                max_attempts: 3,
                wait: Duration::from_millis(1),
                ..VerifyPolicy::default()
            },
        }
    }

    #[tokio::test]
    async fn test_sync_overrides_counts_each_outcome() {
        let records = vec![student("ok", 3.0), student("flaky", 2.0), student("orphan", 4.0)];
        let lms = Arc::new(
            InMemoryLms::new()
                .with_records(records.clone())
                .with_override_failures(&rid("flaky"), 2, RemoteError::RateLimited("429".into()))
                .without_correlation_id(&rid("orphan")),
        );
        let change_set = compute(&records, &ExclusionSet::default(), Some(&LinearScale::new(25.0)));
        assert_eq!(change_set.override_entries().count(), 3);

        let sync = OverrideSynchronizer::new(ScopeId::from_str("101").unwrap(), lms.clone(), quick_policy());
        let result = sync.sync_overrides(&change_set, &CancelToken::none()).await.unwrap();

        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.unresolved, vec![rid("orphan")]);
        assert!(result.mismatches.is_empty());
        assert_eq!(lms.override_write_count(&rid("flaky")).await, 3);
        assert_eq!(lms.override_write_count(&rid("orphan")).await, 0);
        assert_eq!(lms.override_value(&rid("ok")).await, Some(75.0));
    }

    #[tokio::test]
    async fn test_submit_once_does_not_retry() {
        let records = vec![student("flaky", 2.0)];
        let lms = Arc::new(
            InMemoryLms::new()
                .with_records(records.clone())
                .with_override_failures(&rid("flaky"), 1, RemoteError::Timeout("slow".into())),
        );
        let change_set = compute(&records, &ExclusionSet::default(), Some(&LinearScale::new(25.0)));
        let sync = OverrideSynchronizer::new(ScopeId::from_str("101").unwrap(), lms.clone(), quick_policy());

        let outcome = sync.submit_once(&change_set.entries()[0]).await;
        assert!(matches!(outcome, OverrideOutcome::Failed { attempts: 1, .. }));
        assert_eq!(lms.override_write_count(&rid("flaky")).await, 1);
    }

    #[tokio::test]
    async fn test_failed_writes_surface_as_mismatches() {
        let records = vec![student("down", 2.0)];
        let lms = Arc::new(
            InMemoryLms::new()
                .with_records(records.clone())
                .with_override_failures(&rid("down"), 10, RemoteError::ServerError {
                    status: 500,
                    message: "boom".into(),
                }),
        );
        let change_set = compute(&records, &ExclusionSet::default(), Some(&LinearScale::new(25.0)));
        let sync = OverrideSynchronizer::new(ScopeId::from_str("101").unwrap(), lms, quick_policy());

        let result = sync.sync_overrides(&change_set, &CancelToken::none()).await.unwrap();
        assert_eq!(result.failed, 1);
        assert_eq!(result.failures[0].attempts, 3);
        assert_eq!(result.mismatches.len(), 1);
        assert_eq!(result.mismatches[0].expected, 50.0);
    }

    #[tokio::test]
    async fn test_verify_written_closes_out_single_shot_writes() {
        let records = vec![student("ok", 3.0), student("down", 2.0)];
        let lms = Arc::new(
            InMemoryLms::new()
                .with_records(records.clone())
                .with_override_failures(&rid("down"), 1, RemoteError::Timeout("slow".into())),
        );
        let change_set = compute(&records, &ExclusionSet::default(), Some(&LinearScale::new(25.0)));
        let sync = OverrideSynchronizer::new(ScopeId::from_str("101").unwrap(), lms, quick_policy());

        let mut result = OverrideSyncResult::default();
        for entry in change_set.override_entries() {
            let outcome = sync.submit_once(entry).await;
            result.record(&entry.record_id, outcome);
        }
        let report = sync
            .verify_written(&change_set, &mut result, &CancelToken::none())
            .await
            .unwrap();

        assert_eq!(report.checked, 2);
        assert_eq!(report.matched(), 1);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.mismatches.len(), 1);
        assert_eq!(result.mismatches[0].record_id, rid("down"));
        assert_eq!(result.mismatches[0].channel, Channel::Override);
    }
}
