//! Read-back verification
//!
//! Re-reads submitted values until every record matches within tolerance or
//! the attempt budget runs out. Running out is not an error: the report says
//! `converged = false` and lists what is still off.

use super::report::{within_tolerance, Mismatch, VerificationReport, DEFAULT_TOLERANCE};
use crate::adapters::traits::{OverrideApi, PrimaryApi, WriteTarget};
use crate::core::cancel::CancelToken;
use crate::domain::ids::{RecordId, ScopeId};
use crate::domain::{ChangeSet, Channel, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::time::{Duration, Instant};

/// Reads the current remote value of one channel
#[async_trait]
pub trait ValueReader: Send + Sync {
    fn channel(&self) -> Channel;

    async fn read(&self, record_id: &RecordId) -> Result<Option<f64>>;
}

pub struct PrimaryReader<'a> {
    pub api: &'a dyn PrimaryApi,
    pub target: &'a WriteTarget,
}

#[async_trait]
impl<'a> ValueReader for PrimaryReader<'a> {
    fn channel(&self) -> Channel {
        Channel::Primary
    }

    async fn read(&self, record_id: &RecordId) -> Result<Option<f64>> {
        self.api.read_value(self.target, record_id).await
    }
}

pub struct OverrideReader<'a> {
    pub api: &'a dyn OverrideApi,
    pub scope: &'a ScopeId,
}

#[async_trait]
impl<'a> ValueReader for OverrideReader<'a> {
    fn channel(&self) -> Channel {
        Channel::Override
    }

    async fn read(&self, record_id: &RecordId) -> Result<Option<f64>> {
        self.api.read_override(self.scope, record_id).await
    }
}

/// Verification budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerifyPolicy {
    pub tolerance: f64,
    pub max_attempts: u32,
    pub wait: Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_attempts: 50,
            wait: Duration::from_secs(2),
        }
    }
}

pub struct Verifier {
    policy: VerifyPolicy,
}

impl Verifier {
    pub fn new(policy: VerifyPolicy) -> Self {
        Self { policy }
    }

    /// Poll `reader` until every expected value is observed
    ///
    /// # Errors
    ///
    /// Only cancellation is an error. Read failures count as mismatches for
    /// that round.
    pub async fn verify(
        &self,
        reader: &dyn ValueReader,
        expected: &[(RecordId, f64)],
        cancel: &CancelToken,
    ) -> Result<VerificationReport> {
        let channel = reader.channel();
        if expected.is_empty() {
            return Ok(VerificationReport::empty(channel));
        }

        let started = Instant::now();
        let mut outstanding: Vec<(RecordId, f64)> = expected.to_vec();
        let mut mismatches: Vec<Mismatch> = Vec::new();
        let mut attempts = 0;

        while attempts < self.policy.max_attempts {
            attempts += 1;
            mismatches.clear();

            for (record_id, value) in &outstanding {
                match reader.read(record_id).await {
                    Ok(Some(actual)) if within_tolerance(*value, actual, self.policy.tolerance) => {}
                    Ok(actual) => mismatches.push(Mismatch {
                        record_id: record_id.clone(),
                        channel,
                        expected: *value,
                        actual,
                        error: None,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            record_id = %record_id,
                            channel = ?channel,
                            error = %e,
                            "Read-back failed"
                        );
                        mismatches.push(Mismatch {
                            record_id: record_id.clone(),
                            channel,
                            expected: *value,
                            actual: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }

            outstanding.retain(|(id, _)| mismatches.iter().any(|m| &m.record_id == id));
            if outstanding.is_empty() {
                break;
            }

            tracing::debug!(
                channel = ?channel,
                attempt = attempts,
                max_attempts = self.policy.max_attempts,
                remaining = outstanding.len(),
                "Values not yet visible"
            );
            if attempts < self.policy.max_attempts {
                cancel.sleep(self.policy.wait, "verification").await?;
            }
        }

        let converged = outstanding.is_empty();
        if converged {
            tracing::info!(channel = ?channel, checked = expected.len(), attempts = attempts, "Verification converged");
        } else {
            tracing::warn!(
                channel = ?channel,
                checked = expected.len(),
                mismatched = mismatches.len(),
                attempts = attempts,
                "Verification incomplete"
            );
        }

        Ok(VerificationReport {
            channel,
            verified_at: Utc::now(),
            checked: expected.len(),
            attempts,
            converged,
            mismatches: if converged { Vec::new() } else { mismatches },
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Verify primary values for the change set's primary entries
pub async fn verify_primary(
    api: &dyn PrimaryApi,
    target: &WriteTarget,
    change_set: &ChangeSet,
    policy: VerifyPolicy,
    cancel: &CancelToken,
) -> Result<VerificationReport> {
    let expected: Vec<(RecordId, f64)> = change_set
        .primary_entries()
        .map(|e| (e.record_id.clone(), e.value))
        .collect();
    Verifier::new(policy)
        .verify(&PrimaryReader { api, target }, &expected, cancel)
        .await
}

/// Verify override values for the change set's override entries
pub async fn verify_overrides(
    api: &dyn OverrideApi,
    scope: &ScopeId,
    change_set: &ChangeSet,
    policy: VerifyPolicy,
    cancel: &CancelToken,
) -> Result<VerificationReport> {
    let expected: Vec<(RecordId, f64)> = change_set
        .override_entries()
        .filter_map(|e| e.override_value.map(|v| (e.record_id.clone(), v)))
        .collect();
    Verifier::new(policy)
        .verify(&OverrideReader { api, scope }, &expected, cancel)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SyncError;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves `stale` until `visible_after` reads have happened
    struct LaggingReader {
        values: HashMap<RecordId, f64>,
        stale: Option<f64>,
        visible_after: u32,
        reads: AtomicU32,
    }

    #[async_trait]
    impl ValueReader for LaggingReader {
        fn channel(&self) -> Channel {
            Channel::Primary
        }

        async fn read(&self, record_id: &RecordId) -> Result<Option<f64>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n < self.visible_after {
                return Ok(self.stale);
            }
            Ok(self.values.get(record_id).copied())
        }
    }

    struct FailingReader;

    #[async_trait]
    impl ValueReader for FailingReader {
        fn channel(&self) -> Channel {
            Channel::Override
        }

        async fn read(&self, _record_id: &RecordId) -> Result<Option<f64>> {
            Err(SyncError::Remote(crate::domain::RemoteError::ServerError {
                status: 502,
                message: "bad gateway".into(),
            }))
        }
    }

    fn rid(s: &str) -> RecordId {
        RecordId::from_str(s).unwrap()
    }

    fn policy(max_attempts: u32) -> VerifyPolicy {
        VerifyPolicy {
            tolerance: DEFAULT_TOLERANCE,
            max_attempts,
            wait: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_converges_after_lag() {
        let reader = LaggingReader {
            values: HashMap::from([(rid("a"), 3.0), (rid("b"), 2.5)]),
            stale: Some(1.0),
            visible_after: 3,
            reads: AtomicU32::new(0),
        };
        let expected = vec![(rid("a"), 3.0), (rid("b"), 2.5)];

        let report = Verifier::new(policy(10))
            .verify(&reader, &expected, &CancelToken::none())
            .await
            .unwrap();

        assert!(report.converged);
        assert!(report.mismatches.is_empty());
        assert!(report.attempts >= 2);
        assert_eq!(report.checked, 2);
    }

    #[tokio::test]
    async fn test_tolerance_applies_to_read_back() {
        let reader = LaggingReader {
            values: HashMap::from([(rid("a"), 3.0009), (rid("b"), 3.0011)]),
            stale: None,
            visible_after: 0,
            reads: AtomicU32::new(0),
        };
        let expected = vec![(rid("a"), 3.0), (rid("b"), 3.0)];

        let report = Verifier::new(policy(2))
            .verify(&reader, &expected, &CancelToken::none())
            .await
            .unwrap();

        assert!(!report.converged);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].record_id, rid("b"));
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn test_read_errors_become_mismatches() {
        let report = Verifier::new(policy(3))
            .verify(&FailingReader, &[(rid("a"), 75.0)], &CancelToken::none())
            .await
            .unwrap();

        assert!(!report.converged);
        assert_eq!(report.attempts, 3);
        assert!(report.mismatches[0].error.as_deref().unwrap().contains("502"));
        assert_eq!(report.mismatches[0].channel, Channel::Override);
    }

    #[tokio::test]
    async fn test_nothing_to_verify() {
        let report = Verifier::new(policy(3))
            .verify(&FailingReader, &[], &CancelToken::none())
            .await
            .unwrap();
        assert!(report.converged);
        assert_eq!(report.attempts, 0);
    }
}
