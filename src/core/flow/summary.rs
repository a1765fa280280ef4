//! End-of-run summary

use super::context::FlowContext;
use super::state::FlowState;
use crate::core::overrides::OverrideSyncResult;
use crate::core::submit::{retry_histogram, SubmissionMode};
use crate::core::verification::VerificationReport;
use crate::domain::ids::ScopeId;
use crate::domain::RetryRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Emitted on a successful `COMPLETE` for the host to persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRunMetadata {
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: u64,
}

/// Summary of a finished flow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub scope: ScopeId,

    pub mode: Option<SubmissionMode>,
    pub dry_run: bool,
    pub final_state: FlowState,

    pub records_fetched: usize,
    pub change_set_size: usize,

    /// Change-set records whose submission was accepted
    pub number_of_updates: usize,

    /// Records whose primary write failed both passes
    pub failures: Vec<RetryRecord>,

    /// Attempt count to number of records that needed it (only counts > 1)
    pub retry_histogram: BTreeMap<u32, usize>,

    pub verification: Option<VerificationReport>,
    pub overrides: OverrideSyncResult,
    pub override_verification: Option<VerificationReport>,

    pub last_run: Option<LastRunMetadata>,
    pub duration_ms: u64,
}

impl SyncSummary {
    /// Build the summary from a context that reached `COMPLETE`
    pub fn from_context(run_id: Uuid, context: &FlowContext, dry_run: bool) -> Self {
        let change_set_size = context.change_set().map(|c| c.len()).unwrap_or(0);
        let failures = context.primary_failures().to_vec();
        let number_of_updates = if context.is_submitted() {
            change_set_size.saturating_sub(failures.len())
        } else {
            0
        };
        let elapsed = context.elapsed();

        Self {
            run_id,
            scope: context.scope().clone(),
            mode: context.mode(),
            dry_run,
            final_state: FlowState::Complete,
            records_fetched: context.records_fetched(),
            change_set_size,
            number_of_updates,
            retry_histogram: retry_histogram(context.retries()),
            failures,
            verification: context.verification().cloned(),
            overrides: context.overrides().clone(),
            override_verification: context.override_verification().cloned(),
            last_run: (!dry_run).then(|| LastRunMetadata {
                completed_at: Utc::now(),
                duration_seconds: elapsed.as_secs(),
            }),
            duration_ms: elapsed.as_millis() as u64,
        }
    }

    /// Primary read-back did not see every value before giving up
    pub fn verification_incomplete(&self) -> bool {
        self.verification
            .as_ref()
            .map(|v| !v.converged)
            .unwrap_or(false)
    }

    /// No primary failures and no override failures
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty() && self.overrides.failed == 0
    }

    /// Format the summary as a human-readable string
    pub fn format_summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("📋 Sync Summary\n");
        summary.push_str(&format!("  Run: {}\n", self.run_id));
        summary.push_str(&format!("  Course: {}\n", self.scope));
        if self.dry_run {
            summary.push_str("  Mode: dry run (nothing submitted)\n");
        } else if let Some(mode) = self.mode {
            summary.push_str(&format!("  Mode: {mode}\n"));
        }
        summary.push_str(&format!("  Students fetched: {}\n", self.records_fetched));
        summary.push_str(&format!("  Changed: {}\n", self.change_set_size));
        summary.push_str(&format!("  ✅ Updated: {}\n", self.number_of_updates));

        if !self.retry_histogram.is_empty() {
            let retries: Vec<String> = self
                .retry_histogram
                .iter()
                .map(|(attempts, count)| format!("{count}×{attempts} attempts"))
                .collect();
            summary.push_str(&format!("  🔁 Retried: {}\n", retries.join(", ")));
        }

        if !self.failures.is_empty() {
            summary.push_str(&format!("  ❌ Failed: {}\n", self.failures.len()));
            for failure in &self.failures {
                summary.push_str(&format!(
                    "    - {} after {} attempts: {}\n",
                    failure.record_id,
                    failure.attempts,
                    failure.last_error.as_deref().unwrap_or("unknown error")
                ));
            }
        }

        if self.overrides.total() > 0 {
            summary.push_str(&format!(
                "  Overrides: {} ok, {} failed\n",
                self.overrides.succeeded, self.overrides.failed
            ));
        }
        if self.verification_incomplete() {
            summary.push_str("  ⚠️  Verification incomplete; some scores were not yet visible\n");
        }
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            run_id = %self.run_id,
            scope = %self.scope,
            mode = ?self.mode,
            dry_run = self.dry_run,
            records_fetched = self.records_fetched,
            change_set_size = self.change_set_size,
            number_of_updates = self.number_of_updates,
            failed = self.failures.len(),
            overrides_succeeded = self.overrides.succeeded,
            overrides_failed = self.overrides.failed,
            duration_ms = self.duration_ms,
            "Sync completed"
        );

        if self.verification_incomplete() {
            tracing::warn!(scope = %self.scope, "Primary verification did not converge");
        }
        for failure in &self.failures {
            tracing::warn!(
                record_id = %failure.record_id,
                attempts = failure.attempts,
                error = failure.last_error.as_deref().unwrap_or(""),
                "Record not updated"
            );
        }
    }
}
