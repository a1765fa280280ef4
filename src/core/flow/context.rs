//! Flow working state and typed deltas
//!
//! Handlers get a shared reference to [`FlowContext`] and hand back a
//! [`ContextDelta`]. Only the orchestrator calls [`FlowContext::merge`], which
//! rejects deltas that arrive out of order or would rewrite earlier results.

use crate::adapters::traits::JobStatus;
use crate::core::overrides::OverrideSyncResult;
use crate::core::submit::SubmissionMode;
use crate::core::verification::VerificationReport;
use crate::domain::ids::{JobHandle, ResourceId, ScopeId};
use crate::domain::{ChangeSet, ResourceKind, Result, RetryRecord, SyncError, TargetResources};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use super::state::FlowState;

/// What a handler wants merged into the context
#[derive(Debug, Clone, PartialEq)]
pub enum ContextDelta {
    None,
    SetupChecked {
        resolved: TargetResources,
    },
    ResourceCreated {
        kind: ResourceKind,
        id: ResourceId,
    },
    Calculated {
        change_set: ChangeSet,
        records_fetched: usize,
        mode: SubmissionMode,
    },
    Submitted {
        retries: Vec<RetryRecord>,
        failures: Vec<RetryRecord>,
        overrides: OverrideSyncResult,
        job: Option<JobHandle>,
    },
    JobFinished(JobStatus),
    Verified(VerificationReport),
    OverridesVerified(VerificationReport),
}

impl ContextDelta {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ContextDelta::None => "none",
            ContextDelta::SetupChecked { .. } => "setup_checked",
            ContextDelta::ResourceCreated { .. } => "resource_created",
            ContextDelta::Calculated { .. } => "calculated",
            ContextDelta::Submitted { .. } => "submitted",
            ContextDelta::JobFinished(_) => "job_finished",
            ContextDelta::Verified(_) => "verified",
            ContextDelta::OverridesVerified(_) => "overrides_verified",
        }
    }
}

/// A handler's result: the delta to merge and the state to move to
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub next: FlowState,
    pub delta: ContextDelta,
}

impl StepOutcome {
    pub fn new(next: FlowState, delta: ContextDelta) -> Self {
        Self { next, delta }
    }

    pub fn goto(next: FlowState) -> Self {
        Self::new(next, ContextDelta::None)
    }
}

#[derive(Debug, Clone)]
pub struct FlowContext {
    scope: ScopeId,
    resources: TargetResources,
    created: Vec<ResourceKind>,
    change_set: Option<ChangeSet>,
    mode: Option<SubmissionMode>,
    records_fetched: usize,
    submitted: bool,
    job: Option<JobHandle>,
    job_status: Option<JobStatus>,
    retries: Vec<RetryRecord>,
    primary_failures: Vec<RetryRecord>,
    overrides: OverrideSyncResult,
    verification: Option<VerificationReport>,
    override_verification: Option<VerificationReport>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl FlowContext {
    pub fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            resources: TargetResources::default(),
            created: Vec::new(),
            change_set: None,
            mode: None,
            records_fetched: 0,
            submitted: false,
            job: None,
            job_status: None,
            retries: Vec::new(),
            primary_failures: Vec::new(),
            overrides: OverrideSyncResult::default(),
            verification: None,
            override_verification: None,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn resources(&self) -> &TargetResources {
        &self.resources
    }

    /// Resource kinds created during this run
    pub fn created(&self) -> &[ResourceKind] {
        &self.created
    }

    pub fn change_set(&self) -> Option<&ChangeSet> {
        self.change_set.as_ref()
    }

    pub fn mode(&self) -> Option<SubmissionMode> {
        self.mode
    }

    pub fn records_fetched(&self) -> usize {
        self.records_fetched
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn job(&self) -> Option<&JobHandle> {
        self.job.as_ref()
    }

    pub fn job_status(&self) -> Option<&JobStatus> {
        self.job_status.as_ref()
    }

    /// Per-record primary attempt bookkeeping
    pub fn retries(&self) -> &[RetryRecord] {
        &self.retries
    }

    pub fn primary_failures(&self) -> &[RetryRecord] {
        &self.primary_failures
    }

    pub fn overrides(&self) -> &OverrideSyncResult {
        &self.overrides
    }

    pub fn verification(&self) -> Option<&VerificationReport> {
        self.verification.as_ref()
    }

    pub fn override_verification(&self) -> Option<&VerificationReport> {
        self.override_verification.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Apply a handler's delta
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Fatal`] when the delta contradicts what the
    /// context already holds, e.g. a resolved id changing or a second
    /// calculation within one run.
    pub fn merge(&mut self, delta: ContextDelta) -> Result<()> {
        match delta {
            ContextDelta::None => {}
            ContextDelta::SetupChecked { resolved } => {
                for kind in ResourceKind::ALL {
                    if let Some(id) = resolved.get(kind) {
                        self.merge_resource(kind, id.clone())?;
                    }
                }
            }
            ContextDelta::ResourceCreated { kind, id } => {
                if self.resources.get(kind).is_some() {
                    return Err(self.rejected("resource_created", &format!("{kind} already resolved")));
                }
                self.resources.set(kind, id);
                self.created.push(kind);
            }
            ContextDelta::Calculated {
                change_set,
                records_fetched,
                mode,
            } => {
                if self.change_set.is_some() {
                    return Err(self.rejected("calculated", "change set already computed"));
                }
                self.change_set = Some(change_set);
                self.records_fetched = records_fetched;
                self.mode = Some(mode);
            }
            ContextDelta::Submitted {
                retries,
                failures,
                overrides,
                job,
            } => {
                if self.change_set.is_none() || self.submitted {
                    return Err(self.rejected("submitted", "nothing to submit"));
                }
                self.submitted = true;
                self.retries = retries;
                self.primary_failures = failures;
                self.overrides = overrides;
                self.job = job;
            }
            ContextDelta::JobFinished(status) => {
                if self.job.is_none() {
                    return Err(self.rejected("job_finished", "no job was submitted"));
                }
                self.job_status = Some(status);
            }
            ContextDelta::Verified(report) => {
                if !self.submitted || self.verification.is_some() {
                    return Err(self.rejected("verified", "out of order"));
                }
                self.verification = Some(report);
            }
            ContextDelta::OverridesVerified(report) => {
                if self.verification.is_none() || self.override_verification.is_some() {
                    return Err(self.rejected("overrides_verified", "out of order"));
                }
                self.overrides.mismatches = report.mismatches.clone();
                self.override_verification = Some(report);
            }
        }
        Ok(())
    }

    fn merge_resource(&mut self, kind: ResourceKind, id: ResourceId) -> Result<()> {
        match self.resources.get(kind) {
            Some(existing) if existing != &id => Err(self.rejected(
                "setup_checked",
                &format!("{kind} id changed from {existing} to {id}"),
            )),
            Some(_) => Ok(()),
            None => {
                self.resources.set(kind, id);
                Ok(())
            }
        }
    }

    fn rejected(&self, delta: &str, reason: &str) -> SyncError {
        SyncError::Fatal(format!("context merge '{delta}' rejected for scope {}: {reason}", self.scope))
    }
}
