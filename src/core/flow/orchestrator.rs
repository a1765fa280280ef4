//! Flow orchestrator
//!
//! Drives one sync run through the state machine. Each state has a handler
//! that reads the context and returns a [`StepOutcome`]; the orchestrator
//! merges the delta, validates the transition and notifies the progress sink.
//!
//! # Example
//!
//! ```no_run
//! use outcome_sync::adapters::{Collaborators, InMemoryLms};
//! use outcome_sync::core::flow::{FlowSettings, Orchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let lms = Arc::new(InMemoryLms::new());
//! let mut orchestrator = Orchestrator::new(
//!     Collaborators::from_backend(lms),
//!     FlowSettings { auto_create: true, ..FlowSettings::default() },
//! );
//! let summary = orchestrator.run("4521").await?;
//! println!("{}", summary.format_summary());
//! # Ok(())
//! # }
//! ```

use super::context::{ContextDelta, FlowContext, StepOutcome};
use super::settings::FlowSettings;
use super::state::{check_transition, FlowState};
use super::summary::SyncSummary;
use crate::adapters::traits::{
    AutoApprove, Collaborators, DeclineAll, ProvisionApproval, WriteTarget,
};
use crate::core::calculate::{compute, OverrideTransform};
use crate::core::cancel::CancelToken;
use crate::core::overrides::OverrideSynchronizer;
use crate::core::progress::{FlowProgress, ProgressSink, TracingProgressSink};
use crate::core::submit::{
    poll_until_terminal, select_mode, BatchSubmitter, PerRecordSubmitter, SubmissionMode,
};
use crate::core::verification::{verify_primary, VerificationReport};
use crate::domain::ids::{MeasurementId, RecordId, ScopeId};
use crate::domain::{ChangeSet, Channel, ResourceKind, Result, SyncError, TargetResources};
use crate::{log_error_with_context, log_flow_transition};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

pub struct Orchestrator {
    collaborators: Collaborators,
    settings: FlowSettings,
    approval: Arc<dyn ProvisionApproval>,
    sink: Arc<dyn ProgressSink>,
    cancel: CancelToken,
    state: FlowState,
    history: Vec<FlowState>,
    context: Option<FlowContext>,
}

impl Orchestrator {
    /// Missing resources are created only if `settings.auto_create` is set,
    /// unless an approval is supplied with [`Orchestrator::with_approval`]
    pub fn new(collaborators: Collaborators, settings: FlowSettings) -> Self {
        let approval: Arc<dyn ProvisionApproval> = if settings.auto_create {
            Arc::new(AutoApprove)
        } else {
            Arc::new(DeclineAll)
        };
        Self {
            collaborators,
            settings,
            approval,
            sink: Arc::new(TracingProgressSink),
            cancel: CancelToken::none(),
            state: FlowState::Idle,
            history: vec![FlowState::Idle],
            context: None,
        }
    }

    pub fn with_approval(mut self, approval: Arc<dyn ProvisionApproval>) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Stop at the next safe point once `signal` turns true
    pub fn with_cancellation(mut self, signal: watch::Receiver<bool>) -> Self {
        self.cancel = CancelToken::from_receiver(signal);
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// States visited by the last run, starting at `IDLE`
    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    /// Context of the last run
    pub fn context(&self) -> Option<&FlowContext> {
        self.context.as_ref()
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Run one sync for a scope
    ///
    /// A finished flow is never resumed; each call starts from a fresh
    /// context.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Validation`] before any transition if `scope` is blank
    ///   or a run is already in progress
    /// - any flow-level failure, after the state machine has passed through
    ///   `ERROR` back to `IDLE`
    pub async fn run(&mut self, scope: &str) -> Result<SyncSummary> {
        if !matches!(self.state, FlowState::Idle | FlowState::Complete) {
            return Err(SyncError::Validation(format!(
                "a flow is already in progress ({})",
                self.state
            )));
        }
        let scope = ScopeId::new(scope).map_err(SyncError::Validation)?;

        self.state = FlowState::Idle;
        self.history = vec![FlowState::Idle];
        let run_id = Uuid::new_v4();
        let overrides = self.settings.overrides.map(|policy| {
            OverrideSynchronizer::new(scope.clone(), self.collaborators.overrides.clone(), policy)
        });
        let mut context = FlowContext::new(scope);

        tracing::info!(
            run_id = %run_id,
            scope = %context.scope(),
            dry_run = self.settings.dry_run,
            "Starting sync"
        );

        let outcome = self.drive(&mut context, overrides.as_ref()).await;
        let result = match outcome {
            Ok(()) => {
                let summary = SyncSummary::from_context(run_id, &context, self.settings.dry_run);
                summary.log_summary();
                Ok(summary)
            }
            Err(e) => {
                log_error_with_context!(e, "Sync flow failed");
                self.fail(&context, &e);
                Err(e)
            }
        };
        self.context = Some(context);
        result
    }

    async fn drive(
        &mut self,
        context: &mut FlowContext,
        overrides: Option<&OverrideSynchronizer>,
    ) -> Result<()> {
        self.transition(FlowState::CheckingSetup, context)?;

        while !self.state.is_terminal() {
            self.cancel.check("sync flow")?;
            let step = self.step(context, overrides).await?;
            tracing::debug!(state = %self.state, delta = step.delta.name(), "Merging step result");
            context.merge(step.delta)?;
            self.transition(step.next, context)?;
        }
        Ok(())
    }

    async fn step(
        &self,
        context: &FlowContext,
        overrides: Option<&OverrideSynchronizer>,
    ) -> Result<StepOutcome> {
        match self.state {
            FlowState::CheckingSetup => self.check_setup(context).await,
            FlowState::CreatingOutcome
            | FlowState::CreatingContainer
            | FlowState::CreatingCriterion => {
                let kind = self.state.creation_kind().ok_or_else(|| self.no_handler())?;
                self.create_resource(kind, context).await
            }
            FlowState::Calculating => self.calculate(context).await,
            FlowState::UpdatingRecords => self.update_records(context, overrides).await,
            FlowState::PollingProgress => self.poll_job(context).await,
            FlowState::Verifying => self.verify(context).await,
            FlowState::VerifyingOverrides => self.verify_overrides(context, overrides).await,
            FlowState::Idle | FlowState::Complete | FlowState::Error => Err(self.no_handler()),
        }
    }

    fn no_handler(&self) -> SyncError {
        SyncError::InvalidTransition {
            from: self.state.to_string(),
            to: self.state.to_string(),
        }
    }

    async fn check_setup(&self, context: &FlowContext) -> Result<StepOutcome> {
        let mut resolved = TargetResources::default();

        for kind in ResourceKind::ALL {
            let spec = self.settings.resource_spec(kind, &resolved);
            match self
                .collaborators
                .provisioner
                .find_resource(context.scope(), &spec)
                .await?
            {
                Some(id) => resolved.set(kind, id),
                None if context.resources().get(kind).is_some() => {
                    return Err(SyncError::Fatal(format!(
                        "{kind} '{}' was resolved earlier in this run but can no longer be found",
                        spec.name
                    )));
                }
                None if self.settings.dry_run => {
                    return Err(SyncError::Validation(format!(
                        "{kind} '{}' does not exist; a dry run creates nothing",
                        spec.name
                    )));
                }
                None => {
                    tracing::info!(kind = %kind, name = %spec.name, "Resource missing");
                    return Ok(StepOutcome::new(
                        FlowState::creating(kind),
                        ContextDelta::SetupChecked { resolved },
                    ));
                }
            }
        }

        Ok(StepOutcome::new(
            FlowState::Calculating,
            ContextDelta::SetupChecked { resolved },
        ))
    }

    async fn create_resource(&self, kind: ResourceKind, context: &FlowContext) -> Result<StepOutcome> {
        let spec = self.settings.resource_spec(kind, context.resources());
        if !self.approval.approve(&spec) {
            return Err(SyncError::UserAbort(format!(
                "creation of {kind} '{}' was declined",
                spec.name
            )));
        }

        let id = self
            .collaborators
            .provisioner
            .create_resource(context.scope(), &spec)
            .await?;
        tracing::info!(kind = %kind, id = %id, name = %spec.name, "Resource created");
        Ok(StepOutcome::new(
            FlowState::CheckingSetup,
            ContextDelta::ResourceCreated { kind, id },
        ))
    }

    async fn calculate(&self, context: &FlowContext) -> Result<StepOutcome> {
        let records = self
            .collaborators
            .records
            .fetch_records(context.scope(), context.resources())
            .await?;

        let mut exclusions = self.settings.exclusions.clone();
        if let Some(container) = &context.resources().container_id {
            let id = MeasurementId::new(container.as_str()).map_err(SyncError::Validation)?;
            exclusions = exclusions.with_measurement_id(id);
        }
        let transform: Option<&dyn OverrideTransform> = self
            .settings
            .overrides
            .is_some()
            .then(|| self.settings.transform.as_ref());

        let change_set = compute(&records, &exclusions, transform);
        let mode = select_mode(change_set.len(), self.settings.batch_threshold);
        self.notify(
            context,
            FlowState::Calculating,
            format!("{} of {} students need updates", change_set.len(), records.len()),
        );

        let next = if change_set.is_empty() {
            tracing::info!(scope = %context.scope(), "Nothing to update");
            FlowState::Complete
        } else if self.settings.dry_run {
            tracing::info!(changed = change_set.len(), mode = %mode, "Dry run; skipping submission");
            FlowState::Complete
        } else {
            FlowState::UpdatingRecords
        };

        Ok(StepOutcome::new(
            next,
            ContextDelta::Calculated {
                change_set,
                records_fetched: records.len(),
                mode,
            },
        ))
    }

    async fn update_records(
        &self,
        context: &FlowContext,
        overrides: Option<&OverrideSynchronizer>,
    ) -> Result<StepOutcome> {
        let change_set = required_change_set(context)?;
        let target = WriteTarget::from_resources(context.scope(), context.resources())?;
        let primary = self.collaborators.primary.clone();

        match context.mode().unwrap_or(SubmissionMode::PerRecord) {
            SubmissionMode::PerRecord => {
                let report = PerRecordSubmitter::new(primary, self.settings.per_record)
                    .submit(&target, change_set, overrides, &self.cancel)
                    .await?;
                Ok(StepOutcome::new(
                    FlowState::Verifying,
                    ContextDelta::Submitted {
                        retries: report.records,
                        failures: report.failures,
                        overrides: report.overrides,
                        job: None,
                    },
                ))
            }
            SubmissionMode::Batch => {
                let report = BatchSubmitter::new(primary)
                    .submit(&target, change_set, overrides, &self.cancel)
                    .await?;
                let next = if report.job.is_some() {
                    FlowState::PollingProgress
                } else {
                    FlowState::Verifying
                };
                Ok(StepOutcome::new(
                    next,
                    ContextDelta::Submitted {
                        retries: Vec::new(),
                        failures: Vec::new(),
                        overrides: report.overrides,
                        job: report.job,
                    },
                ))
            }
        }
    }

    async fn poll_job(&self, context: &FlowContext) -> Result<StepOutcome> {
        let job = context
            .job()
            .ok_or_else(|| SyncError::Fatal("no job to poll".to_string()))?;
        let status = poll_until_terminal(
            self.collaborators.primary.as_ref(),
            job,
            self.settings.poll,
            &self.cancel,
            self.sink.as_ref(),
        )
        .await?;
        Ok(StepOutcome::new(
            FlowState::Verifying,
            ContextDelta::JobFinished(status),
        ))
    }

    async fn verify(&self, context: &FlowContext) -> Result<StepOutcome> {
        let change_set = required_change_set(context)?;
        let target = WriteTarget::from_resources(context.scope(), context.resources())?;

        let failed: Vec<&RecordId> = context
            .primary_failures()
            .iter()
            .map(|f| &f.record_id)
            .collect();
        let submitted = ChangeSet::new(
            change_set
                .primary_entries()
                .filter(|e| !failed.contains(&&e.record_id))
                .cloned()
                .collect(),
        );

        let report = verify_primary(
            self.collaborators.primary.as_ref(),
            &target,
            &submitted,
            self.settings.verify,
            &self.cancel,
        )
        .await?;
        self.notify(
            context,
            FlowState::Verifying,
            format!("{}/{} scores confirmed", report.matched(), report.checked),
        );
        Ok(StepOutcome::new(
            FlowState::VerifyingOverrides,
            ContextDelta::Verified(report),
        ))
    }

    async fn verify_overrides(
        &self,
        context: &FlowContext,
        overrides: Option<&OverrideSynchronizer>,
    ) -> Result<StepOutcome> {
        let report = match overrides {
            Some(sync) => {
                let change_set = required_change_set(context)?;
                let mut written = context.overrides().clone();
                sync.verify_written(change_set, &mut written, &self.cancel)
                    .await?
            }
            None => VerificationReport::empty(Channel::Override),
        };

        if !report.mismatches.is_empty() {
            tracing::warn!(
                mismatches = report.mismatches.len(),
                "Grade overrides not confirmed"
            );
        }
        Ok(StepOutcome::new(
            FlowState::Complete,
            ContextDelta::OverridesVerified(report),
        ))
    }

    fn transition(&mut self, next: FlowState, context: &FlowContext) -> Result<()> {
        let pending = match self.state {
            FlowState::CheckingSetup => context.resources().first_missing(),
            _ => None,
        };
        check_transition(self.state, next, pending)?;
        self.enter(next, context, next.description().to_string());
        Ok(())
    }

    fn enter(&mut self, next: FlowState, context: &FlowContext, message: String) {
        log_flow_transition!(self.state, next);
        self.state = next;
        self.history.push(next);
        self.notify(context, next, message);
    }

    /// Route a failed run through `ERROR` back to `IDLE`
    fn fail(&mut self, context: &FlowContext, error: &SyncError) {
        if self.state.can_transition_to(FlowState::Error) {
            self.enter(FlowState::Error, context, format!("Sync failed: {error}"));
        }
        if self.state == FlowState::Error {
            self.enter(FlowState::Idle, context, FlowState::Idle.description().to_string());
        }
    }

    fn notify(&self, context: &FlowContext, state: FlowState, message: String) {
        self.sink.notify(&FlowProgress::new(
            state,
            message,
            context.elapsed().as_secs(),
        ));
    }
}

fn required_change_set(context: &FlowContext) -> Result<&ChangeSet> {
    context
        .change_set()
        .ok_or_else(|| SyncError::Fatal("no change set computed".to_string()))
}
