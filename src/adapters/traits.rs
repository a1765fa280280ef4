//! Collaborator traits consumed by the sync engine
//!
//! The engine never talks HTTP directly. Everything remote goes through these
//! traits so the flow can run against the LMS client or the in-memory backend.

use crate::domain::ids::{CorrelationId, JobHandle, RecordId, ResourceId, ScopeId};
use crate::domain::{DerivedValue, Record, ResourceSpec, Result, SyncError, TargetResources};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Where primary values are written: one criterion on one container, in one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteTarget {
    pub scope: ScopeId,
    pub container_id: ResourceId,
    pub criterion_id: ResourceId,
}

impl WriteTarget {
    /// Build a target from resolved resources
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Validation`] if the container or criterion is unresolved.
    pub fn from_resources(scope: &ScopeId, resources: &TargetResources) -> Result<Self> {
        let (container_id, criterion_id) = resources.write_target().ok_or_else(|| {
            SyncError::Validation(format!(
                "Resources for scope {scope} are not fully resolved"
            ))
        })?;
        Ok(Self {
            scope: scope.clone(),
            container_id: container_id.clone(),
            criterion_id: criterion_id.clone(),
        })
    }
}

/// Remote job state as reported by the progress endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Other(String),
}

impl JobState {
    /// Map a remote workflow state string onto a job state
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "queued" | "pending" => JobState::Queued,
            "running" => JobState::Running,
            "completed" | "complete" => JobState::Completed,
            "failed" => JobState::Failed,
            other => JobState::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => f.write_str("queued"),
            JobState::Running => f.write_str("running"),
            JobState::Completed => f.write_str("completed"),
            JobState::Failed => f.write_str("failed"),
            JobState::Other(s) => f.write_str(s),
        }
    }
}

/// Snapshot of an asynchronous job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,

    /// Percent complete, when the remote reports it
    pub completion: Option<f64>,

    pub message: Option<String>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            completion: None,
            message: None,
        }
    }
}

/// Read-only snapshot of records for a scope
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record with its measurements and current target/override values
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be read.
    async fn fetch_records(
        &self,
        scope: &ScopeId,
        resources: &TargetResources,
    ) -> Result<Vec<Record>>;
}

/// Lookup and creation of setup resources
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Find an existing resource matching `spec`
    async fn find_resource(&self, scope: &ScopeId, spec: &ResourceSpec)
        -> Result<Option<ResourceId>>;

    /// Create the resource and return its id
    async fn create_resource(&self, scope: &ScopeId, spec: &ResourceSpec) -> Result<ResourceId>;
}

/// Primary value channel
#[async_trait]
pub trait PrimaryApi: Send + Sync {
    async fn write_value(&self, target: &WriteTarget, record_id: &RecordId, value: f64)
        -> Result<()>;

    async fn read_value(&self, target: &WriteTarget, record_id: &RecordId) -> Result<Option<f64>>;

    /// Submit every value in one request; returns a job to poll
    async fn submit_batch(&self, target: &WriteTarget, values: &[DerivedValue])
        -> Result<JobHandle>;

    async fn read_job_status(&self, job: &JobHandle) -> Result<JobStatus>;
}

/// Secondary (override) value channel
#[async_trait]
pub trait OverrideApi: Send + Sync {
    /// Every record's correlation id in the scope, fetched in one go
    async fn list_correlation_ids(&self, scope: &ScopeId)
        -> Result<HashMap<RecordId, CorrelationId>>;

    async fn write_override(
        &self,
        scope: &ScopeId,
        correlation_id: &CorrelationId,
        value: f64,
    ) -> Result<()>;

    async fn read_override(&self, scope: &ScopeId, record_id: &RecordId) -> Result<Option<f64>>;
}

/// Host decision on whether a missing resource may be created
pub trait ProvisionApproval: Send + Sync {
    fn approve(&self, spec: &ResourceSpec) -> bool;
}

/// Approves every creation
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl ProvisionApproval for AutoApprove {
    fn approve(&self, _spec: &ResourceSpec) -> bool {
        true
    }
}

/// Declines every creation
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl ProvisionApproval for DeclineAll {
    fn approve(&self, _spec: &ResourceSpec) -> bool {
        false
    }
}

/// The full set of remote collaborators a flow needs
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordSource>,
    pub provisioner: Arc<dyn ResourceProvisioner>,
    pub primary: Arc<dyn PrimaryApi>,
    pub overrides: Arc<dyn OverrideApi>,
}

impl Collaborators {
    /// Use one backend for every collaborator
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RecordSource + ResourceProvisioner + PrimaryApi + OverrideApi + 'static,
    {
        Self {
            records: backend.clone(),
            provisioner: backend.clone(),
            primary: backend.clone(),
            overrides: backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;
    use std::str::FromStr;

    #[test]
    fn test_job_state_parse() {
        assert_eq!(JobState::parse("queued"), JobState::Queued);
        assert_eq!(JobState::parse("RUNNING"), JobState::Running);
        assert_eq!(JobState::parse("completed"), JobState::Completed);
        assert_eq!(JobState::parse("failed"), JobState::Failed);
        assert_eq!(
            JobState::parse("paused"),
            JobState::Other("paused".to_string())
        );
    }

    #[test]
    fn test_job_state_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Other("paused".to_string()).is_terminal());
    }

    #[test]
    fn test_write_target_requires_container_and_criterion() {
        let scope = ScopeId::from_str("101").unwrap();
        let mut resources = TargetResources::default();
        resources.set(ResourceKind::Outcome, ResourceId::from_str("o1").unwrap());
        assert!(WriteTarget::from_resources(&scope, &resources).is_err());

        resources.set(ResourceKind::Container, ResourceId::from_str("a1").unwrap());
        resources.set(ResourceKind::Criterion, ResourceId::from_str("c1").unwrap());
        let target = WriteTarget::from_resources(&scope, &resources).unwrap();
        assert_eq!(target.container_id.as_str(), "a1");
    }
}
