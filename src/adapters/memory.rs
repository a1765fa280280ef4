//! In-process LMS backend
//!
//! Implements every collaborator trait against in-memory state. Failures,
//! read lag and job progress can be scripted, which makes it the backend of
//! choice for tests and for hosts embedding the engine without a network.

use super::traits::{
    JobState, JobStatus, OverrideApi, PrimaryApi, RecordSource, ResourceProvisioner, WriteTarget,
};
use crate::domain::ids::{CorrelationId, JobHandle, RecordId, ResourceId, ScopeId};
use crate::domain::{
    DerivedValue, Record, RemoteError, ResourceKind, ResourceSpec, Result, SyncError,
    TargetResources,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct LaggedRead {
    stale: Option<f64>,
    remaining: u32,
}

#[derive(Debug, Default)]
struct PendingJob {
    values: Vec<DerivedValue>,
    script: VecDeque<JobStatus>,
    applied: bool,
}

#[derive(Debug, Default)]
struct LmsState {
    records: Vec<Record>,
    primary: HashMap<RecordId, f64>,
    overrides: HashMap<RecordId, f64>,
    correlation_ids: HashMap<RecordId, CorrelationId>,

    resources: HashMap<ResourceKind, (String, ResourceId)>,
    failing_creations: HashSet<ResourceKind>,
    next_id: u64,

    write_failures: HashMap<RecordId, VecDeque<RemoteError>>,
    override_failures: HashMap<RecordId, VecDeque<RemoteError>>,
    read_lag: u32,
    primary_lag: HashMap<RecordId, LaggedRead>,
    override_lag: HashMap<RecordId, LaggedRead>,

    job_script: VecDeque<JobStatus>,
    job_status_failures: VecDeque<RemoteError>,
    jobs: HashMap<JobHandle, PendingJob>,

    primary_writes: HashMap<RecordId, u32>,
    override_writes: HashMap<RecordId, u32>,
    batches: Vec<Vec<DerivedValue>>,
    correlation_listings: u32,
    created: Vec<ResourceKind>,
}

impl LmsState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn read_lagged(
        lag: &mut HashMap<RecordId, LaggedRead>,
        current: &HashMap<RecordId, f64>,
        record_id: &RecordId,
    ) -> Option<f64> {
        if let Some(entry) = lag.get_mut(record_id) {
            if entry.remaining > 0 {
                entry.remaining -= 1;
                return entry.stale;
            }
        }
        current.get(record_id).copied()
    }
}

/// Scriptable in-memory LMS
///
/// # Example
///
/// ```
/// use outcome_sync::adapters::InMemoryLms;
/// use outcome_sync::domain::{MeasurementId, Record, RecordId};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let student = Record::new(RecordId::new("1001")?)
///     .with_measurement(MeasurementId::new("a1")?, Some(4.0), "Quiz 1");
/// let lms = InMemoryLms::new().with_record(student).with_read_lag(2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLms {
    state: Mutex<LmsState>,
}

impl InMemoryLms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; its target and override values seed the remote state
    pub fn with_record(mut self, record: Record) -> Self {
        let state = self.state.get_mut();
        let id = record.record_id.clone();
        if let Some(v) = record.target_value {
            state.primary.insert(id.clone(), v);
        }
        if let Some(v) = record.override_value {
            state.overrides.insert(id.clone(), v);
        }
        if let Ok(correlation) = CorrelationId::new(format!("enr-{}", id.as_str())) {
            state.correlation_ids.insert(id, correlation);
        }
        state.records.push(record);
        self
    }

    pub fn with_records(self, records: impl IntoIterator<Item = Record>) -> Self {
        records.into_iter().fold(self, |lms, r| lms.with_record(r))
    }

    /// Pre-provision a resource so setup finds it
    pub fn with_resource(mut self, kind: ResourceKind, name: &str, id: ResourceId) -> Self {
        self.state
            .get_mut()
            .resources
            .insert(kind, (name.to_string(), id));
        self
    }

    /// Make creation of this resource kind fail
    pub fn with_failing_creation(mut self, kind: ResourceKind) -> Self {
        self.state.get_mut().failing_creations.insert(kind);
        self
    }

    /// Fail the next `times` primary writes for a record with the given error
    pub fn with_write_failures(mut self, record_id: &RecordId, times: u32, error: RemoteError) -> Self {
        let queue = self
            .state
            .get_mut()
            .write_failures
            .entry(record_id.clone())
            .or_default();
        queue.extend(std::iter::repeat(error).take(times as usize));
        self
    }

    /// Fail the next `times` override writes for a record
    pub fn with_override_failures(
        mut self,
        record_id: &RecordId,
        times: u32,
        error: RemoteError,
    ) -> Self {
        let queue = self
            .state
            .get_mut()
            .override_failures
            .entry(record_id.clone())
            .or_default();
        queue.extend(std::iter::repeat(error).take(times as usize));
        self
    }

    /// Remove a record's correlation id
    pub fn without_correlation_id(mut self, record_id: &RecordId) -> Self {
        self.state.get_mut().correlation_ids.remove(record_id);
        self
    }

    /// After each write, the next `reads` reads of that record return the old value
    pub fn with_read_lag(mut self, reads: u32) -> Self {
        self.state.get_mut().read_lag = reads;
        self
    }

    /// States the next submitted batch job reports, one per status read
    ///
    /// Once the script runs out the job reports `completed`. Values are applied
    /// when `completed` is first reported.
    pub fn with_job_script(mut self, states: impl IntoIterator<Item = JobState>) -> Self {
        self.state.get_mut().job_script = states.into_iter().map(JobStatus::new).collect();
        self
    }

    /// Fail the next `times` job status reads with the given error
    pub fn with_job_status_failures(mut self, times: u32, error: RemoteError) -> Self {
        self.state
            .get_mut()
            .job_status_failures
            .extend(std::iter::repeat(error).take(times as usize));
        self
    }

    pub async fn primary_value(&self, record_id: &RecordId) -> Option<f64> {
        self.state.lock().await.primary.get(record_id).copied()
    }

    pub async fn override_value(&self, record_id: &RecordId) -> Option<f64> {
        self.state.lock().await.overrides.get(record_id).copied()
    }

    /// Primary write calls made for a record, failed ones included
    pub async fn primary_write_count(&self, record_id: &RecordId) -> u32 {
        self.state
            .lock()
            .await
            .primary_writes
            .get(record_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn override_write_count(&self, record_id: &RecordId) -> u32 {
        self.state
            .lock()
            .await
            .override_writes
            .get(record_id)
            .copied()
            .unwrap_or(0)
    }

    pub async fn batches(&self) -> Vec<Vec<DerivedValue>> {
        self.state.lock().await.batches.clone()
    }

    pub async fn correlation_listing_count(&self) -> u32 {
        self.state.lock().await.correlation_listings
    }

    pub async fn created_resources(&self) -> Vec<ResourceKind> {
        self.state.lock().await.created.clone()
    }

    /// Change a measurement value between runs
    pub async fn set_measurement(&self, record_id: &RecordId, measurement: &str, value: Option<f64>) {
        let mut state = self.state.lock().await;
        if let Some(record) = state.records.iter_mut().find(|r| &r.record_id == record_id) {
            for m in record
                .measurements
                .iter_mut()
                .filter(|m| m.measurement_id.as_str() == measurement)
            {
                m.value = value;
            }
        }
    }
}

#[async_trait]
impl RecordSource for InMemoryLms {
    async fn fetch_records(
        &self,
        _scope: &ScopeId,
        _resources: &TargetResources,
    ) -> Result<Vec<Record>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .map(|r| {
                let mut snapshot = r.clone();
                snapshot.target_value = state.primary.get(&r.record_id).copied();
                snapshot.override_value = state.overrides.get(&r.record_id).copied();
                snapshot
            })
            .collect())
    }
}

#[async_trait]
impl ResourceProvisioner for InMemoryLms {
    async fn find_resource(
        &self,
        _scope: &ScopeId,
        spec: &ResourceSpec,
    ) -> Result<Option<ResourceId>> {
        let state = self.state.lock().await;
        Ok(state
            .resources
            .get(&spec.kind)
            .filter(|(name, _)| name == &spec.name)
            .map(|(_, id)| id.clone()))
    }

    async fn create_resource(&self, _scope: &ScopeId, spec: &ResourceSpec) -> Result<ResourceId> {
        let mut state = self.state.lock().await;
        if state.failing_creations.contains(&spec.kind) {
            return Err(SyncError::Remote(RemoteError::ClientError {
                status: 400,
                message: format!("cannot create {}", spec.kind),
            }));
        }
        let id = ResourceId::new(state.allocate_id(spec.kind.as_str()))
            .map_err(SyncError::Validation)?;
        state
            .resources
            .insert(spec.kind, (spec.name.clone(), id.clone()));
        state.created.push(spec.kind);
        Ok(id)
    }
}

#[async_trait]
impl PrimaryApi for InMemoryLms {
    async fn write_value(
        &self,
        _target: &WriteTarget,
        record_id: &RecordId,
        value: f64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        *state.primary_writes.entry(record_id.clone()).or_insert(0) += 1;

        if let Some(error) = state
            .write_failures
            .get_mut(record_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error.into());
        }

        let stale = state.primary.insert(record_id.clone(), value);
        let remaining = state.read_lag;
        state
            .primary_lag
            .insert(record_id.clone(), LaggedRead { stale, remaining });
        Ok(())
    }

    async fn read_value(&self, _target: &WriteTarget, record_id: &RecordId) -> Result<Option<f64>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        Ok(LmsState::read_lagged(
            &mut state.primary_lag,
            &state.primary,
            record_id,
        ))
    }

    async fn submit_batch(
        &self,
        _target: &WriteTarget,
        values: &[DerivedValue],
    ) -> Result<JobHandle> {
        let mut state = self.state.lock().await;
        let handle = JobHandle::new(state.allocate_id("job")).map_err(SyncError::Validation)?;
        let script = std::mem::take(&mut state.job_script);
        state.batches.push(values.to_vec());
        state.jobs.insert(
            handle.clone(),
            PendingJob {
                values: values.to_vec(),
                script,
                applied: false,
            },
        );
        Ok(handle)
    }

    async fn read_job_status(&self, job: &JobHandle) -> Result<JobStatus> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(error) = state.job_status_failures.pop_front() {
            return Err(error.into());
        }
        let pending = state
            .jobs
            .get_mut(job)
            .ok_or_else(|| RemoteError::NotFound(format!("job {job}")))?;

        let status = pending
            .script
            .pop_front()
            .unwrap_or_else(|| JobStatus::new(JobState::Completed));

        if status.state == JobState::Completed && !pending.applied {
            pending.applied = true;
            for value in &pending.values {
                let stale = state.primary.insert(value.record_id.clone(), value.value);
                state.primary_lag.insert(
                    value.record_id.clone(),
                    LaggedRead {
                        stale,
                        remaining: state.read_lag,
                    },
                );
            }
        }
        Ok(status)
    }
}

#[async_trait]
impl OverrideApi for InMemoryLms {
    async fn list_correlation_ids(
        &self,
        _scope: &ScopeId,
    ) -> Result<HashMap<RecordId, CorrelationId>> {
        let mut state = self.state.lock().await;
        state.correlation_listings += 1;
        Ok(state.correlation_ids.clone())
    }

    async fn write_override(
        &self,
        _scope: &ScopeId,
        correlation_id: &CorrelationId,
        value: f64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let record_id = state
            .correlation_ids
            .iter()
            .find(|(_, c)| *c == correlation_id)
            .map(|(r, _)| r.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("enrollment {correlation_id}")))?;

        *state.override_writes.entry(record_id.clone()).or_insert(0) += 1;

        if let Some(error) = state
            .override_failures
            .get_mut(&record_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error.into());
        }

        let stale = state.overrides.insert(record_id.clone(), value);
        let remaining = state.read_lag;
        state
            .override_lag
            .insert(record_id, LaggedRead { stale, remaining });
        Ok(())
    }

    async fn read_override(&self, _scope: &ScopeId, record_id: &RecordId) -> Result<Option<f64>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        Ok(LmsState::read_lagged(
            &mut state.override_lag,
            &state.overrides,
            record_id,
        ))
    }
}
