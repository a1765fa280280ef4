//! LMS REST client
//!
//! Implements the collaborator traits over the LMS course REST API: students
//! and submissions feed the record snapshot, a rubric criterion on a
//! placeholder assignment holds the primary value, and enrollment final-grade
//! overrides are the secondary channel.

use super::models::{
    ApiAssignment, ApiEnrollment, ApiOutcomeGroup, ApiOutcomeLink, ApiProgress, ApiRubricEnvelope,
    ApiSubmission, ApiUser, BulkGradeRequest, OverrideScoreRequest, RubricAssessmentRequest,
};
use crate::adapters::traits::{
    JobState, JobStatus, OverrideApi, PrimaryApi, RecordSource, ResourceProvisioner, WriteTarget,
};
use crate::config::LmsConfig;
use crate::domain::ids::{CorrelationId, JobHandle, MeasurementId, RecordId, ResourceId, ScopeId};
use crate::domain::{
    DerivedValue, Record, RemoteError, ResourceKind, ResourceSpec, Result, SyncError,
    TargetResources,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, ClientBuilder, Method};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// How a read is delivered
///
/// Reads the engine polls within its own attempt budgets (read-back, job
/// status) go out once. Snapshot, setup lookups and the correlation listing
/// back off on transient failures. Writes are never retried here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Once,
    Backoff,
}

/// HTTP client for one LMS instance
///
/// # Example
///
/// ```no_run
/// use outcome_sync::adapters::LmsClient;
/// use outcome_sync::config::load_config;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config("outcome-sync.toml")?;
/// let client = LmsClient::new(config.lms)?;
/// # Ok(())
/// # }
/// ```
pub struct LmsClient {
    base_url: Url,
    client: Client,
    config: LmsConfig,
}

impl LmsClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the base URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: LmsConfig) -> Result<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            SyncError::Configuration(format!("Invalid LMS base URL {}: {}", config.base_url, e))
        })?;

        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SyncError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            client,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SyncError::Configuration(format!("Invalid endpoint {path}: {e}")))
    }

    fn course_endpoint(&self, scope: &ScopeId, rest: &str) -> Result<Url> {
        self.endpoint(&format!("api/v1/courses/{}/{}", scope.as_str(), rest))
    }

    fn paged(&self, mut url: Url) -> Url {
        url.query_pairs_mut()
            .append_pair("per_page", &self.config.per_page.to_string());
        url
    }

    /// Retry an operation with exponential backoff on transient failures
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() || attempt >= retry.max_retries {
                        return Err(e);
                    }

                    let delay_ms = backoff_delay_ms(
                        retry.initial_delay_ms,
                        retry.backoff_multiplier,
                        retry.max_delay_ms,
                        attempt,
                    );

                    tracing::warn!(
                        attempt = attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Retrying request after error"
                    );

                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    /// One HTTP exchange, no retries
    async fn send_once<T, B>(&self, method: &Method, url: &Url, body: Option<&B>) -> Result<(T, Option<Url>)>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(self.config.api_token.expose_secret().as_ref());
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await.map_err(RemoteError::from)?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RemoteError::from_status(
                status.as_u16(),
                format!("{method} {} failed: {text}", url.path()),
            )
            .into());
        }

        let next = next_page(resp.headers());
        let value = resp
            .json::<T>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok((value, next))
    }

    async fn fetch_page<T: DeserializeOwned>(&self, url: &Url, delivery: Delivery) -> Result<(T, Option<Url>)> {
        match delivery {
            Delivery::Once => self.send_once::<T, ()>(&Method::GET, url, None).await,
            Delivery::Backoff => {
                self.retry_request(|| self.send_once::<T, ()>(&Method::GET, url, None))
                    .await
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &Url, delivery: Delivery) -> Result<T> {
        self.fetch_page(url, delivery).await.map(|(value, _)| value)
    }

    /// Send a write exactly once; the engine owns any retry budget
    async fn write<T, B>(&self, method: Method, url: &Url, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        self.send_once(&method, url, Some(body))
            .await
            .map(|(value, _)| value)
    }

    /// Fetch every page of a list endpoint, following `Link: rel="next"`
    async fn get_all<T: DeserializeOwned>(&self, url: Url, delivery: Delivery) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(self.paged(url));
        let mut pages = 0usize;

        while let Some(url) = next {
            let (page, following) = self.fetch_page::<Vec<T>>(&url, delivery).await?;
            pages += 1;
            items.extend(page);
            next = following;
        }

        tracing::debug!(pages = pages, count = items.len(), "Fetched paginated list");
        Ok(items)
    }

    async fn students(&self, scope: &ScopeId) -> Result<Vec<ApiUser>> {
        let mut url = self.course_endpoint(scope, "users")?;
        url.query_pairs_mut().append_pair("enrollment_type[]", "student");
        self.get_all(url, Delivery::Backoff).await
    }

    async fn assignments(&self, scope: &ScopeId) -> Result<Vec<ApiAssignment>> {
        self.get_all(self.course_endpoint(scope, "assignments")?, Delivery::Backoff)
            .await
    }

    async fn submissions(&self, scope: &ScopeId) -> Result<Vec<ApiSubmission>> {
        let mut url = self.course_endpoint(scope, "students/submissions")?;
        url.query_pairs_mut()
            .append_pair("student_ids[]", "all")
            .append_pair("include[]", "rubric_assessment");
        self.get_all(url, Delivery::Backoff).await
    }

    async fn enrollments(
        &self,
        scope: &ScopeId,
        user: Option<&RecordId>,
        delivery: Delivery,
    ) -> Result<Vec<ApiEnrollment>> {
        let mut url = self.course_endpoint(scope, "enrollments")?;
        url.query_pairs_mut().append_pair("type[]", "StudentEnrollment");
        if let Some(user) = user {
            url.query_pairs_mut().append_pair("user_id", user.as_str());
        }
        self.get_all(url, delivery).await
    }

    fn submission_url(&self, target: &WriteTarget, record_id: &RecordId) -> Result<Url> {
        self.course_endpoint(
            &target.scope,
            &format!(
                "assignments/{}/submissions/{}",
                target.container_id.as_str(),
                record_id.as_str()
            ),
        )
    }
}

/// Delay before retry `attempt` (1-based), capped at `max_delay_ms`
fn backoff_delay_ms(initial_delay_ms: u64, multiplier: f64, max_delay_ms: u64, attempt: usize) -> u64 {
    let factor = multiplier.powf(attempt.saturating_sub(1) as f64);
    let delay = (initial_delay_ms as f64 * factor).min(max_delay_ms as f64);
    delay as u64
}

/// Extract the `rel="next"` URL from a `Link` header
fn next_page(headers: &HeaderMap) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let target = target.strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

fn numeric_id<T>(raw: u64) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.to_string()
        .parse()
        .map_err(|e: String| RemoteError::InvalidResponse(e).into())
}

fn require<'a>(spec: &'a ResourceSpec, kind: ResourceKind) -> Result<&'a ResourceId> {
    spec.resolved.get(kind).ok_or_else(|| {
        SyncError::Validation(format!("{} requires a resolved {}", spec.kind, kind))
    })
}

#[async_trait]
impl RecordSource for LmsClient {
    async fn fetch_records(
        &self,
        scope: &ScopeId,
        resources: &TargetResources,
    ) -> Result<Vec<Record>> {
        let students = self.students(scope).await?;
        let assignments = self.assignments(scope).await?;
        let submissions = self.submissions(scope).await?;
        let enrollments = self.enrollments(scope, None, Delivery::Backoff).await?;

        let container = resources.container_id.as_ref().map(|id| id.as_str());
        let criterion = resources.criterion_id.as_ref().map(|id| id.as_str());
        let labels: HashMap<u64, &str> = assignments
            .iter()
            .map(|a| (a.id, a.name.as_str()))
            .collect();
        let overrides: HashMap<u64, Option<f64>> = enrollments
            .iter()
            .map(|e| (e.user_id, e.override_score()))
            .collect();

        let mut records = Vec::with_capacity(students.len());
        for student in &students {
            let mut record = Record::new(numeric_id(student.id)?)
                .with_override_value(overrides.get(&student.id).copied().flatten());

            for submission in submissions.iter().filter(|s| s.user_id == student.id) {
                let assignment_id = submission.assignment_id.to_string();
                if Some(assignment_id.as_str()) == container {
                    record.target_value = criterion.and_then(|c| submission.criterion_points(c));
                    continue;
                }
                let label = labels.get(&submission.assignment_id).copied().unwrap_or("");
                record = record.with_measurement(
                    MeasurementId::new(assignment_id).map_err(RemoteError::InvalidResponse)?,
                    submission.score,
                    label,
                );
            }
            records.push(record);
        }

        tracing::info!(
            course_id = %scope,
            students = records.len(),
            assignments = assignments.len(),
            "Fetched course snapshot"
        );
        Ok(records)
    }
}

#[async_trait]
impl ResourceProvisioner for LmsClient {
    async fn find_resource(
        &self,
        scope: &ScopeId,
        spec: &ResourceSpec,
    ) -> Result<Option<ResourceId>> {
        match spec.kind {
            ResourceKind::Outcome => {
                let links: Vec<ApiOutcomeLink> = self
                    .get_all(self.course_endpoint(scope, "outcome_group_links")?, Delivery::Backoff)
                    .await?;
                links
                    .iter()
                    .find(|l| l.outcome.title == spec.name)
                    .map(|l| numeric_id(l.outcome.id))
                    .transpose()
            }
            ResourceKind::Container => self
                .assignments(scope)
                .await?
                .iter()
                .find(|a| a.name == spec.name)
                .map(|a| numeric_id(a.id))
                .transpose(),
            ResourceKind::Criterion => {
                let outcome = require(spec, ResourceKind::Outcome)?;
                let container = require(spec, ResourceKind::Container)?;
                let assignment: ApiAssignment = self
                    .get(
                        &self.course_endpoint(scope, &format!("assignments/{}", container))?,
                        Delivery::Backoff,
                    )
                    .await?;
                Ok(assignment
                    .rubric
                    .unwrap_or_default()
                    .into_iter()
                    .find(|c| c.outcome_id.map(|o| o.to_string()).as_deref() == Some(outcome.as_str()))
                    .and_then(|c| ResourceId::new(c.id).ok()))
            }
        }
    }

    async fn create_resource(&self, scope: &ScopeId, spec: &ResourceSpec) -> Result<ResourceId> {
        let id = match spec.kind {
            ResourceKind::Outcome => {
                let group: ApiOutcomeGroup = self
                    .get(&self.course_endpoint(scope, "root_outcome_group")?, Delivery::Backoff)
                    .await?;
                let body = serde_json::json!({
                    "title": spec.name,
                    "description": spec.description,
                    "mastery_points": spec.mastery_points,
                    "ratings": [
                        { "description": "Mastery", "points": spec.points_possible },
                        { "description": "Not yet", "points": 0.0 }
                    ],
                });
                let link: ApiOutcomeLink = self
                    .write(
                        Method::POST,
                        &self.course_endpoint(scope, &format!("outcome_groups/{}/outcomes", group.id))?,
                        &body,
                    )
                    .await?;
                numeric_id(link.outcome.id)?
            }
            ResourceKind::Container => {
                let body = serde_json::json!({
                    "assignment": {
                        "name": spec.name,
                        "points_possible": spec.points_possible,
                        "submission_types": ["none"],
                        "grading_type": "points",
                        "omit_from_final_grade": true,
                        "published": true,
                    }
                });
                let assignment: ApiAssignment = self
                    .write(Method::POST, &self.course_endpoint(scope, "assignments")?, &body)
                    .await?;
                numeric_id(assignment.id)?
            }
            ResourceKind::Criterion => {
                let outcome = require(spec, ResourceKind::Outcome)?;
                let container = require(spec, ResourceKind::Container)?;
                let body = serde_json::json!({
                    "rubric": {
                        "title": spec.name,
                        "criteria": {
                            "0": {
                                "description": spec.description,
                                "points": spec.points_possible,
                                "learning_outcome_id": outcome.as_str(),
                            }
                        }
                    },
                    "rubric_association": {
                        "association_id": container.as_str(),
                        "association_type": "Assignment",
                        "use_for_grading": true,
                        "purpose": "grading",
                    }
                });
                let envelope: ApiRubricEnvelope = self
                    .write(Method::POST, &self.course_endpoint(scope, "rubrics")?, &body)
                    .await?;
                let criterion = envelope.rubric.data.into_iter().next().ok_or_else(|| {
                    RemoteError::InvalidResponse(format!(
                        "rubric {} was created without criteria",
                        envelope.rubric.id
                    ))
                })?;
                ResourceId::new(criterion.id).map_err(RemoteError::InvalidResponse)?
            }
        };

        tracing::info!(course_id = %scope, kind = %spec.kind, id = %id, "Created resource");
        Ok(id)
    }
}

#[async_trait]
impl PrimaryApi for LmsClient {
    async fn write_value(
        &self,
        target: &WriteTarget,
        record_id: &RecordId,
        value: f64,
    ) -> Result<()> {
        let body = RubricAssessmentRequest::single(target.criterion_id.as_str(), value);
        let _: serde_json::Value = self
            .write(Method::PUT, &self.submission_url(target, record_id)?, &body)
            .await?;
        Ok(())
    }

    async fn read_value(&self, target: &WriteTarget, record_id: &RecordId) -> Result<Option<f64>> {
        let mut url = self.submission_url(target, record_id)?;
        url.query_pairs_mut().append_pair("include[]", "rubric_assessment");
        let submission: ApiSubmission = self.get(&url, Delivery::Once).await?;
        Ok(submission.criterion_points(target.criterion_id.as_str()))
    }

    async fn submit_batch(
        &self,
        target: &WriteTarget,
        values: &[DerivedValue],
    ) -> Result<JobHandle> {
        let grade_data = values
            .iter()
            .map(|v| {
                (
                    v.record_id.as_str().to_string(),
                    RubricAssessmentRequest::single(target.criterion_id.as_str(), v.value),
                )
            })
            .collect();
        let url = self.course_endpoint(
            &target.scope,
            &format!(
                "assignments/{}/submissions/update_grades",
                target.container_id.as_str()
            ),
        )?;
        let progress: ApiProgress = self
            .write(Method::POST, &url, &BulkGradeRequest { grade_data })
            .await?;

        tracing::info!(job = progress.id, count = values.len(), "Submitted bulk update");
        numeric_id(progress.id)
    }

    async fn read_job_status(&self, job: &JobHandle) -> Result<JobStatus> {
        let progress: ApiProgress = self
            .get(
                &self.endpoint(&format!("api/v1/progress/{}", job.as_str()))?,
                Delivery::Once,
            )
            .await?;
        Ok(JobStatus {
            state: JobState::parse(&progress.workflow_state),
            completion: progress.completion,
            message: progress.message,
        })
    }
}

#[async_trait]
impl OverrideApi for LmsClient {
    async fn list_correlation_ids(
        &self,
        scope: &ScopeId,
    ) -> Result<HashMap<RecordId, CorrelationId>> {
        let mut ids = HashMap::new();
        for enrollment in self.enrollments(scope, None, Delivery::Backoff).await? {
            ids.insert(numeric_id(enrollment.user_id)?, numeric_id(enrollment.id)?);
        }
        Ok(ids)
    }

    async fn write_override(
        &self,
        scope: &ScopeId,
        correlation_id: &CorrelationId,
        value: f64,
    ) -> Result<()> {
        let url = self.course_endpoint(
            scope,
            &format!("enrollments/{}/final_grade_override", correlation_id.as_str()),
        )?;
        let _: serde_json::Value = self
            .write(Method::PUT, &url, &OverrideScoreRequest { override_score: value })
            .await?;
        Ok(())
    }

    async fn read_override(&self, scope: &ScopeId, record_id: &RecordId) -> Result<Option<f64>> {
        Ok(self
            .enrollments(scope, Some(record_id), Delivery::Once)
            .await?
            .first()
            .and_then(ApiEnrollment::override_score))
    }
}
