//! LMS REST API models
//!
//! Wire shapes for the course-scoped REST endpoints. These stay separate from
//! the domain types; conversion happens in the client.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user enrolled in the course
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

/// One rubric criterion as embedded in an assignment
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRubricCriterion {
    pub id: String,
    #[serde(default)]
    pub outcome_id: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiAssignment {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub points_possible: Option<f64>,
    #[serde(default)]
    pub omit_from_final_grade: bool,
    #[serde(default)]
    pub rubric: Option<Vec<ApiRubricCriterion>>,
}

/// Points awarded for one criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCriterionAssessment {
    #[serde(default)]
    pub points: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSubmission {
    pub assignment_id: u64,
    pub user_id: u64,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub rubric_assessment: Option<HashMap<String, ApiCriterionAssessment>>,
}

impl ApiSubmission {
    pub fn criterion_points(&self, criterion_id: &str) -> Option<f64> {
        self.rubric_assessment
            .as_ref()
            .and_then(|a| a.get(criterion_id))
            .and_then(|c| c.points)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiGrades {
    #[serde(default)]
    pub override_score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnrollment {
    pub id: u64,
    pub user_id: u64,
    #[serde(default)]
    pub grades: Option<ApiGrades>,
}

impl ApiEnrollment {
    pub fn override_score(&self) -> Option<f64> {
        self.grades.as_ref().and_then(|g| g.override_score)
    }
}

/// Asynchronous job handle returned by bulk endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiProgress {
    pub id: u64,
    pub workflow_state: String,
    #[serde(default)]
    pub completion: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOutcome {
    pub id: u64,
    pub title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOutcomeLink {
    pub outcome: ApiOutcome,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiOutcomeGroup {
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRubricData {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRubric {
    pub id: u64,
    #[serde(default)]
    pub data: Vec<ApiRubricData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRubricEnvelope {
    pub rubric: ApiRubric,
}

/// Request body writing one rubric score
#[derive(Debug, Clone, Serialize)]
pub struct RubricAssessmentRequest {
    pub rubric_assessment: HashMap<String, ApiCriterionAssessment>,
}

impl RubricAssessmentRequest {
    pub fn single(criterion_id: &str, points: f64) -> Self {
        let mut rubric_assessment = HashMap::new();
        rubric_assessment.insert(
            criterion_id.to_string(),
            ApiCriterionAssessment {
                points: Some(points),
            },
        );
        Self { rubric_assessment }
    }
}

/// Request body for the bulk grade update
#[derive(Debug, Clone, Serialize)]
pub struct BulkGradeRequest {
    pub grade_data: HashMap<String, RubricAssessmentRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverrideScoreRequest {
    pub override_score: f64,
}
