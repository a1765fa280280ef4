//! Integration tests for flow state legality
//!
//! Every history an orchestrator records must be a walk through the
//! transition table, whatever path the run took.

use outcome_sync::adapters::{Collaborators, InMemoryLms, JobState};
use outcome_sync::core::flow::{check_transition, FlowSettings, FlowState, Orchestrator};
use outcome_sync::domain::{MeasurementId, Record, RecordId, RemoteError, ResourceId, ResourceKind, SyncError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const ALL_STATES: [FlowState; 12] = [
    FlowState::Idle,
    FlowState::CheckingSetup,
    FlowState::CreatingOutcome,
    FlowState::CreatingContainer,
    FlowState::CreatingCriterion,
    FlowState::Calculating,
    FlowState::UpdatingRecords,
    FlowState::PollingProgress,
    FlowState::Verifying,
    FlowState::VerifyingOverrides,
    FlowState::Complete,
    FlowState::Error,
];

fn student(id: &str, score: f64) -> Record {
    Record::new(RecordId::from_str(id).unwrap()).with_measurement(
        MeasurementId::from_str("quiz").unwrap(),
        Some(score),
        "Quiz",
    )
}

fn fast_settings() -> FlowSettings {
    let mut settings = FlowSettings {
        auto_create: true,
        ..FlowSettings::default()
    };
    settings.per_record.deferred_pass_delay = Duration::from_millis(1);
    settings.poll.interval = Duration::from_millis(1);
    settings.verify.wait = Duration::from_millis(1);
    if let Some(overrides) = settings.overrides.as_mut() {
        overrides.verify.wait = Duration::from_millis(1);
    }
    settings
}

fn assert_legal(history: &[FlowState]) {
    assert_eq!(history.first(), Some(&FlowState::Idle));
    for pair in history.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "illegal transition {} -> {} in {history:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn test_histories_follow_transition_table() {
    let setup = FlowSettings::default().setup;
    let scenarios: Vec<(InMemoryLms, FlowSettings)> = vec![
        // Fresh course: every resource is created
        (InMemoryLms::new().with_record(student("s1", 3.0)), fast_settings()),
        // Batch with a slow job
        (
            InMemoryLms::new()
                .with_records([student("s1", 3.0), student("s2", 2.0)])
                .with_job_script([JobState::Queued, JobState::Running]),
            FlowSettings {
                batch_threshold: 1,
                ..fast_settings()
            },
        ),
        // Job that fails remotely
        (
            InMemoryLms::new()
                .with_record(student("s1", 3.0))
                .with_job_script([JobState::Failed]),
            FlowSettings {
                batch_threshold: 1,
                ..fast_settings()
            },
        ),
        // Only the criterion is missing
        (
            InMemoryLms::new()
                .with_resource(ResourceKind::Outcome, &setup.outcome_title, ResourceId::new("o1").unwrap())
                .with_resource(ResourceKind::Container, &setup.container_title, ResourceId::new("a1").unwrap())
                .with_record(student("s1", 3.0)),
            fast_settings(),
        ),
        // Creation fails
        (
            InMemoryLms::new()
                .with_record(student("s1", 3.0))
                .with_failing_creation(ResourceKind::Container),
            fast_settings(),
        ),
        // Nothing to grade
        (InMemoryLms::new(), fast_settings()),
    ];

    for (lms, settings) in scenarios {
        let lms = Arc::new(lms);
        let mut orchestrator = Orchestrator::new(Collaborators::from_backend(lms), settings);
        let result = orchestrator.run("4521").await;

        assert_legal(orchestrator.history());
        match result {
            Ok(_) => assert_eq!(orchestrator.state(), FlowState::Complete),
            Err(_) => assert_eq!(orchestrator.state(), FlowState::Idle),
        }
    }
}

#[tokio::test]
async fn test_failed_job_is_fatal() {
    let lms = Arc::new(
        InMemoryLms::new()
            .with_record(student("s1", 3.0))
            .with_job_script([JobState::Running, JobState::Failed]),
    );
    let settings = FlowSettings {
        batch_threshold: 1,
        ..fast_settings()
    };
    let mut orchestrator = Orchestrator::new(Collaborators::from_backend(lms), settings);

    let err = orchestrator.run("4521").await.unwrap_err();

    assert!(matches!(err, SyncError::Fatal(_)));
    assert!(orchestrator.history().contains(&FlowState::PollingProgress));
    assert!(!orchestrator.history().contains(&FlowState::Verifying));
}

#[tokio::test]
async fn test_transient_failures_do_not_break_the_flow() {
    let lms = Arc::new(
        InMemoryLms::new()
            .with_record(student("s1", 3.0))
            .with_write_failures(
                &RecordId::from_str("s1").unwrap(),
                1,
                RemoteError::RateLimited("slow down".to_string()),
            ),
    );
    let mut orchestrator = Orchestrator::new(Collaborators::from_backend(lms), fast_settings());

    let summary = orchestrator.run("4521").await.unwrap();

    assert_eq!(summary.number_of_updates, 1);
    assert_legal(orchestrator.history());
}

#[test]
fn test_only_error_leads_back_to_idle() {
    for state in ALL_STATES {
        let expected = state == FlowState::Error;
        assert_eq!(
            state.can_transition_to(FlowState::Idle),
            expected,
            "{state} -> IDLE"
        );
    }
}

#[test]
fn test_every_active_state_can_fail() {
    for state in ALL_STATES {
        if matches!(state, FlowState::Complete | FlowState::Error) {
            continue;
        }
        assert!(check_transition(state, FlowState::Error, None).is_ok(), "{state} -> ERROR");
    }
}

#[test]
fn test_calculating_requires_complete_setup() {
    assert!(check_transition(FlowState::CheckingSetup, FlowState::Calculating, None).is_ok());
    for kind in ResourceKind::ALL {
        let err = check_transition(FlowState::CheckingSetup, FlowState::Calculating, Some(kind)).unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { .. }));
    }
}

#[test]
fn test_state_names_are_stable() {
    for state in ALL_STATES {
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, format!("\"{}\"", state.as_str()));
    }
}
