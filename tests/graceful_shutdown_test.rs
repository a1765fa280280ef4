//! Integration tests for graceful shutdown
//!
//! These tests verify that:
//! - A shutdown signal stops the flow at the next safe point
//! - An interrupted run passes through ERROR back to IDLE
//! - Interrupted runs are reported with the cancellation exit code

use outcome_sync::adapters::{Collaborators, InMemoryLms, JobState};
use outcome_sync::cli::commands::sync::exit_code_for;
use outcome_sync::core::flow::{FlowSettings, FlowState, Orchestrator};
use outcome_sync::domain::{ErrorKind, MeasurementId, Record, RecordId, ResourceId, ResourceKind, SyncError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

fn provisioned_lms() -> InMemoryLms {
    let setup = FlowSettings::default().setup;
    InMemoryLms::new()
        .with_resource(ResourceKind::Outcome, &setup.outcome_title, ResourceId::new("o1").unwrap())
        .with_resource(ResourceKind::Container, &setup.container_title, ResourceId::new("a1").unwrap())
        .with_resource(ResourceKind::Criterion, &setup.criterion_description, ResourceId::new("c1").unwrap())
        .with_record(
            Record::new(RecordId::from_str("s1").unwrap()).with_measurement(
                MeasurementId::from_str("quiz").unwrap(),
                Some(3.0),
                "Quiz",
            ),
        )
}

#[tokio::test]
async fn test_shutdown_signal_propagation() {
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}

#[tokio::test]
async fn test_signal_before_start_cancels_run() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lms = Arc::new(provisioned_lms());
    let mut orchestrator = Orchestrator::new(Collaborators::from_backend(lms.clone()), FlowSettings::default())
        .with_cancellation(shutdown_rx);

    shutdown_tx.send(true).unwrap();
    let err = orchestrator.run("4521").await.unwrap_err();

    assert!(matches!(err, SyncError::Cancelled(_)));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(exit_code_for(&err), 130);
    assert_eq!(orchestrator.state(), FlowState::Idle);
    assert_eq!(
        orchestrator.history(),
        &[FlowState::Idle, FlowState::CheckingSetup, FlowState::Error, FlowState::Idle]
    );
    assert_eq!(lms.primary_write_count(&RecordId::from_str("s1").unwrap()).await, 0);
}

#[tokio::test]
async fn test_signal_interrupts_job_polling() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lms = Arc::new(provisioned_lms().with_job_script(vec![JobState::Queued; 1000]));
    let mut settings = FlowSettings {
        batch_threshold: 1,
        ..FlowSettings::default()
    };
    settings.poll.interval = Duration::from_secs(30);
    let mut orchestrator = Orchestrator::new(Collaborators::from_backend(lms), settings)
        .with_cancellation(shutdown_rx);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown_tx.send(true);
    });

    let started = Instant::now();
    let err = orchestrator.run("4521").await.unwrap_err();

    assert!(matches!(err, SyncError::Cancelled(_)));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(orchestrator.history().contains(&FlowState::PollingProgress));
    assert_eq!(orchestrator.state(), FlowState::Idle);
}

#[tokio::test]
async fn test_run_after_cancellation_starts_fresh() {
    let (shutdown_tx, shutdown_rx) = watch::channel(true);
    let lms = Arc::new(provisioned_lms());
    let mut cancelled = Orchestrator::new(Collaborators::from_backend(lms.clone()), FlowSettings::default())
        .with_cancellation(shutdown_rx);
    assert!(cancelled.run("4521").await.is_err());
    drop(shutdown_tx);

    let mut settings = FlowSettings::default();
    settings.verify.wait = Duration::from_millis(1);
    if let Some(overrides) = settings.overrides.as_mut() {
        overrides.verify.wait = Duration::from_millis(1);
    }
    let mut orchestrator = Orchestrator::new(Collaborators::from_backend(lms.clone()), settings);
    let summary = orchestrator.run("4521").await.unwrap();

    assert_eq!(summary.number_of_updates, 1);
    assert_eq!(lms.primary_value(&RecordId::from_str("s1").unwrap()).await, Some(3.0));
}
