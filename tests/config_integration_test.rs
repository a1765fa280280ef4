//! Integration tests for configuration loading and validation
//!
//! Note: Tests that modify environment variables are serialized through a
//! mutex to avoid interference between tests.

use outcome_sync::config::load_config;
use outcome_sync::core::calculate::OverrideTransform;
use outcome_sync::core::flow::FlowSettings;
use outcome_sync::core::submit::SubmissionMode;
use outcome_sync::domain::SyncError;
use secrecy::ExposeSecret;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::NamedTempFile;

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn cleanup_env_vars() {
    std::env::remove_var("OUTCOME_SYNC_APPLICATION_LOG_LEVEL");
    std::env::remove_var("OUTCOME_SYNC_APPLICATION_DRY_RUN");
    std::env::remove_var("OUTCOME_SYNC_SUBMISSION_BATCH_THRESHOLD");
    std::env::remove_var("OUTCOME_SYNC_OVERRIDES_ENABLED");
    std::env::remove_var("OUTCOME_SYNC_LMS_BASE_URL");
    std::env::remove_var("TEST_LMS_TOKEN");
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(contents.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

const COMPLETE: &str = r#"
[application]
log_level = "debug"
dry_run = true

[lms]
base_url = "https://school.instructure.com"
api_token = "token-12345"
timeout_seconds = 45
per_page = 50

[lms.retry]
max_retries = 5
initial_delay_ms = 250
max_delay_ms = 5000
backoff_multiplier = 1.5

[setup]
outcome_title = "Unit Mastery"
container_title = "Unit Mastery Score"
criterion_description = "Mastery"
mastery_points = 3.0
points_possible = 4.0
auto_create = true

[calculation]
excluded_measurement_ids = ["9001"]
excluded_label_substrings = ["Practice"]

[submission]
batch_threshold = 40
max_attempts = 4
deferred_pass_delay_ms = 500
poll_interval_ms = 1000
poll_timeout_seconds = 600

[verification]
tolerance = 0.01
max_attempts = 10
wait_ms = 250

[overrides]
enabled = true
scale_factor = 20.0
max_attempts = 2
verify_retries = 5
verify_delay_ms = 100

[state]
directory = "/tmp/outcome-sync-state"

[logging]
local_enabled = false
local_path = "/tmp/outcome-sync-logs"
local_rotation = "hourly"
local_max_size_mb = 50
"#;

#[test]
fn test_load_complete_config() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    let temp_file = write_config(COMPLETE);

    let config = load_config(temp_file.path()).unwrap();

    assert_eq!(config.application.log_level, "debug");
    assert!(config.application.dry_run);
    assert_eq!(config.lms.base_url, "https://school.instructure.com");
    assert_eq!(config.lms.api_token.expose_secret().as_ref(), "token-12345");
    assert_eq!(config.lms.retry.max_retries, 5);
    assert_eq!(config.setup.outcome_title, "Unit Mastery");
    assert!(config.setup.auto_create);
    assert_eq!(config.calculation.excluded_measurement_ids, vec!["9001"]);
    assert_eq!(config.submission.batch_threshold, 40);
    assert_eq!(config.verification.max_attempts, 10);
    assert_eq!(config.overrides.scale_factor, 20.0);
    assert_eq!(config.state.directory, "/tmp/outcome-sync-state");
    assert_eq!(config.logging.local_rotation, "hourly");
}

#[test]
fn test_settings_follow_config() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    let temp_file = write_config(COMPLETE);
    let config = load_config(temp_file.path()).unwrap();

    let settings = FlowSettings::from_config(&config).unwrap();

    assert!(settings.dry_run);
    assert!(settings.auto_create);
    assert_eq!(settings.batch_threshold, 40);
    assert_eq!(settings.per_record.max_attempts, 4);
    assert_eq!(settings.per_record.deferred_pass_delay, Duration::from_millis(500));
    assert_eq!(settings.poll.timeout, Duration::from_secs(600));
    assert_eq!(settings.verify.max_attempts, 10);
    assert_eq!(settings.transform.apply(3.0), 60.0);

    let overrides = settings.overrides.unwrap();
    assert_eq!(overrides.max_attempts, 2);
    assert_eq!(overrides.verify.max_attempts, 5);
    assert_eq!(settings.setup.container_title, "Unit Mastery Score");
}

#[test]
fn test_env_overrides_win_over_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    let temp_file = write_config(COMPLETE);

    std::env::set_var("OUTCOME_SYNC_APPLICATION_LOG_LEVEL", "warn");
    std::env::set_var("OUTCOME_SYNC_APPLICATION_DRY_RUN", "false");
    std::env::set_var("OUTCOME_SYNC_SUBMISSION_BATCH_THRESHOLD", "7");
    std::env::set_var("OUTCOME_SYNC_OVERRIDES_ENABLED", "false");

    let result = load_config(temp_file.path());
    cleanup_env_vars();
    let config = result.unwrap();

    assert_eq!(config.application.log_level, "warn");
    assert!(!config.application.dry_run);
    assert_eq!(config.submission.batch_threshold, 7);
    assert!(!config.overrides.enabled);

    let settings = FlowSettings::from_config(&config).unwrap();
    assert!(settings.overrides.is_none());
    assert_eq!(
        outcome_sync::core::submit::select_mode(7, settings.batch_threshold),
        SubmissionMode::Batch
    );
}

#[test]
fn test_token_substituted_from_environment() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    std::env::set_var("TEST_LMS_TOKEN", "from-env");
    let temp_file = write_config(
        r#"
[lms]
base_url = "https://school.instructure.com"
api_token = "${TEST_LMS_TOKEN}"
"#,
    );

    let result = load_config(temp_file.path());
    cleanup_env_vars();
    let config = result.unwrap();

    assert_eq!(config.lms.api_token.expose_secret().as_ref(), "from-env");
    assert_eq!(config.setup.outcome_title, "Current Mastery");
    assert!(config.overrides.enabled);
}

#[test]
fn test_missing_token_variable_is_a_configuration_error() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    let temp_file = write_config(
        r#"
[lms]
base_url = "https://school.instructure.com"
api_token = "${TEST_LMS_TOKEN}"
"#,
    );

    let err = load_config(temp_file.path()).unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
    assert!(err.to_string().contains("TEST_LMS_TOKEN"));
}

#[test]
fn test_invalid_values_are_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_env_vars();
    let cases = [
        ("base_url = \"https://school.instructure.com\"", "base_url = \"ftp://school\""),
        ("batch_threshold = 40", "batch_threshold = 0"),
        ("scale_factor = 20.0", "scale_factor = -1.0"),
        ("mastery_points = 3.0", "mastery_points = 5.0"),
    ];

    for (from, to) in cases {
        let temp_file = write_config(&COMPLETE.replace(from, to));
        assert!(load_config(temp_file.path()).is_err(), "accepted {to}");
    }
}
