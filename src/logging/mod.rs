//! Logging and observability
//!
//! Structured logging through `tracing`, plus a handful of macros that keep
//! field names consistent across the engine.
//!
//! # Example
//!
//! ```no_run
//! use outcome_sync::logging::init_logging;
//! use outcome_sync::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!(course_id = "1234", "Sync started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log a state machine transition
///
/// # Example
///
/// ```no_run
/// use outcome_sync::log_flow_transition;
///
/// log_flow_transition!("CALCULATING", "UPDATING_RECORDS");
/// ```
#[macro_export]
macro_rules! log_flow_transition {
    ($from:expr, $to:expr) => {
        tracing::info!(from = %$from, to = %$to, "Flow transition");
    };
}

/// Log a retry attempt
///
/// # Example
///
/// ```no_run
/// use outcome_sync::log_retry_attempt;
///
/// log_retry_attempt!(2, 3, "Connection timeout");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::warn!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying operation"
        );
    };
}

/// Log one tick of a polling loop
///
/// # Example
///
/// ```no_run
/// use outcome_sync::log_poll_tick;
///
/// log_poll_tick!("job-17", "running", 14);
/// ```
#[macro_export]
macro_rules! log_poll_tick {
    ($handle:expr, $state:expr, $elapsed_secs:expr) => {
        tracing::debug!(
            job = %$handle,
            state = %$state,
            elapsed_secs = $elapsed_secs,
            "Polling job status"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use outcome_sync::log_error_with_context;
/// use outcome_sync::domain::SyncError;
///
/// let error = SyncError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
