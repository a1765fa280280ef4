//! Configuration schema types
//!
//! This module defines the configuration structure for outcome-sync. Every
//! section except `[lms]` and `[setup]` has usable defaults.

use crate::config::SecretString;
use serde::{Deserialize, Serialize};

/// Main outcome-sync configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// LMS connection settings
    pub lms: LmsConfig,

    /// Names and shapes of the provisioned resources
    #[serde(default)]
    pub setup: SetupConfig,

    /// Value calculation settings
    #[serde(default)]
    pub calculation: CalculationConfig,

    /// Submission strategy and polling settings
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// Primary read-back verification
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Override channel settings
    #[serde(default)]
    pub overrides: OverrideConfig,

    /// Host-side persistence of last-run metadata
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SyncConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.lms.validate()?;
        self.setup.validate()?;
        self.submission.validate()?;
        self.verification.validate()?;
        self.overrides.validate()?;
        self.state.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Compute and report changes without writing anything
    #[serde(default)]
    pub dry_run: bool,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dry_run: false,
        }
    }
}

/// HTTP retry configuration for transient failures inside the LMS client
///
/// Applies to the snapshot fetch, resource lookups and the correlation
/// listing. Writes, read-backs and job status reads are sent once; their
/// retries come from the submission and verification budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per request
    #[serde(default = "default_http_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_http_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// LMS connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmsConfig {
    /// Base URL of the LMS, e.g. `https://school.instructure.com`
    pub base_url: String,

    /// API access token, sent as a bearer token
    /// Stored securely in memory and automatically zeroized on drop
    pub api_token: SecretString,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Page size for list endpoints
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,
}

impl LmsConfig {
    fn validate(&self) -> Result<(), String> {
        use secrecy::ExposeSecret;

        if self.base_url.is_empty() {
            return Err("lms.base_url cannot be empty".to_string());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err("lms.base_url must start with http:// or https://".to_string());
        }
        if self.api_token.expose_secret().is_empty() {
            return Err("lms.api_token cannot be empty".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("lms.timeout_seconds must be > 0".to_string());
        }
        if self.per_page == 0 || self.per_page > 100 {
            return Err("lms.per_page must be between 1 and 100".to_string());
        }
        if self.retry.max_retries == 0 {
            return Err("lms.retry.max_retries must be > 0".to_string());
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err("lms.retry.backoff_multiplier must be >= 1.0".to_string());
        }
        Ok(())
    }
}

/// Resource provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Title of the outcome values are scored against
    #[serde(default = "default_outcome_title")]
    pub outcome_title: String,

    /// Title of the placeholder assignment holding one value per record
    #[serde(default = "default_container_title")]
    pub container_title: String,

    /// Description of the rubric criterion
    #[serde(default = "default_criterion_description")]
    pub criterion_description: String,

    /// Points that count as mastery
    #[serde(default = "default_mastery_points")]
    pub mastery_points: f64,

    /// Maximum points on the outcome scale
    #[serde(default = "default_points_possible")]
    pub points_possible: f64,

    /// Create missing resources without asking
    #[serde(default)]
    pub auto_create: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            outcome_title: default_outcome_title(),
            container_title: default_container_title(),
            criterion_description: default_criterion_description(),
            mastery_points: default_mastery_points(),
            points_possible: default_points_possible(),
            auto_create: false,
        }
    }
}

impl SetupConfig {
    fn validate(&self) -> Result<(), String> {
        if self.outcome_title.trim().is_empty() {
            return Err("setup.outcome_title cannot be empty".to_string());
        }
        if self.container_title.trim().is_empty() {
            return Err("setup.container_title cannot be empty".to_string());
        }
        if self.points_possible <= 0.0 {
            return Err("setup.points_possible must be > 0".to_string());
        }
        if self.mastery_points <= 0.0 || self.mastery_points > self.points_possible {
            return Err("setup.mastery_points must be in (0, points_possible]".to_string());
        }
        Ok(())
    }
}

/// Value calculation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalculationConfig {
    /// Measurement (assignment) ids never included in the mean
    #[serde(default)]
    pub excluded_measurement_ids: Vec<String>,

    /// Case-insensitive label substrings never included in the mean
    #[serde(default)]
    pub excluded_label_substrings: Vec<String>,
}

/// Submission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Change sets at least this large are submitted as one batch
    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: usize,

    /// Attempts per record per pass in per-record mode
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause before the deferred second pass
    #[serde(default = "default_deferred_pass_delay_ms")]
    pub deferred_pass_delay_ms: u64,

    /// Batch job polling interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Batch job polling budget
    #[serde(default = "default_poll_timeout_seconds")]
    pub poll_timeout_seconds: u64,
}

impl SubmissionConfig {
    fn validate(&self) -> Result<(), String> {
        if self.batch_threshold == 0 {
            return Err("submission.batch_threshold must be > 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("submission.max_attempts must be > 0".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("submission.poll_interval_ms must be > 0".to_string());
        }
        if self.poll_timeout_seconds == 0 {
            return Err("submission.poll_timeout_seconds must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            batch_threshold: default_batch_threshold(),
            max_attempts: default_max_attempts(),
            deferred_pass_delay_ms: default_deferred_pass_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_seconds: default_poll_timeout_seconds(),
        }
    }
}

/// Primary verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Absolute difference under which a read-back value matches
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Read-back rounds before giving up
    #[serde(default = "default_verification_attempts")]
    pub max_attempts: u32,

    /// Wait between read-back rounds
    #[serde(default = "default_verification_wait_ms")]
    pub wait_ms: u64,
}

impl VerificationConfig {
    fn validate(&self) -> Result<(), String> {
        if !(self.tolerance > 0.0) {
            return Err("verification.tolerance must be > 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("verification.max_attempts must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_attempts: default_verification_attempts(),
            wait_ms: default_verification_wait_ms(),
        }
    }
}

/// Override channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideConfig {
    /// Synchronize the override surface at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Override = derived value * scale_factor
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,

    /// Attempts per override write in per-record mode
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Override read-back rounds
    #[serde(default = "default_max_attempts")]
    pub verify_retries: u32,

    /// Wait between override read-back rounds
    #[serde(default = "default_override_verify_delay_ms")]
    pub verify_delay_ms: u64,
}

impl OverrideConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err("overrides.scale_factor must be a positive number".to_string());
        }
        if self.max_attempts == 0 {
            return Err("overrides.max_attempts must be > 0".to_string());
        }
        if self.verify_retries == 0 {
            return Err("overrides.verify_retries must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scale_factor: default_scale_factor(),
            max_attempts: default_max_attempts(),
            verify_retries: default_max_attempts(),
            verify_delay_ms: default_override_verify_delay_ms(),
        }
    }
}

/// Last-run metadata persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Directory holding one JSON file per scope
    #[serde(default = "default_state_directory")]
    pub directory: String,
}

impl StateConfig {
    fn validate(&self) -> Result<(), String> {
        if self.directory.trim().is_empty() {
            return Err("state.directory cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            directory: default_state_directory(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log file directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Maximum log file size in MB
    #[serde(default = "default_local_max_size_mb")]
    pub local_max_size_mb: usize,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_max_size_mb == 0 {
            return Err("logging.local_max_size_mb must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            local_max_size_mb: default_local_max_size_mb(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_per_page() -> u32 {
    100
}

fn default_http_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_outcome_title() -> String {
    "Current Mastery".to_string()
}

fn default_container_title() -> String {
    "Current Mastery Score".to_string()
}

fn default_criterion_description() -> String {
    "Overall mastery".to_string()
}

fn default_mastery_points() -> f64 {
    3.0
}

fn default_points_possible() -> f64 {
    4.0
}

fn default_batch_threshold() -> usize {
    25
}

fn default_max_attempts() -> u32 {
    3
}

fn default_deferred_pass_delay_ms() -> u64 {
    2_000
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_poll_timeout_seconds() -> u64 {
    20 * 60
}

fn default_tolerance() -> f64 {
    1e-3
}

fn default_verification_attempts() -> u32 {
    50
}

fn default_verification_wait_ms() -> u64 {
    2_000
}

fn default_scale_factor() -> f64 {
    25.0
}

fn default_override_verify_delay_ms() -> u64 {
    2_000
}

fn default_state_directory() -> String {
    ".outcome-sync".to_string()
}

fn default_local_path() -> String {
    "logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_local_max_size_mb() -> usize {
    100
}
