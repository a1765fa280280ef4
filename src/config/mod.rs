//! Configuration management for outcome-sync.
//!
//! TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `OUTCOME_SYNC_<SECTION>_<KEY>` overrides
//! - Default values for every tuning knob
//! - Validation on load
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [lms]
//! base_url = "https://school.instructure.com"
//! api_token = "${OUTCOME_SYNC_API_TOKEN}"
//!
//! [setup]
//! outcome_title = "Course Mastery"
//! container_title = "Mastery Score"
//!
//! [calculation]
//! excluded_label_substrings = ["practice", "extra credit"]
//!
//! [submission]
//! batch_threshold = 25
//!
//! [overrides]
//! scale_factor = 25.0
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use outcome_sync::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("outcome-sync.toml")?;
//! println!("LMS: {}", config.lms.base_url);
//! println!("Batch threshold: {}", config.submission.batch_threshold);
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, CalculationConfig, LmsConfig, LoggingConfig, OverrideConfig, RetryConfig,
    SetupConfig, StateConfig, SubmissionConfig, SyncConfig, VerificationConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
