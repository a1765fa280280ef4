//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "outcome-sync.toml")]
    pub output: String,

    /// Include every option with comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing outcome-sync configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your LMS address and titles", self.output);
                println!("  2. Put OUTCOME_SYNC_API_TOKEN in a .env file or your environment");
                println!("  3. Validate configuration: outcome-sync validate-config");
                println!("  4. Preview changes: outcome-sync sync --course <id> --dry-run");
                println!("  5. Run: outcome-sync sync --course <id>");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5) // Fatal error exit code
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# outcome-sync configuration

[application]
log_level = "info"
dry_run = false

[lms]
base_url = "https://school.instructure.com"
api_token = "${OUTCOME_SYNC_API_TOKEN}"

[setup]
outcome_title = "Current Mastery"
container_title = "Current Mastery Score"
auto_create = false

[calculation]
excluded_label_substrings = ["practice"]

[submission]
batch_threshold = 25

[overrides]
enabled = true
scale_factor = 25.0

[state]
directory = ".outcome-sync"

[logging]
local_enabled = false
local_path = "logs"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# outcome-sync configuration
#
# Every option with its default. Values of the form ${VAR} are read from the
# environment (or a .env file). Any option can also be overridden with
# OUTCOME_SYNC_<SECTION>_<KEY>, e.g. OUTCOME_SYNC_SUBMISSION_BATCH_THRESHOLD=50.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# Calculate and report changes without writing anything
dry_run = false

# ============================================================================
# LMS Connection
# ============================================================================
[lms]
# Base URL of the LMS (http or https)
base_url = "https://school.instructure.com"

# API access token (use an environment variable)
api_token = "${OUTCOME_SYNC_API_TOKEN}"

# Per-request timeout
timeout_seconds = 30

# Page size for list endpoints (1-100)
per_page = 100

[lms.retry]
# Retries for connection failures, timeouts, 429 and 5xx responses
max_retries = 3
initial_delay_ms = 500
max_delay_ms = 10000
backoff_multiplier = 2.0

# ============================================================================
# Course Setup
# ============================================================================
[setup]
# Learning outcome the mastery score is aligned to
outcome_title = "Current Mastery"

# Assignment that holds one mastery score per student
container_title = "Current Mastery Score"

# Rubric criterion description on that assignment
criterion_description = "Overall mastery"

mastery_points = 3.0
points_possible = 4.0

# Create missing resources without asking
auto_create = false

# ============================================================================
# Calculation
# ============================================================================
[calculation]
# Assignment ids never counted in the mean
excluded_measurement_ids = []

# Assignments whose name contains any of these (case-insensitive) are skipped
excluded_label_substrings = ["practice", "extra credit"]

# ============================================================================
# Submission
# ============================================================================
[submission]
# Change sets at least this large are sent as one bulk update
batch_threshold = 25

# Attempts per student per pass in per-student mode
max_attempts = 3

# Pause before retrying failed students a second time
deferred_pass_delay_ms = 2000

# Bulk update job polling
poll_interval_ms = 2000
poll_timeout_seconds = 1200

# ============================================================================
# Verification
# ============================================================================
[verification]
# Read-back tolerance
tolerance = 0.001
max_attempts = 50
wait_ms = 2000

# ============================================================================
# Final Grade Overrides
# ============================================================================
[overrides]
enabled = true

# Override = mastery score x scale_factor
scale_factor = 25.0
max_attempts = 3
verify_retries = 3
verify_delay_ms = 2000

# ============================================================================
# Local State
# ============================================================================
[state]
# Where the last completed sync per course is recorded
directory = ".outcome-sync"

# ============================================================================
# Logging
# ============================================================================
[logging]
# JSON log files next to console output
local_enabled = false
local_path = "logs"

# daily | hourly
local_rotation = "daily"
local_max_size_mb = 100
"#
        .to_string()
    }
}
