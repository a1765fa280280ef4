//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the outcome-sync configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates after applying overrides
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!("  Dry Run: {}", config.application.dry_run);
        println!("  LMS: {}", config.lms.base_url);
        println!("  Outcome: {}", config.setup.outcome_title);
        println!("  Assignment: {}", config.setup.container_title);
        println!("  Auto-create: {}", config.setup.auto_create);
        println!("  Batch Threshold: {}", config.submission.batch_threshold);
        println!(
            "  Excluded Labels: {:?}",
            config.calculation.excluded_label_substrings
        );
        if config.overrides.enabled {
            println!("  Grade Overrides: x{}", config.overrides.scale_factor);
        } else {
            println!("  Grade Overrides: disabled");
        }
        println!("  State Directory: {}", config.state.directory);
        println!();
        Ok(0)
    }
}
