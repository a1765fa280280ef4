//! Status command implementation
//!
//! This module implements the `status` command, listing the last completed
//! sync recorded for each course.

use crate::config::load_config;
use crate::core::state::LastRunStore;
use crate::domain::ScopeId;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show this course
    #[arg(long)]
    pub course: Option<String>,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking sync status");

        println!("📊 Sync Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        let store = LastRunStore::new(&config.state.directory);
        let records = match &self.course {
            Some(course) => {
                let scope = match ScopeId::new(course.as_str()) {
                    Ok(s) => s,
                    Err(e) => {
                        println!("❌ {e}");
                        return Ok(2);
                    }
                };
                store.load(&scope).map(|r| r.into_iter().collect::<Vec<_>>())
            }
            None => store.list(),
        };
        let records = match records {
            Ok(r) => r,
            Err(e) => {
                println!("❌ Failed to read sync history");
                println!("   Error: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        if records.is_empty() {
            println!("No sync history found in {}.", store.directory().display());
            println!("Run 'outcome-sync sync --course <id>' to start.");
            return Ok(0);
        }

        println!("Found {} course(s):", records.len());
        println!();
        println!(
            "{:<12} {:<22} {:<12} {:<10} {:<10} {:<10}",
            "Course", "Last Sync", "Mode", "Updated", "Failed", "Duration"
        );
        println!("{}", "-".repeat(80));

        for record in records {
            let mode = record
                .mode
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<12} {:<22} {:<12} {:<10} {:<10} {:<10}",
                record.scope.as_str(),
                record.completed_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                mode,
                record.number_of_updates,
                record.failures,
                format!("{}s", record.duration_seconds)
            );
        }
        println!();

        Ok(0)
    }
}
