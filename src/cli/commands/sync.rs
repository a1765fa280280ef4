//! Sync command implementation
//!
//! This module implements the `sync` command, which runs one flow against a
//! course on the configured LMS.

use crate::adapters::traits::{AutoApprove, Collaborators, ProvisionApproval};
use crate::adapters::LmsClient;
use crate::config::load_config;
use crate::core::flow::{FlowSettings, FlowState, Orchestrator, SyncSummary};
use crate::core::progress::{FlowProgress, ProgressSink};
use crate::core::state::{LastRunRecord, LastRunStore};
use crate::domain::{ErrorKind, ResourceSpec, SyncError};
use clap::Args;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Course to synchronize
    #[arg(long, env = "OUTCOME_SYNC_COURSE")]
    pub course: String,

    /// Create missing outcome, assignment or rubric without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Calculate and report changes without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Override the change-set size at which batch mode starts
    #[arg(long)]
    pub threshold: Option<usize>,
}

impl SyncArgs {
    /// Execute the sync command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(course = %self.course, "Starting sync command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("❌ Failed to load configuration: {e}");
                return Ok(2); // Configuration error exit code
            }
        };

        if self.dry_run {
            tracing::info!("Enabling dry-run mode from CLI");
            config.application.dry_run = true;
        }
        if let Some(threshold) = self.threshold {
            tracing::info!(threshold, "Overriding batch threshold from CLI");
            config.submission.batch_threshold = threshold;
        }
        if let Err(e) = config.validate() {
            eprintln!("❌ Configuration validation failed: {e}");
            return Ok(2);
        }

        let settings = match FlowSettings::from_config(&config) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("❌ Invalid settings: {e}");
                return Ok(2);
            }
        };
        let client = match LmsClient::new(config.lms.clone()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                eprintln!("❌ Failed to initialize LMS client: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        let approval: Arc<dyn ProvisionApproval> = if self.yes || config.setup.auto_create {
            Arc::new(AutoApprove)
        } else {
            Arc::new(PromptApproval)
        };

        if config.application.dry_run {
            println!("🔍 DRY RUN MODE - No scores will be written");
            println!();
        }
        println!("🚀 Syncing course {}...", self.course);
        println!();

        let mut orchestrator = Orchestrator::new(Collaborators::from_backend(client), settings)
            .with_approval(approval)
            .with_progress_sink(Arc::new(ConsoleProgressSink))
            .with_cancellation(shutdown_signal);

        let summary = match orchestrator.run(&self.course).await {
            Ok(s) => s,
            Err(e) => {
                let code = exit_code_for(&e);
                match e.kind() {
                    ErrorKind::UserAbort => println!("Setup cancelled; nothing was changed."),
                    ErrorKind::Cancelled => {
                        println!();
                        println!("⚠️  Sync interrupted. Re-run the same command to finish;");
                        println!("   only students still out of sync will be resubmitted.");
                    }
                    _ => eprintln!("❌ Sync failed: {e}"),
                }
                return Ok(code);
            }
        };

        println!();
        print_summary(&summary);
        persist_last_run(&LastRunStore::new(&config.state.directory), &summary);

        let exit_code = if summary.is_successful() {
            println!("✅ Sync completed successfully!");
            0
        } else {
            println!("⚠️  Sync completed with failures");
            1 // Partial success
        };
        Ok(exit_code)
    }
}

/// Map a flow error onto the process exit code
pub fn exit_code_for(error: &SyncError) -> i32 {
    match error.kind() {
        ErrorKind::Validation => 2,
        ErrorKind::UserAbort => 3,
        ErrorKind::TransientRemote => 4,
        ErrorKind::Cancelled => 130,
        ErrorKind::Internal if matches!(error, SyncError::Configuration(_)) => 2,
        ErrorKind::FatalRemote | ErrorKind::Timeout | ErrorKind::Internal => 5,
    }
}

fn print_summary(summary: &SyncSummary) {
    print!("{}", summary.format_summary());
    if let Some(report) = &summary.verification {
        println!();
        print!("{}", report.format_summary());
    }
    if let Some(report) = summary.override_verification.as_ref().filter(|r| r.checked > 0) {
        println!();
        print!("{}", report.format_summary());
    }
    println!();
}

fn persist_last_run(store: &LastRunStore, summary: &SyncSummary) {
    let Some(record) = LastRunRecord::from_summary(summary) else {
        return;
    };
    match store.save(&record) {
        Ok(path) => tracing::info!(path = %path.display(), "Saved last-run metadata"),
        Err(e) => tracing::warn!(error = %e, "Failed to save last-run metadata"),
    }
}

/// Asks on the terminal before creating a resource
struct PromptApproval;

impl ProvisionApproval for PromptApproval {
    fn approve(&self, spec: &ResourceSpec) -> bool {
        print!("{} '{}' does not exist. Create it? [y/N]: ", spec.kind, spec.name);
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(_) => input.trim().eq_ignore_ascii_case("y"),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read confirmation");
                false
            }
        }
    }
}

/// Prints each phase with the elapsed time
struct ConsoleProgressSink;

impl ProgressSink for ConsoleProgressSink {
    fn notify(&self, progress: &FlowProgress) {
        tracing::debug!(state = %progress.state, elapsed_secs = progress.elapsed_secs, "{}", progress.message);
        if progress.state == FlowState::Idle {
            return;
        }
        println!("  [{:>4}s] {}", progress.elapsed_secs, progress.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RemoteError;
    use test_case::test_case;

    #[test_case(SyncError::Validation("scope".into()) => 2 ; "validation")]
    #[test_case(SyncError::Configuration("bad".into()) => 2 ; "configuration")]
    #[test_case(SyncError::UserAbort("no".into()) => 3 ; "user abort")]
    #[test_case(SyncError::Remote(RemoteError::ConnectionFailed("down".into())) => 4 ; "connection")]
    #[test_case(SyncError::Fatal("job failed".into()) => 5 ; "fatal")]
    #[test_case(SyncError::Timeout { operation: "job 1".into(), elapsed_secs: 1200 } => 5 ; "timeout")]
    #[test_case(SyncError::Cancelled("signal".into()) => 130 ; "cancelled")]
    fn test_exit_codes(error: SyncError) -> i32 {
        exit_code_for(&error)
    }

    #[tokio::test]
    async fn test_missing_config_is_configuration_error() {
        let args = SyncArgs {
            course: "4521".to_string(),
            yes: true,
            dry_run: false,
            threshold: None,
        };
        let (_tx, rx) = watch::channel(false);
        let code = args
            .execute("/nonexistent/outcome-sync.toml", rx)
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
