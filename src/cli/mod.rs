//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for outcome-sync using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// outcome-sync - LMS mastery score synchronization
#[derive(Parser, Debug)]
#[command(name = "outcome-sync")]
#[command(version, about, long_about = None)]
#[command(author = "Outcome Sync Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "outcome-sync.toml", env = "OUTCOME_SYNC_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "OUTCOME_SYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synchronize mastery scores for one course
    Sync(commands::sync::SyncArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show the last completed sync per course
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
