//! Core engine for outcome-sync.
//!
//! # Modules
//!
//! - [`calculate`] - derived values and change sets
//! - [`submit`] - strategy selection, per-record and batch submission, job polling
//! - [`verification`] - read-back until values are visible
//! - [`overrides`] - the override channel and its correlation cache
//! - [`flow`] - the state machine tying it together
//! - [`state`] - last-run persistence for hosts
//! - [`cancel`], [`progress`] - cancellation and progress notification
//!
//! # Sync Workflow
//!
//! 1. **Check setup**: find the outcome, assignment and rubric criterion,
//!    creating whatever is missing and re-checking after each creation
//! 2. **Calculate**: fetch the course snapshot and diff derived scores
//!    against the current ones
//! 3. **Update**: write per student below the batch threshold, otherwise
//!    submit one bulk update and poll its job
//! 4. **Verify**: read scores back until they are visible
//! 5. **Verify overrides**: read final-grade overrides back
//!
//! # Example
//!
//! ```rust,no_run
//! use outcome_sync::adapters::{Collaborators, LmsClient};
//! use outcome_sync::config::load_config;
//! use outcome_sync::core::flow::{FlowSettings, Orchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("outcome-sync.toml")?;
//! let settings = FlowSettings::from_config(&config)?;
//! let client = Arc::new(LmsClient::new(config.lms)?);
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let mut orchestrator = Orchestrator::new(Collaborators::from_backend(client), settings)
//!     .with_cancellation(shutdown_rx);
//!
//! let summary = orchestrator.run("4521").await?;
//! println!("Updated: {}", summary.number_of_updates);
//! # Ok(())
//! # }
//! ```

pub mod calculate;
pub mod cancel;
pub mod flow;
pub mod overrides;
pub mod progress;
pub mod state;
pub mod submit;
pub mod verification;
