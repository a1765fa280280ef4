// outcome-sync - LMS mastery score synchronization
// Copyright (c) 2025 Outcome Sync Contributors
// Licensed under the MIT License

//! # outcome-sync - LMS mastery score synchronization
//!
//! outcome-sync computes a per-student mastery score for a course and writes
//! it back to the LMS as a rubric score on a placeholder assignment,
//! optionally mirroring it as a final grade override.
//!
//! ## Overview
//!
//! A sync run:
//! - **Checks** that the outcome, the placeholder assignment and its rubric
//!   criterion exist, creating them after approval
//! - **Calculates** each student's rounded mean over eligible assignment
//!   scores and keeps only the students whose stored values differ
//! - **Submits** the differences per student with retries, or as one bulk
//!   job for large change sets
//! - **Verifies** the written values by reading them back
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - The sync state machine and its steps
//! - [`adapters`] - Collaborator traits, the LMS REST client and an
//!   in-memory backend
//! - [`domain`] - Identifiers, records, change sets and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use outcome_sync::adapters::{Collaborators, LmsClient};
//! use outcome_sync::config::load_config;
//! use outcome_sync::core::flow::{FlowSettings, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("outcome-sync.toml")?;
//!     let settings = FlowSettings::from_config(&config)?;
//!     let client = Arc::new(LmsClient::new(config.lms)?);
//!
//!     let mut orchestrator = Orchestrator::new(Collaborators::from_backend(client), settings);
//!     let summary = orchestrator.run("4521").await?;
//!
//!     println!("{}", summary.format_summary());
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`domain::SyncError`]. Its
//! [`kind`](domain::SyncError::kind) separates transient remote failures,
//! which are retried, from fatal ones:
//!
//! ```rust,no_run
//! use outcome_sync::domain::{ErrorKind, SyncError};
//!
//! fn should_retry(err: &SyncError) -> bool {
//!     matches!(err.kind(), ErrorKind::TransientRemote | ErrorKind::Timeout)
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
