//! External system integrations for outcome-sync.
//!
//! - [`traits`] - the collaborator interfaces the engine consumes
//! - [`lms`] - REST client for the LMS
//! - [`memory`] - in-process backend with scriptable failures
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern**: the engine only sees the traits,
//! so a flow runs unchanged against the network client or the in-memory
//! backend.
//!
//! ```rust,no_run
//! use outcome_sync::adapters::{Collaborators, LmsClient};
//! use outcome_sync::config::load_config;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("outcome-sync.toml")?;
//! let client = Arc::new(LmsClient::new(config.lms)?);
//! let collaborators = Collaborators::from_backend(client);
//! # Ok(())
//! # }
//! ```

pub mod lms;
pub mod memory;
pub mod traits;

pub use lms::LmsClient;
pub use memory::InMemoryLms;
pub use traits::{
    AutoApprove, Collaborators, DeclineAll, JobState, JobStatus, OverrideApi, PrimaryApi, ProvisionApproval,
    RecordSource, ResourceProvisioner, WriteTarget,
};
