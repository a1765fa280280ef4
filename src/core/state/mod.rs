//! Host-side state
//!
//! - [`last_run`] - per-scope record of the last completed sync

pub mod last_run;

pub use last_run::{LastRunRecord, LastRunStore};
