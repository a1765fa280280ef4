//! Writing a change set to the primary surface
//!
//! - [`strategy`] picks per-record or batch mode from the change-set size
//! - [`per_record`] writes one value at a time with a deferred retry pass
//! - [`batch`] sends one bulk request
//! - [`poller`] waits on the bulk request's job

pub mod batch;
pub mod per_record;
pub mod poller;
pub mod strategy;

pub use batch::{BatchReport, BatchSubmitter};
pub use per_record::{retry_histogram, PerRecordPolicy, PerRecordReport, PerRecordSubmitter};
pub use poller::{poll_until_terminal, PollPolicy};
pub use strategy::{select_mode, SubmissionMode, DEFAULT_BATCH_THRESHOLD};
