//! Submission strategy selection

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default change-set size at which batching starts
pub const DEFAULT_BATCH_THRESHOLD: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionMode {
    PerRecord,
    Batch,
}

impl fmt::Display for SubmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionMode::PerRecord => f.write_str("PER_RECORD"),
            SubmissionMode::Batch => f.write_str("BATCH"),
        }
    }
}

/// `PerRecord` below the threshold, `Batch` at or above it
pub fn select_mode(change_set_len: usize, threshold: usize) -> SubmissionMode {
    if change_set_len < threshold {
        SubmissionMode::PerRecord
    } else {
        SubmissionMode::Batch
    }
}
