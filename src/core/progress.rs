//! One-way progress notifications
//!
//! The engine pushes phase text and elapsed seconds to a sink; it never reads
//! anything back.

use crate::core::flow::FlowState;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowProgress {
    pub state: FlowState,
    pub message: String,
    pub elapsed_secs: u64,
}

impl FlowProgress {
    pub fn new(state: FlowState, message: impl Into<String>, elapsed_secs: u64) -> Self {
        Self {
            state,
            message: message.into(),
            elapsed_secs,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn notify(&self, progress: &FlowProgress);
}

/// Emits progress as `info!` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn notify(&self, progress: &FlowProgress) {
        tracing::info!(
            state = %progress.state,
            elapsed_secs = progress.elapsed_secs,
            "{}",
            progress.message
        );
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingProgressSink {
    events: Mutex<Vec<FlowProgress>>,
}

impl RecordingProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FlowProgress> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Messages emitted while in `state`
    pub fn messages_for(&self, state: FlowState) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.state == state)
            .map(|e| e.message)
            .collect()
    }
}

impl ProgressSink for RecordingProgressSink {
    fn notify(&self, progress: &FlowProgress) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(progress.clone());
    }
}
