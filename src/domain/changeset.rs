//! Change sets and per-record retry bookkeeping

use super::ids::RecordId;
use super::record::DerivedValue;
use serde::{Deserialize, Serialize};

/// One record whose primary or override value is out of sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub record_id: RecordId,

    /// Newly derived value (rounded)
    pub value: f64,

    /// Value found on the primary surface when the snapshot was taken
    pub previous_value: Option<f64>,

    /// Whether the primary surface needs the new value
    pub primary_changed: bool,

    /// Scaled override to write; `Some` only when the override surface differs
    pub override_value: Option<f64>,

    /// Override found when the snapshot was taken
    pub previous_override: Option<f64>,
}

impl ChangeEntry {
    /// Whether the override surface needs synchronizing for this record
    pub fn needs_override(&self) -> bool {
        self.override_value.is_some()
    }

    pub fn derived(&self) -> DerivedValue {
        DerivedValue {
            record_id: self.record_id.clone(),
            value: self.value,
        }
    }
}

/// Records whose derived or override value differs from the remote state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    entries: Vec<ChangeEntry>,
}

impl ChangeSet {
    pub fn new(entries: Vec<ChangeEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter()
    }

    /// Entries whose primary value must be written
    pub fn primary_entries(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter().filter(|e| e.primary_changed)
    }

    /// Entries whose override must be written
    pub fn override_entries(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.entries.iter().filter(|e| e.needs_override())
    }

    pub fn get(&self, record_id: &RecordId) -> Option<&ChangeEntry> {
        self.entries.iter().find(|e| &e.record_id == record_id)
    }

    /// Restrict the set to the given records, keeping the original order
    pub fn subset<'a>(&self, record_ids: impl IntoIterator<Item = &'a RecordId>) -> ChangeSet {
        let wanted: Vec<&RecordId> = record_ids.into_iter().collect();
        ChangeSet::new(
            self.entries
                .iter()
                .filter(|e| wanted.contains(&&e.record_id))
                .cloned()
                .collect(),
        )
    }
}

/// Remote surface a retry record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Primary,
    Override,
}

/// Attempts spent on one record for one channel across the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRecord {
    pub record_id: RecordId,
    pub channel: Channel,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl RetryRecord {
    pub fn new(record_id: RecordId, channel: Channel) -> Self {
        Self {
            record_id,
            channel,
            attempts: 0,
            last_error: None,
        }
    }

    /// Count a failed attempt
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
    }

    /// Count a successful attempt
    pub fn record_success(&mut self) {
        self.attempts += 1;
    }
}
