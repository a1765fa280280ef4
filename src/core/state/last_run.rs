//! Last-run metadata persistence
//!
//! The engine only emits [`LastRunMetadata`] on `COMPLETE`; hosts that want
//! to remember it use this store. One JSON document per scope lives in the
//! configured state directory.

use crate::core::flow::SyncSummary;
use crate::core::submit::SubmissionMode;
use crate::domain::ids::ScopeId;
use crate::domain::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const FILE_PREFIX: &str = "last-run-";
const FILE_SUFFIX: &str = ".json";

/// What the host remembers about a scope's last completed sync
///
/// # Examples
///
/// ```
/// use outcome_sync::core::state::LastRunRecord;
/// use outcome_sync::domain::ids::ScopeId;
///
/// let record = LastRunRecord::new(ScopeId::new("4521").unwrap());
/// assert_eq!(record.number_of_updates, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRunRecord {
    pub scope: ScopeId,
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: u64,
    pub number_of_updates: usize,
    pub change_set_size: usize,
    pub failures: usize,
    #[serde(default)]
    pub mode: Option<SubmissionMode>,
}

impl LastRunRecord {
    pub fn new(scope: ScopeId) -> Self {
        Self {
            scope,
            run_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            duration_seconds: 0,
            number_of_updates: 0,
            change_set_size: 0,
            failures: 0,
            mode: None,
        }
    }

    /// `None` for summaries without last-run metadata (dry runs)
    pub fn from_summary(summary: &SyncSummary) -> Option<Self> {
        let last_run = summary.last_run.as_ref()?;
        Some(Self {
            scope: summary.scope.clone(),
            run_id: summary.run_id,
            completed_at: last_run.completed_at,
            duration_seconds: last_run.duration_seconds,
            number_of_updates: summary.number_of_updates,
            change_set_size: summary.change_set_size,
            failures: summary.failures.len(),
            mode: summary.mode,
        })
    }
}

/// File-backed store of [`LastRunRecord`]s
#[derive(Debug, Clone)]
pub struct LastRunStore {
    directory: PathBuf,
}

impl LastRunStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write the record, replacing the scope's previous one
    ///
    /// The document is written to a temporary file and renamed into place.
    pub fn save(&self, record: &LastRunRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path_for(&record.scope);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(scope = %record.scope, path = %path.display(), "Saved last-run metadata");
        Ok(path)
    }

    pub fn load(&self, scope: &ScopeId) -> Result<Option<LastRunRecord>> {
        let path = self.path_for(scope);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let record = serde_json::from_str(&content).map_err(|e| {
            SyncError::Serialization(format!("{}: {e}", path.display()))
        })?;
        Ok(Some(record))
    }

    /// Every stored record, most recent first
    ///
    /// Unreadable files are skipped with a warning.
    pub fn list(&self) -> Result<Vec<LastRunRecord>> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
                .unwrap_or(false);
            if !is_record {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(SyncError::from)
                .and_then(|c| serde_json::from_str::<LastRunRecord>(&c).map_err(SyncError::from))
            {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable last-run file")
                }
            }
        }

        records.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(records)
    }

    fn path_for(&self, scope: &ScopeId) -> PathBuf {
        let safe: String = scope
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{FILE_PREFIX}{safe}{FILE_SUFFIX}"))
    }
}
