//! Verification report structures

use crate::domain::ids::RecordId;
use crate::domain::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default absolute tolerance for read-back comparison
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Whether a read-back value matches the expected one
pub fn within_tolerance(expected: f64, actual: f64, tolerance: f64) -> bool {
    (expected - actual).abs() <= tolerance
}

/// A record whose read-back value did not match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub record_id: RecordId,
    pub channel: Channel,
    pub expected: f64,

    /// `None` when the remote has no value or the read failed
    pub actual: Option<f64>,

    pub error: Option<String>,
}

/// Result of one verification loop over a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub channel: Channel,

    /// When the loop finished
    pub verified_at: DateTime<Utc>,

    /// Records that were checked
    pub checked: usize,

    /// Read-back rounds performed
    pub attempts: u32,

    /// Every checked record matched within tolerance
    pub converged: bool,

    /// Records still mismatched after the last round
    pub mismatches: Vec<Mismatch>,

    pub duration_ms: u64,
}

impl VerificationReport {
    /// Report for a channel with nothing to check
    pub fn empty(channel: Channel) -> Self {
        Self {
            channel,
            verified_at: Utc::now(),
            checked: 0,
            attempts: 0,
            converged: true,
            mismatches: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn matched(&self) -> usize {
        self.checked - self.mismatches.len()
    }

    /// Format the report as a human-readable string
    pub fn format_summary(&self) -> String {
        let title = match self.channel {
            Channel::Primary => "📊 Verification Report",
            Channel::Override => "📊 Override Verification Report",
        };
        let mut summary = String::new();
        summary.push_str(title);
        summary.push('\n');
        summary.push_str(&format!("  Verified at: {}\n", self.verified_at));
        summary.push_str(&format!("  Duration: {} ms\n", self.duration_ms));
        summary.push_str(&format!("  Attempts: {}\n", self.attempts));
        summary.push_str(&format!("  ✅ Matched: {}/{}\n", self.matched(), self.checked));

        if !self.mismatches.is_empty() {
            summary.push_str(&format!("  ❌ Mismatched: {}\n", self.mismatches.len()));
            for mismatch in &self.mismatches {
                let actual = mismatch
                    .actual
                    .map(|v| format!("{v:.2}"))
                    .unwrap_or_else(|| "none".to_string());
                summary.push_str(&format!(
                    "    - {}: expected {:.2}, found {}\n",
                    mismatch.record_id, mismatch.expected, actual
                ));
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use test_case::test_case;

    #[test_case(3.0, 3.0009 => true ; "just inside tolerance")]
    #[test_case(3.0, 3.0011 => false ; "just outside tolerance")]
    #[test_case(3.0, 2.9991 => true ; "inside below")]
    #[test_case(3.0, 2.9989 => false ; "outside below")]
    #[test_case(75.0, 75.0 => true ; "exact")]
    fn test_within_tolerance(expected: f64, actual: f64) -> bool {
        within_tolerance(expected, actual, DEFAULT_TOLERANCE)
    }

    #[test]
    fn test_format_summary_lists_mismatches() {
        let mut report = VerificationReport::empty(Channel::Primary);
        report.checked = 2;
        report.converged = false;
        report.mismatches.push(Mismatch {
            record_id: RecordId::from_str("1001").unwrap(),
            channel: Channel::Primary,
            expected: 3.0,
            actual: Some(2.0),
            error: None,
        });

        let text = report.format_summary();
        assert!(text.contains("Matched: 1/2"));
        assert!(text.contains("1001: expected 3.00, found 2.00"));
    }
}
