//! Value calculation
//!
//! Pure functions turning a record snapshot into a [`ChangeSet`]. A record's
//! derived value is the rounded mean of its eligible measurements; only
//! records that differ on the primary or the override channel are emitted.

use crate::domain::{round_value, ChangeEntry, ChangeSet, ExclusionSet, Record};
use std::fmt;

/// Maps a derived value onto the override scale
pub trait OverrideTransform: Send + Sync + fmt::Debug {
    fn apply(&self, value: f64) -> f64;
}

/// `value * factor`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    pub factor: f64,
}

impl LinearScale {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl OverrideTransform for LinearScale {
    fn apply(&self, value: f64) -> f64 {
        value * self.factor
    }
}

/// Rounded mean of the record's numeric, non-excluded measurements
///
/// Returns `None` when nothing is eligible; that record is skipped, it is not
/// treated as zero.
pub fn derive_value(record: &Record, exclusions: &ExclusionSet) -> Option<f64> {
    let values: Vec<f64> = record
        .measurements
        .iter()
        .filter(|m| !exclusions.excludes(m))
        .filter_map(|m| m.numeric_value())
        .collect();

    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(round_value(mean))
}

/// Compute the change set for a snapshot
///
/// The primary channel changes when the new value is not exactly the current
/// target. With a transform, the override channel changes when the rounded
/// scaled value is not exactly the current override (a missing override
/// always differs).
pub fn compute(
    records: &[Record],
    exclusions: &ExclusionSet,
    overrides: Option<&dyn OverrideTransform>,
) -> ChangeSet {
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for record in records {
        let Some(value) = derive_value(record, exclusions) else {
            skipped += 1;
            continue;
        };

        let primary_changed = record.target_value != Some(value);
        let override_value = overrides
            .map(|t| round_value(t.apply(value)))
            .filter(|scaled| record.override_value != Some(*scaled));

        if !primary_changed && override_value.is_none() {
            continue;
        }

        entries.push(ChangeEntry {
            record_id: record.record_id.clone(),
            value,
            previous_value: record.target_value,
            primary_changed,
            override_value,
            previous_override: record.override_value,
        });
    }

    tracing::debug!(
        records = records.len(),
        skipped = skipped,
        changed = entries.len(),
        "Computed change set"
    );
    ChangeSet::new(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MeasurementId, RecordId};
    use std::str::FromStr;

    fn record(id: &str, target: Option<f64>, values: &[(&str, Option<f64>, &str)]) -> Record {
        values.iter().fold(
            Record::new(RecordId::from_str(id).unwrap()).with_target_value(target),
            |r, (mid, v, label)| r.with_measurement(MeasurementId::from_str(mid).unwrap(), *v, *label),
        )
    }

    #[test]
    fn test_mean_is_rounded() {
        let r = record("s1", None, &[("a", Some(4.0), "Quiz"), ("b", Some(2.0), "Quiz")]);
        assert_eq!(derive_value(&r, &ExclusionSet::default()), Some(3.0));

        let r = record(
            "s2",
            None,
            &[("a", Some(1.0), "Q"), ("b", Some(2.0), "Q"), ("c", Some(2.0), "Q")],
        );
        assert_eq!(derive_value(&r, &ExclusionSet::default()), Some(1.67));
    }

    #[test]
    fn test_record_without_measurements_is_absent() {
        let records = vec![record("s1", None, &[])];
        let set = compute(&records, &ExclusionSet::default(), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_non_numeric_values_are_ignored() {
        let r = record("s1", None, &[("a", None, "Quiz"), ("b", Some(f64::NAN), "Quiz"), ("c", Some(3.0), "Quiz")]);
        assert_eq!(derive_value(&r, &ExclusionSet::default()), Some(3.0));

        let r = record("s2", None, &[("a", None, "Quiz")]);
        assert_eq!(derive_value(&r, &ExclusionSet::default()), None);
    }

    #[test]
    fn test_excluded_labels_never_count() {
        let exclusions = ExclusionSet::new(Vec::new(), vec!["practice"]);
        let r = record(
            "s1",
            None,
            &[("a", Some(4.0), "Unit 1"), ("b", Some(0.0), "PRACTICE Unit 1"), ("c", Some(0.0), "unit 2 practice")],
        );
        assert_eq!(derive_value(&r, &exclusions), Some(4.0));
    }

    #[test]
    fn test_fully_excluded_record_is_skipped() {
        let exclusions = ExclusionSet::new(vec![MeasurementId::from_str("a").unwrap()], Vec::<String>::new());
        let records = vec![record("s1", None, &[("a", Some(4.0), "Quiz")])];
        assert!(compute(&records, &exclusions, None).is_empty());
    }

    #[test]
    fn test_primary_diff_is_strict() {
        let records = vec![
            record("same", Some(3.0), &[("a", Some(3.0), "Q")]),
            record("close", Some(3.0001), &[("a", Some(3.0), "Q")]),
            record("missing", None, &[("a", Some(3.0), "Q")]),
        ];
        let set = compute(&records, &ExclusionSet::default(), None);
        let ids: Vec<&str> = set.iter().map(|e| e.record_id.as_str()).collect();
        assert_eq!(ids, vec!["close", "missing"]);
    }

    #[test]
    fn test_override_only_change_is_emitted() {
        let scale = LinearScale::new(25.0);
        let records = vec![
            record("synced", Some(3.0), &[("a", Some(3.0), "Q")]).with_override_value(Some(75.0)),
            record("stale", Some(3.0), &[("a", Some(3.0), "Q")]).with_override_value(Some(50.0)),
        ];
        let set = compute(&records, &ExclusionSet::default(), Some(&scale));

        assert_eq!(set.len(), 1);
        let entry = set.get(&RecordId::from_str("stale").unwrap()).unwrap();
        assert!(!entry.primary_changed);
        assert_eq!(entry.override_value, Some(75.0));
        assert_eq!(entry.previous_override, Some(50.0));
    }

    #[test]
    fn test_override_unchanged_is_not_resubmitted() {
        let scale = LinearScale::new(25.0);
        let records = vec![record("s1", Some(2.0), &[("a", Some(3.0), "Q")]).with_override_value(Some(75.0))];
        let set = compute(&records, &ExclusionSet::default(), Some(&scale));

        let entry = &set.entries()[0];
        assert!(entry.primary_changed);
        assert!(!entry.needs_override());
    }

    #[test]
    fn test_compute_is_deterministic() {
        let records = vec![
            record("s1", Some(1.0), &[("a", Some(4.0), "Q"), ("b", Some(2.5), "Q")]),
            record("s2", None, &[("a", Some(1.0), "Q")]),
        ];
        let scale = LinearScale::new(25.0);
        let first = compute(&records, &ExclusionSet::default(), Some(&scale));
        let second = compute(&records, &ExclusionSet::default(), Some(&scale));
        assert_eq!(first, second);
    }
}
