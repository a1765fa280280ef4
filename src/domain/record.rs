//! Records, source measurements and exclusion rules
//!
//! A [`Record`] is one student in one scope. It carries the immutable snapshot
//! of its [`SourceMeasurement`]s plus the values currently stored on the two
//! remote surfaces, which the calculator diffs against.

use super::ids::{MeasurementId, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Number of decimals derived values are rounded to
pub const VALUE_PRECISION: i32 = 2;

/// Round a value to [`VALUE_PRECISION`] decimals, half away from zero
///
/// ```
/// use outcome_sync::domain::record::round_value;
///
/// assert_eq!(round_value(3.14159), 3.14);
/// assert_eq!(round_value(2.675_1), 2.68);
/// ```
pub fn round_value(value: f64) -> f64 {
    let factor = 10f64.powi(VALUE_PRECISION);
    (value * factor).round() / factor
}

/// One raw input contributing to a record's derived value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeasurement {
    pub measurement_id: MeasurementId,
    pub record_id: RecordId,
    /// Score; `None` when ungraded
    pub value: Option<f64>,
    /// Human readable label used by substring exclusions
    pub label: String,
}

impl SourceMeasurement {
    pub fn new(
        measurement_id: MeasurementId,
        record_id: RecordId,
        value: Option<f64>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            measurement_id,
            record_id,
            value,
            label: label.into(),
        }
    }

    /// The measurement value if it is a usable number
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// The unit being synchronized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: RecordId,

    /// Value currently stored on the primary surface
    pub target_value: Option<f64>,

    /// Value currently stored on the override surface
    pub override_value: Option<f64>,

    pub measurements: Vec<SourceMeasurement>,
}

impl Record {
    /// Create a record with no stored values and no measurements
    pub fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            target_value: None,
            override_value: None,
            measurements: Vec::new(),
        }
    }

    /// Set the current primary target value
    pub fn with_target_value(mut self, value: Option<f64>) -> Self {
        self.target_value = value;
        self
    }

    /// Set the current override value
    pub fn with_override_value(mut self, value: Option<f64>) -> Self {
        self.override_value = value;
        self
    }

    /// Append a measurement belonging to this record
    pub fn with_measurement(
        mut self,
        measurement_id: MeasurementId,
        value: Option<f64>,
        label: impl Into<String>,
    ) -> Self {
        self.measurements.push(SourceMeasurement::new(
            measurement_id,
            self.record_id.clone(),
            value,
            label,
        ));
        self
    }
}

/// Measurements ignored for every record of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionSet {
    measurement_ids: HashSet<MeasurementId>,
    /// Stored lowercased and untrimmed; empty entries are dropped on construction
    label_substrings: Vec<String>,
}

impl ExclusionSet {
    /// Build an exclusion set
    ///
    /// Empty label substrings are discarded since they would match every label.
    /// Surrounding whitespace is kept and takes part in the match.
    pub fn new(
        measurement_ids: impl IntoIterator<Item = MeasurementId>,
        label_substrings: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            measurement_ids: measurement_ids.into_iter().collect(),
            label_substrings: label_substrings
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Exclude one more measurement id
    pub fn with_measurement_id(mut self, id: MeasurementId) -> Self {
        self.measurement_ids.insert(id);
        self
    }

    /// Whether the measurement must be left out of the mean
    pub fn excludes(&self, measurement: &SourceMeasurement) -> bool {
        if self.measurement_ids.contains(&measurement.measurement_id) {
            return true;
        }
        let label = measurement.label.to_lowercase();
        self.label_substrings.iter().any(|s| label.contains(s.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.measurement_ids.is_empty() && self.label_substrings.is_empty()
    }
}

/// Computed mean used as the new target value, already rounded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedValue {
    pub record_id: RecordId,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn measurement(id: &str, label: &str) -> SourceMeasurement {
        SourceMeasurement::new(
            MeasurementId::from_str(id).unwrap(),
            RecordId::from_str("s1").unwrap(),
            Some(1.0),
            label,
        )
    }

    #[test]
    fn test_round_value() {
        assert_eq!(round_value(3.0), 3.0);
        assert_eq!(round_value(2.333_333), 2.33);
        assert_eq!(round_value(2.666_666), 2.67);
        assert_eq!(round_value(-1.456), -1.46);
    }

    #[test]
    fn test_exclusion_by_id() {
        let set = ExclusionSet::new(
            vec![MeasurementId::from_str("a1").unwrap()],
            Vec::<String>::new(),
        );
        assert!(set.excludes(&measurement("a1", "Quiz")));
        assert!(!set.excludes(&measurement("a2", "Quiz")));
    }

    #[test]
    fn test_exclusion_by_label_any_case_any_position() {
        let set = ExclusionSet::new(Vec::new(), vec!["Practice", "extra CREDIT"]);
        assert!(set.excludes(&measurement("a1", "practice quiz")));
        assert!(set.excludes(&measurement("a2", "Unit 3 PRACTICE")));
        assert!(set.excludes(&measurement("a3", "Week 2 (Extra Credit)")));
        assert!(!set.excludes(&measurement("a4", "Final Exam")));
    }

    #[test]
    fn test_empty_substrings_are_ignored() {
        let set = ExclusionSet::new(Vec::new(), vec!["", ""]);
        assert!(set.is_empty());
        assert!(!set.excludes(&measurement("a1", "Anything")));
    }

    #[test]
    fn test_label_substring_keeps_surrounding_whitespace() {
        let set = ExclusionSet::new(Vec::new(), vec![" lab"]);
        assert!(!set.is_empty());
        assert!(set.excludes(&measurement("a1", "Unit 2 Lab")));
        assert!(!set.excludes(&measurement("a2", "Collaboration")));
        assert!(!set.excludes(&measurement("a3", "Lab Report")));
    }

    #[test]
    fn test_non_finite_values_are_not_numeric() {
        let mut m = measurement("a1", "Quiz");
        m.value = Some(f64::NAN);
        assert_eq!(m.numeric_value(), None);
        m.value = None;
        assert_eq!(m.numeric_value(), None);
        m.value = Some(2.5);
        assert_eq!(m.numeric_value(), Some(2.5));
    }

    #[test]
    fn test_record_builder() {
        let record = Record::new(RecordId::from_str("s1").unwrap())
            .with_target_value(Some(2.0))
            .with_override_value(None)
            .with_measurement(MeasurementId::from_str("a1").unwrap(), Some(3.0), "Quiz 1");

        assert_eq!(record.target_value, Some(2.0));
        assert_eq!(record.measurements.len(), 1);
        assert_eq!(record.measurements[0].record_id.as_str(), "s1");
    }
}
