//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers the engine passes between the LMS
//! collaborators. Every identifier is an opaque, non-empty string: numeric
//! LMS ids are carried as text so adapters never have to agree on a width.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new `", stringify!($name), "`, rejecting blank input")]
            pub fn new(id: impl Into<String>) -> Result<Self, String> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(concat!($label, " cannot be empty").to_string());
                }
                Ok(Self(id))
            }

            /// Returns the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes self and returns the inner String
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Logical unit of work a flow runs against (one course).
    ///
    /// ```
    /// use outcome_sync::domain::ids::ScopeId;
    /// use std::str::FromStr;
    ///
    /// let scope = ScopeId::from_str("4521").unwrap();
    /// assert_eq!(scope.as_str(), "4521");
    /// assert!(ScopeId::new("  ").is_err());
    /// ```
    ScopeId,
    "Scope ID"
);

string_id!(
    /// The unit being synchronized (one student within a scope).
    RecordId,
    "Record ID"
);

string_id!(
    /// One source measurement (typically an assignment the student was scored on).
    MeasurementId,
    "Measurement ID"
);

string_id!(
    /// Identifier of a provisioned LMS resource (outcome, container or criterion).
    ResourceId,
    "Resource ID"
);

string_id!(
    /// Stable identifier of a record on the override surface.
    CorrelationId,
    "Correlation ID"
);

string_id!(
    /// Handle of an asynchronous batch job on the primary surface.
    JobHandle,
    "Job handle"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_valid() {
        let id = RecordId::new("1001").unwrap();
        assert_eq!(id.as_str(), "1001");
        assert_eq!(id.to_string(), "1001");
        assert_eq!(id.clone().into_inner(), "1001".to_string());
    }

    #[test]
    fn test_ids_reject_blank() {
        assert!(RecordId::new("").is_err());
        assert!(CorrelationId::new("   ").is_err());
        let err = JobHandle::new("").unwrap_err();
        assert_eq!(err, "Job handle cannot be empty");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = ResourceId::from_str("77").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"77\"");
        let back: ResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_ids_order_lexically() {
        let mut ids = vec![RecordId::new("b").unwrap(), RecordId::new("a").unwrap()];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
