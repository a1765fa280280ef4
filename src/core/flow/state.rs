//! Flow states and the static transition table

use crate::domain::{ResourceKind, Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    Idle,
    CheckingSetup,
    CreatingOutcome,
    CreatingContainer,
    CreatingCriterion,
    Calculating,
    UpdatingRecords,
    PollingProgress,
    Verifying,
    VerifyingOverrides,
    Complete,
    Error,
}

impl FlowState {
    /// The creation state for a resource kind
    pub fn creating(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Outcome => FlowState::CreatingOutcome,
            ResourceKind::Container => FlowState::CreatingContainer,
            ResourceKind::Criterion => FlowState::CreatingCriterion,
        }
    }

    /// Resource kind a `Creating*` state provisions
    pub fn creation_kind(&self) -> Option<ResourceKind> {
        match self {
            FlowState::CreatingOutcome => Some(ResourceKind::Outcome),
            FlowState::CreatingContainer => Some(ResourceKind::Container),
            FlowState::CreatingCriterion => Some(ResourceKind::Criterion),
            _ => None,
        }
    }

    /// `Complete` only; `Error` always resolves back to `Idle`
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Idle => "IDLE",
            FlowState::CheckingSetup => "CHECKING_SETUP",
            FlowState::CreatingOutcome => "CREATING_OUTCOME",
            FlowState::CreatingContainer => "CREATING_CONTAINER",
            FlowState::CreatingCriterion => "CREATING_CRITERION",
            FlowState::Calculating => "CALCULATING",
            FlowState::UpdatingRecords => "UPDATING_RECORDS",
            FlowState::PollingProgress => "POLLING_PROGRESS",
            FlowState::Verifying => "VERIFYING",
            FlowState::VerifyingOverrides => "VERIFYING_OVERRIDES",
            FlowState::Complete => "COMPLETE",
            FlowState::Error => "ERROR",
        }
    }

    /// Human-readable phase text for progress sinks
    pub fn description(&self) -> &'static str {
        match self {
            FlowState::Idle => "Idle",
            FlowState::CheckingSetup => "Checking setup",
            FlowState::CreatingOutcome => "Creating outcome",
            FlowState::CreatingContainer => "Creating assignment",
            FlowState::CreatingCriterion => "Creating rubric criterion",
            FlowState::Calculating => "Calculating mastery scores",
            FlowState::UpdatingRecords => "Updating student scores",
            FlowState::PollingProgress => "Waiting for bulk update",
            FlowState::Verifying => "Verifying scores",
            FlowState::VerifyingOverrides => "Verifying grade overrides",
            FlowState::Complete => "Sync complete",
            FlowState::Error => "Sync failed",
        }
    }

    /// States reachable in one step
    pub fn successors(&self) -> &'static [FlowState] {
        use FlowState::*;
        match self {
            Idle => &[CheckingSetup, Error],
            CheckingSetup => &[
                CreatingOutcome,
                CreatingContainer,
                CreatingCriterion,
                Calculating,
                Error,
            ],
            CreatingOutcome | CreatingContainer | CreatingCriterion => &[CheckingSetup, Error],
            Calculating => &[UpdatingRecords, Complete, Error],
            UpdatingRecords => &[PollingProgress, Verifying, Error],
            PollingProgress => &[Verifying, Error],
            Verifying => &[VerifyingOverrides, Error],
            VerifyingOverrides => &[Complete, Error],
            Error => &[Idle],
            Complete => &[],
        }
    }

    pub fn can_transition_to(&self, next: FlowState) -> bool {
        self.successors().contains(&next)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a transition against the table
///
/// `pending` is the resource setup still has to create, if any. While one is
/// pending, `CHECKING_SETUP -> CALCULATING` is rejected.
pub fn check_transition(
    from: FlowState,
    to: FlowState,
    pending: Option<ResourceKind>,
) -> Result<()> {
    let detour_pending = from == FlowState::CheckingSetup && to == FlowState::Calculating && pending.is_some();
    if !from.can_transition_to(to) || detour_pending {
        return Err(SyncError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(FlowState::Idle, FlowState::CheckingSetup => true ; "start")]
    #[test_case(FlowState::CheckingSetup, FlowState::CreatingContainer => true ; "detour")]
    #[test_case(FlowState::CreatingContainer, FlowState::CheckingSetup => true ; "revalidate after create")]
    #[test_case(FlowState::CreatingContainer, FlowState::Calculating => false ; "create must revalidate")]
    #[test_case(FlowState::Calculating, FlowState::Complete => true ; "empty change set")]
    #[test_case(FlowState::UpdatingRecords, FlowState::Verifying => true ; "per record skips polling")]
    #[test_case(FlowState::PollingProgress, FlowState::VerifyingOverrides => false ; "cannot skip verification")]
    #[test_case(FlowState::Complete, FlowState::CreatingOutcome => false ; "complete is terminal")]
    #[test_case(FlowState::Error, FlowState::Idle => true ; "error resets")]
    #[test_case(FlowState::Error, FlowState::CheckingSetup => false ; "error never resumes")]
    fn test_transition_table(from: FlowState, to: FlowState) -> bool {
        check_transition(from, to, None).is_ok()
    }

    #[test]
    fn test_error_reachable_from_every_non_terminal_state() {
        use FlowState::*;
        for state in [
            Idle,
            CheckingSetup,
            CreatingOutcome,
            CreatingContainer,
            CreatingCriterion,
            Calculating,
            UpdatingRecords,
            PollingProgress,
            Verifying,
            VerifyingOverrides,
        ] {
            assert!(state.can_transition_to(Error), "{state} -> ERROR");
        }
        assert!(!Complete.can_transition_to(Error));
    }

    #[test]
    fn test_calculating_requires_no_pending_creation() {
        assert!(check_transition(FlowState::CheckingSetup, FlowState::Calculating, None).is_ok());
        let err = check_transition(
            FlowState::CheckingSetup,
            FlowState::Calculating,
            Some(ResourceKind::Criterion),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "Illegal flow transition CHECKING_SETUP -> CALCULATING");
    }

    #[test]
    fn test_creation_kind_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(FlowState::creating(kind).creation_kind(), Some(kind));
        }
        assert_eq!(FlowState::Verifying.creation_kind(), None);
    }
}
