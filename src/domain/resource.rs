//! Supporting LMS resources the flow provisions before writing values

use super::ids::ResourceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resources that must exist in a scope before values can be written
///
/// Declaration order is dependency order: a container aligns to the outcome and
/// the criterion links both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Learning outcome the derived values are scored against
    Outcome,
    /// Placeholder assignment that holds one value per record
    Container,
    /// Rubric criterion on the container linked to the outcome
    Criterion,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Outcome,
        ResourceKind::Container,
        ResourceKind::Criterion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Outcome => "outcome",
            ResourceKind::Container => "container",
            ResourceKind::Criterion => "criterion",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers resolved during setup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResources {
    pub outcome_id: Option<ResourceId>,
    pub container_id: Option<ResourceId>,
    pub criterion_id: Option<ResourceId>,
}

impl TargetResources {
    pub fn get(&self, kind: ResourceKind) -> Option<&ResourceId> {
        match kind {
            ResourceKind::Outcome => self.outcome_id.as_ref(),
            ResourceKind::Container => self.container_id.as_ref(),
            ResourceKind::Criterion => self.criterion_id.as_ref(),
        }
    }

    pub fn set(&mut self, kind: ResourceKind, id: ResourceId) {
        match kind {
            ResourceKind::Outcome => self.outcome_id = Some(id),
            ResourceKind::Container => self.container_id = Some(id),
            ResourceKind::Criterion => self.criterion_id = Some(id),
        }
    }

    /// First resource, in dependency order, that is still unresolved
    pub fn first_missing(&self) -> Option<ResourceKind> {
        ResourceKind::ALL.into_iter().find(|k| self.get(*k).is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    /// Resolved container and criterion, required by every primary write
    pub fn write_target(&self) -> Option<(&ResourceId, &ResourceId)> {
        Some((self.container_id.as_ref()?, self.criterion_id.as_ref()?))
    }
}

/// What the provisioner should look for or create
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,

    /// Title the resource is found by
    pub name: String,

    /// Free-form description used when creating
    pub description: Option<String>,

    /// Points needed for mastery (outcome and criterion)
    pub mastery_points: f64,

    /// Maximum points (outcome, container and criterion)
    pub points_possible: f64,

    /// Resources resolved so far; creation of dependents reads from here
    pub resolved: TargetResources,
}
