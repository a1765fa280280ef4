//! Domain models and types for outcome-sync.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`ScopeId`], [`RecordId`], [`CorrelationId`], ...)
//! - **Snapshot models** ([`Record`], [`SourceMeasurement`], [`ExclusionSet`])
//! - **Change tracking** ([`ChangeSet`], [`ChangeEntry`], [`RetryRecord`])
//! - **Setup resources** ([`ResourceKind`], [`ResourceSpec`], [`TargetResources`])
//! - **Error types** ([`SyncError`], [`RemoteError`], [`ErrorKind`])
//! - **Result type alias** ([`Result`])
//!
//! # Type Safety
//!
//! Identifiers are newtypes so a record id can never be passed where a
//! correlation id is expected:
//!
//! ```rust
//! use outcome_sync::domain::{CorrelationId, RecordId};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let record = RecordId::new("1001")?;
//! let enrollment = CorrelationId::new("88412")?;
//!
//! // let wrong: RecordId = enrollment;  // Compile error
//! # Ok(())
//! # }
//! ```

pub mod changeset;
pub mod errors;
pub mod ids;
pub mod record;
pub mod resource;
pub mod result;

// Re-export commonly used types for convenience
pub use changeset::{ChangeEntry, ChangeSet, Channel, RetryRecord};
pub use errors::{ErrorKind, RemoteError, SyncError};
pub use ids::{CorrelationId, JobHandle, MeasurementId, RecordId, ResourceId, ScopeId};
pub use record::{round_value, DerivedValue, ExclusionSet, Record, SourceMeasurement};
pub use resource::{ResourceKind, ResourceSpec, TargetResources};
pub use result::Result;
