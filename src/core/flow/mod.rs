//! Flow orchestration
//!
//! The state machine that sequences setup, calculation, submission, polling
//! and verification for one scope.

pub mod context;
pub mod orchestrator;
pub mod settings;
pub mod state;
pub mod summary;

pub use context::{ContextDelta, FlowContext, StepOutcome};
pub use orchestrator::Orchestrator;
pub use settings::{FlowSettings, SetupNames};
pub use state::{check_transition, FlowState};
pub use summary::{LastRunMetadata, SyncSummary};
