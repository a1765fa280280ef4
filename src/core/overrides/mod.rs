//! Secondary (override) channel

pub mod cache;
pub mod sync;

pub use cache::CorrelationCache;
pub use sync::{OverrideOutcome, OverridePolicy, OverrideSyncResult, OverrideSynchronizer};
