//! Post-submission verification
//!
//! Both channels are verified by polling their read path. The primary channel
//! gets a long budget for eventual consistency; the override channel a short
//! one whose leftover mismatches are reported.

pub mod report;
pub mod verify;

pub use report::{within_tolerance, Mismatch, VerificationReport, DEFAULT_TOLERANCE};
pub use verify::{
    verify_overrides, verify_primary, OverrideReader, PrimaryReader, ValueReader, Verifier,
    VerifyPolicy,
};
