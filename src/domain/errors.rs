//! Domain error types
//!
//! This module defines the error hierarchy for outcome-sync. All errors are
//! domain-specific and don't expose third-party types: HTTP client failures
//! are folded into [`RemoteError`] before they reach the engine.

use thiserror::Error;

/// Main outcome-sync error type
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Flow preconditions not met; raised before any state transition
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transport or HTTP level failure talking to a remote surface
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The remote explicitly reported a permanent failure
    #[error("Remote reported failure: {0}")]
    Fatal(String),

    /// A bounded wait ran out
    #[error("Timed out waiting for {operation} after {elapsed_secs}s")]
    Timeout { operation: String, elapsed_secs: u64 },

    /// An upstream collaborator declined a provisioning prompt
    #[error("Aborted by user: {0}")]
    UserAbort(String),

    /// Illegal state machine transition
    #[error("Illegal flow transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Cooperative cancellation was honoured
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

/// Error classes the host reacts to differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network/5xx-class; retried within bounded budgets
    TransientRemote,
    /// Permanent remote failure; aborts the flow
    FatalRemote,
    /// Bounded wait exhausted
    Timeout,
    /// Provisioning declined; hosts should not raise alarms
    UserAbort,
    /// Preconditions unmet
    Validation,
    /// Cancellation requested by the host
    Cancelled,
    /// Configuration, serialization, I/O and programming errors
    Internal,
}

impl SyncError {
    /// Classify the error into the engine's taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Remote(e) if e.is_transient() => ErrorKind::TransientRemote,
            SyncError::Remote(_) | SyncError::Fatal(_) => ErrorKind::FatalRemote,
            SyncError::Timeout { .. } => ErrorKind::Timeout,
            SyncError::UserAbort(_) => ErrorKind::UserAbort,
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::Cancelled(_) => ErrorKind::Cancelled,
            SyncError::Configuration(_)
            | SyncError::InvalidTransition { .. }
            | SyncError::Serialization(_)
            | SyncError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether a retry of the same call may succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientRemote
    }

    /// Whether the flow stopped because provisioning was declined
    pub fn is_user_abort(&self) -> bool {
        self.kind() == ErrorKind::UserAbort
    }
}

/// Remote surface errors
///
/// Errors that occur when talking to the LMS. These errors don't expose
/// third-party HTTP client types.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Failed to reach the server
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Request timed out
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Rate limit exceeded (429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx other than 404/429)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Whether the failure is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::ConnectionFailed(_)
                | RemoteError::Timeout(_)
                | RemoteError::RateLimited(_)
                | RemoteError::ServerError { .. }
        )
    }

    /// Build a remote error from an HTTP status and response body
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            404 => RemoteError::NotFound(message),
            429 => RemoteError::RateLimited(message),
            500..=599 => RemoteError::ServerError { status, message },
            _ => RemoteError::ClientError { status, message },
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(err.to_string())
        } else if err.is_decode() {
            RemoteError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::from_status(status.as_u16(), err.to_string())
        } else {
            RemoteError::ConnectionFailed(err.to_string())
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Configuration(format!("TOML parse error: {err}"))
    }
}
