//! OVSDB engine error types
//!
//! Every failure the engine can observe is one of these variants. They are
//! folded into an [`Outcome`](crate::outcome::Outcome) before reaching callers
//! of the relational helpers, so nothing escapes as a panic or a half-filled
//! result.

use thiserror::Error;

/// OVSDB engine errors
#[derive(Error, Debug)]
pub enum OvsdbError {
    // ========================================================================
    // Codec Errors
    // ========================================================================
    #[error("Malformed OVSDB value: {0}")]
    MalformedValue(String),

    #[error("Unknown OVSDB operation: {0}")]
    UnknownOperation(String),

    // ========================================================================
    // Transaction Errors
    // ========================================================================
    #[error("Operation failed: {error} : {details}")]
    OperationFailed { error: String, details: String },

    #[error("Protocol anomaly: {0}")]
    ProtocolAnomaly(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    #[error("OVSDB service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("OVSDB RPC error: {0}")]
    Rpc(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using [`OvsdbError`]
pub type Result<T> = std::result::Result<T, OvsdbError>;

impl OvsdbError {
    /// Create a malformed value error
    pub fn malformed(msg: impl Into<String>) -> Self {
        OvsdbError::MalformedValue(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        OvsdbError::NotFound(msg.into())
    }

    /// Create a service unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        OvsdbError::ServiceUnavailable(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        OvsdbError::Internal(msg.into())
    }

    /// Returns true if the remote peer could not be reached at all
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            OvsdbError::ServiceUnavailable(_) | OvsdbError::Io(_) | OvsdbError::Timeout(_)
        )
    }

    /// Returns true if the error came from decoding a wire value
    pub fn is_codec_failure(&self) -> bool {
        matches!(
            self,
            OvsdbError::MalformedValue(_) | OvsdbError::UnknownOperation(_)
        )
    }
}
