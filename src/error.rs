//! Error types for protostub.

use thiserror::Error;

use crate::rpc::Status;

/// Main error type for all codec and dispatch operations.
#[derive(Debug, Error)]
pub enum ProtostubError {
    /// I/O error on a connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON text could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input ended in the middle of a varint, fixed-width value or
    /// length-delimited payload.
    #[error("Truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required by the value being read.
        needed: usize,
        /// Bytes left in the current range.
        remaining: usize,
    },

    /// Varint longer than 10 bytes or wider than 64 bits.
    #[error("Varint overflows 64 bits")]
    VarintOverflow,

    /// Tag carries a wire kind outside 0..=5.
    #[error("Invalid wire kind: {0}")]
    InvalidWireKind(u8),

    /// Tag carries field number 0 or one above the protobuf maximum.
    #[error("Invalid field number: {0}")]
    InvalidFieldNumber(u64),

    /// String field is not valid UTF-8.
    #[error("Invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Structurally invalid input not covered by a more specific variant.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// A 64-bit value falls outside the safe integer range.
    #[error("Integer {0} exceeds the safe integer range")]
    IntegerOverflow(i128),

    /// A value does not fit the field it was assigned to.
    #[error("Schema error: {0}")]
    Schema(String),

    /// JSON value has the wrong shape for its field.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// Timestamp cannot be represented or parsed.
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    /// Two alternatives of one optional group were present under strict decoding.
    #[error("Conflicting alternatives for group '{group}' in {message}")]
    GroupConflict {
        /// Full name of the message being decoded.
        message: &'static str,
        /// Name of the optional group.
        group: &'static str,
    },

    /// Frame protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The remote side answered the call with a failure status.
    #[error("Call failed: {0}")]
    Status(Status),

    /// The service was not selected when the stub was built.
    #[error("Service {0} is not connected (disabled in stub)")]
    ServiceDisabled(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Transport used before `connect()` where lazy connect is not possible.
    #[error("Not connected")]
    NotConnected,

    /// Outbound queue stayed full for longer than the send timeout.
    #[error("Backpressure timeout")]
    BackpressureTimeout,
}

impl From<Status> for ProtostubError {
    fn from(status: Status) -> Self {
        ProtostubError::Status(status)
    }
}

impl ProtostubError {
    pub(crate) fn truncated(needed: usize, remaining: usize) -> Self {
        ProtostubError::Truncated { needed, remaining }
    }

    /// Returns the remote status if this error came from the server.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ProtostubError::Status(status) => Some(status),
            _ => None,
        }
    }
}

/// Result type alias using ProtostubError.
pub type Result<T> = std::result::Result<T, ProtostubError>;
