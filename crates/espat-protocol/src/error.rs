//! Error types for the AT protocol.

use thiserror::Error;

/// Errors that can occur when parsing chip replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Failed to parse a reply.
    #[error("failed to parse reply: {0}")]
    ParseError(String),

    /// Invalid command argument.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A reply line was longer than the framer accepts.
    #[error("line too long: max {max} bytes, got {actual}")]
    LineTooLong { max: usize, actual: usize },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
