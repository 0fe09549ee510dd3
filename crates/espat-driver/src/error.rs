//! Error types for the driver.
//!
//! Driver operations never return `Err`: they report a plain success signal
//! and latch the most specific [`ErrorCode`], readable through
//! [`EspAtDriver::last_error`](crate::EspAtDriver::last_error) until the next
//! operation overwrites it. [`DriverError`] is only used while building a
//! driver.

use thiserror::Error;

/// Latched error code of the last driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    /// The last operation succeeded.
    #[default]
    NoError,
    /// `init` has not completed successfully.
    NotInitialized,
    /// The chip stayed silent or produced only noise.
    NotResponding,
    /// The chip answered `ERROR` or `FAIL`.
    ProtocolError,
    /// The chip is not joined to an access point.
    NoAccessPoint,
    /// The chosen link slot was already connected.
    LinkAlreadyConnected,
    /// The link is neither connected nor holding data.
    LinkNotActive,
    /// A pull returned fewer bytes than advertised or was malformed.
    ReceiveError,
    /// A send handshake was missing a confirmation.
    SendError,
    /// Every link slot is busy.
    NoFreeLink,
}

impl ErrorCode {
    /// Stable snake_case name, used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "no_error",
            ErrorCode::NotInitialized => "not_initialized",
            ErrorCode::NotResponding => "not_responding",
            ErrorCode::ProtocolError => "protocol_error",
            ErrorCode::NoAccessPoint => "no_access_point",
            ErrorCode::LinkAlreadyConnected => "link_already_connected",
            ErrorCode::LinkNotActive => "link_not_active",
            ErrorCode::ReceiveError => "receive_error",
            ErrorCode::SendError => "send_error",
            ErrorCode::NoFreeLink => "no_free_link",
        }
    }

    /// Check whether this code means the chip itself is unusable.
    pub fn is_module_failure(&self) -> bool {
        matches!(self, ErrorCode::NotInitialized | ErrorCode::NotResponding)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NoError => write!(f, "no error"),
            ErrorCode::NotInitialized => write!(f, "driver not initialized"),
            ErrorCode::NotResponding => write!(f, "module not responding"),
            ErrorCode::ProtocolError => write!(f, "module returned an error"),
            ErrorCode::NoAccessPoint => write!(f, "not connected to an access point"),
            ErrorCode::LinkAlreadyConnected => write!(f, "link already connected"),
            ErrorCode::LinkNotActive => write!(f, "link not active"),
            ErrorCode::ReceiveError => write!(f, "receive failed"),
            ErrorCode::SendError => write!(f, "send failed"),
            ErrorCode::NoFreeLink => write!(f, "no free link"),
        }
    }
}

/// Errors raised while constructing a driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for driver construction.
pub type DriverResult<T> = Result<T, DriverError>;
