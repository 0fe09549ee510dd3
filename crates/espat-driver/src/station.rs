//! Station state machine.

use crate::error::ErrorCode;

/// Connection state of the chip's WiFi interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StationState {
    /// Nothing attempted yet.
    #[default]
    Idle,
    /// Joined to an access point.
    Connected,
    /// The last join attempt failed.
    ConnectFailed,
    /// Was connected, the access point went away.
    ConnectionLost,
    /// Not joined.
    Disconnected,
    /// Soft access point is up with no stations.
    ApListening,
    /// Soft access point has at least one station.
    ApConnected,
    /// Soft access point could not be started.
    ApFailed,
    /// The chip is missing or not answering.
    NoModule,
}

impl StationState {
    /// Next state given a freshly polled status code or the poll's error.
    pub fn after_poll(self, poll: Result<u8, ErrorCode>) -> StationState {
        match poll {
            Ok(2..=4) => StationState::Connected,
            Ok(0 | 1 | 5) => match self {
                StationState::ConnectFailed => StationState::ConnectFailed,
                StationState::Connected => StationState::ConnectionLost,
                _ => StationState::Disconnected,
            },
            Ok(_) => self,
            Err(code) if code.is_module_failure() => StationState::NoModule,
            Err(_) => self,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StationState::Idle => "idle",
            StationState::Connected => "connected",
            StationState::ConnectFailed => "connect_failed",
            StationState::ConnectionLost => "connection_lost",
            StationState::Disconnected => "disconnected",
            StationState::ApListening => "ap_listening",
            StationState::ApConnected => "ap_connected",
            StationState::ApFailed => "ap_failed",
            StationState::NoModule => "no_module",
        }
    }
}

impl std::fmt::Display for StationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
