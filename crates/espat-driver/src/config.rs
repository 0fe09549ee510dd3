//! Driver configuration.
//!
//! Every timing constant and budget lives here so tests can shrink them and
//! run against a fake transport without real elapsed time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, DriverResult};

/// Highest link capacity the fixed-width `+IPD` header can address.
pub const MAX_LINK_CAPACITY: u8 = 10;

/// Order in which free link slots are handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOrder {
    /// Scan from the highest id down, keeping low ids free for scratch use.
    #[default]
    HighestFirst,
    /// Scan from id 0 up.
    LowestFirst,
}

/// Firmware workarounds that are not part of the AT protocol proper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quirks {
    /// Treat `ERROR` as success when `UNLINK` arrived earlier in the same wait.
    pub forgive_error_after_unlink: bool,
    /// Slot allocation order.
    pub allocation_order: AllocationOrder,
}

impl Default for Quirks {
    fn default() -> Self {
        Self {
            forgive_error_after_unlink: true,
            allocation_order: AllocationOrder::HighestFirst,
        }
    }
}

/// Configuration for an [`EspAtDriver`](crate::EspAtDriver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Number of link slots (1..=10).
    pub link_capacity: u8,
    /// Quiet window that ends a best-effort drain, in milliseconds.
    pub poll_interval_ms: u64,
    /// Timeout handed to each transport read, in milliseconds.
    pub read_timeout_ms: u64,
    /// Consecutive empty reads tolerated before NotResponding.
    pub silence_retries: u32,
    /// Unrecognized tokens tolerated per wait before NotResponding.
    pub garbage_budget: u32,
    /// Longest token the framer assembles before cutting it off.
    pub max_token_len: usize,
    /// Read timeout while joining a network or opening a link, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read timeout while waiting for `ready` after a reset, in milliseconds.
    pub reset_timeout_ms: u64,
    /// Bytes a client pulls per receive.
    pub rx_buffer_size: usize,
    /// Bytes a client buffers before flushing on its own.
    pub tx_buffer_size: usize,
    /// Firmware workarounds.
    pub quirks: Quirks,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            link_capacity: 5,
            poll_interval_ms: 10,
            read_timeout_ms: 1000,
            silence_retries: 3,
            garbage_budget: 100,
            max_token_len: espat_protocol::MAX_TOKEN_LENGTH,
            connect_timeout_ms: 10_000,
            reset_timeout_ms: 5_000,
            rx_buffer_size: 64,
            tx_buffer_size: 64,
            quirks: Quirks::default(),
        }
    }
}

impl DriverConfig {
    /// Check the configuration for values the driver cannot work with.
    pub fn validate(&self) -> DriverResult<()> {
        if self.link_capacity == 0 || self.link_capacity > MAX_LINK_CAPACITY {
            return Err(DriverError::InvalidConfig(format!(
                "link_capacity must be 1..={}, got {}",
                MAX_LINK_CAPACITY, self.link_capacity
            )));
        }
        if self.garbage_budget == 0 {
            return Err(DriverError::InvalidConfig(
                "garbage_budget must be at least 1".to_string(),
            ));
        }
        if self.max_token_len < 8 {
            return Err(DriverError::InvalidConfig(format!(
                "max_token_len too small: {}",
                self.max_token_len
            )));
        }
        if self.rx_buffer_size == 0 || self.tx_buffer_size == 0 {
            return Err(DriverError::InvalidConfig(
                "client buffer sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}
