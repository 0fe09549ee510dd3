//! The driver context.
//!
//! [`EspAtDriver`] owns the transport, the link table, the latched error, and
//! the station state. Nothing is global; callers hold the driver and pass it
//! to the [`Client`](crate::Client)s that use it.

use espat_protocol::{AtCommand, WifiMode};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::engine::CommandEngine;
use crate::error::{DriverResult, ErrorCode};
use crate::links::LinkTable;
use crate::station::StationState;
use crate::transport::Transport;

/// How `init` resets the chip before configuring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetKind {
    /// Configure the chip as it is.
    #[default]
    None,
    /// Restart with `AT+RST`.
    Soft,
    /// Restore factory settings with `AT+RESTORE`.
    Factory,
}

/// Driver for an ESP AT companion chip.
#[derive(Debug)]
pub struct EspAtDriver<T: Transport> {
    pub(crate) engine: CommandEngine<T>,
    pub(crate) links: LinkTable,
    pub(crate) station: StationState,
    initialized: bool,
}

impl<T: Transport> EspAtDriver<T> {
    /// Create a driver over `transport`. Call [`init`](Self::init) before use.
    pub fn new(transport: T, config: DriverConfig) -> DriverResult<Self> {
        config.validate()?;
        let links = LinkTable::new(config.link_capacity);
        Ok(Self {
            engine: CommandEngine::new(transport, config),
            links,
            station: StationState::Idle,
            initialized: false,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        self.engine.config()
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut LinkTable {
        &mut self.links
    }

    pub fn transport(&self) -> &T {
        self.engine.transport()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.engine.transport_mut()
    }

    pub fn into_transport(self) -> T {
        self.engine.into_transport()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// The error latched by the last failing operation.
    pub fn last_error(&self) -> ErrorCode {
        self.engine.last_error()
    }

    /// Human-readable form of [`last_error`](Self::last_error).
    pub fn error_string(&self) -> String {
        self.engine.last_error().to_string()
    }

    /// Start an operation: clear the latched error and absorb pending notices.
    ///
    /// Returns false with `NotInitialized` latched before a successful `init`.
    pub fn maintain(&mut self) -> bool {
        self.engine.clear_error();
        if !self.initialized {
            self.engine.fail(ErrorCode::NotInitialized);
            return false;
        }
        if self.engine.has_pending() {
            return self.engine.drain(&mut self.links);
        }
        true
    }

    /// Reset (optionally) and configure the chip for multiplexed passive
    /// receive.
    pub fn init(&mut self, reset: ResetKind) -> bool {
        self.initialized = false;
        self.engine.clear_error();
        self.links.reset();

        let reset_cmd = match reset {
            ResetKind::None => None,
            ResetKind::Soft => Some(AtCommand::Reset),
            ResetKind::Factory => Some(AtCommand::Restore),
        };
        if let Some(cmd) = reset_cmd {
            info!("Driver: resetting module ({:?})", reset);
            let timeout = self.engine.config().reset_timeout();
            if self
                .engine
                .exchange(&mut self.links, &cmd, Some("ready"), true, timeout)
                .is_none()
            {
                warn!("Driver: module did not come back after reset: {}", self.last_error());
                return false;
            }
        }

        let setup = [
            AtCommand::EchoOff,
            AtCommand::SetMultiplexing { enable: true },
            AtCommand::SetPassiveReceive { enable: true },
            AtCommand::SetWifiMode {
                mode: WifiMode::Station,
            },
        ];
        for cmd in &setup {
            if !self.engine.send_command(&mut self.links, cmd, Some("OK")) {
                warn!(
                    "Driver: init failed at '{}': {}",
                    cmd.to_command_string(),
                    self.last_error()
                );
                return false;
            }
        }

        self.initialized = true;
        self.station = StationState::Idle;
        debug!("Driver: initialized with {} link slots", self.links.capacity());
        true
    }

    /// Firmware version line (`AT version:...`).
    pub fn firmware_version(&mut self) -> Option<String> {
        if !self.maintain() {
            return None;
        }
        let timeout = self.engine.config().read_timeout();
        let line = self
            .engine
            .query(&mut self.links, &AtCommand::Version, "AT version:", timeout)?;
        Some(line.trim_start_matches("AT version:").to_string())
    }

    /// Set the sleep mode (0 = off, 1 = light, 2 = modem).
    pub fn set_sleep_mode(&mut self, mode: u8) -> bool {
        self.maintain()
            && self
                .engine
                .send_command(&mut self.links, &AtCommand::Sleep { mode }, Some("OK"))
    }

    /// Enable or disable DHCP (0 = soft AP, 1 = station, 2 = both).
    pub fn set_dhcp(&mut self, mode: u8, enable: bool) -> bool {
        self.maintain()
            && self.engine.send_command(
                &mut self.links,
                &AtCommand::SetDhcp { mode, enable },
                Some("OK"),
            )
    }
}
