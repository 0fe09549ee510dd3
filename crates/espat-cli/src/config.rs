//! YAML configuration for the `espat` tool.

use std::net::SocketAddr;
use std::path::Path;

use espat_driver::DriverConfig;
use serde::{Deserialize, Serialize};

use crate::error::CliResult;

/// Where the serial-over-TCP bridge listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bridge host name or address.
    pub address: String,
    /// Bridge TCP port.
    pub port: u16,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 9000,
            connect_timeout_ms: 3000,
        }
    }
}

/// Top-level config file.
///
/// ```yaml
/// bridge:
///   address: 192.168.1.50
///   port: 23
/// driver:
///   read_timeout_ms: 2000
///   quirks:
///     allocation_order: lowest_first
/// metrics_listen: 0.0.0.0:9100
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub bridge: BridgeConfig,
    pub driver: DriverConfig,
    /// Serve Prometheus metrics here (needs the `prometheus` feature).
    pub metrics_listen: Option<SocketAddr>,
}

impl CliConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> CliResult<CliConfig> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> CliResult<CliConfig> {
        let config: CliConfig = serde_yaml::from_str(text)?;
        config.driver.validate()?;
        Ok(config)
    }
}
