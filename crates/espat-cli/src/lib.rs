//! The `espat` command line tool.
//!
//! Talks to an ESP AT companion chip whose UART is exposed by a
//! serial-over-TCP bridge. The library half holds everything except argument
//! parsing so the subcommands can be tested against a scripted chip.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod tcp;

use std::net::SocketAddr;

use espat_driver::EspAtDriver;
use tracing::info;

pub use commands::{execute, init_driver, Command, ResetArg};
pub use config::{BridgeConfig, CliConfig};
pub use error::{CliError, CliResult};
pub use tcp::TcpTransport;

/// Start the metrics exporter when the config asks for one.
pub fn install_metrics(listen: Option<SocketAddr>) -> CliResult<()> {
    let Some(addr) = listen else {
        return Ok(());
    };

    #[cfg(feature = "prometheus")]
    {
        espat_metrics::install_prometheus(addr).map_err(|e| CliError::Metrics(e.to_string()))?;
        info!("Metrics: serving on http://{}/metrics", addr);
    }

    #[cfg(not(feature = "prometheus"))]
    tracing::warn!(
        "Metrics: ignoring metrics_listen {}, built without the prometheus feature",
        addr
    );

    Ok(())
}

/// Connect to the bridge and bring the chip up.
pub fn connect(config: &CliConfig, reset: ResetArg) -> CliResult<EspAtDriver<TcpTransport>> {
    let transport = TcpTransport::connect(&config.bridge)?;
    info!(
        "Bridge: {}:{} ({} link slots)",
        config.bridge.address, config.bridge.port, config.driver.link_capacity
    );
    let mut driver = EspAtDriver::new(transport, config.driver.clone())?;
    init_driver(&mut driver, reset)?;
    Ok(driver)
}
