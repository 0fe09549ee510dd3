//! Subcommands of the `espat` tool.

use std::io::Write;
use std::time::Duration;

use clap::{Subcommand, ValueEnum};
use espat_driver::{
    ApEncryption, Client, ErrorCode, EspAtDriver, ResetKind, StationState, Transport,
};
use tracing::{debug, info};

use crate::error::{CliError, CliResult};

const READ_CHUNK: usize = 256;

/// Reset applied before configuring the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResetArg {
    #[value(name = "none")]
    Keep,
    Soft,
    Factory,
}

impl From<ResetArg> for ResetKind {
    fn from(arg: ResetArg) -> ResetKind {
        match arg {
            ResetArg::Keep => ResetKind::None,
            ResetArg::Soft => ResetKind::Soft,
            ResetArg::Factory => ResetKind::Factory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show firmware version, station state, and addresses.
    Info,
    /// Join an access point.
    Join {
        #[arg(long)]
        ssid: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Leave the access point.
    Leave {
        /// Also disable auto-connect at power up.
        #[arg(long)]
        persistent: bool,
    },
    /// List visible access points.
    Scan,
    /// Ping a host.
    Ping { host: String },
    /// Show the chip's view of open links.
    Links,
    /// Fetch a path over HTTP/1.0 and print the raw response.
    Get {
        host: String,
        #[arg(long, default_value = "/")]
        path: String,
        #[arg(long, default_value_t = 80)]
        port: u16,
        /// Use a TLS link terminated on the chip.
        #[arg(long)]
        tls: bool,
    },
    /// Start a WPA2 soft access point.
    Ap {
        #[arg(long)]
        ssid: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value_t = 1)]
        channel: u8,
    },
}

fn failed<T: Transport>(op: &'static str, driver: &EspAtDriver<T>) -> CliError {
    CliError::Operation {
        op,
        error: driver.last_error(),
    }
}

/// Reset (optionally) and configure the chip.
pub fn init_driver<T: Transport>(driver: &mut EspAtDriver<T>, reset: ResetArg) -> CliResult<()> {
    if !driver.init(reset.into()) {
        return Err(failed("init", driver));
    }
    info!("Module ready");
    Ok(())
}

/// Request sent by `espat get`.
pub fn http_request(host: &str, path: &str) -> String {
    format!(
        "GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, host
    )
}

/// Run one subcommand against an initialized driver.
pub fn execute<T: Transport, W: Write>(
    driver: &mut EspAtDriver<T>,
    command: &Command,
    out: &mut W,
) -> CliResult<()> {
    match command {
        Command::Info => {
            let version = driver
                .firmware_version()
                .ok_or_else(|| failed("version", driver))?;
            writeln!(out, "firmware: {}", version)?;

            let state = driver.status();
            writeln!(out, "station:  {}", state)?;
            if state == StationState::Connected {
                if let Some(info) = driver.ap_info() {
                    writeln!(out, "ssid:     {} ({} dBm, channel {})", info.ssid, info.rssi, info.channel)?;
                }
                if let Some(ip) = driver.local_ip() {
                    writeln!(out, "ip:       {}", ip)?;
                }
                if let Some(gateway) = driver.gateway_ip() {
                    writeln!(out, "gateway:  {}", gateway)?;
                }
                if let Some(mask) = driver.subnet_mask() {
                    writeln!(out, "netmask:  {}", mask)?;
                }
            }
        }
        Command::Join { ssid, password } => {
            let state = driver.begin(ssid, password);
            writeln!(out, "{}", state)?;
            if state != StationState::Connected {
                return Err(failed("join", driver));
            }
        }
        Command::Leave { persistent } => {
            if !driver.disconnect(*persistent) {
                return Err(failed("leave", driver));
            }
        }
        Command::Scan => {
            let networks = driver
                .scan_networks()
                .ok_or_else(|| failed("scan", driver))?;
            for network in networks {
                writeln!(
                    out,
                    "{:<32} {:>4} dBm  ch {:<2}  {}",
                    network.ssid, network.rssi, network.channel, network.mac
                )?;
            }
        }
        Command::Ping { host } => {
            let rtt = driver.ping(host).ok_or_else(|| failed("ping", driver))?;
            writeln!(out, "{}: {} ms", host, rtt)?;
        }
        Command::Links => {
            let links = driver
                .link_statuses()
                .ok_or_else(|| failed("links", driver))?;
            for link in links {
                writeln!(
                    out,
                    "{} {} {}:{} local {}{}",
                    link.link,
                    link.protocol,
                    link.remote_ip,
                    link.remote_port,
                    link.local_port,
                    if link.is_server { " (server)" } else { "" }
                )?;
            }
        }
        Command::Get {
            host,
            path,
            port,
            tls,
        } => fetch(driver, host, path, *port, *tls, out)?,
        Command::Ap {
            ssid,
            password,
            channel,
        } => {
            let state = driver.begin_ap(ssid, password, *channel, ApEncryption::Wpa2Psk);
            writeln!(out, "{}", state)?;
            if state != StationState::ApListening {
                return Err(failed("ap", driver));
            }
        }
    }
    Ok(())
}

fn fetch<T: Transport, W: Write>(
    driver: &mut EspAtDriver<T>,
    host: &str,
    path: &str,
    port: u16,
    tls: bool,
    out: &mut W,
) -> CliResult<()> {
    let mut client = Client::new();
    let connected = if tls {
        client.connect_secure(driver, host, port)
    } else {
        client.connect(driver, host, port)
    };
    if !connected {
        return Err(failed("connect", driver));
    }

    client.print(&http_request(host, path));
    if client.flush(driver) == 0 {
        let err = failed("send", driver);
        client.abort(driver);
        return Err(err);
    }

    let poll = Duration::from_millis(driver.config().poll_interval_ms);
    let max_idle = (driver.config().read_timeout_ms / driver.config().poll_interval_ms.max(1)).max(1);
    let mut buf = [0u8; READ_CHUNK];
    let mut idle = 0;
    let mut total = 0;
    while client.connected(driver) {
        let n = client.read_buffer(driver, &mut buf);
        if n == 0 {
            if driver.last_error() == ErrorCode::ReceiveError {
                break;
            }
            idle += 1;
            if idle > max_idle {
                debug!("Get: link idle, giving up");
                break;
            }
            std::thread::sleep(poll);
            continue;
        }
        idle = 0;
        total += n;
        out.write_all(&buf[..n])?;
    }
    debug!("Get: received {} bytes", total);
    client.stop(driver);
    Ok(())
}
