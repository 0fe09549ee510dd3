//! Commands that can be sent to the companion chip.
//!
//! The AT firmware groups its commands into:
//! - Basic commands (`AT`, `AT+RST`, `ATE0`, `AT+GMR`)
//! - WiFi commands (`AT+CWMODE`, `AT+CWJAP_CUR`, `AT+CWLAP`, ...)
//! - TCP/IP commands (`AT+CIPSTART`, `AT+CIPSEND`, `AT+CIPRECVDATA`, ...)

use crate::codec::{ResponseFramer, MAX_TOKEN_LENGTH};
use crate::error::{ProtocolError, ProtocolResult};

/// Transport protocol of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkProtocol {
    /// TCP stream.
    Tcp,
    /// UDP datagrams.
    Udp,
    /// TLS over TCP, terminated on the chip.
    Ssl,
}

impl LinkProtocol {
    /// Get the protocol string used in `AT+CIPSTART`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkProtocol::Tcp => "TCP",
            LinkProtocol::Udp => "UDP",
            LinkProtocol::Ssl => "SSL",
        }
    }
}

/// WiFi operating mode (`AT+CWMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    /// Station only.
    Station = 1,
    /// Soft access point only.
    SoftAp = 2,
    /// Station and soft access point.
    Both = 3,
}

/// Encryption of a soft access point (`AT+CWSAP_CUR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApEncryption {
    /// Open network.
    Open = 0,
    /// WPA-PSK.
    WpaPsk = 2,
    /// WPA2-PSK.
    Wpa2Psk = 3,
    /// WPA/WPA2-PSK.
    WpaWpa2Psk = 4,
}

/// Commands understood by the AT firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum AtCommand {
    // ========== Basic Commands ==========
    /// Liveness probe.
    Test,

    /// Soft restart.
    Reset,

    /// Restore factory settings and restart.
    Restore,

    /// Disable command echo.
    EchoOff,

    /// Firmware version information.
    Version,

    /// Set sleep mode (0 = disabled, 1 = light, 2 = modem).
    Sleep {
        /// Sleep mode.
        mode: u8,
    },

    // ========== WiFi Commands ==========
    /// Select the WiFi mode.
    SetWifiMode {
        /// Mode to set.
        mode: WifiMode,
    },

    /// Join an access point (not stored in flash).
    JoinAp {
        /// Network SSID.
        ssid: String,
        /// Network passphrase.
        password: String,
    },

    /// Query the joined access point.
    QueryAp,

    /// Leave the joined access point.
    QuitAp,

    /// Enable or disable auto-connect at power up.
    SetAutoConnect {
        /// Whether to auto-connect.
        enable: bool,
    },

    /// List visible access points.
    ListAps,

    /// Configure the soft access point.
    ConfigureSoftAp {
        /// SSID to advertise.
        ssid: String,
        /// Passphrase (ignored for open networks).
        password: String,
        /// Channel (1-13).
        channel: u8,
        /// Encryption mode.
        encryption: ApEncryption,
    },

    /// List stations joined to the soft access point.
    ListStations,

    /// Enable or disable DHCP (0 = soft AP, 1 = station, 2 = both).
    SetDhcp {
        /// DHCP target.
        mode: u8,
        /// Whether to enable DHCP.
        enable: bool,
    },

    // ========== TCP/IP Commands ==========
    /// Connection status (`STATUS:<n>` plus one line per link).
    Status,

    /// Station IP, gateway, and netmask.
    QueryStationIp,

    /// Configured DNS servers.
    QueryDns,

    /// Enable or disable multiple links.
    SetMultiplexing {
        /// Whether to multiplex links.
        enable: bool,
    },

    /// Select passive receive mode (data is pulled with `AT+CIPRECVDATA`).
    SetPassiveReceive {
        /// Whether to use passive receive.
        enable: bool,
    },

    /// Open a link.
    StartLink {
        /// Link id.
        link: u8,
        /// Transport protocol.
        protocol: LinkProtocol,
        /// Remote host name or address.
        host: String,
        /// Remote port.
        port: u16,
    },

    /// Choose how the next close of a link behaves.
    SetCloseMode {
        /// Link id.
        link: u8,
        /// Hard abort (RST) instead of a graceful close.
        abortive: bool,
    },

    /// Close a link.
    CloseLink {
        /// Link id.
        link: u8,
    },

    /// Announce `len` bytes for a link; the chip answers with the send prompt.
    Send {
        /// Link id.
        link: u8,
        /// Number of bytes that will follow the prompt.
        len: usize,
    },

    /// Pull up to `len` buffered bytes from a link.
    RecvData {
        /// Link id.
        link: u8,
        /// Maximum number of bytes to pull.
        len: usize,
    },

    /// Ping a host.
    Ping {
        /// Host name or address.
        host: String,
    },

    // ========== Raw Command ==========
    /// Send a raw command string.
    Raw {
        /// The raw command text.
        command: String,
    },
}

impl AtCommand {
    /// Encode the command as bytes to send (including CR-LF).
    pub fn encode(&self) -> Vec<u8> {
        ResponseFramer::encode_command(&self.to_command_string())
    }

    /// Encode the command, rejecting lines the firmware would truncate.
    pub fn encode_checked(&self) -> ProtocolResult<Vec<u8>> {
        let line = self.to_command_string();
        if line.len() > MAX_TOKEN_LENGTH {
            return Err(ProtocolError::LineTooLong {
                max: MAX_TOKEN_LENGTH,
                actual: line.len(),
            });
        }
        if line.contains(|c: char| c == '\r' || c == '\n') {
            return Err(ProtocolError::InvalidCommand(format!(
                "line terminator inside command: {:?}",
                line
            )));
        }
        Ok(ResponseFramer::encode_command(&line))
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            // Basic
            AtCommand::Test => "AT".to_string(),
            AtCommand::Reset => "AT+RST".to_string(),
            AtCommand::Restore => "AT+RESTORE".to_string(),
            AtCommand::EchoOff => "ATE0".to_string(),
            AtCommand::Version => "AT+GMR".to_string(),
            AtCommand::Sleep { mode } => format!("AT+SLEEP={}", mode),

            // WiFi
            AtCommand::SetWifiMode { mode } => format!("AT+CWMODE={}", *mode as u8),
            AtCommand::JoinAp { ssid, password } => format!(
                "AT+CWJAP_CUR=\"{}\",\"{}\"",
                escape_quoted(ssid),
                escape_quoted(password)
            ),
            AtCommand::QueryAp => "AT+CWJAP_CUR?".to_string(),
            AtCommand::QuitAp => "AT+CWQAP".to_string(),
            AtCommand::SetAutoConnect { enable } => format!("AT+CWAUTOCONN={}", *enable as u8),
            AtCommand::ListAps => "AT+CWLAP".to_string(),
            AtCommand::ConfigureSoftAp {
                ssid,
                password,
                channel,
                encryption,
            } => format!(
                "AT+CWSAP_CUR=\"{}\",\"{}\",{},{}",
                escape_quoted(ssid),
                escape_quoted(password),
                channel,
                *encryption as u8
            ),
            AtCommand::ListStations => "AT+CWLIF".to_string(),
            AtCommand::SetDhcp { mode, enable } => {
                format!("AT+CWDHCP_CUR={},{}", mode, *enable as u8)
            }

            // TCP/IP
            AtCommand::Status => "AT+CIPSTATUS".to_string(),
            AtCommand::QueryStationIp => "AT+CIPSTA_CUR?".to_string(),
            AtCommand::QueryDns => "AT+CIPDNS_CUR?".to_string(),
            AtCommand::SetMultiplexing { enable } => format!("AT+CIPMUX={}", *enable as u8),
            AtCommand::SetPassiveReceive { enable } => {
                format!("AT+CIPRECVMODE={}", *enable as u8)
            }
            AtCommand::StartLink {
                link,
                protocol,
                host,
                port,
            } => format!(
                "AT+CIPSTART={},\"{}\",\"{}\",{}",
                link,
                protocol.as_str(),
                escape_quoted(host),
                port
            ),
            AtCommand::SetCloseMode { link, abortive } => {
                format!("AT+CIPCLOSEMODE={},{}", link, *abortive as u8)
            }
            AtCommand::CloseLink { link } => format!("AT+CIPCLOSE={}", link),
            AtCommand::Send { link, len } => format!("AT+CIPSEND={},{}", link, len),
            AtCommand::RecvData { link, len } => format!("AT+CIPRECVDATA={},{}", link, len),
            AtCommand::Ping { host } => format!("AT+PING=\"{}\"", escape_quoted(host)),

            // Raw
            AtCommand::Raw { command } => command.clone(),
        }
    }
}

/// Escape the characters the firmware treats specially inside quotes.
pub fn escape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '"' | ',' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
