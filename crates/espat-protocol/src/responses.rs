//! Reply classification and parsing.
//!
//! Every framed token is first classified lexically with [`Reply::classify`].
//! Unsolicited link notices are recognized by [`Notice::parse`]; a token that
//! looks like a notice but fails to parse is left as [`Reply::Other`].
//! The remaining parsers extract values from query replies.

use std::net::Ipv4Addr;

use crate::error::{ProtocolError, ProtocolResult};

/// Unsolicited notice about a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// `+IPD,<link>,<len>`: the chip holds `len` bytes for the link.
    DataAvailable {
        /// Link id.
        link: u8,
        /// Buffered byte count.
        len: usize,
    },
    /// `<link>,CONNECT`
    Connected {
        /// Link id.
        link: u8,
    },
    /// `<link>,CLOSED`
    Closed {
        /// Link id.
        link: u8,
    },
    /// `<link>,CONNECT FAIL`
    ConnectFailed {
        /// Link id.
        link: u8,
    },
}

impl Notice {
    /// Parse one of the unsolicited notice shapes.
    ///
    /// Returns `None` for anything that is not a well-formed notice.
    pub fn parse(text: &str) -> Option<Notice> {
        if let Some(rest) = text.strip_prefix("+IPD,") {
            let mut fields = rest.split(',');
            let link = parse_link_id(fields.next()?)?;
            let len_field = fields.next()?;
            // Active receive mode appends `:<data>` to the length.
            let len_field = len_field.split(':').next()?;
            let len = len_field.trim().parse::<usize>().ok()?;
            return Some(Notice::DataAvailable { link, len });
        }

        let (link, event) = text.split_once(',')?;
        let link = parse_link_id(link)?;
        match event {
            "CONNECT" => Some(Notice::Connected { link }),
            "CLOSED" => Some(Notice::Closed { link }),
            "CONNECT FAIL" => Some(Notice::ConnectFailed { link }),
            _ => None,
        }
    }

    /// The link this notice refers to.
    pub fn link(&self) -> u8 {
        match self {
            Notice::DataAvailable { link, .. }
            | Notice::Connected { link }
            | Notice::Closed { link }
            | Notice::ConnectFailed { link } => *link,
        }
    }

    /// Short name for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Notice::DataAvailable { .. } => "data",
            Notice::Connected { .. } => "connect",
            Notice::Closed { .. } => "closed",
            Notice::ConnectFailed { .. } => "connect_fail",
        }
    }
}

fn parse_link_id(s: &str) -> Option<u8> {
    if s.len() != 1 {
        return None;
    }
    s.parse::<u8>().ok()
}

/// Lexical class of a framed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK`
    Ok,
    /// `ERROR`
    Error,
    /// `FAIL`
    Fail,
    /// `SEND FAIL`
    SendFail,
    /// `No AP`
    NoAp,
    /// `UNLINK`, emitted when closing an already closed link.
    Unlink,
    /// `>` send prompt.
    Prompt,
    /// Unsolicited link notice.
    Notice(Notice),
    /// Anything else.
    Other,
}

impl Reply {
    /// Classify a token.
    pub fn classify(text: &str) -> Reply {
        match text {
            "OK" => Reply::Ok,
            "ERROR" => Reply::Error,
            "FAIL" => Reply::Fail,
            "SEND FAIL" => Reply::SendFail,
            "No AP" => Reply::NoAp,
            "UNLINK" => Reply::Unlink,
            ">" => Reply::Prompt,
            _ => match Notice::parse(text) {
                Some(notice) => Reply::Notice(notice),
                None => Reply::Other,
            },
        }
    }

    /// Check if this reply ends a command with a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Reply::Error | Reply::Fail | Reply::SendFail | Reply::NoAp
        )
    }
}

// ============================================================================
// Data plane replies
// ============================================================================

/// Parse the `Recv <n> bytes` echo that follows a raw send.
pub fn parse_recv_ack(text: &str) -> Option<usize> {
    let rest = text.strip_prefix("Recv ")?;
    let (count, unit) = rest.split_once(' ')?;
    if unit != "bytes" {
        return None;
    }
    count.parse().ok()
}

/// Parse the `+CIPRECVDATA,<len>:` header of a pull reply.
pub fn parse_recv_data_header(text: &str) -> Option<usize> {
    let rest = text.strip_prefix("+CIPRECVDATA,")?;
    let len = rest.strip_suffix(':').unwrap_or(rest);
    len.trim().parse().ok()
}

/// Parse the `STATUS:<n>` line of `AT+CIPSTATUS`.
pub fn parse_status_code(text: &str) -> Option<u8> {
    text.strip_prefix("STATUS:")?.trim().parse().ok()
}

/// Parse a `+PING:<ms>` or `+<ms>` reply.
pub fn parse_ping(text: &str) -> Option<u32> {
    let rest = text.strip_prefix('+')?;
    let rest = rest.strip_prefix("PING:").unwrap_or(rest);
    rest.split_whitespace().next()?.parse().ok()
}

/// Parse the `+CWJAP:<code>` line that precedes a failed join.
pub fn parse_join_error(text: &str) -> Option<u8> {
    text.strip_prefix("+CWJAP:")?.trim().parse().ok()
}

// ============================================================================
// Field splitting
// ============================================================================

/// Split a comma separated field list, honoring double quotes and backslash
/// escapes. Quotes are removed from the returned fields.
pub fn split_fields(text: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn payload<'a>(text: &'a str, prefix: &str) -> ProtocolResult<&'a str> {
    text.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| ProtocolError::ParseError(format!("expected {}: {}", prefix, text)))
}

fn parse_field<T: std::str::FromStr>(fields: &[String], index: usize, name: &str) -> ProtocolResult<T> {
    fields
        .get(index)
        .and_then(|f| f.trim().parse().ok())
        .ok_or_else(|| ProtocolError::ParseError(format!("invalid {}: {:?}", name, fields.get(index))))
}

// ============================================================================
// Structured query replies
// ============================================================================

/// Joined access point, parsed from `+CWJAP_CUR:"ssid","bssid",channel,rssi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApInfo {
    /// Network SSID.
    pub ssid: String,
    /// Access point MAC address.
    pub bssid: String,
    /// WiFi channel.
    pub channel: u8,
    /// Signal strength in dBm.
    pub rssi: i32,
}

impl ApInfo {
    /// Parse the reply line.
    pub fn parse(text: &str) -> ProtocolResult<ApInfo> {
        let fields = split_fields(payload(text, "+CWJAP_CUR")?);
        if fields.len() < 4 {
            return Err(ProtocolError::ParseError(format!(
                "expected 4 fields, got {}: {}",
                fields.len(),
                text
            )));
        }
        Ok(ApInfo {
            ssid: fields[0].clone(),
            bssid: fields[1].clone(),
            channel: parse_field(&fields, 2, "channel")?,
            rssi: parse_field(&fields, 3, "rssi")?,
        })
    }
}

/// Visible network, parsed from `+CWLAP:(enc,"ssid",rssi,"mac",channel)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Encryption code (0 = open).
    pub encryption: u8,
    /// Network SSID.
    pub ssid: String,
    /// Signal strength in dBm.
    pub rssi: i32,
    /// Access point MAC address.
    pub mac: String,
    /// WiFi channel.
    pub channel: u8,
}

impl NetworkInfo {
    /// Parse one list item.
    pub fn parse(text: &str) -> ProtocolResult<NetworkInfo> {
        let body = payload(text, "+CWLAP")?;
        let body = body
            .trim()
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(|| ProtocolError::ParseError(format!("expected parentheses: {}", text)))?;
        let fields = split_fields(body);
        if fields.len() < 5 {
            return Err(ProtocolError::ParseError(format!(
                "expected 5 fields, got {}: {}",
                fields.len(),
                text
            )));
        }
        Ok(NetworkInfo {
            encryption: parse_field(&fields, 0, "encryption")?,
            ssid: fields[1].clone(),
            rssi: parse_field(&fields, 2, "rssi")?,
            mac: fields[3].clone(),
            channel: parse_field(&fields, 4, "channel")?,
        })
    }
}

/// One `+CIPSTATUS:<id>,"type","ip",rport,lport,tetype` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    /// Link id.
    pub link: u8,
    /// `TCP`, `UDP`, or `SSL`.
    pub protocol: String,
    /// Remote address.
    pub remote_ip: String,
    /// Remote port.
    pub remote_port: u16,
    /// Local port.
    pub local_port: u16,
    /// Whether the chip is the server side of the link.
    pub is_server: bool,
}

impl LinkStatus {
    /// Parse one status line.
    pub fn parse(text: &str) -> ProtocolResult<LinkStatus> {
        let fields = split_fields(payload(text, "+CIPSTATUS")?);
        if fields.len() < 6 {
            return Err(ProtocolError::ParseError(format!(
                "expected 6 fields, got {}: {}",
                fields.len(),
                text
            )));
        }
        Ok(LinkStatus {
            link: parse_field(&fields, 0, "link")?,
            protocol: fields[1].clone(),
            remote_ip: fields[2].clone(),
            remote_port: parse_field(&fields, 3, "remote port")?,
            local_port: parse_field(&fields, 4, "local port")?,
            is_server: parse_field::<u8>(&fields, 5, "tetype")? == 1,
        })
    }
}

/// Which address a `+CIPSTA_CUR:` line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// `ip`
    Ip,
    /// `gateway`
    Gateway,
    /// `netmask`
    Netmask,
}

/// Parse a `+CIPSTA_CUR:<kind>:"a.b.c.d"` line.
pub fn parse_station_address(text: &str) -> ProtocolResult<(AddressKind, Ipv4Addr)> {
    let rest = payload(text, "+CIPSTA_CUR")?;
    let (kind, value) = rest
        .split_once(':')
        .ok_or_else(|| ProtocolError::ParseError(format!("missing address kind: {}", text)))?;
    let kind = match kind {
        "ip" => AddressKind::Ip,
        "gateway" => AddressKind::Gateway,
        "netmask" => AddressKind::Netmask,
        other => {
            return Err(ProtocolError::ParseError(format!(
                "unknown address kind: {}",
                other
            )))
        }
    };
    let addr = value
        .trim()
        .trim_matches('"')
        .parse::<Ipv4Addr>()
        .map_err(|_| ProtocolError::ParseError(format!("invalid address: {}", value)))?;
    Ok((kind, addr))
}

/// Parse a `+CIPDNS_CUR:a.b.c.d` line.
pub fn parse_dns_server(text: &str) -> ProtocolResult<Ipv4Addr> {
    let value = payload(text, "+CIPDNS_CUR")?;
    value
        .trim()
        .trim_matches('"')
        .parse()
        .map_err(|_| ProtocolError::ParseError(format!("invalid DNS address: {}", value)))
}

/// A station joined to the soft access point, parsed from `ip,mac` lines of
/// `AT+CWLIF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationEntry {
    /// Station address.
    pub ip: Ipv4Addr,
    /// Station MAC address.
    pub mac: String,
}

impl StationEntry {
    /// Parse one `AT+CWLIF` line.
    pub fn parse(text: &str) -> ProtocolResult<StationEntry> {
        let (ip, mac) = text
            .split_once(',')
            .ok_or_else(|| ProtocolError::ParseError(format!("expected ip,mac: {}", text)))?;
        let ip = ip
            .trim()
            .parse()
            .map_err(|_| ProtocolError::ParseError(format!("invalid station ip: {}", ip)))?;
        Ok(StationEntry {
            ip,
            mac: mac.trim().to_string(),
        })
    }
}
