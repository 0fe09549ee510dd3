//! Station and soft access point operations.

use std::net::Ipv4Addr;

use espat_protocol::{
    parse_dns_server, parse_ping, parse_station_address, parse_status_code, AddressKind,
    ApEncryption, ApInfo, AtCommand, NetworkInfo, StationEntry, WifiMode,
};
use tracing::{debug, info, warn};

use crate::driver::EspAtDriver;
use crate::error::ErrorCode;
use crate::station::StationState;
use crate::transport::Transport;

impl<T: Transport> EspAtDriver<T> {
    // ========================================================================
    // Station
    // ========================================================================

    /// Join an access point and report the resulting state.
    pub fn begin(&mut self, ssid: &str, password: &str) -> StationState {
        if !self.maintain() {
            return self.poll_failed();
        }

        let cmd = AtCommand::JoinAp {
            ssid: ssid.to_string(),
            password: password.to_string(),
        };
        let timeout = self.engine.config().connect_timeout();
        if self
            .engine
            .exchange(&mut self.links, &cmd, Some("OK"), true, timeout)
            .is_none()
        {
            let err = self.last_error();
            warn!("Driver: joining '{}' failed: {}", ssid, err);
            self.station = if err.is_module_failure() {
                StationState::NoModule
            } else {
                StationState::ConnectFailed
            };
            return self.station;
        }

        info!("Driver: joined '{}'", ssid);
        self.status()
    }

    /// Leave the access point. With `persistent`, also stop the chip from
    /// rejoining at power up.
    pub fn disconnect(&mut self, persistent: bool) -> bool {
        if !self.maintain() {
            return false;
        }
        if persistent {
            let cmd = AtCommand::SetAutoConnect { enable: false };
            if !self.engine.send_command(&mut self.links, &cmd, Some("OK")) {
                return false;
            }
        }
        if !self
            .engine
            .send_command(&mut self.links, &AtCommand::QuitAp, Some("OK"))
        {
            return false;
        }
        self.station = StationState::Disconnected;
        true
    }

    /// Poll the chip and advance the station state.
    pub fn status(&mut self) -> StationState {
        if !self.maintain() {
            return self.poll_failed();
        }
        let timeout = self.engine.config().read_timeout();
        let poll = match self
            .engine
            .query(&mut self.links, &AtCommand::Status, "STATUS:", timeout)
        {
            Some(line) => parse_status_code(&line).ok_or(ErrorCode::ProtocolError),
            None => Err(self.last_error()),
        };
        self.advance(poll)
    }

    /// The state computed by the last operation, without polling.
    pub fn station_state(&self) -> StationState {
        self.station
    }

    fn poll_failed(&mut self) -> StationState {
        let err = self.last_error();
        self.advance(Err(err))
    }

    fn advance(&mut self, poll: Result<u8, ErrorCode>) -> StationState {
        let next = self.station.after_poll(poll);
        if next != self.station {
            debug!("Driver: station {} -> {}", self.station, next);
        }
        self.station = next;
        next
    }

    pub fn local_ip(&mut self) -> Option<Ipv4Addr> {
        self.station_address(AddressKind::Ip)
    }

    pub fn gateway_ip(&mut self) -> Option<Ipv4Addr> {
        self.station_address(AddressKind::Gateway)
    }

    pub fn subnet_mask(&mut self) -> Option<Ipv4Addr> {
        self.station_address(AddressKind::Netmask)
    }

    fn station_address(&mut self, kind: AddressKind) -> Option<Ipv4Addr> {
        if !self.maintain() {
            return None;
        }
        let timeout = self.engine.config().read_timeout();
        let items = self.engine.query_list(
            &mut self.links,
            &AtCommand::QueryStationIp,
            "+CIPSTA_CUR:",
            timeout,
        )?;
        let found = items
            .iter()
            .filter_map(|item| parse_station_address(item).ok())
            .find(|(k, _)| *k == kind)
            .map(|(_, addr)| addr);
        if found.is_none() {
            self.engine.fail(ErrorCode::ProtocolError);
        }
        found
    }

    /// The `n`th configured DNS server.
    pub fn dns_ip(&mut self, n: usize) -> Option<Ipv4Addr> {
        if !self.maintain() {
            return None;
        }
        let timeout = self.engine.config().read_timeout();
        let items =
            self.engine
                .query_list(&mut self.links, &AtCommand::QueryDns, "+CIPDNS_CUR:", timeout)?;
        items.get(n).and_then(|item| parse_dns_server(item).ok())
    }

    /// Details of the joined access point; `None` with `NoAccessPoint`
    /// latched when not joined.
    pub fn ap_info(&mut self) -> Option<ApInfo> {
        if !self.maintain() {
            return None;
        }
        let timeout = self.engine.config().read_timeout();
        let line = self
            .engine
            .query(&mut self.links, &AtCommand::QueryAp, "+CWJAP_CUR:", timeout)?;
        match ApInfo::parse(&line) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Driver: bad access point reply {:?}: {}", line, e);
                self.engine.fail(ErrorCode::ProtocolError);
                None
            }
        }
    }

    pub fn ssid(&mut self) -> Option<String> {
        self.ap_info().map(|info| info.ssid)
    }

    pub fn bssid(&mut self) -> Option<String> {
        self.ap_info().map(|info| info.bssid)
    }

    pub fn channel(&mut self) -> Option<u8> {
        self.ap_info().map(|info| info.channel)
    }

    pub fn rssi(&mut self) -> Option<i32> {
        self.ap_info().map(|info| info.rssi)
    }

    /// Visible access points.
    pub fn scan_networks(&mut self) -> Option<Vec<NetworkInfo>> {
        if !self.maintain() {
            return None;
        }
        let timeout = self.engine.config().connect_timeout();
        let items = self
            .engine
            .query_list(&mut self.links, &AtCommand::ListAps, "+CWLAP:", timeout)?;
        Some(
            items
                .iter()
                .filter_map(|item| match NetworkInfo::parse(item) {
                    Ok(network) => Some(network),
                    Err(e) => {
                        debug!("Driver: skipping scan entry {:?}: {}", item, e);
                        None
                    }
                })
                .collect(),
        )
    }

    /// Round-trip time to `host` in milliseconds.
    pub fn ping(&mut self, host: &str) -> Option<u32> {
        if !self.maintain() {
            return None;
        }
        let cmd = AtCommand::Ping {
            host: host.to_string(),
        };
        let timeout = self.engine.config().connect_timeout();
        let line = self.engine.query(&mut self.links, &cmd, "+", timeout)?;
        let rtt = parse_ping(&line);
        if rtt.is_none() {
            self.engine.fail(ErrorCode::ProtocolError);
        }
        rtt
    }

    // ========================================================================
    // Soft access point
    // ========================================================================

    /// Start a soft access point alongside the station interface.
    pub fn begin_ap(
        &mut self,
        ssid: &str,
        password: &str,
        channel: u8,
        encryption: ApEncryption,
    ) -> StationState {
        if !self.maintain() {
            return self.poll_failed();
        }

        let mode = AtCommand::SetWifiMode {
            mode: WifiMode::Both,
        };
        let configure = AtCommand::ConfigureSoftAp {
            ssid: ssid.to_string(),
            password: password.to_string(),
            channel,
            encryption,
        };
        let started = self.engine.send_command(&mut self.links, &mode, Some("OK"))
            && self.engine.send_command(&mut self.links, &configure, Some("OK"));

        self.station = if started {
            info!("Driver: soft AP '{}' up on channel {}", ssid, channel);
            StationState::ApListening
        } else if self.last_error().is_module_failure() {
            StationState::NoModule
        } else {
            StationState::ApFailed
        };
        self.station
    }

    /// Stations joined to the soft access point.
    pub fn ap_stations(&mut self) -> Option<Vec<StationEntry>> {
        if !self.maintain() {
            return None;
        }
        let timeout = self.engine.config().read_timeout();
        let items = self
            .engine
            .query_list(&mut self.links, &AtCommand::ListStations, "", timeout)?;
        Some(
            items
                .iter()
                .filter_map(|item| StationEntry::parse(item).ok())
                .collect(),
        )
    }

    /// Refresh the soft access point state from its station list.
    pub fn ap_status(&mut self) -> StationState {
        if !matches!(
            self.station,
            StationState::ApListening | StationState::ApConnected
        ) {
            return self.station;
        }
        match self.ap_stations() {
            Some(stations) if stations.is_empty() => self.station = StationState::ApListening,
            Some(_) => self.station = StationState::ApConnected,
            None => return self.poll_failed(),
        }
        self.station
    }
}
