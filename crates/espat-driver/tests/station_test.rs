//! Station, soft access point, and module lifecycle integration tests.

use std::net::Ipv4Addr;

use espat_driver::{
    ApEncryption, DriverConfig, ErrorCode, EspAtDriver, ResetKind, ScriptedTransport, StationState,
    INIT_COMMANDS,
};

// ============================================================================
// Test Helper Functions
// ============================================================================

fn ready(transport: ScriptedTransport) -> EspAtDriver<ScriptedTransport> {
    let mut driver = EspAtDriver::new(transport.with_init(), DriverConfig::default()).unwrap();
    assert!(driver.init(ResetKind::None));
    driver.transport_mut().clear_writes();
    driver
}

const JOIN: &str = "AT+CWJAP_CUR=\"home\",\"secret\"";
const STATUS: &str = "AT+CIPSTATUS";

fn status_reply(code: u8) -> String {
    format!("STATUS:{}\r\n\r\nOK\r\n", code)
}

// ============================================================================
// Init
// ============================================================================

#[test]
fn test_init_sends_configuration() {
    let mut driver =
        EspAtDriver::new(ScriptedTransport::new().with_init(), DriverConfig::default()).unwrap();
    assert!(!driver.is_initialized());
    assert!(driver.init(ResetKind::None));
    assert!(driver.is_initialized());
    assert_eq!(driver.transport().written_commands(), INIT_COMMANDS);
}

#[test]
fn test_init_soft_reset_waits_for_ready() {
    let transport = ScriptedTransport::new()
        .on_command("AT+RST", "\r\nOK\r\n\r\n ets Jan  8 2013,rst cause:2\r\nboot mode:(3,6)\r\n\r\nready\r\n")
        .with_init();
    let mut driver = EspAtDriver::new(transport, DriverConfig::default()).unwrap();

    assert!(driver.init(ResetKind::Soft));
    assert_eq!(driver.transport().written_commands()[0], "AT+RST");
}

#[test]
fn test_init_factory_reset() {
    let transport = ScriptedTransport::new()
        .on_command("AT+RESTORE", "\r\nOK\r\nready\r\n")
        .with_init();
    let mut driver = EspAtDriver::new(transport, DriverConfig::default()).unwrap();
    assert!(driver.init(ResetKind::Factory));
}

#[test]
fn test_silent_module() {
    let mut driver = EspAtDriver::new(ScriptedTransport::new(), DriverConfig::default()).unwrap();

    assert!(!driver.init(ResetKind::None));
    assert_eq!(driver.last_error(), ErrorCode::NotResponding);

    assert_eq!(driver.status(), StationState::NoModule);
    assert_eq!(driver.last_error(), ErrorCode::NotInitialized);
}

#[test]
fn test_firmware_version() {
    let transport = ScriptedTransport::new().on_command(
        "AT+GMR",
        "AT version:1.7.4.0(May 11 2020 19:13:04)\r\nSDK version:3.0.4\r\ncompile time:May 11 2020\r\n\r\nOK\r\n",
    );
    let mut driver = ready(transport);
    assert_eq!(
        driver.firmware_version().as_deref(),
        Some("1.7.4.0(May 11 2020 19:13:04)")
    );
}

// ============================================================================
// Station
// ============================================================================

#[test]
fn test_begin_connects() {
    let transport = ScriptedTransport::new()
        .on_command(JOIN, "WIFI CONNECTED\r\nWIFI GOT IP\r\n\r\nOK\r\n")
        .on_command(STATUS, &status_reply(2));
    let mut driver = ready(transport);

    assert_eq!(driver.begin("home", "secret"), StationState::Connected);
    assert_eq!(driver.station_state(), StationState::Connected);
}

#[test]
fn test_begin_failure_is_sticky() {
    let transport = ScriptedTransport::new()
        .on_command(JOIN, "+CWJAP:1\r\n\r\nFAIL\r\n")
        .on_command(STATUS, &status_reply(5));
    let mut driver = ready(transport);

    assert_eq!(driver.begin("home", "secret"), StationState::ConnectFailed);
    assert_eq!(driver.last_error(), ErrorCode::ProtocolError);
    assert_eq!(driver.status(), StationState::ConnectFailed);
}

#[test]
fn test_connection_lost_then_disconnected() {
    let transport = ScriptedTransport::new()
        .on_command(STATUS, &status_reply(3))
        .on_command(STATUS, &status_reply(5))
        .on_command(STATUS, &status_reply(5));
    let mut driver = ready(transport);

    assert_eq!(driver.status(), StationState::Connected);
    assert_eq!(driver.status(), StationState::ConnectionLost);
    assert_eq!(driver.status(), StationState::Disconnected);
}

#[test]
fn test_status_error_keeps_state() {
    let transport = ScriptedTransport::new()
        .on_command(STATUS, &status_reply(2))
        .on_command(STATUS, "\r\nERROR\r\n");
    let mut driver = ready(transport);

    assert_eq!(driver.status(), StationState::Connected);
    assert_eq!(driver.status(), StationState::Connected);
    assert_eq!(driver.last_error(), ErrorCode::ProtocolError);
}

#[test]
fn test_disconnect_persistent() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CWAUTOCONN=0", "\r\nOK\r\n")
        .on_command("AT+CWQAP", "\r\nOK\r\nWIFI DISCONNECT\r\n");
    let mut driver = ready(transport);

    assert!(driver.disconnect(true));
    assert_eq!(driver.station_state(), StationState::Disconnected);
    assert_eq!(
        driver.transport().written_commands(),
        vec!["AT+CWAUTOCONN=0", "AT+CWQAP"]
    );
}

#[test]
fn test_addresses() {
    let reply = "+CIPSTA_CUR:ip:\"192.168.1.20\"\r\n+CIPSTA_CUR:gateway:\"192.168.1.1\"\r\n+CIPSTA_CUR:netmask:\"255.255.255.0\"\r\n\r\nOK\r\n";
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSTA_CUR?", reply)
        .on_command("AT+CIPSTA_CUR?", reply)
        .on_command("AT+CIPSTA_CUR?", reply);
    let mut driver = ready(transport);

    assert_eq!(driver.local_ip(), Some(Ipv4Addr::new(192, 168, 1, 20)));
    assert_eq!(driver.gateway_ip(), Some(Ipv4Addr::new(192, 168, 1, 1)));
    assert_eq!(driver.subnet_mask(), Some(Ipv4Addr::new(255, 255, 255, 0)));
}

#[test]
fn test_dns_servers() {
    let transport = ScriptedTransport::new().on_command(
        "AT+CIPDNS_CUR?",
        "+CIPDNS_CUR:208.67.222.222\r\n+CIPDNS_CUR:8.8.8.8\r\n\r\nOK\r\n",
    );
    let mut driver = ready(transport);
    assert_eq!(driver.dns_ip(1), Some(Ipv4Addr::new(8, 8, 8, 8)));
}

#[test]
fn test_access_point_details() {
    let reply = "+CWJAP_CUR:\"home\",\"aa:bb:cc:dd:ee:ff\",6,-58\r\n\r\nOK\r\n";
    let transport = ScriptedTransport::new()
        .on_command("AT+CWJAP_CUR?", reply)
        .on_command("AT+CWJAP_CUR?", reply);
    let mut driver = ready(transport);

    assert_eq!(driver.rssi(), Some(-58));
    let info = driver.ap_info().unwrap();
    assert_eq!(info.ssid, "home");
    assert_eq!(info.bssid, "aa:bb:cc:dd:ee:ff");
    assert_eq!(info.channel, 6);
}

#[test]
fn test_no_access_point() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CWJAP_CUR?", "No AP\r\n\r\nOK\r\n")
        .on_command("AT+CIPSTATUS", &status_reply(5));
    let mut driver = ready(transport);

    assert_eq!(driver.channel(), None);
    assert_eq!(driver.last_error(), ErrorCode::NoAccessPoint);

    // The trailing OK of the failed query does not confuse the next command.
    assert_eq!(driver.status(), StationState::Disconnected);
}

#[test]
fn test_scan_networks() {
    let transport = ScriptedTransport::new().on_command(
        "AT+CWLAP",
        "+CWLAP:(3,\"home\",-58,\"aa:bb:cc:dd:ee:ff\",6)\r\n+CWLAP:(0,\"cafe, free\",-80,\"11:22:33:44:55:66\",11)\r\n\r\nOK\r\n",
    );
    let mut driver = ready(transport);

    let networks = driver.scan_networks().unwrap();
    assert_eq!(networks.len(), 2);
    assert_eq!(networks[0].ssid, "home");
    assert_eq!(networks[1].ssid, "cafe, free");
    assert_eq!(networks[1].channel, 11);
}

#[test]
fn test_ping() {
    let transport = ScriptedTransport::new()
        .on_command("AT+PING=\"example.com\"", "+12\r\n\r\nOK\r\n")
        .on_command("AT+PING=\"nowhere\"", "+timeout\r\n\r\nERROR\r\n");
    let mut driver = ready(transport);

    assert_eq!(driver.ping("example.com"), Some(12));
    assert_eq!(driver.ping("nowhere"), None);
    assert_eq!(driver.last_error(), ErrorCode::ProtocolError);
}

#[test]
fn test_sleep_and_dhcp() {
    let transport = ScriptedTransport::new()
        .on_command("AT+SLEEP=1", "\r\nOK\r\n")
        .on_command("AT+CWDHCP_CUR=1,0", "\r\nOK\r\n");
    let mut driver = ready(transport);

    assert!(driver.set_sleep_mode(1));
    assert!(driver.set_dhcp(1, false));
}

// ============================================================================
// Soft access point
// ============================================================================

#[test]
fn test_soft_ap_lifecycle() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CWMODE=3", "\r\nOK\r\n")
        .on_command("AT+CWSAP_CUR=\"espat\",\"password1\",5,3", "\r\nOK\r\n")
        .on_command("AT+CWLIF", "\r\nOK\r\n")
        .on_command("AT+CWLIF", "192.168.4.2,aa:bb:cc:00:11:22\r\n\r\nOK\r\n");
    let mut driver = ready(transport);

    assert_eq!(
        driver.begin_ap("espat", "password1", 5, ApEncryption::Wpa2Psk),
        StationState::ApListening
    );
    assert_eq!(driver.ap_status(), StationState::ApListening);
    assert_eq!(driver.ap_status(), StationState::ApConnected);
}

#[test]
fn test_soft_ap_failure() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CWMODE=3", "\r\nOK\r\n")
        .on_command("AT+CWSAP_CUR=\"espat\",\"short\",5,3", "\r\nERROR\r\n");
    let mut driver = ready(transport);

    assert_eq!(
        driver.begin_ap("espat", "short", 5, ApEncryption::Wpa2Psk),
        StationState::ApFailed
    );
}

// ============================================================================
// Noise
// ============================================================================

#[test]
fn test_garbage_budget_stops_the_wait() {
    let config = DriverConfig {
        garbage_budget: 5,
        ..Default::default()
    };
    let noise: String = (0..20).map(|i| format!("noise {}\r\n", i)).collect();
    let transport = ScriptedTransport::new()
        .with_init()
        .on_command("AT+SLEEP=0", &format!("{}OK\r\n", noise));
    let mut driver = EspAtDriver::new(transport, config).unwrap();
    assert!(driver.init(ResetKind::None));

    assert!(!driver.set_sleep_mode(0));
    assert_eq!(driver.last_error(), ErrorCode::NotResponding);
}
