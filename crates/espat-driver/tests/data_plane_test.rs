//! Data plane integration tests: notices, pulls, and the send handshake,
//! driven through a scripted transport.

use espat_driver::{DriverConfig, ErrorCode, EspAtDriver, LinkFlags, ResetKind, ScriptedTransport};

// ============================================================================
// Test Helper Functions
// ============================================================================

/// Build an initialized driver and forget the init traffic.
fn ready(transport: ScriptedTransport) -> EspAtDriver<ScriptedTransport> {
    let mut driver = EspAtDriver::new(transport.with_init(), DriverConfig::default()).unwrap();
    assert!(driver.init(ResetKind::None));
    driver.transport_mut().clear_writes();
    driver
}

fn mark_connected(driver: &mut EspAtDriver<ScriptedTransport>, id: u8) {
    driver
        .links_mut()
        .slot_mut(id)
        .unwrap()
        .set_flags(LinkFlags::CONNECTED);
}

fn pull_reply(advertised: usize, payload: &[u8]) -> String {
    format!(
        "+CIPRECVDATA,{}:{}\r\nOK\r\n",
        advertised,
        String::from_utf8_lossy(payload)
    )
}

// ============================================================================
// Receive
// ============================================================================

#[test]
fn test_ipd_sets_available_without_accumulating() {
    let mut driver = ready(ScriptedTransport::new());
    mark_connected(&mut driver, 1);

    driver.transport_mut().push_rx(b"+IPD,1,10\r\n");
    assert_eq!(driver.available_on_link(1), 10);

    driver.transport_mut().push_rx(b"+IPD,1,30\r\n");
    assert_eq!(driver.available_on_link(1), 30);
}

#[test]
fn test_recv_partial_pull_leaves_remainder() {
    let payload = vec![b'x'; 64];
    let transport =
        ScriptedTransport::new().on_command("AT+CIPRECVDATA=2,64", &pull_reply(64, &payload));
    let mut driver = ready(transport);
    mark_connected(&mut driver, 2);

    driver.transport_mut().push_rx(b"+IPD,2,128\r\n");
    assert_eq!(driver.available_on_link(2), 128);

    let data = driver.recv_on_link(2, 64);
    assert_eq!(data, payload);
    assert_eq!(driver.available_on_link(2), 64);
    assert_eq!(driver.last_error(), ErrorCode::NoError);
}

#[test]
fn test_recv_never_exceeds_advertised_length() {
    let payload = b"0123456789abcdef0123456789abcdef";
    let transport =
        ScriptedTransport::new().on_command("AT+CIPRECVDATA=0,64", &pull_reply(32, payload));
    let mut driver = ready(transport);
    mark_connected(&mut driver, 0);
    driver.links_mut().slot_mut(0).unwrap().set_available(100);

    let data = driver.recv_on_link(0, 64);
    assert_eq!(data.len(), 32);
    assert_eq!(data, payload);
    assert_eq!(driver.available_on_link(0), 68);
}

#[test]
fn test_recv_payload_may_contain_protocol_bytes() {
    let payload = b"OK\r\nERROR\r\n> ";
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPRECVDATA=3,13", &pull_reply(payload.len(), payload));
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);
    driver.links_mut().slot_mut(3).unwrap().set_available(13);

    assert_eq!(driver.recv_on_link(3, 64), payload);
    assert_eq!(driver.available_on_link(3), 0);
}

#[test]
fn test_recv_short_read_resets_available() {
    let transport =
        ScriptedTransport::new().on_command("AT+CIPRECVDATA=2,64", "+CIPRECVDATA,64:only ten b");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 2);
    driver.links_mut().slot_mut(2).unwrap().set_available(128);

    let data = driver.recv_on_link(2, 64);
    assert!(data.is_empty());
    assert_eq!(driver.last_error(), ErrorCode::ReceiveError);
    assert_eq!(driver.links().slot(2).unwrap().available(), 0);
}

#[test]
fn test_recv_rejects_header_larger_than_request() {
    let payload = vec![b'y'; 100];
    let transport =
        ScriptedTransport::new().on_command("AT+CIPRECVDATA=2,64", &pull_reply(100, &payload));
    let mut driver = ready(transport);
    mark_connected(&mut driver, 2);
    driver.links_mut().slot_mut(2).unwrap().set_available(128);

    let data = driver.recv_on_link(2, 64);
    assert!(data.is_empty());
    assert_eq!(driver.last_error(), ErrorCode::ReceiveError);
    assert_eq!(driver.links().slot(2).unwrap().available(), 0);

    // The oversized payload was consumed, so only the trailing OK is drained.
    assert!(driver.maintain());
    assert_eq!(driver.last_error(), ErrorCode::NoError);
}

#[test]
fn test_recv_zero_length_header_stops_pulling() {
    let transport =
        ScriptedTransport::new().on_command("AT+CIPRECVDATA=2,64", &pull_reply(0, b""));
    let mut driver = ready(transport);
    mark_connected(&mut driver, 2);
    driver.links_mut().slot_mut(2).unwrap().set_available(128);

    assert!(driver.recv_on_link(2, 64).is_empty());
    assert_eq!(driver.last_error(), ErrorCode::ReceiveError);
    assert_eq!(driver.available_on_link(2), 0);

    // Nothing is left to pull, so no second pull command goes out.
    assert!(driver.recv_on_link(2, 64).is_empty());
    assert_eq!(
        driver.transport().written_commands(),
        vec!["AT+CIPRECVDATA=2,64"]
    );
}

#[test]
fn test_recv_with_nothing_available() {
    let mut driver = ready(ScriptedTransport::new());
    mark_connected(&mut driver, 1);

    assert!(driver.recv_on_link(1, 64).is_empty());
    assert_eq!(driver.last_error(), ErrorCode::NoError);

    // Same on a link that is not open, but that is worth reporting.
    assert!(driver.recv_on_link(0, 64).is_empty());
    assert_eq!(driver.last_error(), ErrorCode::LinkNotActive);
    assert!(driver.transport().writes().is_empty());
}

#[test]
fn test_recv_after_remote_close_drains_buffered_data() {
    let transport = ScriptedTransport::new().on_command("AT+CIPRECVDATA=4,5", &pull_reply(5, b"tail!"));
    let mut driver = ready(transport);
    mark_connected(&mut driver, 4);

    driver.transport_mut().push_rx(b"+IPD,4,5\r\n4,CLOSED\r\n");
    assert!(!driver.is_link_connected(4));
    assert_eq!(driver.recv_on_link(4, 64), b"tail!");
    assert_eq!(driver.available_on_link(4), 0);
}

// ============================================================================
// Send
// ============================================================================

#[test]
fn test_send_requires_both_confirmations() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSEND=3,5", "\r\nOK\r\n> ")
        .on_write(b"hello", b"\r\nRecv 5 bytes\r\n\r\nSEND OK\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 5);
    assert_eq!(driver.last_error(), ErrorCode::NoError);

    let writes = driver.transport().writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], b"AT+CIPSEND=3,5\r\n");
    assert_eq!(writes[1], b"hello");
}

#[test]
fn test_send_missing_echo_fails() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSEND=3,5", "\r\nOK\r\n> ")
        .on_write(b"hello", b"\r\nSEND OK\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
}

#[test]
fn test_send_missing_send_ok_fails() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSEND=3,5", "\r\nOK\r\n> ")
        .on_write(b"hello", b"\r\nRecv 5 bytes\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
}

#[test]
fn test_send_fail_reply() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSEND=3,5", "\r\nOK\r\n> ")
        .on_write(b"hello", b"\r\nRecv 5 bytes\r\n\r\nSEND FAIL\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
}

#[test]
fn test_send_malformed_echo_fails() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSEND=3,5", "\r\nOK\r\n> ")
        .on_write(b"hello", b"\r\nRecv five bytes\r\n\r\nSEND OK\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
}

#[test]
fn test_send_zero_byte_echo_fails() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSEND=3,5", "\r\nOK\r\n> ")
        .on_write(b"hello", b"\r\nRecv 0 bytes\r\n\r\nSEND OK\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
}

#[test]
fn test_send_echo_larger_than_payload_fails() {
    let transport = ScriptedTransport::new()
        .on_command("AT+CIPSEND=3,5", "\r\nOK\r\n> ")
        .on_write(b"hello", b"\r\nRecv 4096 bytes\r\n\r\nSEND OK\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
}

#[test]
fn test_send_without_prompt_writes_no_payload() {
    let transport = ScriptedTransport::new().on_command("AT+CIPSEND=3,5", "\r\nERROR\r\n");
    let mut driver = ready(transport);
    mark_connected(&mut driver, 3);

    assert_eq!(driver.send_on_link(3, b"hello"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
    assert_eq!(driver.transport().written_commands(), vec!["AT+CIPSEND=3,5"]);
}

#[test]
fn test_send_on_closed_link() {
    let mut driver = ready(ScriptedTransport::new());

    assert_eq!(driver.send_on_link(2, b"data"), 0);
    assert_eq!(driver.last_error(), ErrorCode::SendError);
    assert!(driver.transport().writes().is_empty());
}

#[test]
fn test_send_empty_payload_is_noop() {
    let mut driver = ready(ScriptedTransport::new());
    mark_connected(&mut driver, 2);

    assert_eq!(driver.send_on_link(2, b""), 0);
    assert_eq!(driver.last_error(), ErrorCode::NoError);
    assert!(driver.transport().writes().is_empty());
}
