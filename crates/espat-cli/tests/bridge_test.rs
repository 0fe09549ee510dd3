//! End-to-end tests against a fake chip behind a TCP listener.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::process::Command as Process;
use std::thread::{self, JoinHandle};

use espat_cli::{execute, BridgeConfig, CliConfig, Command, ResetArg};

// ============================================================================
// Test Helper Functions
// ============================================================================

fn reply_for(line: &str) -> &'static str {
    match line {
        "ATE0" | "AT+CIPMUX=1" | "AT+CIPRECVMODE=1" | "AT+CWMODE=1" => "\r\nOK\r\n",
        "AT+GMR" => "AT version:1.7.4.0\r\nSDK version:3.0.4\r\n\r\nOK\r\n",
        "AT+CIPSTATUS" => "STATUS:5\r\n\r\nOK\r\n",
        _ => "\r\nERROR\r\n",
    }
}

/// Serve one bridge connection, answering each command line.
fn spawn_fake_chip() -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut seen = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let command = line.trim_end().to_string();
            if writer.write_all(reply_for(&command).as_bytes()).is_err() {
                break;
            }
            seen.push(command);
        }
        seen
    });
    (port, handle)
}

fn config_for(port: u16) -> CliConfig {
    CliConfig {
        bridge: BridgeConfig {
            port,
            ..Default::default()
        },
        ..Default::default()
    }
}

// ============================================================================
// Library
// ============================================================================

#[test]
fn test_info_over_tcp() {
    espat_cli::logging::init_for_tests();
    let (port, chip) = spawn_fake_chip();

    let mut driver = espat_cli::connect(&config_for(port), ResetArg::Keep).unwrap();
    let mut out = Vec::new();
    execute(&mut driver, &Command::Info, &mut out).unwrap();
    drop(driver);

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "firmware: 1.7.4.0\nstation:  disconnected\n"
    );
    let seen = chip.join().unwrap();
    assert_eq!(
        seen,
        ["ATE0", "AT+CIPMUX=1", "AT+CIPRECVMODE=1", "AT+CWMODE=1", "AT+GMR", "AT+CIPSTATUS"]
    );
}

#[test]
fn test_unreachable_bridge() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = espat_cli::connect(&config_for(port), ResetArg::Keep).unwrap_err();
    assert!(matches!(err, espat_cli::CliError::Io(_)));
}

// ============================================================================
// Binary
// ============================================================================

#[test]
fn test_binary_info() {
    let (port, chip) = spawn_fake_chip();

    let output = Process::new(env!("CARGO_BIN_EXE_espat"))
        .args(["--port", &port.to_string(), "info"])
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to spawn espat");

    assert!(
        output.status.success(),
        "expected exit code 0, got {:?}",
        output.status.code()
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("firmware: 1.7.4.0"), "{}", stdout);
    chip.join().unwrap();
}

#[test]
fn test_binary_reports_failure() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let output = Process::new(env!("CARGO_BIN_EXE_espat"))
        .args(["--port", &port.to_string(), "scan"])
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to spawn espat");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("espat: "));
}
