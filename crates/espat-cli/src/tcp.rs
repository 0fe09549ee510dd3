//! Transport over a serial-over-TCP bridge.
//!
//! Bridges such as ser2net or an ESP-Link expose the chip's UART as a plain
//! TCP byte stream, so the AT conversation runs unchanged over the socket.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use espat_driver::Transport;
use tracing::{debug, warn};

use crate::config::BridgeConfig;

const PEEK_BUFFER_SIZE: usize = 1024;

/// [`Transport`] backed by a blocking TCP stream.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect to the bridge.
    pub fn connect(config: &BridgeConfig) -> io::Result<TcpTransport> {
        let timeout = Duration::from_millis(config.connect_timeout_ms.max(1));
        let addr = (config.address.as_str(), config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    ErrorKind::NotFound,
                    format!("no address for {}", config.address),
                )
            })?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        debug!("Bridge: connected to {}", addr);
        Ok(TcpTransport { stream })
    }

    /// Wrap an already connected stream.
    pub fn from_stream(stream: TcpStream) -> TcpTransport {
        TcpTransport { stream }
    }

    fn peek_pending(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; PEEK_BUFFER_SIZE];
        self.stream.set_nonblocking(true)?;
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;
        match result {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, data: &[u8]) -> usize {
        match self.stream.write_all(data).and_then(|_| self.stream.flush()) {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("Bridge: write failed: {}", e);
                0
            }
        }
    }

    fn pending(&mut self) -> usize {
        self.peek_pending().unwrap_or_else(|e| {
            warn!("Bridge: peek failed: {}", e);
            0
        })
    }

    fn read(&mut self, max: usize, timeout: Duration) -> Vec<u8> {
        // A zero read timeout means "block forever" to the socket API.
        let timeout = timeout.max(Duration::from_millis(1));
        if let Err(e) = self.stream.set_read_timeout(Some(timeout)) {
            warn!("Bridge: cannot set read timeout: {}", e);
            return Vec::new();
        }

        let mut buf = vec![0u8; max.max(1)];
        match self.stream.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                buf
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Vec::new()
            }
            Err(e) => {
                warn!("Bridge: read failed: {}", e);
                Vec::new()
            }
        }
    }
}
