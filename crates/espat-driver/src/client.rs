//! Stream client over a single link.

use bytes::{Buf, BytesMut};
use espat_protocol::LinkProtocol;
use tracing::{debug, trace};

use crate::driver::EspAtDriver;
use crate::transport::Transport;

/// A byte stream bound to at most one link at a time.
///
/// The client holds only buffers and its link id; every call that touches
/// the chip borrows the driver that owns the link table.
#[derive(Debug, Default)]
pub struct Client {
    link: Option<u8>,
    port: u16,
    tx: BytesMut,
    rx: BytesMut,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound link id, if any.
    pub fn link_id(&self) -> Option<u8> {
        self.link
    }

    /// Remote port of the bound link, or 0.
    pub fn remote_port(&self) -> u16 {
        if self.link.is_some() {
            self.port
        } else {
            0
        }
    }

    /// Open a TCP connection.
    pub fn connect<T: Transport>(&mut self, drv: &mut EspAtDriver<T>, host: &str, port: u16) -> bool {
        self.open(drv, LinkProtocol::Tcp, host, port)
    }

    /// Open a TLS connection terminated on the chip.
    pub fn connect_secure<T: Transport>(
        &mut self,
        drv: &mut EspAtDriver<T>,
        host: &str,
        port: u16,
    ) -> bool {
        self.open(drv, LinkProtocol::Ssl, host, port)
    }

    /// Open a UDP association.
    pub fn connect_udp<T: Transport>(
        &mut self,
        drv: &mut EspAtDriver<T>,
        host: &str,
        port: u16,
    ) -> bool {
        self.open(drv, LinkProtocol::Udp, host, port)
    }

    fn open<T: Transport>(
        &mut self,
        drv: &mut EspAtDriver<T>,
        protocol: LinkProtocol,
        host: &str,
        port: u16,
    ) -> bool {
        if self.link.is_some() {
            self.stop(drv);
        }
        match drv.open_link(protocol, host, port) {
            Some(id) => {
                debug!("Client: bound to link {}", id);
                self.link = Some(id);
                self.port = port;
                true
            }
            None => false,
        }
    }

    /// Whether the link is open or still has data to hand out.
    ///
    /// Buffered data keeps the client connected after the remote end closed.
    /// Once neither holds, the client unbinds.
    pub fn connected<T: Transport>(&mut self, drv: &mut EspAtDriver<T>) -> bool {
        let Some(id) = self.link else {
            return false;
        };
        if !self.rx.is_empty() || drv.is_link_connected(id) || drv.available_on_link(id) > 0 {
            return true;
        }
        trace!("Client: link {} gone, unbinding", id);
        self.unbind();
        false
    }

    /// Bytes ready to read, pulling from the chip only when the local buffer
    /// is empty.
    pub fn available<T: Transport>(&mut self, drv: &mut EspAtDriver<T>) -> usize {
        if !self.rx.is_empty() {
            return self.rx.len();
        }
        let Some(id) = self.link else {
            return 0;
        };
        if !self.tx.is_empty() {
            self.flush(drv);
        }
        if drv.available_on_link(id) == 0 {
            return 0;
        }
        let max = drv.config().rx_buffer_size;
        let data = drv.recv_on_link(id, max);
        self.rx.extend_from_slice(&data);
        self.rx.len()
    }

    /// Read one byte.
    pub fn read<T: Transport>(&mut self, drv: &mut EspAtDriver<T>) -> Option<u8> {
        if self.available(drv) == 0 {
            return None;
        }
        Some(self.rx.get_u8())
    }

    /// Read into `buf`, returning the number of bytes copied.
    pub fn read_buffer<T: Transport>(&mut self, drv: &mut EspAtDriver<T>, buf: &mut [u8]) -> usize {
        if buf.is_empty() || self.available(drv) == 0 {
            return 0;
        }
        let n = buf.len().min(self.rx.len());
        self.rx.copy_to_slice(&mut buf[..n]);
        n
    }

    /// Next byte without consuming it.
    pub fn peek<T: Transport>(&mut self, drv: &mut EspAtDriver<T>) -> Option<u8> {
        if self.available(drv) == 0 {
            return None;
        }
        self.rx.first().copied()
    }

    /// Queue text for sending. Nothing is written until a flush.
    pub fn print(&mut self, text: &str) {
        self.tx.extend_from_slice(text.as_bytes());
    }

    /// Queue bytes, flushing once the buffer reaches its configured size.
    pub fn write<T: Transport>(&mut self, drv: &mut EspAtDriver<T>, data: &[u8]) -> usize {
        if self.link.is_none() {
            return 0;
        }
        self.tx.extend_from_slice(data);
        if self.tx.len() >= drv.config().tx_buffer_size {
            self.flush(drv);
        }
        data.len()
    }

    /// Bytes queued and not yet flushed.
    pub fn pending_write(&self) -> usize {
        self.tx.len()
    }

    /// Send the whole transmit buffer. The buffer is cleared whatever the
    /// outcome; the return value is the acknowledged byte count.
    pub fn flush<T: Transport>(&mut self, drv: &mut EspAtDriver<T>) -> usize {
        if self.tx.is_empty() {
            return 0;
        }
        let sent = match self.link {
            Some(id) => drv.send_on_link(id, &self.tx),
            None => 0,
        };
        self.tx.clear();
        sent
    }

    /// Flush, then close the link.
    pub fn stop<T: Transport>(&mut self, drv: &mut EspAtDriver<T>) {
        self.flush(drv);
        self.abort(drv);
    }

    /// Reset the link and unbind without flushing.
    pub fn abort<T: Transport>(&mut self, drv: &mut EspAtDriver<T>) {
        if let Some(id) = self.link {
            drv.close_link(id, true);
        }
        self.unbind();
    }

    fn unbind(&mut self) {
        self.link = None;
        self.port = 0;
        self.tx.clear();
        self.rx.clear();
    }
}
