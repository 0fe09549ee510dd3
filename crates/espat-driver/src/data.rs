//! Link lifecycle and the data plane.

use espat_metrics::metric_defs;
use espat_protocol::{parse_recv_ack, parse_recv_data_header, AtCommand, LinkProtocol, LinkStatus};
use tracing::{debug, warn};

use crate::driver::EspAtDriver;
use crate::error::ErrorCode;
use crate::links::LinkFlags;
use crate::transport::Transport;

impl<T: Transport> EspAtDriver<T> {
    // ========================================================================
    // Link lifecycle
    // ========================================================================

    /// Pick a free link id without claiming it.
    pub fn allocate_free_link(&self) -> Option<u8> {
        self.links
            .allocate_free_link(self.engine.config().quirks.allocation_order)
    }

    /// Open a link to `host:port` on a free slot.
    ///
    /// Returns the link id, or `None` with the error latched. When no slot is
    /// free nothing is written to the transport.
    pub fn open_link(&mut self, protocol: LinkProtocol, host: &str, port: u16) -> Option<u8> {
        if !self.maintain() {
            return None;
        }
        let Some(id) = self.allocate_free_link() else {
            debug!("Driver: no free link for {}:{}", host, port);
            self.engine.fail(ErrorCode::NoFreeLink);
            return None;
        };
        if self.links.slot(id).is_some_and(|s| s.is_connected()) {
            self.engine.fail(ErrorCode::LinkAlreadyConnected);
            return None;
        }

        let cmd = AtCommand::StartLink {
            link: id,
            protocol,
            host: host.to_string(),
            port,
        };
        let timeout = self.engine.config().connect_timeout();
        if self
            .engine
            .exchange(&mut self.links, &cmd, Some("OK"), true, timeout)
            .is_none()
        {
            warn!(
                "Link[{}]: open {} {}:{} failed: {}",
                id,
                protocol.as_str(),
                host,
                port,
                self.last_error()
            );
            return None;
        }

        if let Some(slot) = self.links.slot_mut(id) {
            slot.set_flags(LinkFlags::CONNECTED);
        }
        debug!("Link[{}]: opened {} {}:{}", id, protocol.as_str(), host, port);
        metrics::counter!(metric_defs::LINKS_OPENED.name, "protocol" => protocol.as_str())
            .increment(1);
        self.update_active_links();
        Some(id)
    }

    /// Close a link. Closing a link that is not connected succeeds at once.
    ///
    /// Pending data on the link is always discarded. With `abortive` the chip
    /// is asked to reset the connection instead of closing it gracefully.
    pub fn close_link(&mut self, id: u8, abortive: bool) -> bool {
        let ready = self.maintain();
        let Some(slot) = self.links.slot_mut(id) else {
            self.engine.fail(ErrorCode::LinkNotActive);
            return false;
        };
        slot.set_available(0);
        if !ready {
            return false;
        }
        if !slot.is_connected() {
            return true;
        }

        let mut flags = slot.flags();
        flags.insert(LinkFlags::CLOSING);
        slot.set_flags(flags);

        if abortive {
            let cmd = AtCommand::SetCloseMode { link: id, abortive: true };
            if !self.engine.send_command(&mut self.links, &cmd, Some("OK")) {
                debug!("Link[{}]: close mode not accepted: {}", id, self.last_error());
            }
            self.engine.clear_error();
        }

        let closed = self
            .engine
            .send_command(&mut self.links, &AtCommand::CloseLink { link: id }, Some("OK"));
        if closed {
            if let Some(slot) = self.links.slot_mut(id) {
                slot.set_flags(LinkFlags::NONE);
            }
            debug!("Link[{}]: closed (abortive={})", id, abortive);
            let mode = if abortive { "abort" } else { "graceful" };
            metrics::counter!(metric_defs::LINKS_CLOSED.name, "mode" => mode).increment(1);
            self.update_active_links();
        } else {
            warn!("Link[{}]: close failed: {}", id, self.last_error());
        }
        closed
    }

    /// Check whether a link is open, after absorbing pending notices.
    pub fn is_link_connected(&mut self, id: u8) -> bool {
        self.maintain();
        self.links.slot(id).is_some_and(|s| s.is_connected())
    }

    /// Per-link status reported by the chip.
    pub fn link_statuses(&mut self) -> Option<Vec<LinkStatus>> {
        if !self.maintain() {
            return None;
        }
        let timeout = self.engine.config().read_timeout();
        let items =
            self.engine
                .query_list(&mut self.links, &AtCommand::Status, "+CIPSTATUS", timeout)?;
        Some(
            items
                .iter()
                .filter_map(|item| match LinkStatus::parse(item) {
                    Ok(status) => Some(status),
                    Err(e) => {
                        debug!("Driver: skipping link status {:?}: {}", item, e);
                        None
                    }
                })
                .collect(),
        )
    }

    fn update_active_links(&self) {
        metrics::gauge!(metric_defs::ACTIVE_LINKS.name).set(self.links.connected_count() as f64);
    }

    // ========================================================================
    // Send
    // ========================================================================

    /// Send `data` on a link.
    ///
    /// Returns the byte count the chip acknowledged, or 0 with `SendError`
    /// latched unless both the `Recv <n> bytes` echo and `SEND OK` arrived.
    pub fn send_on_link(&mut self, id: u8, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        if !self.maintain() {
            return 0;
        }
        if !self.links.slot(id).is_some_and(|s| s.is_connected()) {
            self.engine.fail(ErrorCode::SendError);
            return 0;
        }

        match self.send_handshake(id, data) {
            Some(acked) => {
                metrics::counter!(metric_defs::BYTES_SENT.name).increment(acked as u64);
                acked
            }
            None => {
                warn!(
                    "Link[{}]: send of {} bytes failed: {}",
                    id,
                    data.len(),
                    self.last_error()
                );
                metrics::counter!(metric_defs::SEND_FAILURES.name).increment(1);
                self.engine.fail(ErrorCode::SendError);
                0
            }
        }
    }

    fn send_handshake(&mut self, id: u8, data: &[u8]) -> Option<usize> {
        let timeout = self.engine.config().read_timeout();
        let announce = AtCommand::Send {
            link: id,
            len: data.len(),
        };
        self.engine
            .exchange(&mut self.links, &announce, Some(">"), true, timeout)?;

        let written = self.engine.write_raw(data);
        if written != data.len() {
            debug!("Link[{}]: payload write accepted {}/{} bytes", id, written, data.len());
            return None;
        }

        let echo = self.engine.await_reply(&mut self.links, "Recv ", true, timeout)?;
        let acked = parse_recv_ack(&echo);
        self.engine
            .await_reply(&mut self.links, "SEND OK", true, timeout)?;
        match acked {
            Some(n) if n > 0 && n <= data.len() => Some(n),
            _ => {
                debug!("Link[{}]: send echo {:?} does not match {} bytes", id, echo, data.len());
                None
            }
        }
    }

    // ========================================================================
    // Receive
    // ========================================================================

    /// Bytes the chip holds for a link, as last announced.
    pub fn available_on_link(&mut self, id: u8) -> usize {
        self.maintain();
        self.links.slot(id).map_or(0, |s| s.available())
    }

    /// Pull up to `max` bytes from a link.
    ///
    /// A pull whose header announces zero or more than was asked for, or
    /// that delivers fewer bytes than announced, latches `ReceiveError`,
    /// returns nothing, and forgets the link's pending count.
    pub fn recv_on_link(&mut self, id: u8, max: usize) -> Vec<u8> {
        if !self.maintain() {
            return Vec::new();
        }
        let Some(slot) = self.links.slot(id) else {
            self.engine.fail(ErrorCode::LinkNotActive);
            return Vec::new();
        };
        let available = slot.available();
        if available == 0 {
            if !slot.is_connected() {
                self.engine.fail(ErrorCode::LinkNotActive);
            }
            return Vec::new();
        }
        if max == 0 {
            return Vec::new();
        }

        let want = max.min(available);
        let timeout = self.engine.config().read_timeout();
        let cmd = AtCommand::RecvData { link: id, len: want };
        let Some(header) =
            self.engine
                .exchange(&mut self.links, &cmd, Some("+CIPRECVDATA"), false, timeout)
        else {
            warn!("Link[{}]: pull of {} bytes failed: {}", id, want, self.last_error());
            return Vec::new();
        };

        let Some(len) = parse_recv_data_header(&header) else {
            warn!("Link[{}]: malformed pull header {:?}", id, header);
            return self.abandon_pull(id);
        };
        if len == 0 || len > want {
            warn!("Link[{}]: pull header announced {} bytes, asked for {}", id, len, want);
            if len > 0 {
                self.engine.read_raw(len, timeout);
            }
            return self.abandon_pull(id);
        }

        let data = self.engine.read_raw(len, timeout);
        if data.len() < len {
            warn!("Link[{}]: short read, got {}/{} bytes", id, data.len(), len);
            metrics::counter!(metric_defs::SHORT_READS.name).increment(1);
            return self.abandon_pull(id);
        }

        if let Some(slot) = self.links.slot_mut(id) {
            slot.set_available(slot.available().saturating_sub(len));
        }
        if self
            .engine
            .await_reply(&mut self.links, "OK", true, timeout)
            .is_none()
        {
            debug!("Link[{}]: pull not acknowledged: {}", id, self.last_error());
            self.engine.clear_error();
        }

        metrics::counter!(metric_defs::BYTES_RECEIVED.name).increment(len as u64);
        metrics::histogram!(metric_defs::PULL_SIZE.name).record(len as f64);
        data
    }

    fn abandon_pull(&mut self, id: u8) -> Vec<u8> {
        if let Some(slot) = self.links.slot_mut(id) {
            slot.set_available(0);
        }
        self.engine.fail(ErrorCode::ReceiveError);
        Vec::new()
    }
}
