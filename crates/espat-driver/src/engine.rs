//! The command engine.
//!
//! Exactly one command is in flight at a time. While the engine waits for a
//! reply it also applies unsolicited link notices to the [`LinkTable`], so
//! there is no background reader and nothing else mutates the table.
//!
//! Every wait is bounded twice: by a garbage budget (tokens that match
//! nothing) and by a silence budget (consecutive reads that return no bytes).
//! Exceeding either latches [`ErrorCode::NotResponding`].

use std::time::Duration;

use espat_metrics::metric_defs;
use espat_protocol::{AtCommand, Frame, Notice, Reply, ResponseFramer};
use tracing::{debug, trace, warn};

use crate::config::DriverConfig;
use crate::error::ErrorCode;
use crate::links::LinkTable;
use crate::transport::Transport;

// ============================================================================
// Tokens
// ============================================================================

/// Why a wait ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalError {
    /// `No AP`
    NoAccessPoint,
    /// `ERROR`
    Protocol,
    /// `FAIL` or `SEND FAIL`
    Fail,
}

impl TerminalError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            TerminalError::NoAccessPoint => ErrorCode::NoAccessPoint,
            TerminalError::Protocol | TerminalError::Fail => ErrorCode::ProtocolError,
        }
    }
}

/// Classification of one framed token relative to the current wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolToken {
    /// The token the wait was looking for.
    MatchedExpected(String),
    /// A link notice, already applied to the link table.
    UnsolicitedHandled(Notice),
    /// A reply that ends the wait with a failure.
    ErrorTerminal(TerminalError),
    /// The `OK` that closes a list reply.
    ListEnd,
    /// Anything else.
    Garbage(String),
}

/// Bookkeeping for a single wait.
#[derive(Debug, Default)]
struct WaitState {
    garbage: u32,
    unlink_seen: bool,
}

// ============================================================================
// Engine
// ============================================================================

/// Serializes commands over a [`Transport`] and interprets the replies.
#[derive(Debug)]
pub struct CommandEngine<T: Transport> {
    transport: T,
    framer: ResponseFramer,
    config: DriverConfig,
    last_error: ErrorCode,
}

impl<T: Transport> CommandEngine<T> {
    pub fn new(transport: T, config: DriverConfig) -> Self {
        Self {
            transport,
            framer: ResponseFramer::with_max_token_len(config.max_token_len),
            config,
            last_error: ErrorCode::NoError,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// The latched error of the last failing call.
    pub fn last_error(&self) -> ErrorCode {
        self.last_error
    }

    pub fn clear_error(&mut self) {
        self.last_error = ErrorCode::NoError;
    }

    /// Latch `code`, replacing whatever was latched before.
    pub fn fail(&mut self, code: ErrorCode) {
        if code != ErrorCode::NoError {
            metrics::counter!(metric_defs::COMMAND_FAILURES.name, "error" => code.as_str())
                .increment(1);
        }
        self.last_error = code;
    }

    /// Check whether unread bytes are waiting in the transport or the framer.
    pub fn has_pending(&mut self) -> bool {
        self.framer.buffered_len() > 0 || self.transport.pending() > 0
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Send a command and wait for a reply starting with `expected`.
    ///
    /// With `expected` empty or `None` the engine only drains unsolicited
    /// notices until the channel goes quiet for one poll interval.
    pub fn send_command(
        &mut self,
        links: &mut LinkTable,
        cmd: &AtCommand,
        expected: Option<&str>,
    ) -> bool {
        let timeout = self.config.read_timeout();
        self.exchange(links, cmd, expected, true, timeout).is_some()
    }

    /// Like [`send_command`](Self::send_command), returning the matched token.
    ///
    /// `buffer_raw` is false only for commands whose reply header is followed
    /// by raw payload; status-class tokens then end at the first colon.
    pub fn exchange(
        &mut self,
        links: &mut LinkTable,
        cmd: &AtCommand,
        expected: Option<&str>,
        buffer_raw: bool,
        timeout: Duration,
    ) -> Option<String> {
        if !self.write_command(cmd) {
            return None;
        }
        match expected {
            Some(prefix) if !prefix.is_empty() => {
                self.await_reply(links, prefix, buffer_raw, timeout)
            }
            _ => self.drain(links).then(String::new),
        }
    }

    /// Send a query, returning its value line once the trailing `OK` arrives.
    pub fn query(
        &mut self,
        links: &mut LinkTable,
        cmd: &AtCommand,
        expected: &str,
        timeout: Duration,
    ) -> Option<String> {
        let text = self.exchange(links, cmd, Some(expected), true, timeout)?;
        if Reply::classify(&text) != Reply::Ok {
            self.await_reply(links, "OK", true, timeout)?;
        }
        Some(text)
    }

    /// Send a command whose reply is a list of items closed by `OK`.
    ///
    /// With an empty `item_prefix`, every unrecognized line is an item.
    pub fn query_list(
        &mut self,
        links: &mut LinkTable,
        cmd: &AtCommand,
        item_prefix: &str,
        timeout: Duration,
    ) -> Option<Vec<String>> {
        if !self.write_command(cmd) {
            return None;
        }
        let mut wait = WaitState::default();
        let mut items = Vec::new();
        loop {
            match self.read_token(links, &mut wait, item_prefix, true, true, timeout) {
                Ok(ProtocolToken::MatchedExpected(text)) => items.push(text),
                Ok(ProtocolToken::ListEnd) => {
                    trace!("Engine: list ended with {} items", items.len());
                    return Some(items);
                }
                Ok(ProtocolToken::ErrorTerminal(err)) => {
                    self.fail(err.error_code());
                    return None;
                }
                Ok(_) => {}
                Err(code) => {
                    self.fail(code);
                    return None;
                }
            }
        }
    }

    /// Wait for a token starting with `expected` without writing anything.
    pub fn await_reply(
        &mut self,
        links: &mut LinkTable,
        expected: &str,
        buffer_raw: bool,
        timeout: Duration,
    ) -> Option<String> {
        let mut wait = WaitState::default();
        loop {
            match self.read_token(links, &mut wait, expected, false, buffer_raw, timeout) {
                Ok(ProtocolToken::MatchedExpected(text)) => return Some(text),
                Ok(ProtocolToken::ErrorTerminal(err)) => {
                    debug!("Engine: waiting for '{}' failed: {:?}", expected, err);
                    self.fail(err.error_code());
                    return None;
                }
                Ok(_) => {}
                Err(code) => {
                    self.fail(code);
                    return None;
                }
            }
        }
    }

    /// Read unsolicited tokens until the channel is quiet for one poll interval.
    pub fn drain(&mut self, links: &mut LinkTable) -> bool {
        let mut wait = WaitState::default();
        loop {
            while let Some(frame) = self.framer.decode(true) {
                match self.classify(links, &mut wait, &frame.text, "", false) {
                    Some(ProtocolToken::UnsolicitedHandled(notice)) => {
                        metrics::counter!(metric_defs::NOTICES.name, "kind" => notice.kind())
                            .increment(1);
                    }
                    Some(token) => {
                        trace!("Engine: drained stray {:?}", token);
                        if self.count_garbage(&mut wait) {
                            self.fail(ErrorCode::NotResponding);
                            return false;
                        }
                    }
                    None => {}
                }
            }
            let want = self.transport.pending().max(1);
            let chunk = self.transport.read(want, self.config.poll_interval());
            if chunk.is_empty() {
                return true;
            }
            self.framer.push(&chunk);
        }
    }

    // ------------------------------------------------------------------------
    // Raw data
    // ------------------------------------------------------------------------

    /// Write bytes straight to the transport, bypassing line framing.
    pub fn write_raw(&mut self, data: &[u8]) -> usize {
        trace!("Engine: -> {} raw bytes", data.len());
        self.transport.write(data)
    }

    /// Read exactly `n` raw bytes, or fewer if the silence budget runs out.
    ///
    /// Bytes the framer already buffered are consumed first.
    pub fn read_raw(&mut self, n: usize, timeout: Duration) -> Vec<u8> {
        let mut data = self.framer.take_raw(n);
        let mut silent = 0;
        while data.len() < n {
            let chunk = self.transport.read(n - data.len(), timeout);
            if chunk.is_empty() {
                silent += 1;
                if silent > self.config.silence_retries {
                    break;
                }
                continue;
            }
            silent = 0;
            data.extend_from_slice(&chunk);
        }
        trace!("Engine: <- {}/{} raw bytes", data.len(), n);
        data
    }

    // ------------------------------------------------------------------------
    // Reader loop
    // ------------------------------------------------------------------------

    fn write_command(&mut self, cmd: &AtCommand) -> bool {
        let frame = match cmd.encode_checked() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Engine: refusing to send command: {}", e);
                self.fail(ErrorCode::ProtocolError);
                return false;
            }
        };

        trace!(
            "Engine: sending '{}' ({} bytes)",
            cmd.to_command_string(),
            frame.len()
        );
        metrics::counter!(metric_defs::COMMANDS_SENT.name).increment(1);

        let written = self.transport.write(&frame);
        if written != frame.len() {
            warn!("Engine: short write ({}/{} bytes)", written, frame.len());
            self.fail(ErrorCode::NotResponding);
            return false;
        }
        true
    }

    /// Read and classify one token, enforcing the garbage budget.
    fn read_token(
        &mut self,
        links: &mut LinkTable,
        wait: &mut WaitState,
        expected: &str,
        list_mode: bool,
        buffer_raw: bool,
        timeout: Duration,
    ) -> Result<ProtocolToken, ErrorCode> {
        loop {
            let frame = self.next_frame(buffer_raw, timeout)?;
            let Some(token) = self.classify(links, wait, &frame.text, expected, list_mode) else {
                continue;
            };

            match &token {
                ProtocolToken::UnsolicitedHandled(notice) => {
                    metrics::counter!(metric_defs::NOTICES.name, "kind" => notice.kind())
                        .increment(1);
                }
                ProtocolToken::Garbage(text) => {
                    trace!("Engine: garbage token {:?}", text);
                    if self.count_garbage(wait) {
                        warn!(
                            "Engine: gave up waiting for '{}' after {} unrecognized tokens",
                            expected, wait.garbage
                        );
                        return Err(ErrorCode::NotResponding);
                    }
                }
                _ => {}
            }
            return Ok(token);
        }
    }

    /// Count one garbage token; true once the budget is exceeded.
    fn count_garbage(&self, wait: &mut WaitState) -> bool {
        wait.garbage += 1;
        metrics::counter!(metric_defs::GARBAGE_TOKENS.name).increment(1);
        wait.garbage > self.config.garbage_budget
    }

    /// Classify a token. `None` means a marker that only updates the wait.
    fn classify(
        &self,
        links: &mut LinkTable,
        wait: &mut WaitState,
        text: &str,
        expected: &str,
        list_mode: bool,
    ) -> Option<ProtocolToken> {
        let reply = Reply::classify(text);

        if let Reply::Notice(notice) = reply {
            if links.apply_notice(notice) {
                return Some(ProtocolToken::UnsolicitedHandled(notice));
            }
            return Some(ProtocolToken::Garbage(text.to_string()));
        }
        if list_mode && reply == Reply::Ok {
            return Some(ProtocolToken::ListEnd);
        }

        let matched = if expected.is_empty() {
            list_mode && reply == Reply::Other
        } else {
            text.starts_with(expected)
        };
        if matched {
            return Some(ProtocolToken::MatchedExpected(text.to_string()));
        }

        let token = match reply {
            Reply::Unlink => {
                trace!("Engine: UNLINK marker");
                wait.unlink_seen = true;
                return None;
            }
            Reply::Error if wait.unlink_seen && self.config.quirks.forgive_error_after_unlink => {
                warn!("Engine: ignoring ERROR that followed UNLINK");
                ProtocolToken::MatchedExpected(text.to_string())
            }
            Reply::Error => ProtocolToken::ErrorTerminal(TerminalError::Protocol),
            Reply::Fail | Reply::SendFail => ProtocolToken::ErrorTerminal(TerminalError::Fail),
            Reply::NoAp => ProtocolToken::ErrorTerminal(TerminalError::NoAccessPoint),
            _ => ProtocolToken::Garbage(text.to_string()),
        };
        Some(token)
    }

    /// Cut the next frame, reading from the transport as needed.
    fn next_frame(&mut self, buffer_raw: bool, timeout: Duration) -> Result<Frame, ErrorCode> {
        let mut silent = 0u32;
        loop {
            if let Some(frame) = self.framer.decode(buffer_raw) {
                trace!("Engine: received {:?}", frame.text);
                return Ok(frame);
            }

            let want = self.transport.pending().max(1);
            let chunk = self.transport.read(want, timeout);
            if !chunk.is_empty() {
                silent = 0;
                self.framer.push(&chunk);
                continue;
            }

            silent += 1;
            metrics::counter!(metric_defs::SILENCE_RETRIES.name).increment(1);
            if silent > self.config.silence_retries {
                warn!("Engine: no reply after {} silent reads", silent);
                return Err(ErrorCode::NotResponding);
            }
            let pending = self.transport.pending();
            debug!(
                "Engine: read timed out ({}/{}), {} bytes pending",
                silent, self.config.silence_retries, pending
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Quirks;
    use crate::testing::ScriptedTransport;

    fn engine(transport: ScriptedTransport) -> (CommandEngine<ScriptedTransport>, LinkTable) {
        let config = DriverConfig::default();
        let links = LinkTable::new(config.link_capacity);
        (CommandEngine::new(transport, config), links)
    }

    #[test]
    fn test_send_command_ok() {
        let (mut engine, mut links) = engine(ScriptedTransport::new().on_command("AT", "\r\nOK\r\n"));
        assert!(engine.send_command(&mut links, &AtCommand::Test, Some("OK")));
        assert_eq!(engine.last_error(), ErrorCode::NoError);
    }

    #[test]
    fn test_error_is_protocol_error() {
        let (mut engine, mut links) =
            engine(ScriptedTransport::new().on_command("AT+CWQAP", "\r\nERROR\r\n"));
        assert!(!engine.send_command(&mut links, &AtCommand::QuitAp, Some("OK")));
        assert_eq!(engine.last_error(), ErrorCode::ProtocolError);
    }

    #[test]
    fn test_no_ap() {
        let (mut engine, mut links) =
            engine(ScriptedTransport::new().on_command("AT+CWJAP_CUR?", "No AP\r\n\r\nOK\r\n"));
        let reply = engine.query(&mut links, &AtCommand::QueryAp, "+CWJAP_CUR", Duration::ZERO);
        assert!(reply.is_none());
        assert_eq!(engine.last_error(), ErrorCode::NoAccessPoint);
    }

    #[test]
    fn test_unlink_then_error_succeeds() {
        let cmd = AtCommand::CloseLink { link: 0 };
        let (mut engine, mut links) = engine(
            ScriptedTransport::new().on_command("AT+CIPCLOSE=0", "UNLINK\r\n\r\nERROR\r\n"),
        );
        assert!(engine.send_command(&mut links, &cmd, Some("OK")));
    }

    #[test]
    fn test_unlink_forgiveness_can_be_disabled() {
        let config = DriverConfig {
            quirks: Quirks {
                forgive_error_after_unlink: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let transport =
            ScriptedTransport::new().on_command("AT+CIPCLOSE=0", "UNLINK\r\n\r\nERROR\r\n");
        let mut links = LinkTable::new(config.link_capacity);
        let mut engine = CommandEngine::new(transport, config);

        let cmd = AtCommand::CloseLink { link: 0 };
        assert!(!engine.send_command(&mut links, &cmd, Some("OK")));
        assert_eq!(engine.last_error(), ErrorCode::ProtocolError);
    }

    #[test]
    fn test_garbage_budget_exhausted() {
        let config = DriverConfig {
            garbage_budget: 3,
            ..Default::default()
        };
        let transport = ScriptedTransport::new().on_command("AT", "a\r\nb\r\nc\r\nd\r\nOK\r\n");
        let mut links = LinkTable::new(config.link_capacity);
        let mut engine = CommandEngine::new(transport, config);

        assert!(!engine.send_command(&mut links, &AtCommand::Test, Some("OK")));
        assert_eq!(engine.last_error(), ErrorCode::NotResponding);
    }

    #[test]
    fn test_garbage_within_budget() {
        let config = DriverConfig {
            garbage_budget: 3,
            ..Default::default()
        };
        let transport = ScriptedTransport::new().on_command("AT", "a\r\nb\r\nc\r\nOK\r\n");
        let mut links = LinkTable::new(config.link_capacity);
        let mut engine = CommandEngine::new(transport, config);

        assert!(engine.send_command(&mut links, &AtCommand::Test, Some("OK")));
    }

    #[test]
    fn test_silence_gives_up() {
        let (mut engine, mut links) = engine(ScriptedTransport::new());
        assert!(!engine.send_command(&mut links, &AtCommand::Test, Some("OK")));
        assert_eq!(engine.last_error(), ErrorCode::NotResponding);
        // One initial read plus one per retry.
        assert_eq!(engine.transport().read_calls(), 4);
    }

    #[test]
    fn test_notices_absorbed_while_waiting() {
        let (mut engine, mut links) = engine(
            ScriptedTransport::new().on_command("AT", "+IPD,1,20\r\n3,CONNECT\r\nOK\r\n"),
        );
        assert!(engine.send_command(&mut links, &AtCommand::Test, Some("OK")));
        assert_eq!(links.slot(1).unwrap().available(), 20);
        assert!(links.slot(3).unwrap().is_connected());
    }

    #[test]
    fn test_out_of_range_notice_is_garbage() {
        let config = DriverConfig {
            garbage_budget: 1,
            ..Default::default()
        };
        let transport =
            ScriptedTransport::new().on_command("AT", "+IPD,7,5\r\n8,CONNECT\r\nOK\r\n");
        let mut links = LinkTable::new(config.link_capacity);
        let mut engine = CommandEngine::new(transport, config);

        assert!(!engine.send_command(&mut links, &AtCommand::Test, Some("OK")));
        assert_eq!(engine.last_error(), ErrorCode::NotResponding);
    }

    #[test]
    fn test_query_list() {
        let (mut engine, mut links) = engine(ScriptedTransport::new().on_command(
            "AT+CIPDNS_CUR?",
            "+CIPDNS_CUR:8.8.8.8\r\n+CIPDNS_CUR:1.1.1.1\r\n\r\nOK\r\n",
        ));
        let items = engine
            .query_list(&mut links, &AtCommand::QueryDns, "+CIPDNS_CUR", Duration::ZERO)
            .unwrap();
        assert_eq!(items, vec!["+CIPDNS_CUR:8.8.8.8", "+CIPDNS_CUR:1.1.1.1"]);
    }

    #[test]
    fn test_drain_without_expected_reply() {
        let (mut engine, mut links) = engine(
            ScriptedTransport::new().on_command("AT+SLEEP=0", "+IPD,0,9\r\nOK\r\n"),
        );
        let cmd = AtCommand::Sleep { mode: 0 };
        assert!(engine.send_command(&mut links, &cmd, None));
        assert_eq!(links.slot(0).unwrap().available(), 9);
        assert!(!engine.has_pending());
    }

    #[test]
    fn test_invalid_command_not_written() {
        let (mut engine, mut links) = engine(ScriptedTransport::new());
        let cmd = AtCommand::Raw {
            command: "AT\r\nAT+RST".to_string(),
        };
        assert!(!engine.send_command(&mut links, &cmd, Some("OK")));
        assert_eq!(engine.last_error(), ErrorCode::ProtocolError);
        assert!(engine.transport().writes().is_empty());
    }

    #[test]
    fn test_read_raw_uses_buffered_bytes_first() {
        let (mut engine, mut links) = engine(
            ScriptedTransport::new().on_command("AT+CIPRECVDATA=0,5", "+CIPRECVDATA,5:hel"),
        );
        let cmd = AtCommand::RecvData { link: 0, len: 5 };
        let header = engine
            .exchange(&mut links, &cmd, Some("+CIPRECVDATA"), false, Duration::ZERO)
            .unwrap();
        assert_eq!(header, "+CIPRECVDATA,5:");

        engine.transport_mut().push_rx(b"lo\r\nOK\r\n");
        assert_eq!(engine.read_raw(5, Duration::ZERO), b"hello");
    }
}
