//! A scripted in-memory transport for tests.
//!
//! [`ScriptedTransport`] plays the chip's side of a conversation: each rule
//! pairs an exact write with the bytes the chip sends back, and free-standing
//! bytes can be queued to model unsolicited notices. Reads never sleep, so a
//! silent chip is observed as a run of empty reads.

use std::collections::VecDeque;
use std::time::Duration;

use crate::transport::Transport;

/// Commands `init` sends after the optional reset, in order.
pub const INIT_COMMANDS: &[&str] = &["ATE0", "AT+CIPMUX=1", "AT+CIPRECVMODE=1", "AT+CWMODE=1"];

#[derive(Debug, Clone)]
struct Rule {
    expect: Vec<u8>,
    reply: Vec<u8>,
}

/// In-memory transport driven by a script of expected writes.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    rules: Vec<Rule>,
    rx: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    chunk_size: Option<usize>,
    reads: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply to the command line `command` (written with its CR-LF).
    ///
    /// Rules are consumed once, in order of registration among equal commands.
    pub fn on_command(mut self, command: &str, reply: &str) -> Self {
        self.add_command(command, reply);
        self
    }

    /// Reply to an exact raw write, such as a send payload.
    pub fn on_write(mut self, data: &[u8], reply: &[u8]) -> Self {
        self.rules.push(Rule {
            expect: data.to_vec(),
            reply: reply.to_vec(),
        });
        self
    }

    /// Answer the configuration commands `init` sends with `OK`.
    pub fn with_init(self) -> Self {
        INIT_COMMANDS
            .iter()
            .fold(self, |t, cmd| t.on_command(cmd, "\r\nOK\r\n"))
    }

    /// Queue bytes the chip sends on its own.
    pub fn with_unsolicited(mut self, data: &str) -> Self {
        self.push_rx(data.as_bytes());
        self
    }

    /// Deliver at most `n` bytes per read.
    pub fn with_chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n.max(1));
        self
    }

    pub fn add_command(&mut self, command: &str, reply: &str) {
        let mut expect = command.as_bytes().to_vec();
        expect.extend_from_slice(b"\r\n");
        self.rules.push(Rule {
            expect,
            reply: reply.as_bytes().to_vec(),
        });
    }

    pub fn push_rx(&mut self, data: &[u8]) {
        self.rx.extend(data.iter().copied());
    }

    /// Every write, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Every write as text with the trailing CR-LF removed.
    pub fn written_commands(&self) -> Vec<String> {
        self.writes
            .iter()
            .map(|w| {
                let text = String::from_utf8_lossy(w);
                text.strip_suffix("\r\n").unwrap_or(&text).to_string()
            })
            .collect()
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Number of rules that were never triggered.
    pub fn unused_rules(&self) -> usize {
        self.rules.len()
    }

    /// Bytes still queued for reading.
    pub fn unread(&self) -> usize {
        self.rx.len()
    }

    /// Number of read calls made so far.
    pub fn read_calls(&self) -> usize {
        self.reads
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, data: &[u8]) -> usize {
        self.writes.push(data.to_vec());
        if let Some(pos) = self.rules.iter().position(|r| r.expect == data) {
            let rule = self.rules.remove(pos);
            self.rx.extend(rule.reply);
        }
        data.len()
    }

    fn pending(&mut self) -> usize {
        self.rx.len()
    }

    fn read(&mut self, max: usize, _timeout: Duration) -> Vec<u8> {
        self.reads += 1;
        let mut n = max.min(self.rx.len());
        if let Some(chunk) = self.chunk_size {
            n = n.min(chunk);
        }
        self.rx.drain(..n).collect()
    }
}
