//! Contextual response framer.
//!
//! The companion chip replies with CR-LF terminated lines most of the time,
//! but a few replies do not follow that rule:
//!
//! - `+C...` status replies that carry a raw payload (`+CIPRECVDATA,<len>:`)
//!   end at the first colon when the caller reads the payload itself.
//! - `+IPD,<link>,` data notices have a fixed-width header that is taken
//!   without scanning, followed by the length field and CR-LF.
//! - The send prompt is a single `>` followed by one padding byte and no
//!   terminator at all.
//!
//! Terminator choice is driven by [`SHAPE_TABLE`], which maps the first bytes
//! of a token to a [`FrameShape`], and by [`FrameShape::terminator`].

use bytes::{Buf, BytesMut};

/// Maximum length of a single token before it is cut and reported as is.
pub const MAX_TOKEN_LENGTH: usize = 256;

/// Command terminator expected by the chip.
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";

/// Width of the `+IPD,<link>,` header (single digit link ids).
pub const DATA_NOTICE_HEADER_LEN: usize = 7;

/// Width of the send prompt: `>` plus one padding byte.
pub const PROMPT_LEN: usize = 2;

/// Shape of a token, decided by its leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameShape {
    /// Ordinary CR-LF terminated line.
    Line,
    /// `+C...` status reply; may carry a payload after a colon.
    Status,
    /// `+IPD,...` unsolicited data notice.
    DataNotice,
    /// `>` send prompt.
    Prompt,
}

/// How the end of a token is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// Ends at `\n` (a trailing `\r` is stripped).
    Newline,
    /// Ends at the first `:` (kept in the token) or `\n`, whichever comes first.
    Colon,
    /// A fixed-width header is consumed without scanning, then the rest of
    /// the line up to `\n`.
    Header {
        /// Header width in bytes.
        width: usize,
    },
    /// Exactly `width` bytes, no terminator.
    Padded {
        /// Token width in bytes.
        width: usize,
    },
}

/// One entry of the prefix table.
#[derive(Debug, Clone, Copy)]
pub struct ShapeRule {
    /// Leading bytes that select this shape.
    pub prefix: &'static [u8],
    /// The selected shape.
    pub shape: FrameShape,
}

/// Prefix → shape table. Anything not listed is a [`FrameShape::Line`].
pub const SHAPE_TABLE: &[ShapeRule] = &[
    ShapeRule { prefix: b">", shape: FrameShape::Prompt },
    ShapeRule { prefix: b"+I", shape: FrameShape::DataNotice },
    ShapeRule { prefix: b"+C", shape: FrameShape::Status },
];

impl FrameShape {
    /// Pick the shape for the start of `buf`.
    ///
    /// Returns `None` when `buf` is a strict prefix of a table entry and more
    /// bytes are needed to decide.
    pub fn detect(buf: &[u8]) -> Option<FrameShape> {
        for rule in SHAPE_TABLE {
            let n = rule.prefix.len().min(buf.len());
            if buf[..n] != rule.prefix[..n] {
                continue;
            }
            if n < rule.prefix.len() {
                return None;
            }
            return Some(rule.shape);
        }
        Some(FrameShape::Line)
    }

    /// Terminator rule for this shape.
    ///
    /// `buffer_raw` is true when the caller wants status replies framed as
    /// whole lines; false when it reads the payload after the colon itself.
    pub fn terminator(self, buffer_raw: bool) -> Terminator {
        match self {
            FrameShape::Line => Terminator::Newline,
            FrameShape::Status if buffer_raw => Terminator::Newline,
            FrameShape::Status => Terminator::Colon,
            FrameShape::DataNotice => Terminator::Header {
                width: DATA_NOTICE_HEADER_LEN,
            },
            FrameShape::Prompt => Terminator::Padded { width: PROMPT_LEN },
        }
    }
}

/// A complete token cut from the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Shape the token was framed with.
    pub shape: FrameShape,
    /// Token text without the line terminator.
    pub text: String,
}

/// Accumulates received bytes and cuts them into [`Frame`]s.
#[derive(Debug)]
pub struct ResponseFramer {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Tokens longer than this are cut and reported unterminated.
    max_token_len: usize,
}

impl Default for ResponseFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseFramer {
    /// Create a framer with the default token limit.
    pub fn new() -> Self {
        Self::with_max_token_len(MAX_TOKEN_LENGTH)
    }

    /// Create a framer with a custom token limit.
    pub fn with_max_token_len(max_token_len: usize) -> Self {
        ResponseFramer {
            buffer: BytesMut::with_capacity(max_token_len * 2),
            max_token_len: max_token_len.max(PROMPT_LEN),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to cut the next token from the buffer.
    ///
    /// Blank CR-LF separators are discarded. Returns `None` when more data is
    /// needed.
    pub fn decode(&mut self, buffer_raw: bool) -> Option<Frame> {
        while !self.buffer.is_empty() && (self.buffer[0] == b'\r' || self.buffer[0] == b'\n') {
            self.buffer.advance(1);
        }
        if self.buffer.is_empty() {
            return None;
        }

        let shape = FrameShape::detect(&self.buffer)?;
        let frame = match shape.terminator(buffer_raw) {
            Terminator::Padded { width } => {
                if self.buffer.len() < width {
                    return None;
                }
                let token = self.buffer.split_to(width);
                Frame {
                    shape,
                    text: String::from_utf8_lossy(&token[..1]).to_string(),
                }
            }
            Terminator::Header { width } => {
                let newline = self.find(b'\n', 0);
                match newline {
                    // Shorter than the header: not a real notice, frame it as a line.
                    Some(end) if end < width => self.take_line(FrameShape::Line, end),
                    Some(end) => self.take_line(shape, end),
                    None => self.overflow()?,
                }
            }
            Terminator::Newline => match self.find(b'\n', 0) {
                Some(end) => self.take_line(shape, end),
                None => self.overflow()?,
            },
            Terminator::Colon => {
                let colon = self.find(b':', 0);
                let newline = self.find(b'\n', 0);
                match (colon, newline) {
                    (Some(c), Some(n)) if n < c => self.take_line(shape, n),
                    (Some(c), _) => {
                        let token = self.buffer.split_to(c + 1);
                        Frame {
                            shape,
                            text: String::from_utf8_lossy(&token).to_string(),
                        }
                    }
                    (None, Some(n)) => self.take_line(shape, n),
                    (None, None) => self.overflow()?,
                }
            }
        };

        log::trace!("framed {:?} token {:?}", frame.shape, frame.text);
        Some(frame)
    }

    /// Take up to `n` raw bytes that were already buffered.
    ///
    /// Used for payloads that must bypass framing; the caller reads whatever
    /// is still missing straight from the transport.
    pub fn take_raw(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.buffer.len());
        self.buffer.split_to(n).to_vec()
    }

    /// Encode a command for transmission, appending CR-LF.
    pub fn encode_command(cmd: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(cmd.len() + COMMAND_TERMINATOR.len());
        buf.extend_from_slice(cmd.as_bytes());
        buf.extend_from_slice(COMMAND_TERMINATOR);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the current buffer contents as a string (for debugging).
    pub fn buffer_as_str(&self) -> String {
        String::from_utf8_lossy(&self.buffer).to_string()
    }

    fn find(&self, byte: u8, from: usize) -> Option<usize> {
        self.buffer
            .iter()
            .skip(from)
            .position(|&b| b == byte)
            .map(|i| i + from)
    }

    /// Cut a line ending at `end` (the `\n` index) and strip the terminator.
    fn take_line(&mut self, shape: FrameShape, end: usize) -> Frame {
        let line = self.buffer.split_to(end + 1);
        let mut body = &line[..end];
        if body.last() == Some(&b'\r') {
            body = &body[..body.len() - 1];
        }
        Frame {
            shape,
            text: String::from_utf8_lossy(body).to_string(),
        }
    }

    /// Cut an unterminated token once it exceeds the limit.
    fn overflow(&mut self) -> Option<Frame> {
        if self.buffer.len() < self.max_token_len {
            return None;
        }
        log::debug!(
            "token exceeded {} bytes without terminator, cutting",
            self.max_token_len
        );
        let token = self.buffer.split_to(self.max_token_len);
        Some(Frame {
            shape: FrameShape::Line,
            text: String::from_utf8_lossy(&token).to_string(),
        })
    }
}
