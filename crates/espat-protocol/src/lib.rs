//! ESP AT Command Protocol
//!
//! This crate provides types and utilities for talking to an ESP8266/ESP8285
//! companion radio over its textual AT command interface. It has no I/O and no
//! notion of time: callers push received bytes into a [`ResponseFramer`] and
//! classify the tokens it cuts.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → chip): ASCII text terminated with CR-LF
//! - **Replies** (chip → host): mostly CR-LF lines ending in `OK`, `ERROR`,
//!   `FAIL`, or `No AP`
//! - **Notices** (chip → host, unsolicited): `+IPD,<link>,<len>`,
//!   `<link>,CONNECT`, `<link>,CLOSED`, `<link>,CONNECT FAIL`
//! - **Flow control**: `>` plus one padding byte invites a raw payload;
//!   `+CIPRECVDATA,<len>:` precedes exactly `<len>` raw bytes
//!
//! # Example
//!
//! ```rust
//! use espat_protocol::{AtCommand, Reply, ResponseFramer};
//!
//! let bytes = AtCommand::Status.encode();
//! assert_eq!(bytes, b"AT+CIPSTATUS\r\n");
//!
//! let mut framer = ResponseFramer::new();
//! framer.push(b"STATUS:2\r\nOK\r\n");
//! let first = framer.decode(true).unwrap();
//! assert_eq!(first.text, "STATUS:2");
//! let second = framer.decode(true).unwrap();
//! assert_eq!(Reply::classify(&second.text), Reply::Ok);
//! ```

mod codec;
mod commands;
mod error;
mod responses;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use responses::*;
