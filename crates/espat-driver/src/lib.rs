//! Driver for ESP AT companion WiFi chips.
//!
//! The driver speaks the AT command protocol over a byte [`Transport`] with
//! multiplexed links and passive receive: the chip announces buffered data
//! with `+IPD` notices and the host pulls it with `AT+CIPRECVDATA`.
//!
//! All state lives in one [`EspAtDriver`] value. Operations return plain
//! success values and latch an [`ErrorCode`] readable through
//! [`EspAtDriver::last_error`].
//!
//! # Example
//!
//! ```rust
//! use espat_driver::{Client, DriverConfig, EspAtDriver, ResetKind, ScriptedTransport};
//!
//! let transport = ScriptedTransport::new()
//!     .with_init()
//!     .on_command("AT+CIPSTART=4,\"TCP\",\"example.com\",80", "4,CONNECT\r\n\r\nOK\r\n");
//! let mut driver = EspAtDriver::new(transport, DriverConfig::default()).unwrap();
//! assert!(driver.init(ResetKind::None));
//!
//! let mut client = Client::new();
//! assert!(client.connect(&mut driver, "example.com", 80));
//! assert_eq!(client.link_id(), Some(4));
//! ```

mod client;
mod config;
mod data;
mod driver;
mod engine;
mod error;
mod links;
mod notify;
mod station;
#[cfg(any(test, feature = "testing"))]
mod testing;
mod transport;
mod wifi;

pub use client::Client;
pub use config::{AllocationOrder, DriverConfig, Quirks, MAX_LINK_CAPACITY};
pub use driver::{EspAtDriver, ResetKind};
pub use engine::{CommandEngine, ProtocolToken, TerminalError};
pub use error::{DriverError, DriverResult, ErrorCode};
pub use links::{LinkFlags, LinkSlot, LinkTable};
pub use station::StationState;
#[cfg(any(test, feature = "testing"))]
pub use testing::{ScriptedTransport, INIT_COMMANDS};
pub use transport::Transport;

pub use espat_protocol::{ApEncryption, ApInfo, LinkProtocol, LinkStatus, NetworkInfo, StationEntry};
