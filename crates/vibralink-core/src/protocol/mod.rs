//! Serial Protocol Communication
//!
//! Implements the VL-series command/response protocol: ASCII CR-terminated
//! commands with text-line acknowledgements, interleaved with CRC-checked
//! binary frames for bulk measurement data.

pub mod checksum;
pub mod commands;
mod engine;
mod error;
pub mod frame;
mod keepalive;
pub mod serial;
mod transport;

pub use commands::{AckWait, Command, DataKind, SensorChannel};
pub use engine::{Communicator, DeviceEvent, ProtocolConfig, Response};
pub use error::ProtocolError;
pub use frame::{encode_frame, FrameEvent, FrameParser, ParseMode};
pub use serial::{list_ports, open_port, PortInfo, SerialLink, SerialTransport};
pub use transport::{LinkEvent, Transport};

/// Unit address prefix carried by every command
pub const COMMAND_PREFIX: &str = "!123:";

/// Command/response line terminator; the link never uses a line feed
pub const LINE_TERMINATOR: u8 = b'\r';

/// Binary frame magic pattern
pub const MAGIC_PATTERN: u32 = 0xFEDC_BA98;

/// Write attempts per command before giving up
pub const DEFAULT_RETRY_LIMIT: u8 = 3;

/// Default acknowledgement wait for parameter-setting commands, milliseconds
pub const DEFAULT_ACK_SHORT_MS: u64 = 2000;

/// Default acknowledgement wait for query commands, milliseconds
pub const DEFAULT_ACK_LONG_MS: u64 = 5000;

/// Default idle period before a liveness probe, milliseconds
pub const DEFAULT_KEEP_ALIVE_MS: u64 = 2000;
