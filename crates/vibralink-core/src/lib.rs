//! # VibraLink Core Library
//!
//! Core functionality for the VibraLink datalogger companion.
//!
//! This library provides:
//! - Serial protocol communication with VL-series measurement units
//! - Bulk measurement download orchestration
//! - A simulated unit for offline/demo use
//!
//! ## Example
//!
//! ```rust,ignore
//! use vibralink_core::prelude::*;
//!
//! // Open the port and start the protocol engine
//! let link = SerialLink::open("/dev/ttyUSB0", 115200)?;
//! let (comm, _events) = Communicator::spawn(
//!     link.transport,
//!     link.events,
//!     ProtocolConfig::default(),
//! );
//!
//! // Pull the ten most recent PSD packets for the X accelerometer
//! let request = DownloadRequest {
//!     selection: Selection::Recent { start_id: 0, end_id: 9 },
//!     sensor: SensorChannel::AccX,
//!     kind: DataKind::Psd,
//! };
//! let received = download::run(&comm, &request, |chunk| {
//!     println!("packet {} ({} / {} bytes)", chunk.packet_id, chunk.received, chunk.total);
//!     std::ops::ControlFlow::Continue(())
//! }).await?;
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod demo;
pub mod download;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::DemoDevice;
    pub use crate::download::{self, DownloadChunk, DownloadError, DownloadRequest, Selection};
    pub use crate::protocol::{
        Command, Communicator, DataKind, DeviceEvent, LinkEvent, ProtocolConfig, ProtocolError,
        Response, SensorChannel, SerialLink, Transport,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
