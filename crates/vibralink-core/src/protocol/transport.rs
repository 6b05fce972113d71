//! Transport adapter contract
//!
//! The engine never opens or configures a physical link. It consumes a write
//! capability and a stream of link events; anything that can carry bytes to
//! the unit (serial port, TCP bridge, in-process simulator) plugs in here.

/// Write half of a link to the unit.
pub trait Transport: Send + 'static {
    /// Best-effort write of a complete command. Returns `false` when the
    /// link cannot accept the bytes; the engine treats that as fatal for the
    /// command being sent.
    fn write(&mut self, bytes: &[u8]) -> bool;
}

/// Read-half events fed to the engine by the transport glue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link is up; liveness probing starts.
    Opened,
    /// The link dropped; any outstanding command resolves with `LinkClosed`.
    Closed,
    /// Inbound bytes, chunked however the transport delivered them.
    Data(Vec<u8>),
}
