//! Protocol errors

use thiserror::Error;

/// Errors that can occur during protocol communication
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Another command is already in flight")]
    Busy,

    #[error("Transport write failed")]
    Transport,

    #[error("Acknowledgement timeout")]
    Timeout,

    #[error("Command failed: all retry attempts timed out")]
    ExhaustedRetries,

    #[error("Link closed")]
    LinkClosed,

    #[error("Invalid response from unit: {0}")]
    InvalidResponse(String),

    #[error("Protocol engine is not running")]
    EngineGone,
}
