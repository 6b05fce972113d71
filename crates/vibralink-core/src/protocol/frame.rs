//! Inbound stream framing
//!
//! Converts the raw byte stream from a VL unit into discrete events: text
//! lines and CRC-validated binary frames.
//!
//! Binary frame wire format:
//! - 4 bytes: magic pattern (0xFEDCBA98, matched as a rolling window)
//! - 2 bytes: CRC-16/MODBUS of the payload (little-endian)
//! - 2 bytes: payload length (little-endian)
//! - N bytes: payload
//! - trailing text line terminated by `\r` (the frame's acknowledgement)
//!
//! The magic pattern is searched byte by byte, so the parser locks onto a
//! frame regardless of how much line noise precedes it. A parser is built
//! fresh for every command attempt; stale state cannot leak between attempts.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::checksum::crc16;
use super::{LINE_TERMINATOR, MAGIC_PATTERN};

/// Starting parse mode for a command's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    /// Response is a plain `\r`-terminated text line.
    TextLine,
    /// Response is a binary frame followed by a terminating text line.
    BinaryFrame,
}

/// Event emitted by the parser after consuming a byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A checksum-valid binary frame payload.
    Frame(Vec<u8>),
    /// A completed text line (may be empty; caller decides whether it counts).
    Line(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    WaitMagic,
    WaitCrcLow,
    WaitCrcHigh,
    WaitLengthLow,
    WaitLengthHigh,
    WaitPayload,
    WaitLine,
}

/// Byte-at-a-time parser for one command/response exchange.
#[derive(Debug)]
pub struct FrameParser {
    state: RxState,
    magic: u32,
    eol: u8,
    /// Rolling 4-byte window for magic detection.
    window: u32,
    header_crc: u16,
    length: u16,
    payload: Vec<u8>,
    line: Vec<u8>,
}

impl FrameParser {
    /// Create a parser starting in `mode` with the default magic pattern and
    /// line terminator.
    pub fn new(mode: ParseMode) -> Self {
        Self::with_framing(mode, MAGIC_PATTERN, LINE_TERMINATOR)
    }

    /// Create a parser with an explicit magic pattern and line terminator.
    pub fn with_framing(mode: ParseMode, magic: u32, eol: u8) -> Self {
        let state = match mode {
            ParseMode::TextLine => RxState::WaitLine,
            ParseMode::BinaryFrame => RxState::WaitMagic,
        };
        Self {
            state,
            magic,
            eol,
            window: 0,
            header_crc: 0,
            length: 0,
            payload: Vec::new(),
            line: Vec::new(),
        }
    }

    /// Consume one byte; returns an event if the byte completed a frame or
    /// a line.
    pub fn push(&mut self, byte: u8) -> Option<FrameEvent> {
        match self.state {
            RxState::WaitMagic => {
                // Newest byte enters as the most significant window byte
                self.window = (self.window >> 8) | (u32::from(byte) << 24);
                if self.window == self.magic {
                    tracing::debug!("magic pattern found");
                    self.state = RxState::WaitCrcLow;
                }
                None
            }
            RxState::WaitCrcLow => {
                self.header_crc = u16::from(byte);
                self.state = RxState::WaitCrcHigh;
                None
            }
            RxState::WaitCrcHigh => {
                self.header_crc |= u16::from(byte) << 8;
                self.state = RxState::WaitLengthLow;
                None
            }
            RxState::WaitLengthLow => {
                self.length = u16::from(byte);
                self.state = RxState::WaitLengthHigh;
                None
            }
            RxState::WaitLengthHigh => {
                self.length |= u16::from(byte) << 8;
                tracing::debug!(length = self.length, "waiting for frame payload");
                self.payload.clear();
                if self.length == 0 {
                    // Nothing to accumulate; validate the empty payload now
                    self.state = RxState::WaitLine;
                    return self.finish_frame();
                }
                self.payload.reserve(usize::from(self.length));
                self.state = RxState::WaitPayload;
                None
            }
            RxState::WaitPayload => {
                self.payload.push(byte);
                if self.payload.len() >= usize::from(self.length) {
                    self.state = RxState::WaitLine;
                    return self.finish_frame();
                }
                None
            }
            RxState::WaitLine => {
                if byte == self.eol {
                    let text = String::from_utf8_lossy(&self.line).into_owned();
                    self.line.clear();
                    Some(FrameEvent::Line(text))
                } else {
                    self.line.push(byte);
                    None
                }
            }
        }
    }

    /// Validate the accumulated payload against the header CRC. A mismatch
    /// drops the frame without an event; the trailing line is consumed either
    /// way and the next command attempt re-arms the magic search.
    fn finish_frame(&mut self) -> Option<FrameEvent> {
        let computed = crc16(&self.payload);
        if computed == self.header_crc {
            tracing::debug!(length = self.length, "received frame payload");
            Some(FrameEvent::Frame(std::mem::take(&mut self.payload)))
        } else {
            tracing::debug!(
                expected = self.header_crc,
                computed,
                "frame checksum mismatch, dropping payload"
            );
            self.payload.clear();
            None
        }
    }
}

/// Encode a binary frame the way a VL unit transmits it: magic, payload CRC,
/// payload length (both little-endian), then the payload. The trailing
/// acknowledgement line is the device's to send and is not included.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + payload.len());

    let mut header = [0u8; 8];
    LittleEndian::write_u32(&mut header[0..4], MAGIC_PATTERN);
    LittleEndian::write_u16(&mut header[4..6], crc16(payload));
    LittleEndian::write_u16(&mut header[6..8], payload.len() as u16);

    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(payload);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn feed(parser: &mut FrameParser, bytes: &[u8]) -> Vec<FrameEvent> {
        bytes.iter().filter_map(|&b| parser.push(b)).collect()
    }

    #[test]
    fn test_text_line_mode() {
        let mut parser = FrameParser::new(ParseMode::TextLine);
        let events = feed(&mut parser, b"1024\r");
        assert_eq!(events, vec![FrameEvent::Line("1024".to_string())]);
    }

    #[test]
    fn test_empty_line_still_emits() {
        let mut parser = FrameParser::new(ParseMode::TextLine);
        let events = feed(&mut parser, b"\r");
        assert_eq!(events, vec![FrameEvent::Line(String::new())]);
    }

    #[test]
    fn test_frame_roundtrip_byte_by_byte() {
        let payload = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x42];
        let mut wire = encode_frame(&payload);
        wire.extend_from_slice(b"7\r");

        let mut parser = FrameParser::new(ParseMode::BinaryFrame);
        let events = feed(&mut parser, &wire);

        assert_eq!(
            events,
            vec![
                FrameEvent::Frame(payload),
                FrameEvent::Line("7".to_string()),
            ]
        );
    }

    #[test]
    fn test_magic_resync_after_noise() {
        let payload = vec![1, 2, 3];
        let mut wire = Vec::new();
        // Arbitrary leading noise, including bytes of the magic itself
        wire.extend_from_slice(&[0x00, 0x98, 0xBA, 0xFF, 0xDC, 0xFE, 0x55]);
        wire.extend_from_slice(&encode_frame(&payload));
        wire.extend_from_slice(b"\r");

        let mut parser = FrameParser::new(ParseMode::BinaryFrame);
        let events = feed(&mut parser, &wire);

        assert_eq!(
            events,
            vec![FrameEvent::Frame(payload), FrameEvent::Line(String::new())]
        );
    }

    #[test]
    fn test_no_noise_also_locks() {
        let wire = encode_frame(&[9]);
        let mut parser = FrameParser::new(ParseMode::BinaryFrame);
        let events = feed(&mut parser, &wire);
        assert_eq!(events, vec![FrameEvent::Frame(vec![9])]);
    }

    #[test]
    fn test_checksum_mismatch_drops_frame() {
        let payload = vec![0x11, 0x22, 0x33, 0x44];
        let mut wire = encode_frame(&payload);
        wire[10] ^= 0xFF; // corrupt one payload byte
        wire.extend_from_slice(b"12\r");

        let mut parser = FrameParser::new(ParseMode::BinaryFrame);
        let events = feed(&mut parser, &wire);

        // No frame event, but the trailing line is still consumed
        assert_eq!(events, vec![FrameEvent::Line("12".to_string())]);
    }

    #[test]
    fn test_recovery_on_retry_after_corrupt_frame() {
        let payload = vec![0xA0, 0xA1, 0xA2];
        let mut corrupted = encode_frame(&payload);
        corrupted[8] ^= 0x01;
        corrupted.extend_from_slice(b"3\r");

        let mut parser = FrameParser::new(ParseMode::BinaryFrame);
        let events = feed(&mut parser, &corrupted);
        assert_eq!(events, vec![FrameEvent::Line("3".to_string())]);

        // The retry attempt builds a fresh parser and locks onto the
        // retransmitted frame
        let mut retry = FrameParser::new(ParseMode::BinaryFrame);
        let mut wire = encode_frame(&payload);
        wire.extend_from_slice(b"3\r");
        let events = feed(&mut retry, &wire);
        assert_eq!(
            events,
            vec![FrameEvent::Frame(payload), FrameEvent::Line("3".to_string())]
        );
    }

    #[test]
    fn test_zero_length_frame() {
        let mut wire = encode_frame(&[]);
        wire.extend_from_slice(b"0\r");

        let mut parser = FrameParser::new(ParseMode::BinaryFrame);
        let events = feed(&mut parser, &wire);

        assert_eq!(
            events,
            vec![FrameEvent::Frame(Vec::new()), FrameEvent::Line("0".to_string())]
        );
    }

    #[test]
    fn test_line_mode_never_interprets_frames() {
        // A stray frame while in line mode is consumed as line bytes
        let mut parser = FrameParser::new(ParseMode::TextLine);
        let mut wire = encode_frame(&[0x01]);
        wire.push(b'\r');
        let events = feed(&mut parser, &wire);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FrameEvent::Line(_)));
    }

    #[test]
    fn test_wire_magic_byte_order() {
        // The rolling window matches 0xFEDCBA98 when bytes arrive LSB first
        let wire = encode_frame(&[]);
        assert_eq!(&wire[0..4], &[0x98, 0xBA, 0xDC, 0xFE]);
    }
}
