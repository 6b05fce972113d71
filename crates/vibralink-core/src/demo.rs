//! Demo Mode - Simulated VL unit for testing and offline use
//!
//! Answers the real command set over an in-process link: set-commands get a
//! bare acknowledgement line, size queries report a total derived from the
//! selected range, and data queries return CRC-framed packets filled with
//! random bytes. Lets the application (and the integration tests) exercise
//! the full protocol stack without hardware on the desk.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{encode_frame, LinkEvent, Transport, COMMAND_PREFIX, LINE_TERMINATOR};

const EVENT_QUEUE_DEPTH: usize = 256;
const DEFAULT_CHUNK_SIZE: u16 = 512;

/// Builder for a simulated unit.
pub struct DemoDevice {
    rng: StdRng,
    chunk_size: u16,
}

impl Default for DemoDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoDevice {
    /// Create a simulator with entropy-seeded payloads.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a simulator with deterministic payloads.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the per-packet payload size.
    pub fn chunk_size(mut self, size: u16) -> Self {
        self.chunk_size = size;
        self
    }

    /// Open the simulated link. Returns the write half and the link event
    /// stream with `Opened` already queued; feed both to
    /// [`Communicator::spawn`](crate::protocol::Communicator::spawn).
    pub fn link(self) -> (DemoTransport, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let _ = tx.try_send(LinkEvent::Opened);
        (
            DemoTransport {
                rng: self.rng,
                chunk_size: self.chunk_size,
                start_id: 0,
                end_id: 0,
                cursor: 0,
                tx,
            },
            rx,
        )
    }
}

/// Write half of a simulated link; parses commands and queues replies.
pub struct DemoTransport {
    rng: StdRng,
    chunk_size: u16,
    start_id: u32,
    end_id: u32,
    cursor: u32,
    tx: mpsc::Sender<LinkEvent>,
}

impl DemoTransport {
    fn respond(&mut self, bytes: Vec<u8>) {
        let _ = self.tx.try_send(LinkEvent::Data(bytes));
    }

    fn respond_line(&mut self, text: &str) {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(LINE_TERMINATOR);
        self.respond(bytes);
    }

    fn selected_packets(&self) -> u32 {
        if self.end_id >= self.start_id {
            self.end_id - self.start_id + 1
        } else {
            0
        }
    }

    fn handle_command(&mut self, command: &str) {
        if command == "KPLV" {
            // The unit never replies to a probe
            return;
        }

        if let Some(args) = command.strip_prefix("DWNR=") {
            if let Some((start, end)) = parse_id_pair(args) {
                self.start_id = start;
                self.end_id = end;
                self.cursor = start;
            }
            self.respond_line("");
        } else if let Some(args) = command.strip_prefix("DWNH=") {
            // First field is the epoch start; the id range follows
            let ids = args.splitn(2, ',').nth(1).unwrap_or("");
            if let Some((start, end)) = parse_id_pair(ids) {
                self.start_id = start;
                self.end_id = end;
                self.cursor = start;
            }
            self.respond_line("");
        } else if command.strip_prefix("DWNT=").is_some() {
            self.respond_line("");
        } else if let Some(arg) = command.strip_prefix("DWNI=") {
            if let Ok(id) = arg.trim().parse() {
                self.cursor = id;
            }
            self.respond_line("");
        } else if command == "DWNN" {
            self.cursor = self.cursor.saturating_add(1);
            self.respond_line("");
        } else if command == "DWNS?" {
            let total = self.selected_packets() * u32::from(self.chunk_size);
            self.respond_line(&total.to_string());
        } else if command == "DWND?" {
            let payload: Vec<u8> = (0..self.chunk_size).map(|_| self.rng.gen()).collect();
            let mut bytes = encode_frame(&payload);
            bytes.extend_from_slice(self.cursor.to_string().as_bytes());
            bytes.push(LINE_TERMINATOR);
            self.respond(bytes);
        } else {
            debug!(command, "demo unit ignoring unknown command");
        }
    }
}

impl Transport for DemoTransport {
    fn write(&mut self, bytes: &[u8]) -> bool {
        // Commands arrive whole from the engine; one terminated line each
        let text = String::from_utf8_lossy(bytes);
        let line = text.trim_end_matches(char::from(LINE_TERMINATOR));
        match line.strip_prefix(COMMAND_PREFIX) {
            Some(command) => self.handle_command(command),
            None => debug!(line, "demo unit ignoring unaddressed bytes"),
        }
        true
    }
}

fn parse_id_pair(args: &str) -> Option<(u32, u32)> {
    let (start, end) = args.split_once(',')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}
