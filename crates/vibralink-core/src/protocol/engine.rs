//! Command execution engine
//!
//! All protocol state — parser, acknowledgement tracking, the single send
//! session, and the liveness schedule — lives on one spawned task. The
//! [`Communicator`] handle sends requests into that task and suspends the
//! caller until one of three sources resolves the attempt: the
//! acknowledgement line, the per-attempt deadline, or the link closing.
//! First resolution wins; the others are ignored.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::commands::{AckWait, Command, DataKind, SensorChannel};
use super::frame::{FrameEvent, FrameParser, ParseMode};
use super::keepalive::KeepAlive;
use super::transport::{LinkEvent, Transport};
use super::{
    ProtocolError, DEFAULT_ACK_LONG_MS, DEFAULT_ACK_SHORT_MS, DEFAULT_KEEP_ALIVE_MS,
    DEFAULT_RETRY_LIMIT, LINE_TERMINATOR, MAGIC_PATTERN,
};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Write attempts per command before giving up
    pub retry_limit: u8,
    /// Acknowledgement wait for parameter-setting commands
    pub ack_short: Duration,
    /// Acknowledgement wait for query commands
    pub ack_long: Duration,
    /// Idle period after which a liveness probe is sent
    pub keep_alive_period: Duration,
    /// Frame magic pattern
    pub magic: u32,
    /// Text line terminator byte
    pub line_terminator: u8,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            ack_short: Duration::from_millis(DEFAULT_ACK_SHORT_MS),
            ack_long: Duration::from_millis(DEFAULT_ACK_LONG_MS),
            keep_alive_period: Duration::from_millis(DEFAULT_KEEP_ALIVE_MS),
            magic: MAGIC_PATTERN,
            line_terminator: LINE_TERMINATOR,
        }
    }
}

impl ProtocolConfig {
    /// Duration of one acknowledgement wait tier.
    pub fn ack_timeout(&self, wait: AckWait) -> Duration {
        match wait {
            AckWait::None => Duration::ZERO,
            AckWait::Short => self.ack_short,
            AckWait::Long => self.ack_long,
        }
    }
}

/// Completed command response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Content of the acknowledgement line (may be empty)
    pub text: String,
    /// Binary frame payload captured during the winning attempt
    pub frame: Option<Vec<u8>>,
}

/// Events published to the application layer, independent of any in-flight
/// command resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A non-empty acknowledgement or unsolicited text line
    TextLine(String),
    /// A checksum-valid binary frame payload
    BinaryFrame(Vec<u8>),
}

/// Acknowledgement lifecycle for the current attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AckState {
    Idle,
    AwaitingAck,
    Received,
}

struct ExecuteRequest {
    command: Command,
    reply: oneshot::Sender<Result<Response, ProtocolError>>,
}

/// Handle to a running protocol engine.
///
/// Cloneable; all clones feed the same engine task. Only one command may be
/// in flight at a time — a second `execute` while one is pending resolves
/// immediately with [`ProtocolError::Busy`].
#[derive(Clone)]
pub struct Communicator {
    requests: mpsc::Sender<ExecuteRequest>,
}

impl Communicator {
    /// Spawn the engine task on the current tokio runtime.
    ///
    /// `transport` is the write half of the link; `link_events` is its read
    /// half. Returns the command handle and the stream of device events
    /// (unsolicited lines, binary frames). The engine stops when every
    /// handle and the link event sender are dropped.
    pub fn spawn<T: Transport>(
        transport: T,
        link_events: mpsc::Receiver<LinkEvent>,
        config: ProtocolConfig,
    ) -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (request_tx, request_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let keep_alive = KeepAlive::new(config.keep_alive_period);
        let parser =
            FrameParser::with_framing(ParseMode::TextLine, config.magic, config.line_terminator);

        let engine = Engine {
            transport,
            config,
            requests: request_rx,
            link: link_events,
            events: event_tx,
            parser,
            ack: AckState::Idle,
            pending: None,
            keep_alive,
            link_up: false,
        };
        tokio::spawn(engine.run());

        (
            Self {
                requests: request_tx,
            },
            event_rx,
        )
    }

    /// Execute one command, suspending until it resolves.
    pub async fn execute(&self, command: Command) -> Result<Response, ProtocolError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(ExecuteRequest {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ProtocolError::EngineGone)?;
        reply_rx.await.map_err(|_| ProtocolError::EngineGone)?
    }

    /// Select the most recent packets in `[start_id, end_id]` for download.
    pub async fn download_recent(&self, start_id: u32, end_id: u32) -> Result<(), ProtocolError> {
        self.execute(Command::DownloadRecent { start_id, end_id })
            .await
            .map(drop)
    }

    /// Select archived packets starting at `start` for download.
    pub async fn download_historic(
        &self,
        start: DateTime<Utc>,
        start_id: u32,
        end_id: u32,
    ) -> Result<(), ProtocolError> {
        self.execute(Command::DownloadHistoric {
            start,
            start_id,
            end_id,
        })
        .await
        .map(drop)
    }

    /// Select the sensor channel and data kind to download.
    pub async fn download_type(
        &self,
        sensor: SensorChannel,
        kind: DataKind,
    ) -> Result<(), ProtocolError> {
        self.execute(Command::DownloadType { sensor, kind })
            .await
            .map(drop)
    }

    /// Position the download cursor on a packet id.
    pub async fn download_id(&self, id: u32) -> Result<(), ProtocolError> {
        self.execute(Command::DownloadId { id }).await.map(drop)
    }

    /// Advance the download cursor to the next packet.
    pub async fn download_next(&self) -> Result<(), ProtocolError> {
        self.execute(Command::DownloadNext).await.map(drop)
    }

    /// Query the total size in bytes of the selected download.
    ///
    /// The engine only guarantees a terminated line; an empty or
    /// non-numeric line is a data error surfaced here.
    pub async fn download_size(&self) -> Result<u32, ProtocolError> {
        let response = self.execute(Command::DownloadSize).await?;
        response.text.trim().parse().map_err(|_| {
            ProtocolError::InvalidResponse(format!(
                "expected byte count, got {:?}",
                response.text
            ))
        })
    }

    /// Request the packet at the cursor; returns its id and payload.
    pub async fn download_data(&self) -> Result<(u32, Vec<u8>), ProtocolError> {
        let response = self.execute(Command::DownloadData).await?;
        let id: u32 = response.text.trim().parse().map_err(|_| {
            ProtocolError::InvalidResponse(format!("expected packet id, got {:?}", response.text))
        })?;
        match response.frame {
            Some(frame) if !frame.is_empty() => Ok((id, frame)),
            _ => Err(ProtocolError::InvalidResponse(
                "packet carried no frame payload".to_string(),
            )),
        }
    }
}

struct Pending {
    command: Command,
    reply: oneshot::Sender<Result<Response, ProtocolError>>,
    retries_remaining: u8,
    deadline: Instant,
    frame: Option<Vec<u8>>,
}

enum Wake {
    Link(Option<LinkEvent>),
    Request(Option<ExecuteRequest>),
    AckTimeout,
    ProbeDue,
}

struct Engine<T: Transport> {
    transport: T,
    config: ProtocolConfig,
    requests: mpsc::Receiver<ExecuteRequest>,
    link: mpsc::Receiver<LinkEvent>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    parser: FrameParser,
    ack: AckState,
    pending: Option<Pending>,
    keep_alive: KeepAlive,
    link_up: bool,
}

impl<T: Transport> Engine<T> {
    async fn run(mut self) {
        debug!("protocol engine started");
        loop {
            let ack_deadline = self.pending.as_ref().map(|p| p.deadline);
            // Half-duplex discipline: never probe while a command owns the
            // line; traffic re-arms the schedule anyway
            let probe_deadline = if self.pending.is_none() {
                self.keep_alive.deadline()
            } else {
                None
            };
            let far = Instant::now() + Duration::from_secs(86400);

            let wake = tokio::select! {
                event = self.link.recv() => Wake::Link(event),
                request = self.requests.recv() => Wake::Request(request),
                _ = sleep_until(ack_deadline.unwrap_or(far)), if ack_deadline.is_some() => Wake::AckTimeout,
                _ = sleep_until(probe_deadline.unwrap_or(far)), if probe_deadline.is_some() => Wake::ProbeDue,
            };

            match wake {
                Wake::Link(Some(event)) => self.on_link_event(event),
                Wake::Request(Some(request)) => self.on_request(request),
                Wake::AckTimeout => self.on_ack_timeout(),
                Wake::ProbeDue => self.on_probe_due(),
                Wake::Link(None) | Wake::Request(None) => break,
            }
        }
        debug!("protocol engine stopped");
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Opened => {
                info!("link opened");
                self.link_up = true;
                // A new open cycle starts clean; no parse state survives it
                self.parser = FrameParser::with_framing(
                    ParseMode::TextLine,
                    self.config.magic,
                    self.config.line_terminator,
                );
                // Wake the unit right away, then probe on idle
                self.send_probe();
                self.keep_alive.restart();
            }
            LinkEvent::Closed => {
                info!("link closed");
                self.link_up = false;
                self.keep_alive.stop();
                if self.pending.is_some() {
                    error!("link closed while awaiting acknowledgement");
                    self.resolve(Err(ProtocolError::LinkClosed));
                }
            }
            LinkEvent::Data(bytes) => {
                // Any received byte postpones the next probe
                if self.link_up {
                    self.keep_alive.restart();
                }
                for byte in bytes {
                    if let Some(event) = self.parser.push(byte) {
                        self.on_parser_event(event);
                    }
                }
            }
        }
    }

    fn on_parser_event(&mut self, event: FrameEvent) {
        match event {
            FrameEvent::Frame(payload) => {
                if let Some(pending) = self.pending.as_mut() {
                    if pending.command.expects_binary_frame() {
                        pending.frame = Some(payload.clone());
                    }
                }
                let _ = self.events.send(DeviceEvent::BinaryFrame(payload));
            }
            FrameEvent::Line(text) => {
                if self.ack != AckState::AwaitingAck {
                    // Unsolicited or stale line; swallow it
                    debug!(line = %text, "line dropped, no acknowledgement pending");
                    return;
                }
                self.ack = AckState::Received;
                debug!(line = %text, "acknowledgement received");
                if !text.is_empty() {
                    let _ = self.events.send(DeviceEvent::TextLine(text.clone()));
                }
                if let Some(pending) = self.pending.take() {
                    let _ = pending.reply.send(Ok(Response {
                        text,
                        frame: pending.frame,
                    }));
                }
            }
        }
    }

    fn on_request(&mut self, request: ExecuteRequest) {
        if self.pending.is_some() {
            warn!("command rejected, another is already in flight");
            let _ = request.reply.send(Err(ProtocolError::Busy));
            return;
        }
        debug!(command = ?request.command, "executing command");
        self.pending = Some(Pending {
            command: request.command,
            reply: request.reply,
            retries_remaining: self.config.retry_limit,
            deadline: Instant::now(),
            frame: None,
        });
        self.start_attempt();
    }

    /// Begin one write attempt for the pending command.
    fn start_attempt(&mut self) {
        let (mode, requires_ack, wait, bytes) = {
            let Some(pending) = self.pending.as_mut() else {
                return;
            };
            pending.retries_remaining = pending.retries_remaining.saturating_sub(1);
            pending.frame = None;
            (
                pending.command.parse_mode(),
                pending.command.requires_ack(),
                pending.command.ack_wait(),
                pending.command.to_bytes(),
            )
        };

        // Fresh parser context per attempt: leftover bytes from a previous
        // attempt can never satisfy this one
        self.parser = FrameParser::with_framing(mode, self.config.magic, self.config.line_terminator);
        self.ack = if requires_ack {
            AckState::AwaitingAck
        } else {
            AckState::Idle
        };

        if !self.transport.write(&bytes) {
            error!("command write failed");
            self.resolve(Err(ProtocolError::Transport));
            return;
        }

        if !requires_ack {
            self.resolve(Ok(Response::default()));
            return;
        }

        let deadline = Instant::now() + self.config.ack_timeout(wait);
        if let Some(pending) = self.pending.as_mut() {
            pending.deadline = deadline;
        }
    }

    fn on_ack_timeout(&mut self) {
        let retries_remaining = self
            .pending
            .as_ref()
            .map(|p| p.retries_remaining)
            .unwrap_or(0);
        if retries_remaining > 0 {
            warn!(retries_remaining, "acknowledgement timeout, retrying");
            self.start_attempt();
        } else {
            warn!("acknowledgement timeout, retries exhausted");
            self.resolve(Err(ProtocolError::ExhaustedRetries));
        }
    }

    fn on_probe_due(&mut self) {
        self.send_probe();
        self.keep_alive.restart();
    }

    fn send_probe(&mut self) {
        debug!("sending liveness probe");
        if !self.transport.write(&Command::KeepAlive.to_bytes()) {
            // Probe failures are never escalated; the next period retries
            warn!("liveness probe write failed");
        }
    }

    /// Vacate the send session and deliver its result.
    fn resolve(&mut self, result: Result<Response, ProtocolError>) {
        self.ack = AckState::Idle;
        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(result);
        }
    }
}
