//! Serial port handling
//!
//! Provides the serial-link glue between a physical port and the protocol
//! engine: port enumeration, opening with the unit's 8N1 settings, and the
//! reader thread that turns blocking reads into [`LinkEvent`]s.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{Read, Write};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::transport::{LinkEvent, Transport};
use super::ProtocolError;

/// Lowest baud rate the unit's UART accepts
pub const MIN_BAUD_RATE: u32 = 1200;
/// Highest baud rate the unit's UART accepts
pub const MAX_BAUD_RATE: u32 = 115_200;

const READ_CHUNK_SIZE: usize = 512;
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, manufacturer, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb_info) => (
                Some(usb_info.vid),
                Some(usb_info.pid),
                usb_info.manufacturer,
                usb_info.product,
                usb_info.serial_number,
            ),
            _ => (None, None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            manufacturer,
            product,
            serial_number,
        }
    }
}

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    // Collect from serialport API
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
    {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // Linux-only: Add /dev/ttyACM* and /dev/ttyUSB* entries if present but not found by API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        vid: None,
                        pid: None,
                        manufacturer: None,
                        product: None,
                        serial_number: None,
                    });
                }
            }
        }
    }

    // Collect and sort deterministically
    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port with the unit's settings: 8N1, no flow control, baud
/// clamped to the supported range.
pub fn open_port(name: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, ProtocolError> {
    let baud = baud_rate.clamp(MIN_BAUD_RATE, MAX_BAUD_RATE);

    serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(READ_POLL_TIMEOUT)
        .open()
        .map_err(|e| ProtocolError::Serial(e.to_string()))
}

/// Write half of an open serial link.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> bool {
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .is_ok()
    }
}

/// An open serial link: the write half plus the event stream produced by a
/// background reader thread. Feed both to
/// [`Communicator::spawn`](super::Communicator::spawn).
pub struct SerialLink {
    /// Write half of the port
    pub transport: SerialTransport,
    /// Link events pumped by the reader thread
    pub events: mpsc::Receiver<LinkEvent>,
}

impl SerialLink {
    /// Open `name` and start pumping link events.
    ///
    /// `Opened` is emitted immediately; `Closed` follows any fatal read
    /// error (device unplugged, port revoked). Dropping the receiver stops
    /// the reader thread.
    pub fn open(name: &str, baud_rate: u32) -> Result<Self, ProtocolError> {
        let port = open_port(name, baud_rate)?;
        let reader = port
            .try_clone()
            .map_err(|e| ProtocolError::Serial(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        info!(port = name, baud = baud_rate, "port opened");
        // The channel is fresh and empty; this cannot fail
        let _ = tx.try_send(LinkEvent::Opened);

        let port_name = name.to_string();
        std::thread::spawn(move || read_pump(reader, tx, port_name));

        Ok(Self {
            transport: SerialTransport { port },
            events: rx,
        })
    }
}

/// Blocking read loop; runs on a dedicated thread for the life of the link.
fn read_pump(mut port: Box<dyn SerialPort>, tx: mpsc::Sender<LinkEvent>, port_name: String) {
    let mut buf = [0u8; READ_CHUNK_SIZE];
    loop {
        match port.read(&mut buf) {
            Ok(0) => {
                info!(port = %port_name, "port closed");
                let _ = tx.blocking_send(LinkEvent::Closed);
                break;
            }
            Ok(n) => {
                if tx.blocking_send(LinkEvent::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                // Poll timeout; nothing arrived in this window
                if tx.is_closed() {
                    break;
                }
            }
            Err(e) => {
                warn!(port = %port_name, error = %e, "port read error");
                let _ = tx.blocking_send(LinkEvent::Closed);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // This test just ensures the function doesn't panic
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "/dev/ttyACM10",
        ];
        let mut ports: Vec<PortInfo> = names
            .into_iter()
            .map(|n| PortInfo {
                name: n.to_string(),
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
                serial_number: None,
            })
            .collect();

        ports.sort_by_key(|p| port_sort_key(&p.name));
        let ordered: Vec<String> = ports.into_iter().map(|p| p.name).collect();

        assert_eq!(
            ordered,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/someport",
            ]
        );
    }
}
