//! Protocol commands
//!
//! Defines the request set understood by VL-series measurement units. Every
//! command is an ASCII string prefixed with the unit address and terminated
//! by a single carriage return; no line feed is sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::frame::ParseMode;
use super::{COMMAND_PREFIX, LINE_TERMINATOR};

/// How long the engine waits for a command's acknowledgement line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckWait {
    /// No acknowledgement expected; the write alone completes the command.
    None,
    /// Parameter-setting commands answer quickly.
    Short,
    /// Query commands may need the unit to assemble data first.
    Long,
}

/// Sensor channel selectable for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorChannel {
    /// Accelerometer X axis
    AccX,
    /// Accelerometer Y axis
    AccY,
    /// Accelerometer Z axis
    AccZ,
    /// Accelerometer resultant magnitude
    AccResultant,
    /// Gyroscope X axis
    GyroX,
    /// Gyroscope Y axis
    GyroY,
    /// Gyroscope Z axis
    GyroZ,
    /// Roll angle
    Roll,
    /// Pitch angle
    Pitch,
    /// Auxiliary ADC input 1
    Adc1,
    /// Auxiliary ADC input 2
    Adc2,
}

impl SensorChannel {
    /// Index used on the wire in `DWNT=`.
    pub fn wire_index(&self) -> u32 {
        *self as u32
    }

    /// Short channel label, as the unit firmware names it.
    pub fn label(&self) -> &'static str {
        match self {
            SensorChannel::AccX => "ACC_X",
            SensorChannel::AccY => "ACC_Y",
            SensorChannel::AccZ => "ACC_Z",
            SensorChannel::AccResultant => "ACC_RES",
            SensorChannel::GyroX => "GYR_X",
            SensorChannel::GyroY => "GYR_Y",
            SensorChannel::GyroZ => "GYR_Z",
            SensorChannel::Roll => "ROLL",
            SensorChannel::Pitch => "PITCH",
            SensorChannel::Adc1 => "ADC1",
            SensorChannel::Adc2 => "ADC2",
        }
    }
}

/// Kind of measurement data stored on the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataKind {
    /// Power spectral density
    Psd,
    /// Min/max/mean/deviation statistics
    Statistic,
    /// Raw samples
    Raw,
}

impl DataKind {
    /// Index used on the wire in `DWNT=`.
    pub fn wire_index(&self) -> u32 {
        *self as u32
    }

    /// Short kind label, as the unit firmware names it.
    pub fn label(&self) -> &'static str {
        match self {
            DataKind::Psd => "PSD",
            DataKind::Statistic => "STAT",
            DataKind::Raw => "RAW",
        }
    }
}

/// Requests understood by the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Liveness probe (`KPLV`); the unit never replies
    KeepAlive,

    /// Select the most recent packets by id range (`DWNR=`)
    DownloadRecent {
        /// First packet id of the range
        start_id: u32,
        /// Last packet id of the range
        end_id: u32,
    },

    /// Select archived packets from a start instant (`DWNH=`)
    DownloadHistoric {
        /// Start of the archive window; sent as epoch seconds
        start: DateTime<Utc>,
        /// First packet id of the range
        start_id: u32,
        /// Last packet id of the range
        end_id: u32,
    },

    /// Select sensor channel and data kind (`DWNT=`)
    DownloadType {
        /// Channel to download
        sensor: SensorChannel,
        /// Data kind to download
        kind: DataKind,
    },

    /// Position the download cursor on a packet id (`DWNI=`)
    DownloadId {
        /// Packet id to position on
        id: u32,
    },

    /// Advance the download cursor to the next packet (`DWNN`)
    DownloadNext,

    /// Query the total selected download size in bytes (`DWNS?`)
    DownloadSize,

    /// Request the packet at the cursor as a binary frame (`DWND?`)
    DownloadData,
}

impl Command {
    /// Serialize to wire bytes: address prefix, verb, arguments, `\r`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = match self {
            Command::KeepAlive => "KPLV".to_string(),
            Command::DownloadRecent { start_id, end_id } => {
                format!("DWNR={},{}", start_id, end_id)
            }
            Command::DownloadHistoric {
                start,
                start_id,
                end_id,
            } => format!("DWNH={},{},{}", start.timestamp(), start_id, end_id),
            Command::DownloadType { sensor, kind } => {
                format!("DWNT={},{}", sensor.wire_index(), kind.wire_index())
            }
            Command::DownloadId { id } => format!("DWNI={}", id),
            Command::DownloadNext => "DWNN".to_string(),
            Command::DownloadSize => "DWNS?".to_string(),
            Command::DownloadData => "DWND?".to_string(),
        };

        let mut bytes = Vec::with_capacity(COMMAND_PREFIX.len() + body.len() + 1);
        bytes.extend_from_slice(COMMAND_PREFIX.as_bytes());
        bytes.extend_from_slice(body.as_bytes());
        bytes.push(LINE_TERMINATOR);
        bytes
    }

    /// Whether the unit answers this command with an acknowledgement line.
    pub fn requires_ack(&self) -> bool {
        !matches!(self, Command::KeepAlive)
    }

    /// Whether the response carries a binary frame before the trailing line.
    pub fn expects_binary_frame(&self) -> bool {
        matches!(self, Command::DownloadData)
    }

    /// Acknowledgement wait tier for this command.
    pub fn ack_wait(&self) -> AckWait {
        match self {
            Command::KeepAlive => AckWait::None,
            Command::DownloadSize | Command::DownloadData => AckWait::Long,
            _ => AckWait::Short,
        }
    }

    /// Parse mode the frame parser must start in for this command.
    pub fn parse_mode(&self) -> ParseMode {
        if self.expects_binary_frame() {
            ParseMode::BinaryFrame
        } else {
            ParseMode::TextLine
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_keep_alive_wire_bytes() {
        assert_eq!(Command::KeepAlive.to_bytes(), b"!123:KPLV\r".to_vec());
    }

    #[test]
    fn test_download_recent_wire_bytes() {
        let cmd = Command::DownloadRecent {
            start_id: 4,
            end_id: 17,
        };
        assert_eq!(cmd.to_bytes(), b"!123:DWNR=4,17\r".to_vec());
    }

    #[test]
    fn test_download_historic_uses_epoch_seconds() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let cmd = Command::DownloadHistoric {
            start,
            start_id: 0,
            end_id: 9,
        };
        let expected = format!("!123:DWNH={},0,9\r", start.timestamp());
        assert_eq!(cmd.to_bytes(), expected.into_bytes());
    }

    #[test]
    fn test_download_type_wire_indices() {
        let cmd = Command::DownloadType {
            sensor: SensorChannel::GyroZ,
            kind: DataKind::Raw,
        };
        assert_eq!(cmd.to_bytes(), b"!123:DWNT=6,2\r".to_vec());
    }

    #[test]
    fn test_queries_end_with_question_mark() {
        assert_eq!(Command::DownloadSize.to_bytes(), b"!123:DWNS?\r".to_vec());
        assert_eq!(Command::DownloadData.to_bytes(), b"!123:DWND?\r".to_vec());
    }

    #[test]
    fn test_ack_expectations() {
        assert!(!Command::KeepAlive.requires_ack());
        assert!(Command::DownloadSize.requires_ack());
        assert!(Command::DownloadData.expects_binary_frame());
        assert!(!Command::DownloadSize.expects_binary_frame());
    }

    #[test]
    fn test_ack_tiers() {
        assert_eq!(Command::KeepAlive.ack_wait(), AckWait::None);
        assert_eq!(
            Command::DownloadId { id: 3 }.ack_wait(),
            AckWait::Short
        );
        assert_eq!(Command::DownloadSize.ack_wait(), AckWait::Long);
        assert_eq!(Command::DownloadData.ack_wait(), AckWait::Long);
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!(Command::DownloadData.parse_mode(), ParseMode::BinaryFrame);
        assert_eq!(Command::DownloadSize.parse_mode(), ParseMode::TextLine);
    }

    #[test]
    fn test_sensor_labels_match_firmware() {
        assert_eq!(SensorChannel::AccResultant.label(), "ACC_RES");
        assert_eq!(SensorChannel::Adc2.wire_index(), 10);
        assert_eq!(DataKind::Statistic.label(), "STAT");
    }
}
