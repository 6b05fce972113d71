//! Measurement download orchestration
//!
//! Drives the unit through a full transfer: select the packet range, select
//! the sensor channel and data kind, query the total size, then pull packets
//! one at a time until the reported size is reached. Chunks are handed to the
//! caller as they arrive; writing them anywhere (file, buffer, socket) is the
//! application's business.

use std::ops::ControlFlow;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::{Communicator, DataKind, ProtocolError, SensorChannel};

/// Which stored packets to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The most recent packets in an id range.
    Recent {
        /// First packet id of the range
        start_id: u32,
        /// Last packet id of the range
        end_id: u32,
    },
    /// Archived packets from a start instant onward.
    Historic {
        /// Start of the archive window
        start: DateTime<Utc>,
        /// First packet id of the range
        start_id: u32,
        /// Last packet id of the range
        end_id: u32,
    },
}

/// Full description of one download session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Packet selection
    pub selection: Selection,
    /// Sensor channel to download
    pub sensor: SensorChannel,
    /// Data kind to download
    pub kind: DataKind,
}

/// One packet delivered to the caller during a download.
#[derive(Debug)]
pub struct DownloadChunk<'a> {
    /// Packet id reported by the unit
    pub packet_id: u32,
    /// Packet payload
    pub data: &'a [u8],
    /// Bytes received so far, this chunk included
    pub received: u64,
    /// Total bytes the unit reported for the session
    pub total: u64,
}

/// Download session errors
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Packet id range is empty")]
    EmptyRange,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Run a download session to completion.
///
/// `on_chunk` is called for every received packet; returning
/// [`ControlFlow::Break`] cancels the session cleanly. Returns the number of
/// bytes received (which may be short of the reported total on cancel).
pub async fn run<F>(
    comm: &Communicator,
    request: &DownloadRequest,
    mut on_chunk: F,
) -> Result<u64, DownloadError>
where
    F: FnMut(DownloadChunk<'_>) -> ControlFlow<()>,
{
    let (start_id, end_id) = match request.selection {
        Selection::Recent { start_id, end_id } => (start_id, end_id),
        Selection::Historic {
            start_id, end_id, ..
        } => (start_id, end_id),
    };
    if start_id > end_id {
        warn!(start_id, end_id, "rejecting download with empty id range");
        return Err(DownloadError::EmptyRange);
    }

    info!(
        sensor = request.sensor.label(),
        kind = request.kind.label(),
        "starting download"
    );

    match request.selection {
        Selection::Recent { start_id, end_id } => {
            comm.download_recent(start_id, end_id).await?;
        }
        Selection::Historic {
            start,
            start_id,
            end_id,
        } => {
            comm.download_historic(start, start_id, end_id).await?;
        }
    }
    comm.download_type(request.sensor, request.kind).await?;

    let total = u64::from(comm.download_size().await?);
    info!(total, "download size reported");

    let mut received = 0u64;
    while received < total {
        let (packet_id, data) = comm.download_data().await?;
        received += data.len() as u64;
        info!(packet_id, received, total, "packet ready");

        let flow = on_chunk(DownloadChunk {
            packet_id,
            data: &data,
            received,
            total,
        });
        if flow.is_break() {
            info!(received, "download cancelled");
            break;
        }

        comm.download_next().await?;
    }

    info!(received, "download finished");
    Ok(received)
}
