//! Download sequencing tests against the simulated unit.

use std::ops::ControlFlow;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use vibralink_core::demo::DemoDevice;
use vibralink_core::download::{self, DownloadError, DownloadRequest, Selection};
use vibralink_core::protocol::{Communicator, DataKind, ProtocolConfig, SensorChannel};

fn spawn_demo(seed: u64, chunk_size: u16) -> Communicator {
    let (transport, link_rx) = DemoDevice::with_seed(seed).chunk_size(chunk_size).link();
    let (comm, _events) = Communicator::spawn(transport, link_rx, ProtocolConfig::default());
    comm
}

#[tokio::test]
async fn test_recent_download_roundtrip() {
    let comm = spawn_demo(42, 64);

    let request = DownloadRequest {
        selection: Selection::Recent {
            start_id: 3,
            end_id: 6,
        },
        sensor: SensorChannel::AccZ,
        kind: DataKind::Raw,
    };

    let mut chunks = Vec::new();
    let received = download::run(&comm, &request, |chunk| {
        chunks.push((chunk.packet_id, chunk.data.to_vec(), chunk.total));
        ControlFlow::Continue(())
    })
    .await
    .unwrap();

    // Four packets of 64 bytes each
    assert_eq!(received, 4 * 64);
    assert_eq!(chunks.len(), 4);
    assert!(chunks.iter().all(|(_, data, total)| data.len() == 64 && *total == 256));

    // Packet ids advance from the start of the selected range
    let ids: Vec<u32> = chunks.iter().map(|(id, _, _)| *id).collect();
    assert_eq!(ids, vec![3, 4, 5, 6]);
}

#[tokio::test]
async fn test_historic_download_roundtrip() {
    let comm = spawn_demo(7, 32);

    let request = DownloadRequest {
        selection: Selection::Historic {
            start: Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap(),
            start_id: 0,
            end_id: 1,
        },
        sensor: SensorChannel::GyroX,
        kind: DataKind::Psd,
    };

    let received = download::run(&comm, &request, |_| ControlFlow::Continue(()))
        .await
        .unwrap();
    assert_eq!(received, 2 * 32);
}

#[tokio::test]
async fn test_cancel_stops_after_current_chunk() {
    let comm = spawn_demo(42, 16);

    let request = DownloadRequest {
        selection: Selection::Recent {
            start_id: 0,
            end_id: 9,
        },
        sensor: SensorChannel::Adc1,
        kind: DataKind::Statistic,
    };

    let mut seen = 0;
    let received = download::run(&comm, &request, |_| {
        seen += 1;
        ControlFlow::Break(())
    })
    .await
    .unwrap();

    assert_eq!(seen, 1);
    assert_eq!(received, 16);
}

#[tokio::test]
async fn test_empty_range_rejected_before_any_command() {
    let comm = spawn_demo(1, 16);

    let request = DownloadRequest {
        selection: Selection::Recent {
            start_id: 5,
            end_id: 2,
        },
        sensor: SensorChannel::AccX,
        kind: DataKind::Raw,
    };

    let result = download::run(&comm, &request, |_| ControlFlow::Continue(())).await;
    assert!(matches!(result, Err(DownloadError::EmptyRange)));
}

#[tokio::test]
async fn test_deterministic_payloads_with_fixed_seed() {
    let run_once = || async {
        let comm = spawn_demo(99, 8);
        let request = DownloadRequest {
            selection: Selection::Recent {
                start_id: 0,
                end_id: 0,
            },
            sensor: SensorChannel::Pitch,
            kind: DataKind::Raw,
        };
        let mut data = Vec::new();
        download::run(&comm, &request, |chunk| {
            data.extend_from_slice(chunk.data);
            ControlFlow::Continue(())
        })
        .await
        .unwrap();
        data
    };

    assert_eq!(run_once().await, run_once().await);
}
