//! Demo Download Tool
//!
//! Runs a full measurement download against the built-in simulated unit, so
//! the protocol stack can be exercised without hardware on the desk.
//!
//! Usage:
//!   cargo run --example demo_download -- [CHUNK_SIZE] [PACKETS]

use std::ops::ControlFlow;

use vibralink_core::demo::DemoDevice;
use vibralink_core::download::{self, DownloadRequest, Selection};
use vibralink_core::protocol::{Communicator, DataKind, ProtocolConfig, SensorChannel};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let chunk_size: u16 = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let packets: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(8);

    let (transport, link_rx) = DemoDevice::new().chunk_size(chunk_size).link();
    let (comm, _events) = Communicator::spawn(transport, link_rx, ProtocolConfig::default());

    let request = DownloadRequest {
        selection: Selection::Recent {
            start_id: 0,
            end_id: packets.saturating_sub(1),
        },
        sensor: SensorChannel::AccX,
        kind: DataKind::Psd,
    };

    println!(
        "Downloading {} packets of {} bytes from the demo unit...",
        packets, chunk_size
    );

    let result = download::run(&comm, &request, |chunk| {
        println!(
            "  packet {:>4}: {:>5} bytes ({} / {} total)",
            chunk.packet_id,
            chunk.data.len(),
            chunk.received,
            chunk.total
        );
        ControlFlow::Continue(())
    })
    .await;

    match result {
        Ok(received) => println!("Done: {} bytes received", received),
        Err(e) => {
            eprintln!("Download failed: {}", e);
            std::process::exit(1);
        }
    }
}
