//! Manual soak runner: connects to a live telemetry WebSocket feed, pushes
//! everything through the full pipeline and prints a summary once per
//! report interval. Not part of the automated test suite; run it by hand
//! against a real or simulated feed:
//!
//!   cargo run -p project_tests --bin test_soak -- --url ws://127.0.0.1:9002/ws

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use lib_telemetry::core::state_sink::ChannelSink;
use lib_telemetry::core::pipeline;
use lib_telemetry::transport::{InboundFrame, TransportManager};
use lib_telemetry::{PipelineConfig, PipelineMetrics, Reading, TransportConfig};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the telemetry feed
    #[clap(short, long, default_value = "ws://127.0.0.1:9002/ws")]
    url: String,

    /// Report interval in seconds
    #[clap(short, long, default_value_t = 10)]
    report_interval_seconds: u64,

    /// Aggregation window in milliseconds
    #[clap(short, long, default_value_t = 1000)]
    window_ms: u64,
}

fn decode(frame: &InboundFrame) -> Result<Vec<Reading>, serde_json::Error> {
    let text = match frame {
        InboundFrame::Text(text) => text.clone(),
        InboundFrame::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    };
    if text.trim_start().starts_with('[') {
        serde_json::from_str::<Vec<Reading>>(&text)
    } else {
        serde_json::from_str::<Reading>(&text).map(|r| vec![r])
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let metrics = Arc::new(PipelineMetrics::new());
    let (sink, mut sink_rx) = ChannelSink::new();
    let pipeline_config = PipelineConfig {
        aggregation_window_ms: args.window_ms,
        ..Default::default()
    };
    let handle = pipeline::spawn(pipeline_config, sink, Arc::clone(&metrics))
        .expect("pipeline spawn failed");

    let (inbound_tx, mut inbound_rx) = mpsc::channel(1024);
    let transport_config = TransportConfig {
        ws_url: args.url.clone(),
        ..Default::default()
    };
    let (transport, transport_handle) =
        TransportManager::new(transport_config, inbound_tx, Arc::clone(&metrics))
            .expect("transport config invalid");
    tokio::spawn(transport.run());

    // Reporter task
    let report_metrics = Arc::clone(&metrics);
    let report_state = transport_handle.clone();
    tokio::spawn(async move {
        loop {
            sleep(Duration::from_secs(args.report_interval_seconds)).await;
            let snap = report_metrics.snapshot();
            println!("\n----- Soak Summary -----");
            println!("State:              {}", report_state.state().as_str());
            println!("Readings ingested:  {}", snap.readings_ingested);
            println!("Aggregates emitted: {}", snap.aggregates_emitted);
            println!("Late dropped:       {}", snap.late_dropped);
            println!("Malformed rejected: {}", snap.malformed_rejected);
            println!("Reconnects:         {}", snap.reconnects);
            println!("Heartbeat timeouts: {}", snap.heartbeat_timeouts);
            println!("------------------------\n");
        }
    });

    // Drain the sink so batches don't pile up.
    tokio::spawn(async move {
        while let Some(batch) = sink_rx.recv().await {
            log::debug!("{}: {} aggregates", batch.source_id, batch.aggregates.len());
        }
    });

    println!("Soaking against {}. Press Ctrl+C to stop.", args.url);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            frame = inbound_rx.recv() => {
                let Some(frame) = frame else { break };
                match decode(&frame) {
                    Ok(readings) => {
                        for reading in readings {
                            if handle.ingest(reading).await.is_err() {
                                eprintln!("Pipeline gone; stopping.");
                                return;
                            }
                        }
                    }
                    Err(e) => log::warn!("Undecodable frame: {}", e),
                }
            }
        }
    }

    transport_handle.close();
    handle.shutdown().await;
    println!("Soak run finished.");
}
