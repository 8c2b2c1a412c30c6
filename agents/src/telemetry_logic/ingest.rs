//! Bridges the transport to the processing isolate: drains inbound frames,
//! decodes them and feeds readings into the supervised pipeline. Decode
//! failures reject the frame and keep the stream flowing.

use crate::telemetry_logic::decode::decode_frame;
use crate::telemetry_logic::supervisor::PipelineSupervisor;
use lib_telemetry::transport::InboundFrame;
use lib_telemetry::{PipelineError, PipelineMetrics};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

pub async fn run(
    supervisor: Arc<PipelineSupervisor>,
    mut inbound_rx: mpsc::Receiver<InboundFrame>,
    metrics: Arc<PipelineMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Ingest task shutting down.");
                break;
            }
            frame = inbound_rx.recv() => {
                let Some(frame) = frame else {
                    log::info!("Transport inbound channel closed; ingest task stopping.");
                    break;
                };
                let readings = match decode_frame(&frame) {
                    Ok(readings) => readings,
                    Err(e) => {
                        log::warn!("Undecodable telemetry frame rejected: {}", e);
                        metrics.record_malformed();
                        continue;
                    }
                };
                for reading in readings {
                    match supervisor.ingest(reading).await {
                        Ok(()) => {}
                        // Malformed readings are already counted by the
                        // aggregator; one bad sample never halts the stream.
                        Err(PipelineError::MalformedReading(reason)) => {
                            log::debug!("Reading rejected: {}", reason);
                        }
                        Err(e) => {
                            log::error!("Pipeline unavailable, reading dropped: {}", e);
                        }
                    }
                }
            }
        }
    }
}
