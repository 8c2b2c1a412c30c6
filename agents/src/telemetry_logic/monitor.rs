//! Periodic health reporting: one metrics log line per interval, plus a
//! check that the processing isolate is still alive (restarting it when it
//! is not).

use crate::telemetry_logic::supervisor::PipelineSupervisor;
use lib_telemetry::transport::TransportHandle;
use lib_telemetry::PipelineMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

pub async fn run(
    report_interval: Duration,
    supervisor: Arc<PipelineSupervisor>,
    transport: TransportHandle,
    metrics: Arc<PipelineMetrics>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut report_tick = interval(report_interval);
    let mut health_tick = interval(Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Monitor task shutting down.");
                break;
            }
            _ = health_tick.tick() => {
                if supervisor.isolate_dead().await {
                    log::error!("Processing isolate died unexpectedly; restarting.");
                    if let Err(e) = supervisor.restart().await {
                        log::error!("Isolate restart failed: {}", e);
                    }
                }
            }
            _ = report_tick.tick() => {
                let snap = metrics.snapshot();
                log::info!(
                    "state={} ingested={} aggregates={} late_dropped={} malformed={} outbound_dropped={} reconnects={} heartbeat_timeouts={} lost_windows={}",
                    transport.state().as_str(),
                    snap.readings_ingested,
                    snap.aggregates_emitted,
                    snap.late_dropped,
                    snap.malformed_rejected,
                    snap.outbound_dropped,
                    snap.reconnects,
                    snap.heartbeat_timeouts,
                    snap.lost_windows,
                );
            }
        }
    }
}
