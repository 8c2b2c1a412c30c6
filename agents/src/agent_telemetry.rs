use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;

use lib_telemetry::loggers::setup_logging;
use lib_telemetry::transport::TransportManager;
use lib_telemetry::PipelineMetrics;

mod telemetry_logic;
use telemetry_logic::{config, ingest, monitor, supervisor::PipelineSupervisor};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("./logs"));
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    setup_logging(&log_dir, &log_level).map_err(|e| anyhow::anyhow!("logging setup: {}", e))?;

    let metrics = Arc::new(PipelineMetrics::new());

    // Processing isolate under supervision; the sink receiver is what an
    // attached UI layer would consume.
    let (supervisor, mut sink_rx) =
        PipelineSupervisor::new(config.pipeline_config(), Arc::clone(&metrics))?;
    let supervisor = Arc::new(supervisor);

    // Transport on its own task, decoupled from processing by the inbound
    // channel.
    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    let (transport, transport_handle) =
        TransportManager::new(config.transport_config(), inbound_tx, Arc::clone(&metrics))?;
    let transport_task = tokio::spawn(transport.run());

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let ingest_task = tokio::spawn(ingest::run(
        Arc::clone(&supervisor),
        inbound_rx,
        Arc::clone(&metrics),
        shutdown_tx.subscribe(),
    ));

    let report_interval = Duration::from_secs(config.metrics_interval_seconds.unwrap_or(60));
    let monitor_task = tokio::spawn(monitor::run(
        report_interval,
        Arc::clone(&supervisor),
        transport_handle.clone(),
        Arc::clone(&metrics),
        shutdown_tx.subscribe(),
    ));

    // No UI attached in the standalone agent: drain the sink so batches do
    // not pile up, logging at trace for diagnosis.
    let mut sink_shutdown = shutdown_tx.subscribe();
    let sink_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sink_shutdown.recv() => break,
                batch = sink_rx.recv() => {
                    match batch {
                        Some(batch) => log::trace!(
                            "{}: {} aggregates ready",
                            batch.source_id,
                            batch.aggregates.len()
                        ),
                        None => break,
                    }
                }
            }
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::error!("Failed to install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());
    transport_handle.close();

    // Wait for components to shut down
    let _ = tokio::try_join!(transport_task, ingest_task, monitor_task, sink_task);

    // Stop the isolate last so everything feeding it is already quiet.
    match Arc::try_unwrap(supervisor) {
        Ok(supervisor) => supervisor.shutdown().await,
        Err(_) => log::warn!("Supervisor still referenced at shutdown; isolate left to drop."),
    }

    log::info!("Shutdown complete.");
    Ok(())
}
