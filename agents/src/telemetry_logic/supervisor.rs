//! Supervision of the processing isolate. The isolate is fatal-restartable:
//! when it stops responding or its task dies, the supervisor spawns a fresh
//! instance wired to the same state sink. In-flight windows of the dead
//! instance are lost and counted, never fabricated.

use lib_telemetry::core::pipeline::{self, PipelineHandle};
use lib_telemetry::core::state_sink::{AggregatesReady, ChannelSink};
use lib_telemetry::{Aggregate, PipelineConfig, PipelineError, PipelineMetrics, Reading};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub struct PipelineSupervisor {
    config: PipelineConfig,
    metrics: Arc<PipelineMetrics>,
    sink_tx: mpsc::UnboundedSender<AggregatesReady>,
    handle: RwLock<PipelineHandle>,
}

impl PipelineSupervisor {
    /// Spawns the first isolate instance. Returns the supervisor plus the
    /// receiver the external consumer drains.
    pub fn new(
        config: PipelineConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AggregatesReady>), PipelineError> {
        let (sink, sink_rx) = ChannelSink::new();
        let sink_tx = sink.sender();
        let handle = pipeline::spawn(config.clone(), sink, Arc::clone(&metrics))?;
        Ok((
            Self {
                config,
                metrics,
                sink_tx,
                handle: RwLock::new(handle),
            },
            sink_rx,
        ))
    }

    pub async fn ingest(&self, reading: Reading) -> Result<(), PipelineError> {
        let result = self.handle.read().await.ingest(reading.clone()).await;
        match result {
            Ok(()) => Ok(()),
            Err(PipelineError::IsolateGone) => {
                self.restart().await?;
                self.handle.read().await.ingest(reading).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn request_downsampled(
        &self,
        source_id: &str,
        target_points: usize,
    ) -> Result<Vec<Aggregate>, PipelineError> {
        let result = self
            .handle
            .read()
            .await
            .request_downsampled(source_id, target_points)
            .await;
        match result {
            Err(PipelineError::IsolateUnresponsive(ms)) => {
                log::error!(
                    "Isolate unresponsive after {}ms; restarting. Buffered history is lost.",
                    ms
                );
                self.restart().await?;
                Err(PipelineError::IsolateUnresponsive(ms))
            }
            Err(PipelineError::IsolateGone) => {
                self.restart().await?;
                Err(PipelineError::IsolateGone)
            }
            other => other,
        }
    }

    /// True when the current isolate task has died (panic or shutdown).
    pub async fn isolate_dead(&self) -> bool {
        self.handle.read().await.is_finished()
    }

    /// Replaces the isolate with a fresh instance feeding the same sink.
    pub async fn restart(&self) -> Result<(), PipelineError> {
        let mut guard = self.handle.write().await;
        // Re-check under the write lock: a concurrent caller may have
        // already swapped in a live isolate.
        if !guard.is_finished() {
            // The old instance is still running; an unresponsive-but-alive
            // isolate is shut down so its windows are flushed where possible.
            log::warn!("Restarting a still-running isolate");
        }
        let sink = ChannelSink::from_sender(self.sink_tx.clone());
        let fresh = pipeline::spawn(self.config.clone(), sink, Arc::clone(&self.metrics))?;
        let old = std::mem::replace(&mut *guard, fresh);
        drop(guard);

        // The old instance counts its own unflushed windows on the way out.
        old.shutdown().await;
        log::info!("Processing isolate restarted");
        Ok(())
    }

    /// Orderly stop of the current isolate.
    pub async fn shutdown(self) {
        self.handle.into_inner().shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            aggregation_window_ms: 50,
            buffer_capacity_per_source: 16,
            request_timeout_ms: 500,
            ..Default::default()
        }
    }

    fn reading(source: &str, ts: i64, value: f64) -> Reading {
        Reading {
            source_id: source.to_string(),
            timestamp_ms: ts,
            value,
            unit: "C".to_string(),
            quality: 100,
        }
    }

    #[tokio::test]
    async fn supervisor_survives_isolate_restart() {
        let metrics = Arc::new(PipelineMetrics::new());
        let (supervisor, _sink_rx) = PipelineSupervisor::new(fast_config(), metrics).unwrap();

        let now = chrono::Utc::now().timestamp_millis();
        supervisor.ingest(reading("s1", now, 1.0)).await.unwrap();
        assert!(!supervisor.isolate_dead().await);

        supervisor.restart().await.unwrap();
        assert!(!supervisor.isolate_dead().await);

        // The fresh isolate accepts traffic; old history is gone.
        supervisor.ingest(reading("s1", now + 100, 2.0)).await.unwrap();
        let err = supervisor.request_downsampled("missing", 5).await;
        assert!(matches!(err, Err(PipelineError::UnknownSource(_))));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn sink_receiver_survives_restart() {
        let metrics = Arc::new(PipelineMetrics::new());
        let (supervisor, mut sink_rx) = PipelineSupervisor::new(fast_config(), metrics).unwrap();

        supervisor.restart().await.unwrap();

        // Windows closed by the *new* isolate still arrive on the original
        // receiver.
        let now = chrono::Utc::now().timestamp_millis();
        let base = (now / 50) * 50 - 200;
        supervisor.ingest(reading("s1", base, 1.0)).await.unwrap();
        supervisor.ingest(reading("s1", base + 60, 2.0)).await.unwrap();

        let batch = tokio::time::timeout(std::time::Duration::from_secs(2), sink_rx.recv())
            .await
            .expect("no batch after restart")
            .expect("sink closed");
        assert_eq!(batch.source_id, "s1");

        supervisor.shutdown().await;
    }
}
