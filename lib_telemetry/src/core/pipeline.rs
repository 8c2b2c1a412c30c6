//! # Processing Isolate
//!
//! Hosts the aggregator and all ring buffers on a dedicated tokio task,
//! isolated from the transport and rendering paths. The task communicates
//! exclusively through its mailbox (a bounded mpsc of `PipelineCommand`) and
//! the `StateSink`; no shared mutable state is visible to callers, so a
//! burst of high-frequency readings can never stall whatever consumes the
//! sink.
//!
//! Closed windows are batched and flushed to the sink once per aggregation
//! window (~1 Hz with the default config), keeping per-source pushes
//! monotone in window start.

use crate::config::PipelineConfig;
use crate::core::aggregator::Aggregator;
use crate::core::downsample;
use crate::core::state_sink::{AggregatesReady, StateSink};
use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::model::{Aggregate, Reading};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Messages into the isolate. A closed tagged union, not an open-ended
/// payload shape.
#[derive(Debug)]
pub enum PipelineCommand {
    Ingest(Reading),
    RequestDownsampled {
        source_id: String,
        target_points: usize,
        responder: oneshot::Sender<Result<Vec<Aggregate>, PipelineError>>,
    },
    /// Drops all per-source state (e.g. session end).
    Reset,
    Shutdown,
}

/// Caller-side handle to a running isolate.
///
/// Explicitly constructed and passed by reference — never a module-level
/// singleton — so independent pipeline instances can coexist and tests get
/// clean lifecycles.
pub struct PipelineHandle {
    cmd_tx: mpsc::Sender<PipelineCommand>,
    join: JoinHandle<()>,
    request_timeout: Duration,
}

impl PipelineHandle {
    /// Feeds one reading into the isolate. Suspends the caller when the
    /// mailbox is full (bounded-memory backpressure) and fails only when the
    /// isolate has shut down.
    pub async fn ingest(&self, reading: Reading) -> Result<(), PipelineError> {
        self.cmd_tx
            .send(PipelineCommand::Ingest(reading))
            .await
            .map_err(|_| PipelineError::IsolateGone)
    }

    /// Requests a downsampled view of one source's history.
    ///
    /// Carries an implicit deadline: if the isolate does not answer within
    /// the configured request timeout it is reported as unresponsive, and
    /// the supervisor — not the caller — decides whether to restart it.
    pub async fn request_downsampled(
        &self,
        source_id: &str,
        target_points: usize,
    ) -> Result<Vec<Aggregate>, PipelineError> {
        let (responder, response) = oneshot::channel();
        self.cmd_tx
            .send(PipelineCommand::RequestDownsampled {
                source_id: source_id.to_string(),
                target_points,
                responder,
            })
            .await
            .map_err(|_| PipelineError::IsolateGone)?;

        match tokio::time::timeout(self.request_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PipelineError::IsolateGone),
            Err(_) => Err(PipelineError::IsolateUnresponsive(
                self.request_timeout.as_millis() as u64,
            )),
        }
    }

    /// Clears all per-source state without stopping the isolate.
    pub async fn reset(&self) -> Result<(), PipelineError> {
        self.cmd_tx
            .send(PipelineCommand::Reset)
            .await
            .map_err(|_| PipelineError::IsolateGone)
    }

    /// Requests an orderly stop: remaining open windows are flushed to the
    /// sink before the task exits.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(PipelineCommand::Shutdown).await;
        let _ = self.join.await;
    }

    /// True when the isolate task has stopped (panic or shutdown). The
    /// supervisor uses this to decide on a restart.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawns the processing isolate and returns its handle.
///
/// Fails fast on structural config mistakes (zero capacities).
pub fn spawn<S: StateSink>(
    config: PipelineConfig,
    sink: S,
    metrics: Arc<PipelineMetrics>,
) -> Result<PipelineHandle, PipelineError> {
    config.validate()?;
    let aggregator = Aggregator::new(&config, Arc::clone(&metrics))?;
    let (cmd_tx, cmd_rx) = mpsc::channel(config.mailbox_capacity);
    let request_timeout = config.request_timeout();

    let join = tokio::spawn(run(config, aggregator, sink, metrics, cmd_rx));

    Ok(PipelineHandle {
        cmd_tx,
        join,
        request_timeout,
    })
}

async fn run<S: StateSink>(
    config: PipelineConfig,
    mut aggregator: Aggregator,
    sink: S,
    metrics: Arc<PipelineMetrics>,
    mut cmd_rx: mpsc::Receiver<PipelineCommand>,
) {
    let mut flush_interval =
        tokio::time::interval(Duration::from_millis(config.aggregation_window_ms));
    flush_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Windows closed by ingest rollovers, held until the next flush tick so
    // sink pushes stay batched per source.
    let mut pending: HashMap<String, Vec<Aggregate>> = HashMap::new();

    log::info!(
        "Processing isolate started (window {}ms, {} entries/source)",
        config.aggregation_window_ms,
        config.buffer_capacity_per_source
    );

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(PipelineCommand::Ingest(reading)) => {
                        match aggregator.ingest(&reading) {
                            Ok(Some(closed)) => {
                                pending.entry(closed.source_id.clone()).or_default().push(closed);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                // Counted by the aggregator; one bad reading
                                // must never halt the stream.
                                log::debug!("Reading rejected: {}", e);
                            }
                        }
                    }
                    Some(PipelineCommand::RequestDownsampled { source_id, target_points, responder }) => {
                        let result = match aggregator.snapshot(&source_id) {
                            Some(series) => downsample::downsample(&series, target_points),
                            None => Err(PipelineError::UnknownSource(source_id)),
                        };
                        // A dropped responder just means the caller timed out.
                        let _ = responder.send(result);
                    }
                    Some(PipelineCommand::Reset) => {
                        aggregator.reset();
                        pending.clear();
                        log::info!("Pipeline state reset");
                    }
                    Some(PipelineCommand::Shutdown) | None => {
                        break;
                    }
                }
            }
            _ = flush_interval.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                for closed in aggregator.tick(now_ms) {
                    pending.entry(closed.source_id.clone()).or_default().push(closed);
                }
                flush_pending(&sink, &mut pending);
            }
        }
    }

    // Orderly exit: flush whatever is closable right now. Still-open windows
    // whose end has not passed are lost and counted, never fabricated.
    let now_ms = chrono::Utc::now().timestamp_millis();
    for closed in aggregator.tick(now_ms) {
        pending.entry(closed.source_id.clone()).or_default().push(closed);
    }
    flush_pending(&sink, &mut pending);
    let lost = aggregator.open_window_count();
    if lost > 0 {
        metrics.record_lost_windows(lost as u64);
        log::warn!("Isolate stopping with {} unflushed open windows", lost);
    }
    log::info!("Processing isolate stopped");
}

fn flush_pending<S: StateSink>(sink: &S, pending: &mut HashMap<String, Vec<Aggregate>>) {
    for (source_id, mut aggregates) in pending.drain() {
        aggregates.sort_by_key(|a| a.window_start_ms);
        sink.publish(AggregatesReady {
            source_id,
            aggregates,
        });
    }
}
