//! # State Sink
//!
//! The hand-off boundary the processing isolate writes aggregates into. The
//! core only ever pushes; it never reads back from consumers, so the UI (or
//! any other consumer) cannot stall the pipeline by holding state.

use crate::model::Aggregate;
use tokio::sync::mpsc;

/// Batch of closed windows for one source, pushed at ~1 Hz.
///
/// Batches for a given source are monotonically increasing in
/// `window_start_ms`.
#[derive(Debug, Clone)]
pub struct AggregatesReady {
    pub source_id: String,
    pub aggregates: Vec<Aggregate>,
}

/// Write-only boundary between the isolate and the external consumer.
pub trait StateSink: Send + 'static {
    /// Hands a batch of freshly closed aggregates to the consumer. Must not
    /// block; a slow or vanished consumer is the consumer's problem.
    fn publish(&self, batch: AggregatesReady);
}

/// Channel-backed sink: batches flow into an unbounded mpsc the consumer
/// drains at its own pace.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AggregatesReady>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AggregatesReady>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Wraps an existing sender, so a respawned isolate keeps feeding the
    /// same consumer.
    pub fn from_sender(tx: mpsc::UnboundedSender<AggregatesReady>) -> Self {
        Self { tx }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AggregatesReady> {
        self.tx.clone()
    }
}

impl StateSink for ChannelSink {
    fn publish(&self, batch: AggregatesReady) {
        // A closed receiver means the consumer is gone; the pipeline keeps
        // running and the batch is simply discarded.
        if self.tx.send(batch).is_err() {
            log::debug!("State sink consumer disconnected; batch discarded");
        }
    }
}
