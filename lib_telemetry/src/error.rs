use thiserror::Error;

/// Error taxonomy for the telemetry pipeline.
///
/// Per-item failures (`MalformedReading`) are counted and skipped, never
/// propagated across the isolate boundary. Structural errors
/// (`InvalidCapacity`, `InvalidTargetPoints`) are configuration mistakes and
/// fail fast at construction/call time.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ring buffer capacity must be greater than zero")]
    InvalidCapacity,

    #[error("downsample target must be at least 3 points, got {0}")]
    InvalidTargetPoints(usize),

    #[error("malformed reading rejected: {0}")]
    MalformedReading(String),

    #[error("connection to upstream lost")]
    ConnectionLost,

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),

    #[error("no inbound traffic for {silent_for_ms}ms (threshold {threshold_ms}ms)")]
    HeartbeatTimeout {
        silent_for_ms: u64,
        threshold_ms: u64,
    },

    #[error("outbound queue full, oldest message dropped")]
    OutboundQueueOverflow,

    #[error("processing isolate did not respond within {0}ms")]
    IsolateUnresponsive(u64),

    #[error("processing isolate has shut down")]
    IsolateGone,

    #[error("unknown source id: {0}")]
    UnknownSource(String),
}
