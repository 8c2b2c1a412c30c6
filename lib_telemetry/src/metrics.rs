//! # Pipeline Metrics
//!
//! Lock-free counters shared across the pipeline tasks. The counters exist so
//! that per-item losses (late readings, malformed frames, dropped outbound
//! commands) are *observable* rather than silent: the UI layer can surface a
//! "degraded" indicator from a snapshot without any error ever crossing the
//! isolate boundary.
//!
//! All counters use `AtomicU64` with `Ordering::Relaxed` — we only care about
//! the eventual consistency of each counter itself, not about ordering other
//! memory operations around the updates.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counter block for one pipeline instance.
///
/// Held behind an `Arc` by the aggregator, the transport manager and the
/// supervising agent; incremented from any task without locking.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    readings_ingested: AtomicU64,
    late_dropped: AtomicU64,
    malformed_rejected: AtomicU64,
    aggregates_emitted: AtomicU64,
    outbound_dropped: AtomicU64,
    reconnects: AtomicU64,
    heartbeat_timeouts: AtomicU64,
    lost_windows: AtomicU64,
}

/// Point-in-time copy of all counters, safe to send to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub readings_ingested: u64,
    pub late_dropped: u64,
    pub malformed_rejected: u64,
    pub aggregates_emitted: u64,
    pub outbound_dropped: u64,
    pub reconnects: u64,
    pub heartbeat_timeouts: u64,
    pub lost_windows: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_ingested(&self) {
        self.readings_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_drop(&self) {
        self.late_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aggregates_emitted(&self, n: u64) {
        self.aggregates_emitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_outbound_drop(&self) {
        self.outbound_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Windows lost when an isolate instance dies before flushing. Never
    /// fabricated into aggregates; only counted.
    pub fn record_lost_windows(&self, n: u64) {
        self.lost_windows.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_ingested: self.readings_ingested.load(Ordering::Relaxed),
            late_dropped: self.late_dropped.load(Ordering::Relaxed),
            malformed_rejected: self.malformed_rejected.load(Ordering::Relaxed),
            aggregates_emitted: self.aggregates_emitted.load(Ordering::Relaxed),
            outbound_dropped: self.outbound_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
            lost_windows: self.lost_windows.load(Ordering::Relaxed),
        }
    }
}
