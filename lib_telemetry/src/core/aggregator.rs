//! # Windowed Aggregator
//!
//! Converts raw readings into one `Aggregate` per (source, window) without
//! retaining the raw samples. Each source keeps a single open accumulator
//! (min/max/sum/count) and a fixed-capacity ring buffer of closed windows,
//! created lazily on the first reading for a new source id.
//!
//! Late arrivals whose window is strictly older than the open window are
//! dropped and counted — a closed window is immutable and is never
//! retroactively corrected.

use crate::config::PipelineConfig;
use crate::core::ring_buffer::RingBuffer;
use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::model::{Aggregate, Reading};
use std::collections::HashMap;
use std::sync::Arc;

/// In-flight accumulator for one not-yet-closed window.
#[derive(Debug)]
struct OpenWindow {
    window_start_ms: i64,
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl OpenWindow {
    fn new(window_start_ms: i64, value: f64) -> Self {
        Self {
            window_start_ms,
            min: value,
            max: value,
            sum: value,
            count: 1,
        }
    }

    fn accumulate(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    fn close(self, source_id: &str) -> Aggregate {
        Aggregate {
            source_id: source_id.to_string(),
            window_start_ms: self.window_start_ms,
            min: self.min,
            max: self.max,
            avg: self.sum / self.count as f64,
            sample_count: self.count,
        }
    }
}

#[derive(Debug)]
struct SourceState {
    open: Option<OpenWindow>,
    /// Start of the newest window ever closed for this source. Readings at
    /// or before it are late regardless of whether a window is open.
    last_closed_start: Option<i64>,
    history: RingBuffer<Aggregate>,
}

/// Per-source windowed aggregation with bounded history.
pub struct Aggregator {
    sources: HashMap<String, SourceState>,
    window_ms: i64,
    buffer_capacity: usize,
    metrics: Arc<PipelineMetrics>,
}

impl Aggregator {
    pub fn new(config: &PipelineConfig, metrics: Arc<PipelineMetrics>) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            sources: HashMap::new(),
            window_ms: config.aggregation_window_ms as i64,
            buffer_capacity: config.buffer_capacity_per_source,
            metrics,
        })
    }

    /// Folds one reading into its (source, window) accumulator.
    ///
    /// Returns the aggregate closed by this reading, if its arrival rolled
    /// the source over into a newer window. Malformed readings are rejected
    /// without touching any window's statistics.
    pub fn ingest(&mut self, reading: &Reading) -> Result<Option<Aggregate>, PipelineError> {
        if reading.source_id.is_empty() {
            self.metrics.record_malformed();
            return Err(PipelineError::MalformedReading(
                "empty source id".to_string(),
            ));
        }
        if !reading.value.is_finite() {
            self.metrics.record_malformed();
            return Err(PipelineError::MalformedReading(format!(
                "non-finite value for source '{}'",
                reading.source_id
            )));
        }

        let window_start = reading.timestamp_ms.div_euclid(self.window_ms) * self.window_ms;
        self.metrics.record_ingested();

        if !self.sources.contains_key(&reading.source_id) {
            // First reading for this source: allocate its history once.
            // Capacity was validated at construction, so this cannot fail.
            let history = RingBuffer::new(self.buffer_capacity)?;
            self.sources.insert(
                reading.source_id.clone(),
                SourceState {
                    open: None,
                    last_closed_start: None,
                    history,
                },
            );
        }
        let state = self
            .sources
            .get_mut(&reading.source_id)
            .expect("source state inserted above");

        // A straggler for an already-closed window must not re-open it, even
        // when the source currently has no open window (e.g. right after a
        // tick flushed it).
        if let Some(last_closed) = state.last_closed_start {
            if window_start <= last_closed {
                log::debug!(
                    "Late reading for '{}' dropped: window {} already closed",
                    reading.source_id,
                    window_start
                );
                self.metrics.record_late_drop();
                return Ok(None);
            }
        }

        let open_start = state.open.as_ref().map(|w| w.window_start_ms);
        match open_start {
            None => {
                state.open = Some(OpenWindow::new(window_start, reading.value));
                Ok(None)
            }
            Some(start) if start == window_start => {
                if let Some(open) = state.open.as_mut() {
                    open.accumulate(reading.value);
                }
                Ok(None)
            }
            Some(start) if window_start > start => {
                // Reading belongs to a newer window: close the current one.
                let closed = state
                    .open
                    .replace(OpenWindow::new(window_start, reading.value))
                    .map(|w| w.close(&reading.source_id));
                if let Some(agg) = &closed {
                    state.last_closed_start = Some(agg.window_start_ms);
                    state.history.push(agg.clone());
                    self.metrics.record_aggregates_emitted(1);
                }
                Ok(closed)
            }
            Some(start) => {
                // Out-of-order arrival for an already-closed window.
                log::debug!(
                    "Late reading for '{}' dropped: window {} < open window {}",
                    reading.source_id,
                    window_start,
                    start
                );
                self.metrics.record_late_drop();
                Ok(None)
            }
        }
    }

    /// Closes every open window whose end has passed, returning the emitted
    /// aggregates. Must be called at least once per window length even with
    /// no new readings, so idle sources still flush.
    pub fn tick(&mut self, now_ms: i64) -> Vec<Aggregate> {
        let mut closed = Vec::new();
        for (source_id, state) in self.sources.iter_mut() {
            let expired = state
                .open
                .as_ref()
                .map(|w| w.window_start_ms + self.window_ms <= now_ms)
                .unwrap_or(false);
            if expired {
                if let Some(open) = state.open.take() {
                    let agg = open.close(source_id);
                    state.last_closed_start = Some(agg.window_start_ms);
                    state.history.push(agg.clone());
                    closed.push(agg);
                }
            }
        }
        if !closed.is_empty() {
            self.metrics.record_aggregates_emitted(closed.len() as u64);
        }
        closed
    }

    /// Deep-copied snapshot of a source's closed-window history, oldest to
    /// newest. This is the only way data crosses the isolate boundary.
    pub fn snapshot(&self, source_id: &str) -> Option<Vec<Aggregate>> {
        self.sources.get(source_id).map(|s| s.history.get_all())
    }

    /// The newest `n` closed windows for a source.
    pub fn snapshot_last(&self, source_id: &str, n: usize) -> Option<Vec<Aggregate>> {
        self.sources.get(source_id).map(|s| s.history.get_last(n))
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Number of windows still open; lost if the isolate dies now.
    pub fn open_window_count(&self) -> usize {
        self.sources.values().filter(|s| s.open.is_some()).count()
    }

    /// Drops all per-source state, e.g. on session end. Buffers are removed
    /// entirely; the next reading for a source recreates its history.
    pub fn reset(&mut self) {
        self.sources.clear();
    }
}
