//! Data model shared across the pipeline: raw readings in, one-second
//! aggregates out, plus the transport connection state the UI observes.

use serde::{Deserialize, Serialize};

/// A single raw sample as delivered by the sensor/transport layer.
///
/// Immutable once decoded; consumed exactly once by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub source_id: String,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    pub value: f64,
    pub unit: String,
    /// Sample quality indicator, 0..=100.
    pub quality: u8,
}

/// One-second statistical summary of a source's readings.
///
/// Created when a window closes; immutable thereafter and owned by the
/// ring buffer for its `source_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub source_id: String,
    /// Window start, second-aligned, in milliseconds.
    pub window_start_ms: i64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub sample_count: u64,
}

/// Lifecycle of the upstream duplex connection.
///
/// `Disconnected` is terminal only after an explicit `close()`; a lost link
/// moves to `Reconnecting` and stays in the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_roundtrips_camel_case() {
        let json = r#"{"sourceId":"temp-01","timestampMs":1700000000123,"value":21.5,"unit":"C","quality":98}"#;
        let reading: Reading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.source_id, "temp-01");
        assert_eq!(reading.timestamp_ms, 1_700_000_000_123);
        assert_eq!(reading.quality, 98);

        let back = serde_json::to_value(&reading).unwrap();
        assert_eq!(back["sourceId"], "temp-01");
    }
}
