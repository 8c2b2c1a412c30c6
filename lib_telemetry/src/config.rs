//! Configuration for the pipeline and transport, with the defaults the
//! engine ships with. Structural mistakes (zero capacities) fail fast here
//! instead of surfacing later as runtime misbehavior.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for aggregation and buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Ring buffer capacity per source. 300 entries keeps five minutes of
    /// history at one aggregate per second.
    pub buffer_capacity_per_source: usize,
    /// Aggregation window length in milliseconds.
    pub aggregation_window_ms: u64,
    /// Mailbox depth of the processing isolate.
    pub mailbox_capacity: usize,
    /// Deadline for `RequestDownsampled` round trips.
    pub request_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity_per_source: 300,
            aggregation_window_ms: 1000,
            mailbox_capacity: 1024,
            request_timeout_ms: 2000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.buffer_capacity_per_source == 0 || self.mailbox_capacity == 0 {
            return Err(PipelineError::InvalidCapacity);
        }
        if self.aggregation_window_ms == 0 {
            return Err(PipelineError::InvalidCapacity);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Tuning knobs for the upstream WebSocket connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportConfig {
    /// Upstream WebSocket URL.
    pub ws_url: String,
    /// Deadline for one connect attempt (TCP + WebSocket handshake).
    pub connect_timeout_ms: u64,
    /// Interval between heartbeat pings while connected.
    pub heartbeat_interval_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Randomized variance applied to each reconnect delay, 0.0..1.0.
    pub reconnect_jitter_fraction: f64,
    /// Bounded outbound queue depth; overflow drops the oldest entry.
    pub outbound_queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://localhost:9003/ws".to_string(),
            connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30_000,
            reconnect_jitter_fraction: 0.2,
            outbound_queue_capacity: 64,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.outbound_queue_capacity == 0 {
            return Err(PipelineError::InvalidCapacity);
        }
        if self.heartbeat_interval_ms == 0
            || self.reconnect_base_delay_ms == 0
            || self.connect_timeout_ms == 0
        {
            return Err(PipelineError::InvalidCapacity);
        }
        let parsed = url::Url::parse(&self.ws_url)
            .map_err(|e| PipelineError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(()),
            other => Err(PipelineError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                other
            ))),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// A "green" connected state must never outlive actual link loss by more
    /// than twice the heartbeat interval.
    pub fn silent_failure_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms * 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipping_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.buffer_capacity_per_source, 300);
        assert_eq!(cfg.aggregation_window_ms, 1000);
        assert!(cfg.validate().is_ok());

        let tcfg = TransportConfig::default();
        assert_eq!(tcfg.heartbeat_interval_ms, 30_000);
        assert_eq!(tcfg.connect_timeout(), Duration::from_secs(10));
        assert_eq!(tcfg.silent_failure_timeout(), Duration::from_secs(60));
        assert!(tcfg.validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let cfg = PipelineConfig {
            buffer_capacity_per_source: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(crate::error::PipelineError::InvalidCapacity)
        ));
    }

    #[test]
    fn non_websocket_url_rejected() {
        let cfg = TransportConfig {
            ws_url: "https://example.com/ws".to_string(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidUrl(_))));

        let cfg = TransportConfig {
            ws_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(PipelineError::InvalidUrl(_))));
    }

    #[test]
    fn config_file_fields_are_camel_case() {
        let json = r#"{"bufferCapacityPerSource":120,"aggregationWindowMs":500}"#;
        let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.buffer_capacity_per_source, 120);
        assert_eq!(cfg.aggregation_window_ms, 500);
        // Unspecified fields fall back to defaults.
        assert_eq!(cfg.mailbox_capacity, 1024);
    }
}
