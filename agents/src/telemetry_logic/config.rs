use clap::Parser;
use lib_telemetry::{PipelineConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "ReTelem telemetry ingestion agent", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "RETELEM_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "RETELEM_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "RETELEM_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "RETELEM_WS_URL", help = "Upstream telemetry WebSocket URL.")]
    pub ws_url: Option<String>,

    #[clap(long, env = "RETELEM_CONNECT_TIMEOUT_MS", help = "Deadline in milliseconds for one upstream connect attempt.")]
    pub connect_timeout_ms: Option<u64>,

    #[clap(long, env = "RETELEM_BUFFER_CAPACITY", help = "Ring buffer capacity per source.")]
    pub buffer_capacity_per_source: Option<usize>,

    #[clap(long, env = "RETELEM_WINDOW_MS", help = "Aggregation window length in milliseconds.")]
    pub aggregation_window_ms: Option<u64>,

    #[clap(long, env = "RETELEM_HEARTBEAT_INTERVAL_MS", help = "Heartbeat interval in milliseconds while connected.")]
    pub heartbeat_interval_ms: Option<u64>,

    #[clap(long, env = "RETELEM_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for upstream reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "RETELEM_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for upstream reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "RETELEM_RECONNECT_JITTER", help = "Jitter fraction applied to reconnect delays (0.0 to 1.0).")]
    pub reconnect_jitter_fraction: Option<f64>,

    #[clap(long, env = "RETELEM_OUTBOUND_QUEUE_CAPACITY", help = "Capacity of the outbound control message queue.")]
    pub outbound_queue_capacity: Option<usize>,

    #[clap(long, env = "RETELEM_METRICS_INTERVAL_SECONDS", help = "Interval in seconds between metrics log lines.")]
    pub metrics_interval_seconds: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            ws_url: other.ws_url.or(self.ws_url),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            buffer_capacity_per_source: other
                .buffer_capacity_per_source
                .or(self.buffer_capacity_per_source),
            aggregation_window_ms: other.aggregation_window_ms.or(self.aggregation_window_ms),
            heartbeat_interval_ms: other.heartbeat_interval_ms.or(self.heartbeat_interval_ms),
            reconnect_base_delay_ms: other
                .reconnect_base_delay_ms
                .or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            reconnect_jitter_fraction: other
                .reconnect_jitter_fraction
                .or(self.reconnect_jitter_fraction),
            outbound_queue_capacity: other
                .outbound_queue_capacity
                .or(self.outbound_queue_capacity),
            metrics_interval_seconds: other
                .metrics_interval_seconds
                .or(self.metrics_interval_seconds),
        }
    }

    /// The library-side pipeline config with defaults applied.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            buffer_capacity_per_source: self
                .buffer_capacity_per_source
                .unwrap_or(defaults.buffer_capacity_per_source),
            aggregation_window_ms: self
                .aggregation_window_ms
                .unwrap_or(defaults.aggregation_window_ms),
            ..defaults
        }
    }

    /// The library-side transport config with defaults applied.
    pub fn transport_config(&self) -> TransportConfig {
        let defaults = TransportConfig::default();
        TransportConfig {
            ws_url: self.ws_url.clone().unwrap_or(defaults.ws_url),
            connect_timeout_ms: self
                .connect_timeout_ms
                .unwrap_or(defaults.connect_timeout_ms),
            heartbeat_interval_ms: self
                .heartbeat_interval_ms
                .unwrap_or(defaults.heartbeat_interval_ms),
            reconnect_base_delay_ms: self
                .reconnect_base_delay_ms
                .unwrap_or(defaults.reconnect_base_delay_ms),
            reconnect_max_delay_ms: self
                .reconnect_max_delay_ms
                .unwrap_or(defaults.reconnect_max_delay_ms),
            reconnect_jitter_fraction: self
                .reconnect_jitter_fraction
                .unwrap_or(defaults.reconnect_jitter_fraction),
            outbound_queue_capacity: self
                .outbound_queue_capacity
                .unwrap_or(defaults.outbound_queue_capacity),
        }
    }
}

pub fn load_config() -> Config {
    // 1. Load defaults
    let default_config = Config {
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        metrics_interval_seconds: Some(60),
        ..Default::default()
    };

    // 2. Load from config file (agent_telemetry.conf) if present.
    //    Allow overriding default config file path with CLI arg.
    let cli_args_for_path = Config::parse();

    let config_file_path = cli_args_for_path
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("agent_telemetry.conf"));

    let mut current_config = default_config;

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!(
                    "Failed to parse config file: {}. Falling back to other sources.",
                    config_file_path.display()
                );
            }
        } else {
            log::warn!(
                "Failed to read config file: {}. Falling back to other sources.",
                config_file_path.display()
            );
        }
    }

    // 3. Override with environment variables and CLI arguments
    //    clap::Parser automatically handles env vars and CLI args.
    let cli_args_final = Config::parse();
    current_config.merge(cli_args_final)
}
