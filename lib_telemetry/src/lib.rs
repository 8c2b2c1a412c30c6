// Declare the modules to re-export
pub mod config;
pub mod core;
pub mod error;
pub mod loggers; // fern-based logging setup shared by agents and tests
pub mod metrics;
pub mod model;
pub mod transport;

// Re-export the types that cross crate boundaries
pub use config::{PipelineConfig, TransportConfig};
pub use error::PipelineError;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use model::{Aggregate, ConnectionState, Reading};
