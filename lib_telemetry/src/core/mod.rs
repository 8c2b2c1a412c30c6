//! Core pipeline components: bounded storage, windowed aggregation,
//! downsampling and the processing isolate that hosts them.

pub mod aggregator;
pub mod downsample;
pub mod pipeline;
pub mod ring_buffer;
pub mod state_sink;

pub use aggregator::Aggregator;
pub use pipeline::{spawn, PipelineCommand, PipelineHandle};
pub use ring_buffer::RingBuffer;
pub use state_sink::{AggregatesReady, ChannelSink, StateSink};
