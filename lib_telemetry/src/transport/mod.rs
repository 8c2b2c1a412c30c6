//! Upstream connectivity: the reconnecting WebSocket manager, its backoff
//! schedule and the bounded outbound queue.

pub mod backoff;
pub mod manager;
pub mod queue;

pub use backoff::Backoff;
pub use manager::{InboundFrame, TransportHandle, TransportManager};
pub use queue::OutboundQueue;
