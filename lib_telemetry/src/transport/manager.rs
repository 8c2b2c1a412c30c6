//! # Transport Manager
//!
//! Resilient duplex WebSocket connection with reconnect/backoff, heartbeat
//! and outbound queuing. The run loop owns the socket on its own task; the
//! rest of the system talks to it through a `TransportHandle`.
//!
//! The single most important correctness property lives in the watchdog: a
//! "green" `Connected` state must never persist longer than twice the
//! heartbeat interval past actual link loss. Absence of *any* inbound frame
//! (data, pong, anything) for that long is treated as a silent failure and
//! forces a reconnect, even though the socket never reported an error.
//!
//! Framing and encoding of payloads are the caller's concern: outbound
//! messages are opaque bytes, inbound frames are handed off undecoded.

use crate::config::TransportConfig;
use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::model::ConnectionState;
use crate::transport::backoff::Backoff;
use crate::transport::queue::OutboundQueue;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;

/// Undecoded frame from the upstream, handed to the wire-protocol layer.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

enum ConnectAttempt {
    Connected(Box<WsStream>),
    Failed,
    Cancelled,
}

/// Caller-side handle: fire-and-forget sends, observable connection state,
/// explicit close.
#[derive(Clone)]
pub struct TransportHandle {
    outbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Queues a message for the upstream. Transmitted immediately while
    /// connected, otherwise held in the bounded outbound queue and flushed
    /// on reconnect. Connection failures are never surfaced here; they only
    /// show up as `ConnectionState` changes and drop counters.
    pub fn send(&self, message: Vec<u8>) {
        // Failure means the manager task is gone, which only happens after
        // close(); the message is intentionally discarded then.
        let _ = self.outbound_tx.send(message);
    }

    /// Current connection state (poll style).
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Subscription to state changes (watch style) for UI indicators.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Cancels any pending reconnect and moves to terminal `Disconnected`.
    /// The outbound queue is cleared.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Connection lifecycle state machine. Constructed with `new`, driven by
/// `run` on a dedicated task.
pub struct TransportManager {
    config: TransportConfig,
    metrics: Arc<PipelineMetrics>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    queue: OutboundQueue,
    backoff: Backoff,
}

impl TransportManager {
    /// Creates the manager and its handle. `inbound_tx` receives every
    /// data-bearing frame; decode happens on the receiving side.
    pub fn new(
        config: TransportConfig,
        inbound_tx: mpsc::Sender<InboundFrame>,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<(Self, TransportHandle), PipelineError> {
        config.validate()?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        let queue = OutboundQueue::new(config.outbound_queue_capacity);
        let backoff = Backoff::new(
            config.reconnect_base_delay_ms,
            config.reconnect_max_delay_ms,
            config.reconnect_jitter_fraction,
        );

        let handle = TransportHandle {
            outbound_tx,
            state_rx,
            cancel: cancel.clone(),
        };

        Ok((
            Self {
                config,
                metrics,
                inbound_tx,
                outbound_rx,
                state_tx,
                cancel,
                queue,
                backoff,
            },
            handle,
        ))
    }

    /// Primary execution loop with reconnection logic. Returns only after
    /// `close()` on the handle.
    pub async fn run(mut self) {
        let mut first_attempt = true;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(if first_attempt {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            first_attempt = false;

            log::info!("Connecting to upstream: {}", self.config.ws_url);
            match self.attempt_connect().await {
                ConnectAttempt::Cancelled => break,
                ConnectAttempt::Connected(ws_stream) => {
                    log::info!("Connected to upstream");
                    self.set_state(ConnectionState::Connected);
                    self.backoff.reset();

                    let session_over = self.drive_connection(*ws_stream).await;
                    if session_over {
                        break; // close() requested
                    }
                    self.set_state(ConnectionState::Reconnecting);
                    self.metrics.record_reconnect();
                }
                ConnectAttempt::Failed => {
                    self.set_state(ConnectionState::Reconnecting);
                }
            }

            if self.wait_backoff().await {
                break; // close() during the wait
            }
        }

        // Terminal: explicit close. Pending reconnects are cancelled above;
        // queued messages are discarded.
        self.queue.clear();
        self.set_state(ConnectionState::Disconnected);
        log::info!("Transport closed");
    }

    /// One connect attempt, bounded by the configured timeout and
    /// interruptible by `close()`. A TCP connect to an unroutable host can
    /// otherwise hang for minutes with the token ignored. Outbound sends
    /// arriving meanwhile land in the bounded queue, same as during the
    /// backoff wait.
    async fn attempt_connect(&mut self) -> ConnectAttempt {
        let request = self.config.ws_url.clone();
        let connect = connect_async(request);
        tokio::pin!(connect);
        let deadline = tokio::time::sleep(self.config.connect_timeout());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return ConnectAttempt::Cancelled,
                result = &mut connect => {
                    return match result {
                        Ok((ws_stream, _)) => ConnectAttempt::Connected(Box::new(ws_stream)),
                        Err(e) => {
                            log::error!("Failed to connect to upstream: {}", e);
                            ConnectAttempt::Failed
                        }
                    };
                }
                _ = &mut deadline => {
                    log::error!(
                        "Connect attempt timed out after {}ms",
                        self.config.connect_timeout_ms
                    );
                    return ConnectAttempt::Failed;
                }
                Some(message) = self.outbound_rx.recv() => {
                    if self.queue.push(message) {
                        self.metrics.record_outbound_drop();
                        log::debug!("{}", PipelineError::OutboundQueueOverflow);
                    }
                }
            }
        }
    }

    /// Runs one connected session. Returns true when the session ended
    /// because of `close()`, false when the link should be re-established.
    async fn drive_connection(&mut self, ws_stream: WsStream) -> bool {
        let (mut write, mut read) = ws_stream.split();

        // Flush the backlog accumulated while disconnected, FIFO.
        for message in self.queue.drain() {
            if let Err(e) = write.send(Message::Binary(message.into())).await {
                log::error!("Failed to flush outbound backlog: {}", e);
                return false;
            }
        }

        let mut last_activity = Instant::now();
        let silent_failure_timeout = self.config.silent_failure_timeout();

        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Watchdog granularity: fine enough to honor the 2x-interval bound
        // even for short test intervals, capped at one second.
        let watchdog_period = Duration::from_millis(self.config.heartbeat_interval_ms.min(1000));
        let mut watchdog = tokio::time::interval(watchdog_period);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.close().await;
                    return true;
                }
                Some(message) = self.outbound_rx.recv() => {
                    if let Err(e) = write.send(Message::Binary(message.clone().into())).await {
                        log::error!("Outbound send failed: {}", e);
                        // Keep the command for the next session.
                        if self.queue.push(message) {
                            self.metrics.record_outbound_drop();
                            log::debug!("{}", PipelineError::OutboundQueueOverflow);
                        }
                        return false;
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            if self.inbound_tx.send(InboundFrame::Text(text.to_string())).await.is_err() {
                                log::warn!("Inbound consumer gone; closing transport");
                                return true;
                            }
                        }
                        Some(Ok(Message::Binary(bin))) => {
                            last_activity = Instant::now();
                            if self.inbound_tx.send(InboundFrame::Binary(bin.to_vec())).await.is_err() {
                                log::warn!("Inbound consumer gone; closing transport");
                                return true;
                            }
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                            // Heartbeat traffic counts as liveness so we don't
                            // reconnect during low data volume.
                            last_activity = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) => {
                            log::warn!("Upstream sent close frame");
                            return false;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::error!("Upstream read error: {}", e);
                            return false;
                        }
                        None => {
                            log::warn!("{}: stream closed by remote host", PipelineError::ConnectionLost);
                            return false;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                        log::error!("Heartbeat send failed: {}", e);
                        return false;
                    }
                }
                _ = watchdog.tick() => {
                    // Detects "zombie" connections: TCP up, nothing flowing.
                    let silent_for = last_activity.elapsed();
                    if silent_for > silent_failure_timeout {
                        let err = PipelineError::HeartbeatTimeout {
                            silent_for_ms: silent_for.as_millis() as u64,
                            threshold_ms: silent_failure_timeout.as_millis() as u64,
                        };
                        log::warn!("{}. Reconnecting...", err);
                        self.metrics.record_heartbeat_timeout();
                        return false;
                    }
                }
            }
        }
    }

    /// Sleeps out the backoff delay while still accepting outbound sends
    /// into the bounded queue. Returns true when cancelled.
    async fn wait_backoff(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        log::info!(
            "Reconnect attempt {} in {}ms",
            self.backoff.attempt(),
            delay.as_millis()
        );
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return true,
                _ = &mut sleep => return false,
                Some(message) = self.outbound_rx.recv() => {
                    if self.queue.push(message) {
                        self.metrics.record_outbound_drop();
                        log::debug!("{}", PipelineError::OutboundQueueOverflow);
                    }
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            log::info!("Connection state -> {}", state.as_str());
        }
        let _ = self.state_tx.send(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(url: &str) -> TransportConfig {
        TransportConfig {
            ws_url: url.to_string(),
            connect_timeout_ms: 2_000,
            heartbeat_interval_ms: 100,
            reconnect_base_delay_ms: 50,
            reconnect_max_delay_ms: 200,
            reconnect_jitter_fraction: 0.0,
            outbound_queue_capacity: 4,
        }
    }

    /// Accepts TCP connections but never answers the WebSocket handshake,
    /// so `connect_async` stays in flight until the caller gives up.
    fn unresponsive_server(listener: tokio::net::TcpListener) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                held.push(stream);
            }
        })
    }

    async fn loopback_server() -> (std::net::SocketAddr, tokio::net::TcpListener) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (addr, listener)
    }

    #[tokio::test]
    async fn unreachable_upstream_moves_to_reconnecting() {
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let metrics = Arc::new(PipelineMetrics::new());
        // Nothing listens on this port.
        let config = test_config("ws://127.0.0.1:1/ws");
        let (manager, handle) = TransportManager::new(config, inbound_tx, metrics).unwrap();
        let task = tokio::spawn(manager.run());

        let mut state_rx = handle.subscribe_state();
        let deadline = Duration::from_secs(2);
        let reached = tokio::time::timeout(deadline, async {
            loop {
                if *state_rx.borrow() == ConnectionState::Reconnecting {
                    break;
                }
                state_rx.changed().await.unwrap();
            }
        })
        .await;
        assert!(reached.is_ok(), "never entered Reconnecting");

        handle.close();
        let _ = task.await;
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn queued_messages_flush_on_connect() {
        let (addr, listener) = loopback_server().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut received = Vec::new();
            while received.len() < 2 {
                match ws.next().await {
                    Some(Ok(Message::Binary(b))) => received.push(b.to_vec()),
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
            received
        });

        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let metrics = Arc::new(PipelineMetrics::new());
        let config = test_config(&format!("ws://{}/", addr));
        let (manager, handle) = TransportManager::new(config, inbound_tx, metrics).unwrap();

        // Sent before run(): must be queued and flushed FIFO on connect.
        handle.send(b"first".to_vec());
        handle.send(b"second".to_vec());
        let task = tokio::spawn(manager.run());

        let received = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, vec![b"first".to_vec(), b"second".to_vec()]);

        handle.close();
        let _ = task.await;
    }

    #[tokio::test]
    async fn silent_connection_times_out_within_two_intervals() {
        let (addr, listener) = loopback_server().await;
        // Accept the WebSocket handshake, then go silent without closing.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(ws);
        });

        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let metrics = Arc::new(PipelineMetrics::new());
        let config = test_config(&format!("ws://{}/", addr));
        let (manager, handle) = TransportManager::new(config, inbound_tx, Arc::clone(&metrics)).unwrap();
        let task = tokio::spawn(manager.run());

        let mut state_rx = handle.subscribe_state();
        // Wait for Connected first.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *state_rx.borrow() == ConnectionState::Connected {
                    break;
                }
                state_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("never connected");

        // Silence threshold is 200ms; allow generous slack for CI.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                state_rx.changed().await.unwrap();
                if *state_rx.borrow() == ConnectionState::Reconnecting {
                    break;
                }
            }
        })
        .await
        .expect("silent link never detected");

        assert!(metrics.snapshot().heartbeat_timeouts >= 1);

        handle.close();
        let _ = task.await;
        server.abort();
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let metrics = Arc::new(PipelineMetrics::new());
        let config = test_config("ws://127.0.0.1:1/ws");
        let (manager, handle) = TransportManager::new(config, inbound_tx, metrics).unwrap();
        let task = tokio::spawn(manager.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.close();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("run() did not exit after close()")
            .unwrap();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_interrupts_a_hanging_connect() {
        let (addr, listener) = loopback_server().await;
        let server = unresponsive_server(listener);

        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let metrics = Arc::new(PipelineMetrics::new());
        // Deadline far beyond the test horizon: only close() can end this.
        let mut config = test_config(&format!("ws://{}/", addr));
        config.connect_timeout_ms = 60_000;
        let (manager, handle) = TransportManager::new(config, inbound_tx, metrics).unwrap();
        let task = tokio::spawn(manager.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.state(), ConnectionState::Connecting);
        handle.close();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("close() did not interrupt the connect attempt")
            .unwrap();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        server.abort();
    }

    #[tokio::test]
    async fn connect_timeout_counts_as_failed_attempt() {
        let (addr, listener) = loopback_server().await;
        let server = unresponsive_server(listener);

        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let metrics = Arc::new(PipelineMetrics::new());
        let mut config = test_config(&format!("ws://{}/", addr));
        config.connect_timeout_ms = 100;
        let (manager, handle) = TransportManager::new(config, inbound_tx, metrics).unwrap();
        let task = tokio::spawn(manager.run());

        let mut state_rx = handle.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *state_rx.borrow() == ConnectionState::Reconnecting {
                    break;
                }
                state_rx.changed().await.unwrap();
            }
        })
        .await
        .expect("handshake stall never treated as a failed attempt");

        handle.close();
        let _ = task.await;
        server.abort();
    }

    #[tokio::test]
    async fn sends_during_connect_attempt_stay_bounded() {
        let (addr, listener) = loopback_server().await;
        let server = unresponsive_server(listener);

        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let metrics = Arc::new(PipelineMetrics::new());
        // Queue capacity is 4; the connect attempt outlives the whole test.
        let mut config = test_config(&format!("ws://{}/", addr));
        config.connect_timeout_ms = 60_000;
        let (manager, handle) =
            TransportManager::new(config, inbound_tx, Arc::clone(&metrics)).unwrap();
        let task = tokio::spawn(manager.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        for i in 0..6u8 {
            handle.send(vec![i]);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Two evictions: six sends into a queue of four, oldest dropped.
        assert_eq!(metrics.snapshot().outbound_dropped, 2);

        handle.close();
        let _ = task.await;
        server.abort();
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let metrics = Arc::new(PipelineMetrics::new());
        let config = TransportConfig {
            outbound_queue_capacity: 0,
            ..Default::default()
        };
        let result = TransportManager::new(config, inbound_tx, metrics);
        assert!(matches!(result, Err(PipelineError::InvalidCapacity)));
    }
}
