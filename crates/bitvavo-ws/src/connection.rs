//! WebSocket connection manager.
//!
//! Handles connection lifecycle, automatic reconnection with exponential
//! backoff, and the single reader/writer pair around the socket. Inbound
//! frames go to [`WsClient::handle_frame`]; queued control messages are
//! written in enqueue order.

use crate::client::WsClient;
use crate::config::WsConfig;
use crate::error::{WsError, WsResult};
use crate::heartbeat::HeartbeatManager;
use crate::outbound::OutboundReceiver;
use bitvavo_telemetry::Metrics;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Transport state as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Owns the socket and the outbound receiver for the lifetime of the client.
pub struct ConnectionManager {
    config: WsConfig,
    client: Arc<WsClient>,
    state: RwLock<ConnectionState>,
    heartbeat: HeartbeatManager,
    /// Consecutive failed sessions; reset on every successful connect.
    failed_sessions: AtomicU32,
    /// Consumed by the message loop; one writer at a time.
    outbound_rx: TokioMutex<OutboundReceiver>,
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    pub fn new(client: Arc<WsClient>, outbound_rx: OutboundReceiver) -> Self {
        let config = client.config().clone();
        Self {
            heartbeat: HeartbeatManager::new(
                config.heartbeat_interval_ms,
                config.heartbeat_timeout_ms,
            ),
            config,
            client,
            state: RwLock::new(ConnectionState::Disconnected),
            failed_sessions: AtomicU32::new(0),
            outbound_rx: TokioMutex::new(outbound_rx),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn client(&self) -> &Arc<WsClient> {
        &self.client
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn reconnect_count(&self) -> u32 {
        self.failed_sessions.load(Ordering::Relaxed)
    }

    /// Stop the connection loop.
    ///
    /// Queued control messages are flushed and a Close frame is sent before
    /// the loop exits.
    pub fn shutdown(&self) {
        info!("Stopping Bitvavo connection");
        self.shutdown_token.cancel();
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(?previous, current = ?state, "Connection state changed");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and run until shutdown or until reconnection attempts run out.
    pub async fn run(&self) -> WsResult<()> {
        loop {
            if self.is_shutdown() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("Bitvavo session ended");
                    "closed"
                }
                Err(e) => {
                    error!(error = %e, "Bitvavo session failed");
                    disconnect_reason(&e)
                }
            };
            Metrics::ws_disconnected();
            self.client.on_disconnected();

            if self.is_shutdown() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            let attempt = self.failed_sessions.fetch_add(1, Ordering::Relaxed) + 1;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                self.set_state(ConnectionState::Disconnected);
                return Err(WsError::ConnectionFailed(format!(
                    "gave up after {attempt} attempts"
                )));
            }

            self.set_state(ConnectionState::Reconnecting);
            Metrics::ws_reconnect(reason);

            let delay = backoff_delay(
                self.config.reconnect_base_delay_ms,
                self.config.reconnect_max_delay_ms,
                attempt,
            );
            warn!(attempt, delay_ms = delay.as_millis() as u64, reason, "Reconnecting to Bitvavo");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> WsResult<()> {
        debug!(url = %self.config.url, "Opening socket");

        let (socket, _) = connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut sink, mut frames) = socket.split();

        self.set_state(ConnectionState::Connected);
        self.failed_sessions.store(0, Ordering::Relaxed);
        Metrics::ws_connected();
        info!(url = %self.config.url, "Connected to Bitvavo");

        let mut outbound_rx = self.outbound_rx.lock().await;

        // Messages queued while disconnected are superseded by the replay.
        let stale = outbound_rx.drain();
        if stale > 0 {
            debug!(stale, "Discarded control messages queued while disconnected");
        }
        self.client.on_reconnected()?;
        self.heartbeat.reset();

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    let mut flushed = 0usize;
                    while let Some(msg) = outbound_rx.try_recv() {
                        sink.send(Message::Text(msg.to_json()?)).await?;
                        flushed += 1;
                    }
                    debug!(flushed, "Flushed control messages before close");
                    if let Err(e) = sink.send(Message::Close(None)).await {
                        warn!(error = %e, "Close frame not sent");
                    }
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }

                frame = frames.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.heartbeat.record_activity();
                            self.client.handle_frame(&text);
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.heartbeat.record_activity();
                            match std::str::from_utf8(&data) {
                                Ok(text) => {
                                    self.client.handle_frame(text);
                                }
                                Err(e) => warn!(error = %e, "Non UTF-8 binary frame, dropped"),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.heartbeat.record_activity();
                            sink.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            self.heartbeat.record_pong();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = match frame {
                                Some(close) => (u16::from(close.code), close.reason.to_string()),
                                None => (1005, String::new()),
                            };
                            warn!(code, %reason, "Close frame from venue");
                            return Err(WsError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Socket read failed");
                            return Err(e.into());
                        }
                        None => {
                            warn!("Socket ended without a close frame");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                outbound = outbound_rx.recv() => {
                    let Some(msg) = outbound else {
                        return Err(WsError::ChannelClosed);
                    };
                    let text = msg.to_json()?;
                    debug!(action = %msg.action, channels = msg.channels.len(), "Sending control message");
                    sink.send(Message::Text(text)).await?;
                }

                () = self.heartbeat.wait_for_check() => {
                    if self.heartbeat.is_timed_out() {
                        error!(timeout_ms = self.config.heartbeat_timeout_ms, "No pong from venue");
                        return Err(WsError::HeartbeatTimeout);
                    }
                    if self.heartbeat.should_send_ping() {
                        sink.send(Message::Ping(Vec::new())).await?;
                        self.heartbeat.record_ping();
                    }
                }
            }
        }
    }
}

fn disconnect_reason(error: &WsError) -> &'static str {
    match error {
        WsError::HeartbeatTimeout => "heartbeat",
        WsError::ConnectionClosed { .. } => "closed",
        WsError::Tungstenite(_) => "transport",
        _ => "error",
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped at `max`, plus 0-1000ms jitter.
pub(crate) fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay + rand_jitter())
}

fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::from(elapsed.subsec_nanos()) % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let ms = |attempt| backoff_delay(1000, 60_000, attempt).as_millis() as u64;

        assert!((1000..2000).contains(&ms(1)));
        assert!((2000..3000).contains(&ms(2)));
        assert!((4000..5000).contains(&ms(3)));
        assert!((60_000..61_000).contains(&ms(20)));
    }

    #[test]
    fn test_disconnect_reason_labels() {
        assert_eq!(disconnect_reason(&WsError::HeartbeatTimeout), "heartbeat");
        assert_eq!(
            disconnect_reason(&WsError::ConnectionClosed {
                code: 1000,
                reason: String::new()
            }),
            "closed"
        );
        assert_eq!(disconnect_reason(&WsError::ChannelClosed), "error");
    }

    #[test]
    fn test_initial_state() {
        let (client, rx) = WsClient::new(WsConfig::default()).unwrap();
        let manager = ConnectionManager::new(Arc::new(client), rx);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.reconnect_count(), 0);
        assert!(!manager.is_shutdown());

        manager.shutdown();
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_run_exits_immediately_after_shutdown() {
        let (client, rx) = WsClient::new(WsConfig::default()).unwrap();
        let manager = ConnectionManager::new(Arc::new(client), rx);
        manager.shutdown();
        manager.run().await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
