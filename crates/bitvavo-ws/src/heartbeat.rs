//! Heartbeat management for WebSocket connections.
//!
//! Tracks inbound activity. When the connection has been idle for the
//! heartbeat interval a WebSocket ping is sent; if no pong arrives within
//! the timeout the connection is considered dead.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct HeartbeatState {
    last_activity: Instant,
    ping_sent_at: Option<Instant>,
}

pub struct HeartbeatManager {
    interval: Duration,
    timeout: Duration,
    state: Mutex<HeartbeatState>,
}

impl HeartbeatManager {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
            state: Mutex::new(HeartbeatState {
                last_activity: Instant::now(),
                ping_sent_at: None,
            }),
        }
    }

    /// Reset on a new connection.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        state.ping_sent_at = None;
    }

    /// Any inbound frame counts as activity.
    pub fn record_activity(&self) {
        self.state.lock().last_activity = Instant::now();
    }

    pub fn record_ping(&self) {
        self.state.lock().ping_sent_at = Some(Instant::now());
    }

    pub fn record_pong(&self) {
        let mut state = self.state.lock();
        if let Some(sent) = state.ping_sent_at.take() {
            debug!(rtt_ms = sent.elapsed().as_millis() as u64, "Received pong");
        }
        state.last_activity = Instant::now();
    }

    pub fn is_waiting_for_pong(&self) -> bool {
        self.state.lock().ping_sent_at.is_some()
    }

    /// A ping is outstanding for longer than the timeout.
    pub fn is_timed_out(&self) -> bool {
        self.state
            .lock()
            .ping_sent_at
            .is_some_and(|sent| sent.elapsed() > self.timeout)
    }

    /// Idle for the full interval and no ping outstanding.
    pub fn should_send_ping(&self) -> bool {
        let state = self.state.lock();
        state.ping_sent_at.is_none() && state.last_activity.elapsed() >= self.interval
    }

    /// Wait for the next heartbeat check.
    pub async fn wait_for_check(&self) {
        tokio::time::sleep(self.interval / 2).await;
    }
}
