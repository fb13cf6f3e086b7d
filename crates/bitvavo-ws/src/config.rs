//! WebSocket client configuration.

use crate::error::{WsError, WsResult};
use crate::registry::DEFAULT_BUFFER_SIZE;
use bitvavo_core::{Credentials, DEFAULT_WINDOW_MS, MAX_WINDOW_MS};
use std::time::Duration;

/// Public WebSocket endpoint.
pub const DEFAULT_WS_URL: &str = "wss://ws.bitvavo.com/v2/";

/// Client and transport settings.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL.
    pub url: String,
    /// Default consumer stream capacity.
    pub buffer_size: usize,
    /// Validity window of the signed `authenticate` action (ms).
    pub window_ms: u64,
    /// How long a private subscribe waits for authentication (ms).
    pub auth_timeout_ms: u64,
    /// API credentials. Without them private channels are unavailable.
    pub credentials: Option<Credentials>,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
    /// Idle time before a WebSocket ping is sent.
    pub heartbeat_interval_ms: u64,
    /// Pong must arrive within this.
    pub heartbeat_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            window_ms: DEFAULT_WINDOW_MS,
            auth_timeout_ms: 10_000,
            credentials: None,
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 10_000,
        }
    }
}

impl WsConfig {
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn validate(&self) -> WsResult<()> {
        if !(self.url.starts_with("wss://") || self.url.starts_with("ws://")) {
            return Err(WsError::Config(format!(
                "url must use ws:// or wss://, got {}",
                self.url
            )));
        }
        if self.buffer_size == 0 {
            return Err(WsError::Config("buffer_size must be positive".to_string()));
        }
        if self.window_ms == 0 || self.window_ms > MAX_WINDOW_MS {
            return Err(WsError::Config(format!(
                "window_ms must be within 1..={MAX_WINDOW_MS}, got {}",
                self.window_ms
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(WsError::Config(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(WsError::Config(
                "reconnect_base_delay_ms exceeds reconnect_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}
