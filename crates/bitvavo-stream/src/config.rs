//! Application configuration.

use crate::error::{AppError, AppResult};
use bitvavo_core::{Credentials, Interval};
use bitvavo_http::{HttpConfig, DEFAULT_HTTP_URL};
use bitvavo_ws::{ChannelName, SubscriptionKey, WsConfig, DEFAULT_BUFFER_SIZE, DEFAULT_WS_URL};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "BITVAVO_API_KEY";
/// Environment variable holding the API secret.
pub const ENV_API_SECRET: &str = "BITVAVO_API_SECRET";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ws: WebSocketConfig,
    /// REST client. When absent no account snapshot is fetched at startup.
    #[serde(default)]
    pub http: Option<RestConfig>,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
}

/// WebSocket settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_ws_url")]
    pub url: String,
    /// Default consumer stream capacity.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Signed authenticate validity window (ms).
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_window_ms() -> u64 {
    bitvavo_core::DEFAULT_WINDOW_MS
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            buffer_size: default_buffer_size(),
            window_ms: default_window_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

/// REST settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_http_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
    /// Log account balances once at startup.
    #[serde(default = "default_fetch_balance")]
    pub fetch_balance: bool,
}

fn default_http_url() -> String {
    DEFAULT_HTTP_URL.to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_fetch_balance() -> bool {
    true
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: default_http_url(),
            timeout_ms: default_http_timeout_ms(),
            fetch_balance: default_fetch_balance(),
        }
    }
}

/// API credentials. Either field may be omitted and supplied through the
/// environment instead.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One `[[streams]]` entry: a channel and the markets to subscribe on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub channel: ChannelName,
    pub markets: Vec<String>,
    /// Candle interval. Required for `candles`, rejected elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    /// Overrides `ws.buffer_size` for this stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<usize>,
}

impl StreamConfig {
    /// Subscription keys covered by this entry.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        self.markets
            .iter()
            .map(|market| match self.interval {
                Some(interval) => SubscriptionKey::candle(market, interval),
                None => SubscriptionKey::market(market),
            })
            .collect()
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.markets.is_empty() {
            return Err(AppError::Config(format!(
                "stream '{}' has no markets",
                self.channel
            )));
        }
        if self.markets.iter().any(|m| m.trim().is_empty()) {
            return Err(AppError::Config(format!(
                "stream '{}' has a blank market",
                self.channel
            )));
        }
        match (self.channel.requires_interval(), self.interval) {
            (true, None) => Err(AppError::Config(format!(
                "stream '{}' requires an interval",
                self.channel
            ))),
            (false, Some(interval)) => Err(AppError::Config(format!(
                "stream '{}' does not accept an interval (got {interval})",
                self.channel
            ))),
            _ => Ok(()),
        }
    }
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.streams.is_empty() {
            return Err(AppError::Config("no [[streams]] configured".to_string()));
        }
        for stream in &self.streams {
            stream.validate()?;
        }
        Ok(())
    }

    /// Whether any configured stream needs an authenticated session.
    pub fn has_private_streams(&self) -> bool {
        self.streams.iter().any(|s| s.channel.is_private())
    }

    /// Resolve credentials from the file, falling back to the process environment.
    pub fn credentials(&self) -> AppResult<Option<Credentials>> {
        self.credentials_with(|name| std::env::var(name).ok())
    }

    /// Resolve credentials using `lookup` for the environment fallback.
    pub fn credentials_with<F>(&self, lookup: F) -> AppResult<Option<Credentials>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = self
            .credentials
            .api_key
            .clone()
            .or_else(|| lookup(ENV_API_KEY))
            .filter(|k| !k.is_empty());
        let secret = self
            .credentials
            .api_secret
            .clone()
            .or_else(|| lookup(ENV_API_SECRET))
            .filter(|s| !s.is_empty());

        match (key, secret) {
            (Some(key), Some(secret)) => Ok(Some(Credentials::new(key, secret)?)),
            (None, None) => Ok(None),
            _ => Err(AppError::Config(format!(
                "both {ENV_API_KEY} and {ENV_API_SECRET} must be set"
            ))),
        }
    }

    pub fn ws_config(&self, credentials: Option<Credentials>) -> WsConfig {
        WsConfig {
            url: self.ws.url.clone(),
            buffer_size: self.ws.buffer_size,
            window_ms: self.ws.window_ms,
            auth_timeout_ms: self.ws.auth_timeout_ms,
            credentials,
            max_reconnect_attempts: self.ws.max_reconnect_attempts,
            reconnect_base_delay_ms: self.ws.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.ws.reconnect_max_delay_ms,
            heartbeat_interval_ms: self.ws.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.ws.heartbeat_timeout_ms,
        }
    }

    /// REST settings, only when a `[http]` section is present.
    pub fn http_config(&self, credentials: Option<Credentials>) -> Option<HttpConfig> {
        self.http.as_ref().map(|rest| HttpConfig {
            base_url: rest.base_url.clone(),
            timeout_ms: rest.timeout_ms,
            window_ms: self.ws.window_ms,
            credentials,
        })
    }
}
