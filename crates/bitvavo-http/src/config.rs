//! REST client configuration.

use crate::error::{HttpError, HttpResult};
use bitvavo_core::{Credentials, DEFAULT_WINDOW_MS, MAX_WINDOW_MS};
use std::time::Duration;

/// Public REST endpoint, including the API version prefix.
pub const DEFAULT_HTTP_URL: &str = "https://api.bitvavo.com/v2";

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL including the version prefix (e.g. `https://api.bitvavo.com/v2`).
    pub base_url: String,
    /// Request timeout (ms).
    pub timeout_ms: u64,
    /// Validity window of signed requests (ms).
    pub window_ms: u64,
    pub credentials: Option<Credentials>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HTTP_URL.to_string(),
            timeout_ms: 10_000,
            window_ms: DEFAULT_WINDOW_MS,
            credentials: None,
        }
    }
}

impl HttpConfig {
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> HttpResult<()> {
        if self.window_ms == 0 || self.window_ms > MAX_WINDOW_MS {
            return Err(HttpError::Config(format!(
                "window_ms must be within 1..={MAX_WINDOW_MS}, got {}",
                self.window_ms
            )));
        }
        if self.timeout_ms == 0 {
            return Err(HttpError::Config("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}
