//! REST client error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("API error {error_code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        error_code: i64,
        message: String,
    },

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] bitvavo_core::CoreError),
}

impl HttpError {
    /// Rate limit exceeded or venue temporarily unavailable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } | Self::Status { status, .. } => {
                *status == 429 || *status >= 500
            }
            Self::HttpClient(_) => true,
            _ => false,
        }
    }
}

pub type HttpResult<T> = Result<T, HttpError>;
