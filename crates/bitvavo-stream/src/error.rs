//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] bitvavo_ws::WsError),

    #[error("HTTP error: {0}")]
    Http(#[from] bitvavo_http::HttpError),

    #[error("Core error: {0}")]
    Core(#[from] bitvavo_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] bitvavo_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
