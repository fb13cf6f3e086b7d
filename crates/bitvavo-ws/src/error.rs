//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Subscription already active: {0}")]
    AlreadySubscribed(String),

    #[error("No active subscription: {0}")]
    NotSubscribed(String),

    #[error("Invalid subscription key: {0}")]
    InvalidKey(String),

    #[error("Empty subscription: at least one market is required")]
    EmptySubscription,

    #[error("API credentials are required for private channels")]
    CredentialsMissing,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Outbound channel closed")]
    ChannelClosed,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Core error: {0}")]
    Core(#[from] bitvavo_core::CoreError),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;
