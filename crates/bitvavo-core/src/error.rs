//! Error types for bitvavo-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
