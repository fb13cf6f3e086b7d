//! Authenticated REST client for the Bitvavo API.
//!
//! Signs every request with the account credentials and keeps the shared
//! [`RateWindow`](bitvavo_core::RateWindow) current from the rate limit
//! headers of each response.

pub mod client;
pub mod config;
pub mod error;

pub use client::{AuthClient, OrderParams};
pub use config::{HttpConfig, DEFAULT_HTTP_URL};
pub use error::{HttpError, HttpResult};
