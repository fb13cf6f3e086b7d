//! Core domain types for the Bitvavo streaming client.
//!
//! This crate provides the primitives shared by the WebSocket and REST layers:
//! - `Interval`: Candle intervals accepted by the venue
//! - `Side`, `OrderType`, `OrderStatus`: Trading enums
//! - `Order`, `Fill`, `Balance`, `Account`, `Candle`: Venue payload models
//! - `Credentials`: API key/secret with HMAC-SHA256 request signing
//! - `RateWindow`: Advisory request budget shared with the REST client

pub mod credentials;
pub mod error;
pub mod interval;
pub mod models;
pub mod rate_window;
pub mod types;

pub use credentials::{Credentials, DEFAULT_WINDOW_MS, MAX_WINDOW_MS};
pub use error::{CoreError, Result};
pub use interval::Interval;
pub use models::{Account, Balance, BookLevel, Candle, Fees, Fill, Order};
pub use rate_window::{RateWindow, RateWindowSnapshot};
pub use types::{OrderStatus, OrderType, SelfTradePrevention, Side, TimeInForce};
