//! WebSocket client for the Bitvavo streaming API.
//!
//! Provides subscription management and event dispatch with:
//! - One generic registry per channel (candles, ticker, ticker24h, trades, book, account)
//! - Bounded per-subscription consumer streams with drop-on-full delivery
//! - A single ordered outbound channel for control messages
//! - Authentication state machine for the private account channel
//! - Transparent subscription replay after reconnect
//! - Automatic reconnection with exponential backoff and heartbeat monitoring

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod handler;
pub mod heartbeat;
pub mod key;
pub mod message;
pub mod outbound;
pub mod reconnect;
pub mod registry;
pub mod router;

pub use auth::{AuthState, Authenticator};
pub use client::WsClient;
pub use config::{WsConfig, DEFAULT_WS_URL};
pub use connection::{ConnectionManager, ConnectionState};
pub use error::{WsError, WsResult};
pub use events::{
    AccountEvent, BookEvent, CandleEvent, ChannelEvent, Ticker24hEvent, TickerEvent, TradeEvent,
};
pub use handler::Handler;
pub use key::SubscriptionKey;
pub use message::{
    Action, AuthEvent, ChannelDescriptor, ChannelName, ControlMessage, Envelope, ErrorFrame,
    WsEvent,
};
pub use outbound::{outbound_channel, OutboundReceiver, OutboundSender};
pub use reconnect::{ReconnectCoordinator, ReplayReport};
pub use registry::{
    ChannelRegistry, DispatchReport, DispatchStatsSnapshot, Registry, DEFAULT_BUFFER_SIZE,
};
pub use router::{MessageRouter, RouteOutcome};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
