//! Client facade.
//!
//! [`WsClient`] owns one registry per channel, the authenticator, the router
//! and the reconnect coordinator, all sharing one outbound channel. It does
//! no I/O: the transport feeds it frames and connection events and drains
//! the [`OutboundReceiver`] returned by [`WsClient::new`].

use crate::auth::{AuthState, Authenticator};
use crate::config::WsConfig;
use crate::error::WsResult;
use crate::events::{
    AccountEvent, BookEvent, CandleEvent, Ticker24hEvent, TickerEvent, TradeEvent,
};
use crate::handler::Handler;
use crate::message::ChannelName;
use crate::outbound::{outbound_channel, OutboundReceiver, OutboundSender};
use crate::reconnect::{ReconnectCoordinator, ReplayReport};
use crate::registry::{ChannelRegistry, DispatchStatsSnapshot, Registry};
use crate::router::{MessageRouter, RouteOutcome};
use std::sync::Arc;
use tracing::warn;

pub struct WsClient {
    config: WsConfig,
    auth: Arc<Authenticator>,
    registries: Vec<Arc<dyn ChannelRegistry>>,
    router: MessageRouter,
    coordinator: ReconnectCoordinator,
    candles: Handler<CandleEvent>,
    ticker: Handler<TickerEvent>,
    ticker24h: Handler<Ticker24hEvent>,
    trades: Handler<TradeEvent>,
    book: Handler<BookEvent>,
    account: Handler<AccountEvent>,
}

impl WsClient {
    /// Build a client and the receiver its transport must drain.
    pub fn new(config: WsConfig) -> WsResult<(Self, OutboundReceiver)> {
        config.validate()?;
        let (tx, rx) = outbound_channel();
        Ok((Self::with_outbound(config, tx), rx))
    }

    /// Build a client on an existing outbound channel.
    pub fn with_outbound(config: WsConfig, outbound: OutboundSender) -> Self {
        let auth = Arc::new(Authenticator::new(
            config.credentials.clone(),
            config.window_ms,
            config.auth_timeout(),
            outbound.clone(),
        ));

        let buffer = config.buffer_size;
        let candles = Arc::new(Registry::<CandleEvent>::new(outbound.clone(), buffer));
        let ticker = Arc::new(Registry::<TickerEvent>::new(outbound.clone(), buffer));
        let ticker24h = Arc::new(Registry::<Ticker24hEvent>::new(outbound.clone(), buffer));
        let trades = Arc::new(Registry::<TradeEvent>::new(outbound.clone(), buffer));
        let book = Arc::new(Registry::<BookEvent>::new(outbound.clone(), buffer));
        let account = Arc::new(Registry::<AccountEvent>::new(outbound, buffer));

        let registries: Vec<Arc<dyn ChannelRegistry>> = vec![
            candles.clone() as Arc<dyn ChannelRegistry>,
            ticker.clone() as Arc<dyn ChannelRegistry>,
            ticker24h.clone() as Arc<dyn ChannelRegistry>,
            trades.clone() as Arc<dyn ChannelRegistry>,
            book.clone() as Arc<dyn ChannelRegistry>,
            account.clone() as Arc<dyn ChannelRegistry>,
        ];

        Self {
            router: MessageRouter::new(registries.clone(), auth.clone()),
            coordinator: ReconnectCoordinator::new(registries.clone(), auth.clone()),
            candles: Handler::public(candles),
            ticker: Handler::public(ticker),
            ticker24h: Handler::public(ticker24h),
            trades: Handler::public(trades),
            book: Handler::public(book),
            account: Handler::private(account, auth.clone()),
            registries,
            auth,
            config,
        }
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    pub fn candles(&self) -> &Handler<CandleEvent> {
        &self.candles
    }

    pub fn ticker(&self) -> &Handler<TickerEvent> {
        &self.ticker
    }

    pub fn ticker24h(&self) -> &Handler<Ticker24hEvent> {
        &self.ticker24h
    }

    pub fn trades(&self) -> &Handler<TradeEvent> {
        &self.trades
    }

    pub fn book(&self) -> &Handler<BookEvent> {
        &self.book
    }

    /// Private order and fill updates. Requires credentials.
    pub fn account(&self) -> &Handler<AccountEvent> {
        &self.account
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth.state()
    }

    /// Route one inbound frame.
    pub fn handle_frame(&self, raw: &str) -> RouteOutcome {
        self.router.route(raw)
    }

    /// Transport (re)established: re-authenticate and replay subscriptions.
    pub fn on_reconnected(&self) -> WsResult<ReplayReport> {
        self.coordinator.replay()
    }

    /// Transport lost.
    pub fn on_disconnected(&self) {
        self.coordinator.disconnected();
    }

    /// Unsubscribe every key on every channel. Returns the first failure.
    pub fn unsubscribe_all(&self) -> WsResult<()> {
        let mut first_error = None;
        for registry in &self.registries {
            if let Err(e) = registry.unsubscribe_all() {
                warn!(channel = %registry.channel(), error = %e, "Unsubscribe all failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Active key count per channel.
    pub fn subscription_counts(&self) -> Vec<(ChannelName, usize)> {
        self.registries
            .iter()
            .map(|r| (r.channel(), r.len()))
            .collect()
    }

    /// Dispatch counters per channel.
    pub fn dispatch_stats(&self) -> Vec<(ChannelName, DispatchStatsSnapshot)> {
        self.registries
            .iter()
            .map(|r| (r.channel(), r.stats()))
            .collect()
    }
}
