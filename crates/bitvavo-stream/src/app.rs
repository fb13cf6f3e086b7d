//! Application orchestration.
//!
//! Runs the connection manager in the background, opens one consumer stream
//! per `[[streams]]` entry and logs every event until Ctrl-C.

use crate::config::{AppConfig, StreamConfig};
use crate::error::AppResult;
use bitvavo_core::Credentials;
use bitvavo_http::AuthClient;
use bitvavo_ws::{
    ChannelEvent, ChannelName, ConnectionManager, ConnectionState, Handler, WsClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long startup waits for the first connection before subscribing anyway.
const CONNECT_WAIT: Duration = Duration::from_secs(15);
/// Grace period for background tasks after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Application {
    config: AppConfig,
    credentials: Option<Credentials>,
    client: Arc<WsClient>,
    connection: Arc<ConnectionManager>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let credentials = config.credentials()?;
        if config.has_private_streams() && credentials.is_none() {
            warn!("Account stream configured without credentials; it will fail to subscribe");
        }

        let (client, outbound_rx) = WsClient::new(config.ws_config(credentials.clone()))?;
        let client = Arc::new(client);
        let connection = Arc::new(ConnectionManager::new(client.clone(), outbound_rx));

        Ok(Self {
            config,
            credentials,
            client,
            connection,
        })
    }

    pub fn client(&self) -> &Arc<WsClient> {
        &self.client
    }

    pub async fn run(self) -> AppResult<()> {
        let connection = self.connection.clone();
        let mut ws_handle = tokio::spawn(async move {
            if let Err(e) = connection.run().await {
                error!(error = %e, "WebSocket connection stopped");
            }
        });

        self.log_balances().await;

        if !self.wait_connected(CONNECT_WAIT).await {
            warn!(
                timeout_secs = CONNECT_WAIT.as_secs(),
                "Not connected yet; subscriptions will be replayed once connected"
            );
        }

        let mut consumers = JoinSet::new();
        let mut opened = 0usize;
        for stream in &self.config.streams {
            match self.open_stream(stream, &mut consumers).await {
                Ok(()) => opened += 1,
                Err(e) => error!(
                    channel = %stream.channel,
                    markets = ?stream.markets,
                    error = %e,
                    "Failed to subscribe"
                ),
            }
        }
        info!(opened, configured = self.config.streams.len(), "Streams opened");

        let connection_exited = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                false
            }
            _ = &mut ws_handle => {
                warn!("Connection task exited");
                true
            }
        };

        let ws_handle = (!connection_exited).then_some(ws_handle);
        self.shutdown(ws_handle, consumers).await;
        Ok(())
    }

    async fn open_stream(
        &self,
        stream: &StreamConfig,
        consumers: &mut JoinSet<u64>,
    ) -> AppResult<()> {
        match stream.channel {
            ChannelName::Candles => spawn_consumer(self.client.candles(), stream, consumers).await,
            ChannelName::Ticker => spawn_consumer(self.client.ticker(), stream, consumers).await,
            ChannelName::Ticker24h => {
                spawn_consumer(self.client.ticker24h(), stream, consumers).await
            }
            ChannelName::Trades => spawn_consumer(self.client.trades(), stream, consumers).await,
            ChannelName::Book => spawn_consumer(self.client.book(), stream, consumers).await,
            ChannelName::Account => spawn_consumer(self.client.account(), stream, consumers).await,
        }
    }

    async fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.connection.state() == ConnectionState::Connected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    /// Log a balance snapshot over REST when `[http]` is configured.
    async fn log_balances(&self) {
        let Some(http_config) = self.config.http_config(self.credentials.clone()) else {
            return;
        };
        if !self.config.http.as_ref().is_some_and(|h| h.fetch_balance) {
            return;
        }
        if http_config.credentials.is_none() {
            debug!("No credentials; skipping balance snapshot");
            return;
        }

        let client = match AuthClient::new(http_config) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to create REST client");
                return;
            }
        };

        match client.get_balance(None).await {
            Ok(balances) => {
                for balance in balances.iter().filter(|b| !b.total().is_zero()) {
                    info!(
                        symbol = %balance.symbol,
                        available = %balance.available,
                        in_order = %balance.in_order,
                        "Balance"
                    );
                }
                info!(
                    assets = balances.len(),
                    ratelimit_remaining = client.rate_window().remaining(),
                    "Balance snapshot fetched"
                );
            }
            Err(e) => warn!(error = %e, "Failed to fetch balances"),
        }
    }

    async fn shutdown(
        &self,
        ws_handle: Option<tokio::task::JoinHandle<()>>,
        mut consumers: JoinSet<u64>,
    ) {
        // Queued unsubscribes are flushed by the connection before it closes.
        if let Err(e) = self.client.unsubscribe_all() {
            warn!(error = %e, "Unsubscribe during shutdown failed");
        }
        self.connection.shutdown();

        if let Some(handle) = ws_handle {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Connection task did not stop in time");
            }
        }

        let mut total_events = 0u64;
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(result) = consumers.join_next().await {
                match result {
                    Ok(count) => total_events += count,
                    Err(e) => warn!(error = %e, "Consumer task failed"),
                }
            }
        })
        .await;
        if drained.is_err() {
            consumers.abort_all();
        }

        for (channel, stats) in self.client.dispatch_stats() {
            info!(
                %channel,
                delivered = stats.delivered,
                dropped = stats.dropped,
                routing_misses = stats.routing_misses,
                decode_failures = stats.decode_failures,
                "Dispatch statistics"
            );
        }
        info!(
            total_events,
            reconnects = self.connection.reconnect_count(),
            "Shutdown complete"
        );
    }
}

async fn spawn_consumer<T: ChannelEvent>(
    handler: &Handler<T>,
    stream: &StreamConfig,
    consumers: &mut JoinSet<u64>,
) -> AppResult<()> {
    let rx = handler
        .subscribe_many_with_buffer(stream.keys(), stream.buffer_size)
        .await?;
    info!(
        channel = %stream.channel,
        markets = ?stream.markets,
        interval = ?stream.interval,
        "Subscribed"
    );
    consumers.spawn(log_events(stream.channel, rx));
    Ok(())
}

/// Log each event until the stream closes. Returns the number of events seen.
async fn log_events<T: ChannelEvent>(channel: ChannelName, mut rx: mpsc::Receiver<T>) -> u64 {
    let mut count = 0u64;
    while let Some(event) = rx.recv().await {
        count += 1;
        info!(%channel, ?event, "Event");
    }
    debug!(%channel, count, "Stream closed");
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> AppConfig {
        AppConfig::from_toml(toml).unwrap()
    }

    #[tokio::test]
    async fn test_open_stream_registers_keys() {
        let app = Application::new(config(
            r#"
            [[streams]]
            channel = "trades"
            markets = ["btc-eur", "ETH-EUR"]
            "#,
        ))
        .unwrap();

        let mut consumers = JoinSet::new();
        app.open_stream(&app.config.streams[0], &mut consumers)
            .await
            .unwrap();

        assert_eq!(app.client().trades().registry().len(), 2);
        assert_eq!(consumers.len(), 1);

        // Unsubscribing closes the stream and ends the consumer
        app.client().unsubscribe_all().unwrap();
        let count = consumers.join_next().await.unwrap().unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_consumer_counts_dispatched_events() {
        let app = Application::new(config(
            r#"
            [[streams]]
            channel = "ticker"
            markets = ["BTC-EUR"]
            "#,
        ))
        .unwrap();

        let mut consumers = JoinSet::new();
        app.open_stream(&app.config.streams[0], &mut consumers)
            .await
            .unwrap();

        app.client()
            .handle_frame(r#"{"event":"ticker","market":"BTC-EUR","lastPrice":"30000"}"#);
        app.client()
            .handle_frame(r#"{"event":"ticker","market":"BTC-EUR","lastPrice":"30001"}"#);
        app.client().unsubscribe_all().unwrap();

        assert_eq!(consumers.join_next().await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_stream_entry_fails() {
        let app = Application::new(config(
            r#"
            [[streams]]
            channel = "book"
            markets = ["BTC-EUR"]

            [[streams]]
            channel = "book"
            markets = ["BTC-EUR"]
            "#,
        ))
        .unwrap();

        let mut consumers = JoinSet::new();
        assert!(app
            .open_stream(&app.config.streams[0], &mut consumers)
            .await
            .is_ok());
        assert!(app
            .open_stream(&app.config.streams[1], &mut consumers)
            .await
            .is_err());
    }
}
