//! Authenticated REST client.
//!
//! Every request is signed as
//! `hex(HMAC-SHA256(secret, timestamp + "GET" + path + "?" + query))` where
//! `path` includes the `/v2` version prefix. Query parameters are sorted by
//! name before signing so the signed string matches the request line.

use crate::config::HttpConfig;
use crate::error::{HttpError, HttpResult};
use bitvavo_core::{Account, Balance, Credentials, Order, RateWindow};
use bitvavo_telemetry::Metrics;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

const HEADER_ACCESS_KEY: &str = "Bitvavo-Access-Key";
const HEADER_ACCESS_SIGNATURE: &str = "Bitvavo-Access-Signature";
const HEADER_ACCESS_TIMESTAMP: &str = "Bitvavo-Access-Timestamp";
const HEADER_ACCESS_WINDOW: &str = "Bitvavo-Access-Window";
const HEADER_RATELIMIT_REMAINING: &str = "bitvavo-ratelimit-remaining";
const HEADER_RATELIMIT_RESET_AT: &str = "bitvavo-ratelimit-resetat";

/// Optional filters for [`AuthClient::get_orders`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderParams {
    /// Maximum number of orders (venue default 500, max 1000).
    pub limit: Option<u32>,
    /// Only orders created at or after this time (ms).
    pub start: Option<i64>,
    /// Only orders created before this time (ms).
    pub end: Option<i64>,
    pub order_id_from: Option<String>,
    pub order_id_to: Option<String>,
}

impl OrderParams {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(start) = self.start {
            pairs.push(("start", start.to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("end", end.to_string()));
        }
        if let Some(from) = &self.order_id_from {
            pairs.push(("orderIdFrom", from.clone()));
        }
        if let Some(to) = &self.order_id_to {
            pairs.push(("orderIdTo", to.clone()));
        }
        pairs
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "errorCode")]
    error_code: i64,
    #[serde(default)]
    error: String,
}

/// Client for the account endpoints.
pub struct AuthClient {
    client: Client,
    base_url: String,
    window_ms: u64,
    credentials: Credentials,
    rate_window: RateWindow,
}

impl AuthClient {
    /// Create a client. Credentials are required.
    pub fn new(config: HttpConfig) -> HttpResult<Self> {
        Self::with_rate_window(config, RateWindow::new())
    }

    /// Create a client that reports into an existing rate window.
    pub fn with_rate_window(config: HttpConfig, rate_window: RateWindow) -> HttpResult<Self> {
        config.validate()?;
        let credentials = config
            .credentials
            .clone()
            .ok_or_else(|| HttpError::Config("API credentials are required".to_string()))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| HttpError::Config(format!("Invalid base url {base_url}: {e}")))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| HttpError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            window_ms: config.window_ms,
            credentials,
            rate_window,
        })
    }

    pub fn rate_window(&self) -> &RateWindow {
        &self.rate_window
    }

    /// Balances of the account, optionally for one symbol (e.g. "ETH").
    pub async fn get_balance(&self, symbol: Option<&str>) -> HttpResult<Vec<Balance>> {
        let mut query = Vec::new();
        if let Some(symbol) = symbol {
            query.push(("symbol", symbol.to_string()));
        }
        self.get("balance", query).await
    }

    /// Fee tier and capabilities of the account.
    pub async fn get_account(&self) -> HttpResult<Account> {
        self.get("account", Vec::new()).await
    }

    /// Orders for a market (e.g. "ETH-EUR"), newest first.
    pub async fn get_orders(
        &self,
        market: &str,
        params: Option<&OrderParams>,
    ) -> HttpResult<Vec<Order>> {
        let mut query = params.map(OrderParams::query_pairs).unwrap_or_default();
        query.push(("market", market.to_string()));
        self.get("orders", query).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        mut query: Vec<(&'static str, String)>,
    ) -> HttpResult<T> {
        let mut url = Url::parse(&format!("{}/{endpoint}", self.base_url))
            .map_err(|e| HttpError::Config(format!("Invalid endpoint url: {e}")))?;
        if !query.is_empty() {
            query.sort_by(|a, b| a.0.cmp(b.0));
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        let signed_path = match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.credentials.sign(timestamp, "GET", &signed_path, "")?;

        debug!(endpoint, path = %signed_path, "Sending signed request");

        let response = self
            .client
            .get(url)
            .header(HEADER_ACCESS_KEY, self.credentials.api_key())
            .header(HEADER_ACCESS_SIGNATURE, signature)
            .header(HEADER_ACCESS_TIMESTAMP, timestamp.to_string())
            .header(HEADER_ACCESS_WINDOW, self.window_ms.to_string())
            .send()
            .await
            .map_err(|e| HttpError::HttpClient(format!("HTTP request failed: {e}")))?;

        self.update_rate_limit(response.headers());

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::HttpClient(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let err = error_from_response(status, &body);
            warn!(endpoint, status = status.as_u16(), error = %err, "Request failed");
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|e| HttpError::Decode(format!("{endpoint}: {e}")))
    }

    fn update_rate_limit(&self, headers: &HeaderMap) {
        if let Some(remaining) = header_i64(headers, HEADER_RATELIMIT_REMAINING) {
            self.rate_window.update_remaining(remaining);
            Metrics::ratelimit_remaining(remaining);
        }
        if let Some(reset_at) = header_i64(headers, HEADER_RATELIMIT_RESET_AT) {
            self.rate_window.update_reset_at_millis(reset_at);
        }
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn error_from_response(status: StatusCode, body: &str) -> HttpError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(api) => HttpError::Api {
            status: status.as_u16(),
            error_code: api.error_code,
            message: api.error,
        },
        Err(_) => HttpError::Status {
            status: status.as_u16(),
            body: body.to_string(),
        },
    }
}
