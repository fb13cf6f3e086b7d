//! Venue payload models shared by the REST client and the stream events.
//!
//! Amounts and prices arrive as decimal strings and decode into
//! [`Decimal`]. Timestamps are milliseconds since the Unix epoch.

use crate::types::{OrderStatus, OrderType, SelfTradePrevention, Side, TimeInForce};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Convert a millisecond timestamp into a UTC datetime.
fn millis_to_utc(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

// ============================================================================
// Account
// ============================================================================

/// Balance of a single asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// Asset symbol in uppercase (e.g. "ETH").
    pub symbol: String,
    /// Amount available for trading or withdrawal.
    pub available: Decimal,
    /// Amount reserved by open orders.
    pub in_order: Decimal,
}

impl Balance {
    /// Total holdings (available + in order).
    pub fn total(&self) -> Decimal {
        self.available + self.in_order
    }
}

/// Trading fee tier of the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fees {
    pub taker: Decimal,
    pub maker: Decimal,
    /// 30 day trading volume in quote currency.
    pub volume: Decimal,
}

/// Account information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub fees: Fees,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

// ============================================================================
// Orders and fills
// ============================================================================

/// Order as returned by the REST API and the account stream.
///
/// The stream carries a subset of the REST fields, so everything beyond the
/// identifying fields is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: String,
    pub market: String,
    /// Creation time (ms).
    pub created: i64,
    /// Last update time (ms).
    pub updated: i64,
    pub status: OrderStatus,
    pub side: Side,
    pub order_type: OrderType,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub amount_remaining: Option<Decimal>,
    #[serde(default)]
    pub amount_quote: Option<Decimal>,
    #[serde(default)]
    pub amount_quote_remaining: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
    #[serde(default)]
    pub on_hold: Option<Decimal>,
    #[serde(default)]
    pub on_hold_currency: Option<String>,
    #[serde(default)]
    pub filled_amount: Option<Decimal>,
    #[serde(default)]
    pub filled_amount_quote: Option<Decimal>,
    #[serde(default)]
    pub fee_paid: Option<Decimal>,
    #[serde(default)]
    pub fee_currency: Option<String>,
    #[serde(default)]
    pub time_in_force: Option<TimeInForce>,
    #[serde(default)]
    pub post_only: Option<bool>,
    #[serde(default)]
    pub self_trade_prevention: Option<SelfTradePrevention>,
    #[serde(default)]
    pub visible: Option<bool>,
}

impl Order {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.created)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.updated)
    }
}

/// Fill notification from the account stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub market: String,
    pub order_id: String,
    #[serde(alias = "id")]
    pub fill_id: String,
    pub timestamp: i64,
    pub amount: Decimal,
    pub side: Side,
    pub price: Decimal,
    pub taker: bool,
    #[serde(default)]
    pub fee: Option<Decimal>,
    #[serde(default)]
    pub fee_currency: Option<String>,
}

impl Fill {
    /// Quote value of the fill (amount * price).
    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }
}

// ============================================================================
// Market data
// ============================================================================

/// Wire row of a candle: `[timestamp, open, high, low, close, volume]`.
type CandleRow = (i64, Decimal, Decimal, Decimal, Decimal, Decimal);

/// OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CandleRow", into = "CandleRow")]
pub struct Candle {
    /// Candle open time (ms).
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        millis_to_utc(self.timestamp)
    }
}

impl From<CandleRow> for Candle {
    fn from((timestamp, open, high, low, close, volume): CandleRow) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl From<Candle> for CandleRow {
    fn from(c: Candle) -> Self {
        (c.timestamp, c.open, c.high, c.low, c.close, c.volume)
    }
}

/// One price level of an order book: `[price, size]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(Decimal, Decimal)", into = "(Decimal, Decimal)")]
pub struct BookLevel {
    pub price: Decimal,
    /// Size at this level; zero removes the level.
    pub size: Decimal,
}

impl From<(Decimal, Decimal)> for BookLevel {
    fn from((price, size): (Decimal, Decimal)) -> Self {
        Self { price, size }
    }
}

impl From<BookLevel> for (Decimal, Decimal) {
    fn from(level: BookLevel) -> Self {
        (level.price, level.size)
    }
}
