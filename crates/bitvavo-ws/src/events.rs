//! Channel event types and their frame decoders.
//!
//! Each channel implements [`ChannelEvent`], which names the channel and
//! turns one raw inbound frame into routed `(key, event)` pairs. A frame
//! can carry several events (candle rows, ticker24h entries).

use crate::key::SubscriptionKey;
use crate::message::ChannelName;
use bitvavo_core::{BookLevel, Candle, Fill, Interval, Order, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Event delivered by one channel kind.
pub trait ChannelEvent: std::fmt::Debug + Send + Sized + 'static {
    const CHANNEL: ChannelName;

    /// Decode a raw frame into events keyed for dispatch.
    fn decode(raw: &str) -> Result<Vec<(SubscriptionKey, Self)>, serde_json::Error>;
}

// ============================================================================
// Candles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CandleEvent {
    pub market: String,
    pub interval: Interval,
    pub candle: Candle,
}

#[derive(Deserialize)]
struct CandleFrame {
    market: String,
    interval: Interval,
    #[serde(default)]
    candle: Vec<Candle>,
}

impl ChannelEvent for CandleEvent {
    const CHANNEL: ChannelName = ChannelName::Candles;

    fn decode(raw: &str) -> Result<Vec<(SubscriptionKey, Self)>, serde_json::Error> {
        let frame: CandleFrame = serde_json::from_str(raw)?;
        let key = SubscriptionKey::candle(&frame.market, frame.interval);
        Ok(frame
            .candle
            .into_iter()
            .map(|candle| {
                (
                    key.clone(),
                    CandleEvent {
                        market: frame.market.clone(),
                        interval: frame.interval,
                        candle,
                    },
                )
            })
            .collect())
    }
}

// ============================================================================
// Ticker
// ============================================================================

/// Best bid/ask and last price update. Only changed fields are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerEvent {
    pub market: String,
    #[serde(default)]
    pub best_bid: Option<Decimal>,
    #[serde(default)]
    pub best_bid_size: Option<Decimal>,
    #[serde(default)]
    pub best_ask: Option<Decimal>,
    #[serde(default)]
    pub best_ask_size: Option<Decimal>,
    #[serde(default)]
    pub last_price: Option<Decimal>,
}

impl ChannelEvent for TickerEvent {
    const CHANNEL: ChannelName = ChannelName::Ticker;

    fn decode(raw: &str) -> Result<Vec<(SubscriptionKey, Self)>, serde_json::Error> {
        let event: TickerEvent = serde_json::from_str(raw)?;
        Ok(vec![(SubscriptionKey::market(&event.market), event)])
    }
}

// ============================================================================
// Ticker 24h
// ============================================================================

/// Rolling 24 hour statistics for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24hEvent {
    pub market: String,
    #[serde(default)]
    pub start_timestamp: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub open: Option<Decimal>,
    #[serde(default)]
    pub open_timestamp: Option<i64>,
    #[serde(default)]
    pub high: Option<Decimal>,
    #[serde(default)]
    pub low: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
    #[serde(default)]
    pub close_timestamp: Option<i64>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub bid_size: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub ask_size: Option<Decimal>,
    #[serde(default)]
    pub volume: Option<Decimal>,
    #[serde(default)]
    pub volume_quote: Option<Decimal>,
}

#[derive(Deserialize)]
struct Ticker24hFrame {
    #[serde(default)]
    data: Vec<Ticker24hEvent>,
}

impl ChannelEvent for Ticker24hEvent {
    const CHANNEL: ChannelName = ChannelName::Ticker24h;

    fn decode(raw: &str) -> Result<Vec<(SubscriptionKey, Self)>, serde_json::Error> {
        let frame: Ticker24hFrame = serde_json::from_str(raw)?;
        Ok(frame
            .data
            .into_iter()
            .map(|entry| (SubscriptionKey::market(&entry.market), entry))
            .collect())
    }
}

// ============================================================================
// Trades
// ============================================================================

/// Public trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub market: String,
    pub id: String,
    pub amount: Decimal,
    pub price: Decimal,
    pub side: Side,
    /// Execution time (ms).
    pub timestamp: i64,
}

impl ChannelEvent for TradeEvent {
    const CHANNEL: ChannelName = ChannelName::Trades;

    fn decode(raw: &str) -> Result<Vec<(SubscriptionKey, Self)>, serde_json::Error> {
        let event: TradeEvent = serde_json::from_str(raw)?;
        Ok(vec![(SubscriptionKey::market(&event.market), event)])
    }
}

// ============================================================================
// Book
// ============================================================================

/// Order book delta. A level with zero size is removed from the book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookEvent {
    pub market: String,
    /// Sequence number; a gap means an update was missed.
    pub nonce: u64,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

impl BookEvent {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl ChannelEvent for BookEvent {
    const CHANNEL: ChannelName = ChannelName::Book;

    fn decode(raw: &str) -> Result<Vec<(SubscriptionKey, Self)>, serde_json::Error> {
        let event: BookEvent = serde_json::from_str(raw)?;
        Ok(vec![(SubscriptionKey::market(&event.market), event)])
    }
}

// ============================================================================
// Account (private)
// ============================================================================

/// Order update or fill for the authenticated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum AccountEvent {
    Order(Order),
    Fill(Fill),
}

impl AccountEvent {
    pub fn market(&self) -> &str {
        match self {
            Self::Order(order) => &order.market,
            Self::Fill(fill) => &fill.market,
        }
    }
}

impl ChannelEvent for AccountEvent {
    const CHANNEL: ChannelName = ChannelName::Account;

    fn decode(raw: &str) -> Result<Vec<(SubscriptionKey, Self)>, serde_json::Error> {
        let event: AccountEvent = serde_json::from_str(raw)?;
        Ok(vec![(SubscriptionKey::market(event.market()), event)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitvavo_core::OrderStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_candle_frame_yields_event_per_row() {
        let raw = r#"{"event":"candle","market":"BTC-EUR","interval":"1h",
            "candle":[[1538784000000,"4999","5012","4999","5012","0.45"],
                      [1538787600000,"5012","5020","5001","5010","1.2"]]}"#;
        let events = CandleEvent::decode(raw).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, SubscriptionKey::candle("BTC-EUR", Interval::OneHour));
        assert_eq!(events[1].1.candle.close, dec!(5010));
    }

    #[test]
    fn test_ticker_partial_fields() {
        let raw = r#"{"event":"ticker","market":"ETH-EUR","bestAsk":"1500.5","bestAskSize":"2"}"#;
        let (key, event) = TickerEvent::decode(raw).unwrap().remove(0);

        assert_eq!(key, SubscriptionKey::market("ETH-EUR"));
        assert_eq!(event.best_ask, Some(dec!(1500.5)));
        assert!(event.best_bid.is_none());
        assert!(event.last_price.is_none());
    }

    #[test]
    fn test_ticker24h_keyed_per_entry() {
        let raw = r#"{"event":"ticker24h","data":[
            {"market":"BTC-EUR","open":"30000","high":"31000","low":"29000","last":"30500",
             "volume":"12.5","volumeQuote":"381250","bid":"30499","bidSize":"0.1",
             "ask":"30501","askSize":"0.2","timestamp":1700000000000},
            {"market":"ETH-EUR","open":"1500","last":"1510"}]}"#;
        let events = Ticker24hEvent::decode(raw).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, SubscriptionKey::market("BTC-EUR"));
        assert_eq!(events[0].1.volume_quote, Some(dec!(381250)));
        assert_eq!(events[1].0, SubscriptionKey::market("ETH-EUR"));
        assert!(events[1].1.high.is_none());
    }

    #[test]
    fn test_trade_decode() {
        let raw = r#"{"event":"trade","timestamp":1542967486256,"market":"BTC-EUR",
            "id":"57b1159b-6bf5-4cde-9e2c-6bd6a5678baf","amount":"0.1","price":"5012","side":"sell"}"#;
        let (_, trade) = TradeEvent::decode(raw).unwrap().remove(0);
        assert_eq!(trade.side, Side::Sell);
        assert_eq!(trade.price, dec!(5012));
    }

    #[test]
    fn test_book_decode() {
        let raw = r#"{"event":"book","market":"BTC-EUR","nonce":438524,
            "bids":[["9209.3","0"]],"asks":[["9285.3","0.3"]]}"#;
        let (_, book) = BookEvent::decode(raw).unwrap().remove(0);
        assert_eq!(book.nonce, 438_524);
        assert!(book.bids[0].size.is_zero());
        assert_eq!(book.asks[0].price, dec!(9285.3));
        assert!(!book.is_empty());
    }

    #[test]
    fn test_account_order_and_fill() {
        let order = r#"{"event":"order","orderId":"o-1","market":"ETH-EUR","created":1,
            "updated":2,"status":"filled","side":"buy","orderType":"market"}"#;
        let (key, event) = AccountEvent::decode(order).unwrap().remove(0);
        assert_eq!(key, SubscriptionKey::market("ETH-EUR"));
        match event {
            AccountEvent::Order(o) => assert_eq!(o.status, OrderStatus::Filled),
            other => panic!("expected order, got {other:?}"),
        }

        let fill = r#"{"event":"fill","market":"ETH-EUR","orderId":"o-1","fillId":"f-1",
            "timestamp":3,"amount":"1","side":"buy","price":"1500","taker":true}"#;
        let (_, event) = AccountEvent::decode(fill).unwrap().remove(0);
        assert!(matches!(event, AccountEvent::Fill(ref f) if f.price == dec!(1500)));
    }

    #[test]
    fn test_malformed_payload_is_error() {
        assert!(TradeEvent::decode(r#"{"event":"trade","market":"BTC-EUR"}"#).is_err());
        assert!(CandleEvent::decode(r#"{"event":"candle","market":"BTC-EUR","interval":"7m"}"#).is_err());
    }
}
