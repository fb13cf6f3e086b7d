//! WebSocket wire messages.
//!
//! Outbound traffic is limited to [`ControlMessage`] (subscribe,
//! unsubscribe, authenticate). Inbound frames are classified through a
//! minimal [`Envelope`] before the owning channel decodes the payload.

use crate::error::WsResult;
use crate::key::SubscriptionKey;
use bitvavo_core::{Credentials, Interval};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Names
// ============================================================================

/// Outbound control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Subscribe,
    Unsubscribe,
    Authenticate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Authenticate => "authenticate",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscribable channel kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelName {
    Candles,
    Ticker,
    Ticker24h,
    Trades,
    Book,
    Account,
}

impl ChannelName {
    /// Replay order used after a reconnect.
    pub const ALL: [ChannelName; 6] = [
        Self::Candles,
        Self::Ticker,
        Self::Ticker24h,
        Self::Trades,
        Self::Book,
        Self::Account,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candles => "candles",
            Self::Ticker => "ticker",
            Self::Ticker24h => "ticker24h",
            Self::Trades => "trades",
            Self::Book => "book",
            Self::Account => "account",
        }
    }

    /// Private channels require an authenticated connection.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Account)
    }

    /// Candle subscriptions are keyed by market and interval.
    pub fn requires_interval(&self) -> bool {
        matches!(self, Self::Candles)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound event discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WsEvent {
    Subscribed,
    Unsubscribed,
    Authenticate,
    Candle,
    Ticker,
    Ticker24h,
    Trade,
    Book,
    Order,
    Fill,
}

impl WsEvent {
    /// Parse the wire discriminator. Unknown names yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        let event = match name {
            "subscribed" => Self::Subscribed,
            "unsubscribed" => Self::Unsubscribed,
            "authenticate" => Self::Authenticate,
            "candle" => Self::Candle,
            "ticker" => Self::Ticker,
            "ticker24h" => Self::Ticker24h,
            "trade" => Self::Trade,
            "book" => Self::Book,
            "order" => Self::Order,
            "fill" => Self::Fill,
            _ => return None,
        };
        Some(event)
    }

    /// Channel whose registry owns this event, if it carries data.
    pub fn channel(&self) -> Option<ChannelName> {
        match self {
            Self::Candle => Some(ChannelName::Candles),
            Self::Ticker => Some(ChannelName::Ticker),
            Self::Ticker24h => Some(ChannelName::Ticker24h),
            Self::Trade => Some(ChannelName::Trades),
            Self::Book => Some(ChannelName::Book),
            Self::Order | Self::Fill => Some(ChannelName::Account),
            Self::Subscribed | Self::Unsubscribed | Self::Authenticate => None,
        }
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// One channel entry of a control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: ChannelName,
    #[serde(rename = "interval", default, skip_serializing_if = "Vec::is_empty")]
    pub intervals: Vec<Interval>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markets: Vec<String>,
}

impl ChannelDescriptor {
    /// Build descriptors covering `keys`.
    ///
    /// Keys without an interval share one descriptor. Keys with an interval
    /// are grouped per interval so each descriptor's markets x intervals
    /// product is exactly the requested set.
    pub fn from_keys<'a>(
        name: ChannelName,
        keys: impl IntoIterator<Item = &'a SubscriptionKey>,
    ) -> Vec<Self> {
        let mut plain: Vec<String> = Vec::new();
        let mut by_interval: BTreeMap<Interval, Vec<String>> = BTreeMap::new();

        for key in keys {
            let markets = match key.interval() {
                Some(interval) => by_interval.entry(interval).or_default(),
                None => &mut plain,
            };
            if !markets.iter().any(|m| m == key.market_name()) {
                markets.push(key.market_name().to_string());
            }
        }

        let mut descriptors = Vec::with_capacity(by_interval.len() + 1);
        if !plain.is_empty() {
            descriptors.push(Self {
                name,
                intervals: Vec::new(),
                markets: plain,
            });
        }
        for (interval, markets) in by_interval {
            descriptors.push(Self {
                name,
                intervals: vec![interval],
                markets,
            });
        }
        descriptors
    }

    /// Keys described by this entry.
    pub fn keys(&self) -> Vec<SubscriptionKey> {
        if self.intervals.is_empty() {
            return self
                .markets
                .iter()
                .map(|m| SubscriptionKey::market(m.as_str()))
                .collect();
        }
        self.markets
            .iter()
            .flat_map(|m| {
                self.intervals
                    .iter()
                    .map(move |i| SubscriptionKey::candle(m.as_str(), *i))
            })
            .collect()
    }
}

/// Outbound control message.
///
/// Empty channel lists and unset authentication fields are omitted from
/// the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<u64>,
}

impl ControlMessage {
    fn with_channels(action: Action, channels: Vec<ChannelDescriptor>) -> Self {
        Self {
            action,
            channels,
            key: None,
            signature: None,
            timestamp: None,
            window: None,
        }
    }

    pub fn subscribe(channels: Vec<ChannelDescriptor>) -> Self {
        Self::with_channels(Action::Subscribe, channels)
    }

    pub fn unsubscribe(channels: Vec<ChannelDescriptor>) -> Self {
        Self::with_channels(Action::Unsubscribe, channels)
    }

    /// Signed `authenticate` action for the given timestamp (ms).
    pub fn authenticate(credentials: &Credentials, timestamp: i64, window_ms: u64) -> WsResult<Self> {
        let signature = credentials.sign_websocket(timestamp)?;
        Ok(Self {
            action: Action::Authenticate,
            channels: Vec::new(),
            key: Some(credentials.api_key().to_string()),
            signature: Some(signature),
            timestamp: Some(timestamp),
            window: Some(window_ms),
        })
    }

    /// Every (channel, key) pair this message covers.
    pub fn keys(&self) -> Vec<(ChannelName, SubscriptionKey)> {
        self.channels
            .iter()
            .flat_map(|c| c.keys().into_iter().map(move |k| (c.name, k)))
            .collect()
    }

    pub fn to_json(&self) -> WsResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Minimal view of an inbound frame used for classification.
///
/// Only the discriminating fields are read; payload fields are skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Envelope {
    pub fn parse(raw: &str) -> WsResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Error frame carried by this envelope, if any.
    pub fn error_frame(&self) -> Option<ErrorFrame> {
        self.error_code.map(|code| ErrorFrame {
            action: self.action.clone(),
            error_code: code,
            error: self.error.clone().unwrap_or_default(),
        })
    }
}

/// Error reported by the venue for a control action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    pub action: Option<String>,
    pub error_code: i64,
    pub error: String,
}

impl ErrorFrame {
    pub fn is_authentication(&self) -> bool {
        self.action.as_deref() == Some(Action::Authenticate.as_str())
    }
}

/// Authentication confirmation: `{"event":"authenticate","authenticated":true}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AuthEvent {
    #[serde(default)]
    pub authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_book_subscribe_round_trip() {
        let key = SubscriptionKey::market("ETH-EUR");
        let msg = ControlMessage::subscribe(ChannelDescriptor::from_keys(ChannelName::Book, [&key]));

        let encoded = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            encoded,
            json!({
                "action": "subscribe",
                "channels": [{"name": "book", "markets": ["ETH-EUR"]}]
            })
        );

        let decoded: ControlMessage = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_candle_descriptors_grouped_by_interval() {
        let keys = [
            SubscriptionKey::candle("BTC-EUR", Interval::OneMinute),
            SubscriptionKey::candle("ETH-EUR", Interval::OneMinute),
            SubscriptionKey::candle("BTC-EUR", Interval::OneHour),
        ];
        let descriptors = ChannelDescriptor::from_keys(ChannelName::Candles, &keys);

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].intervals, vec![Interval::OneMinute]);
        assert_eq!(descriptors[0].markets, vec!["BTC-EUR", "ETH-EUR"]);
        assert_eq!(descriptors[1].intervals, vec![Interval::OneHour]);

        let json = serde_json::to_value(&descriptors[1]).unwrap();
        assert_eq!(
            json,
            json!({"name": "candles", "interval": ["1h"], "markets": ["BTC-EUR"]})
        );
    }

    #[test]
    fn test_descriptor_keys_expand_product() {
        let descriptor = ChannelDescriptor {
            name: ChannelName::Candles,
            intervals: vec![Interval::OneMinute, Interval::FiveMinutes],
            markets: vec!["BTC-EUR".to_string()],
        };
        assert_eq!(
            descriptor.keys(),
            vec![
                SubscriptionKey::candle("BTC-EUR", Interval::OneMinute),
                SubscriptionKey::candle("BTC-EUR", Interval::FiveMinutes),
            ]
        );
    }

    #[test]
    fn test_authenticate_message_fields() {
        let creds = Credentials::new("api-key", "api-secret").unwrap();
        let msg = ControlMessage::authenticate(&creds, 1_548_175_200_641, 10_000).unwrap();
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["action"], "authenticate");
        assert_eq!(json["key"], "api-key");
        assert_eq!(json["timestamp"], 1_548_175_200_641_i64);
        assert_eq!(json["window"], 10_000);
        assert_eq!(
            json["signature"].as_str().unwrap(),
            creds.sign_websocket(1_548_175_200_641).unwrap()
        );
        assert!(json.get("channels").is_none());
    }

    #[test]
    fn test_envelope_error_frame() {
        let env = Envelope::parse(
            r#"{"action":"authenticate","errorCode":302,"error":"Timestamp is invalid."}"#,
        )
        .unwrap();
        let frame = env.error_frame().unwrap();
        assert_eq!(frame.error_code, 302);
        assert!(frame.is_authentication());
        assert!(env.event.is_none());
    }

    #[test]
    fn test_event_channel_mapping() {
        assert_eq!(WsEvent::from_wire("fill").and_then(|e| e.channel()), Some(ChannelName::Account));
        assert_eq!(WsEvent::from_wire("trade").and_then(|e| e.channel()), Some(ChannelName::Trades));
        assert_eq!(WsEvent::from_wire("subscribed").and_then(|e| e.channel()), None);
        assert!(WsEvent::from_wire("mystery").is_none());
    }
}
