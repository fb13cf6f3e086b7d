//! Subscription keys.

use bitvavo_core::Interval;
use std::fmt;

/// Identifies one subscription within a channel.
///
/// Markets are normalized to uppercase so keys built by callers match the
/// market names echoed by the venue. Candle keys carry an interval; all
/// other channels are keyed by market alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    market: String,
    interval: Option<Interval>,
}

impl SubscriptionKey {
    /// Key for a market-only channel.
    pub fn market(market: impl AsRef<str>) -> Self {
        Self {
            market: market.as_ref().trim().to_ascii_uppercase(),
            interval: None,
        }
    }

    /// Key for a candle subscription.
    pub fn candle(market: impl AsRef<str>, interval: Interval) -> Self {
        Self {
            interval: Some(interval),
            ..Self::market(market)
        }
    }

    pub fn market_name(&self) -> &str {
        &self.market
    }

    pub fn interval(&self) -> Option<Interval> {
        self.interval
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.interval {
            Some(interval) => write!(f, "{}@{}", self.market, interval),
            None => f.write_str(&self.market),
        }
    }
}

impl From<&str> for SubscriptionKey {
    fn from(market: &str) -> Self {
        Self::market(market)
    }
}

impl From<String> for SubscriptionKey {
    fn from(market: String) -> Self {
        Self::market(market)
    }
}

impl From<&String> for SubscriptionKey {
    fn from(market: &String) -> Self {
        Self::market(market)
    }
}

impl From<(&str, Interval)> for SubscriptionKey {
    fn from((market, interval): (&str, Interval)) -> Self {
        Self::candle(market, interval)
    }
}

impl From<(String, Interval)> for SubscriptionKey {
    fn from((market, interval): (String, Interval)) -> Self {
        Self::candle(market, interval)
    }
}

impl From<&SubscriptionKey> for SubscriptionKey {
    fn from(key: &SubscriptionKey) -> Self {
        key.clone()
    }
}
