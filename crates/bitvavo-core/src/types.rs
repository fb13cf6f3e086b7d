//! Trading enums shared by order, fill and trade payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order or trade side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
            Self::StopLoss => write!(f, "stopLoss"),
            Self::StopLossLimit => write!(f, "stopLossLimit"),
            Self::TakeProfit => write!(f, "takeProfit"),
            Self::TakeProfitLimit => write!(f, "takeProfitLimit"),
        }
    }
}

/// Order status as reported by REST and the account stream.
///
/// Unrecognized statuses decode as `Unknown` so a new venue status never
/// turns an otherwise valid order payload into a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    New,
    AwaitingTrigger,
    Canceled,
    CanceledAuction,
    CanceledSelfTradePrevention,
    #[serde(rename = "canceledIOC")]
    CanceledIoc,
    #[serde(rename = "canceledFOK")]
    CanceledFok,
    CanceledMarketProtection,
    CanceledPostOnly,
    Filled,
    PartiallyFilled,
    Expired,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    /// Check if no further updates are expected for the order.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::New | Self::AwaitingTrigger | Self::PartiallyFilled
        )
    }
}

/// Time-in-force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-til-cancelled.
    #[default]
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    /// Immediate-or-cancel.
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    /// Fill-or-kill.
    #[serde(rename = "FOK")]
    FillOrKill,
}

/// Self-trade prevention mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelfTradePrevention {
    #[default]
    DecrementAndCancel,
    CancelOldest,
    CancelNewest,
    CancelBoth,
}
