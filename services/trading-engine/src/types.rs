//! Core types shared by strategies, risk, portfolio and execution.
//!
//! These types define the contract between the decision pipeline and the
//! exchange / monitoring collaborators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// One closed candle for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub symbol: String,
    /// Candle open time as reported by the source
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Best bid at the time the bar was produced (zero if unknown)
    #[serde(default)]
    pub bid: Decimal,
    /// Best ask at the time the bar was produced (zero if unknown)
    #[serde(default)]
    pub ask: Decimal,
}

impl MarketBar {
    pub fn spread(&self) -> Decimal {
        if self.ask > Decimal::ZERO && self.bid > Decimal::ZERO {
            self.ask - self.bid
        } else {
            Decimal::ZERO
        }
    }
}

/// Direction of a trade signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalDirection::Hold)
    }

    /// Order side that executes this direction
    pub fn side(&self) -> Option<OrderSide> {
        match self {
            SignalDirection::Buy => Some(OrderSide::Buy),
            SignalDirection::Sell => Some(OrderSide::Sell),
            SignalDirection::Hold => None,
        }
    }
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalDirection::Buy => write!(f, "buy"),
            SignalDirection::Sell => write!(f, "sell"),
            SignalDirection::Hold => write!(f, "hold"),
        }
    }
}

/// KDJ values captured when a signal was produced
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KdjSnapshot {
    pub k: f64,
    pub d: f64,
    pub j: f64,
    pub rsv: f64,
}

/// MACD values captured when a signal was produced
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacdSnapshot {
    pub macd: f64,
    pub signal: f64,
    pub hist: f64,
}

/// Signal metadata: indicator snapshot and provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    pub signal_id: Uuid,
    /// Name of the strategy that produced the signal
    pub strategy: String,
    /// Set when a stop-loss / take-profit exit produced the signal
    #[serde(default)]
    pub stop_trigger: bool,
    pub kdj: Option<KdjSnapshot>,
    pub macd: Option<MacdSnapshot>,
    /// Named readings from the other indicators (moving averages, RSI, grid level)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indicators: BTreeMap<String, f64>,
}

/// Trade signal. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: SignalDirection,
    pub price: Decimal,
    /// Confidence score in [0, 1]
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: SignalMetadata,
}

impl Signal {
    pub fn new(
        symbol: &str,
        direction: SignalDirection,
        price: Decimal,
        confidence: f64,
        strategy: &str,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            direction,
            price,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            metadata: SignalMetadata {
                signal_id: Uuid::new_v4(),
                strategy: strategy.to_string(),
                stop_trigger: false,
                kdj: None,
                macd: None,
                indicators: BTreeMap::new(),
            },
        }
    }

    /// HOLD with zero confidence
    pub fn hold(symbol: &str, price: Decimal, strategy: &str) -> Self {
        Self::new(symbol, SignalDirection::Hold, price, 0.0, strategy)
    }

    pub fn with_kdj(mut self, kdj: KdjSnapshot) -> Self {
        self.metadata.kdj = Some(kdj);
        self
    }

    pub fn with_macd(mut self, macd: MacdSnapshot) -> Self {
        self.metadata.macd = Some(macd);
        self
    }

    pub fn with_indicator(mut self, name: &str, value: f64) -> Self {
        self.metadata.indicators.insert(name.to_string(), value);
        self
    }

    pub fn with_stop_trigger(mut self) -> Self {
        self.metadata.stop_trigger = true;
        self
    }

    pub fn is_stop_trigger(&self) -> bool {
        self.metadata.stop_trigger
    }

    pub fn strategy(&self) -> &str {
        &self.metadata.strategy
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(format!("side must be buy or sell, got '{}'", other)),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    /// Every type except market needs an explicit price
    pub fn requires_price(&self) -> bool {
        !matches!(self, OrderType::Market)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "market"),
            OrderType::Limit => write!(f, "limit"),
            OrderType::Stop => write!(f, "stop"),
            OrderType::StopLimit => write!(f, "stop_limit"),
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "market" => Ok(OrderType::Market),
            "limit" => Ok(OrderType::Limit),
            "stop" => Ok(OrderType::Stop),
            "stop_limit" => Ok(OrderType::StopLimit),
            other => Err(format!("unsupported order type '{}'", other)),
        }
    }
}
