//! Exchange gateway contract
//!
//! The engine talks to an exchange only through [`ExchangeGateway`]. Adapters
//! normalize exchange-specific order states into [`GatewayOrderState`] before
//! they reach the engine.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::market_data::Timeframe;
use crate::types::{MarketBar, OrderSide, OrderType};

/// Order placement request as the gateway sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: Decimal,
    pub price: Option<Decimal>,
    /// Locally assigned id, echoed back by some venues
    pub client_order_id: String,
}

/// Normalized exchange order state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayOrderState {
    Live,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    Rejected,
}

impl GatewayOrderState {
    /// Map a raw exchange status string. Unknown strings are treated as live
    /// so the order keeps being polled.
    pub fn from_exchange_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "partially_filled" | "partial" | "partially-filled" => Self::PartiallyFilled,
            "filled" | "closed" => Self::Filled,
            "cancelled" | "canceled" | "mmp_canceled" => Self::Cancelled,
            "expired" => Self::Expired,
            "rejected" | "failed" => Self::Rejected,
            _ => Self::Live,
        }
    }
}

/// Order details returned by a status query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayOrder {
    pub exchange_order_id: String,
    pub state: GatewayOrderState,
    pub filled_size: Decimal,
    pub avg_price: Decimal,
    pub fee: Decimal,
}

/// Exchange API credentials
#[derive(Clone, Default, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    #[serde(default)]
    pub passphrase: String,
    /// Use the venue's simulated trading environment
    #[serde(default)]
    pub simulated: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &"***")
            .field("passphrase", &"***")
            .field("simulated", &self.simulated)
            .finish()
    }
}

fn redact(key: &str) -> String {
    if key.chars().count() <= 4 {
        "***".to_string()
    } else {
        format!("{}***", key.chars().take(4).collect::<String>())
    }
}

/// Contract the engine requires from an exchange adapter
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Backend name, persisted as the exchange selection
    fn name(&self) -> &str;

    /// Place an order; returns the exchange-assigned order id.
    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<String>;

    async fn cancel_order(&self, symbol: &str, exchange_order_id: &str) -> Result<()>;

    async fn get_order(&self, symbol: &str, exchange_order_id: &str) -> Result<GatewayOrder>;

    /// Candles in ascending time order; the last one may still be forming.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<MarketBar>>;

    async fn fetch_ticker_price(&self, symbol: &str) -> Result<Decimal>;

    fn available_timeframes(&self) -> Vec<Timeframe>;

    /// Re-establish the session with new credentials.
    async fn reconnect(&self, credentials: Credentials) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_normalization() {
        assert_eq!(GatewayOrderState::from_exchange_str("filled"), GatewayOrderState::Filled);
        assert_eq!(
            GatewayOrderState::from_exchange_str("CANCELED"),
            GatewayOrderState::Cancelled
        );
        assert_eq!(
            GatewayOrderState::from_exchange_str("partially_filled"),
            GatewayOrderState::PartiallyFilled
        );
        assert_eq!(GatewayOrderState::from_exchange_str("live"), GatewayOrderState::Live);
        assert_eq!(GatewayOrderState::from_exchange_str("weird"), GatewayOrderState::Live);
    }

    #[test]
    fn test_credentials_are_redacted() {
        let creds = Credentials {
            api_key: "abcdefgh".to_string(),
            api_secret: "topsecret".to_string(),
            passphrase: "pass".to_string(),
            simulated: true,
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("abcd***"));
        assert!(!printed.contains("topsecret"));
        assert!(!printed.contains("efgh"));
    }
}
