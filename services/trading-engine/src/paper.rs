//! Paper exchange gateway
//!
//! Simulated venue for demo mode. Prices follow a seeded random walk per
//! symbol; candles are built on the wall clock so a polled snapshot always
//! ends with the forming candle. Market orders fill on the first status
//! query, limit orders once the price crosses them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::gateway::{Credentials, ExchangeGateway, GatewayOrder, GatewayOrderState, PlaceOrderRequest};
use crate::market_data::Timeframe;
use crate::types::{MarketBar, OrderSide, OrderType};

/// Candles kept per symbol and timeframe
const SERIES_CAP: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub seed: u64,
    pub start_price: Decimal,
    /// Max relative move per step
    pub volatility: f64,
    pub fee_rate: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: dec!(50000),
            volatility: 0.002,
            fee_rate: dec!(0.001),
        }
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: PlaceOrderRequest,
    state: GatewayOrderState,
    avg_price: Decimal,
    fee: Decimal,
}

struct PaperState {
    rng: StdRng,
    prices: HashMap<String, Decimal>,
    series: HashMap<(String, Timeframe), Vec<MarketBar>>,
    orders: HashMap<String, PaperOrder>,
    next_id: u64,
    connections: u32,
    simulated: bool,
}

pub struct PaperGateway {
    config: PaperConfig,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(config: PaperConfig) -> Self {
        let state = PaperState {
            rng: StdRng::seed_from_u64(config.seed),
            prices: HashMap::new(),
            series: HashMap::new(),
            orders: HashMap::new(),
            next_id: 1,
            connections: 1,
            simulated: true,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PaperState>> {
        self.state
            .lock()
            .map_err(|_| EngineError::Gateway("paper gateway state poisoned".to_string()))
    }

    /// Pin the current price of a symbol.
    pub fn set_price(&self, symbol: &str, price: Decimal) -> Result<()> {
        self.lock()?.prices.insert(symbol.to_string(), price);
        Ok(())
    }

    /// Number of sessions established, including reconnects
    pub fn connections(&self) -> Result<u32> {
        Ok(self.lock()?.connections)
    }

    fn step(&self, state: &mut PaperState, price: Decimal) -> Decimal {
        let vol = self.config.volatility.abs();
        if vol == 0.0 {
            return price;
        }
        let change = state.rng.gen_range(-vol..vol);
        let factor = Decimal::try_from(1.0 + change).unwrap_or(Decimal::ONE);
        (price * factor).round_dp(2).max(dec!(0.01))
    }

    fn current_price(&self, state: &PaperState, symbol: &str) -> Decimal {
        state
            .prices
            .get(symbol)
            .copied()
            .unwrap_or(self.config.start_price)
    }

    fn new_bar(&self, state: &mut PaperState, symbol: &str, open_time: DateTime<Utc>, open: Decimal) -> MarketBar {
        let close = self.step(state, open);
        let wiggle = self.step(state, open.max(close));
        let high = open.max(close).max(wiggle);
        let low = open.min(close).min(self.step(state, open.min(close)));
        let volume = Decimal::from(state.rng.gen_range(1u32..1_000));
        MarketBar {
            symbol: symbol.to_string(),
            timestamp: open_time,
            open,
            high,
            low,
            close,
            volume,
            bid: close - dec!(0.01),
            ask: close + dec!(0.01),
        }
    }

    /// Extend the series up to the candle forming at `now` and move it one step.
    fn advance(
        &self,
        state: &mut PaperState,
        symbol: &str,
        timeframe: Timeframe,
        now: DateTime<Utc>,
        backfill: usize,
    ) -> Vec<MarketBar> {
        let forming_open = timeframe.canonicalize(now);
        let interval = Duration::seconds(timeframe.duration_secs());
        let key = (symbol.to_string(), timeframe);
        let mut series = state.series.remove(&key).unwrap_or_default();

        let mut open_price = series
            .last()
            .map(|b| b.close)
            .unwrap_or_else(|| self.current_price(state, symbol));
        let mut next_open = match series.last() {
            Some(last) => last.timestamp + interval,
            None => forming_open - interval * (backfill.max(1) as i32 - 1),
        };
        while next_open <= forming_open {
            let bar = self.new_bar(state, symbol, next_open, open_price);
            open_price = bar.close;
            series.push(bar);
            next_open = next_open + interval;
        }

        if let Some(forming) = series.last_mut() {
            let close = self.step(state, forming.close);
            forming.close = close;
            forming.high = forming.high.max(close);
            forming.low = forming.low.min(close);
            forming.bid = close - dec!(0.01);
            forming.ask = close + dec!(0.01);
            state.prices.insert(symbol.to_string(), close);
        }
        if series.len() > SERIES_CAP {
            series.drain(..series.len() - SERIES_CAP);
        }
        state.series.insert(key, series.clone());
        series
    }

    fn settle(&self, state: &mut PaperState, exchange_order_id: &str) -> Result<GatewayOrder> {
        let Some(order) = state.orders.get(exchange_order_id).cloned() else {
            return Err(EngineError::Gateway(format!(
                "unknown paper order {}",
                exchange_order_id
            )));
        };
        let mut order = order;
        if order.state == GatewayOrderState::Live {
            let price = self.current_price(state, &order.request.symbol);
            let fill_price = match (order.request.order_type, order.request.price) {
                (OrderType::Market, _) => Some(price),
                (_, Some(limit)) => match order.request.side {
                    OrderSide::Buy if price <= limit => Some(limit),
                    OrderSide::Sell if price >= limit => Some(limit),
                    _ => None,
                },
                (_, None) => None,
            };
            if let Some(fill_price) = fill_price {
                order.state = GatewayOrderState::Filled;
                order.avg_price = fill_price;
                order.fee = order.request.size * fill_price * self.config.fee_rate;
                debug!(
                    "Paper fill: {} {} {} @ {}",
                    exchange_order_id, order.request.side, order.request.size, fill_price
                );
            }
            state.orders.insert(exchange_order_id.to_string(), order.clone());
        }

        let filled_size = if order.state == GatewayOrderState::Filled {
            order.request.size
        } else {
            Decimal::ZERO
        };
        Ok(GatewayOrder {
            exchange_order_id: exchange_order_id.to_string(),
            state: order.state,
            filled_size,
            avg_price: order.avg_price,
            fee: order.fee,
        })
    }
}

impl Default for PaperGateway {
    fn default() -> Self {
        Self::new(PaperConfig::default())
    }
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    fn name(&self) -> &str {
        "paper"
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<String> {
        if request.size <= Decimal::ZERO {
            return Err(EngineError::Gateway(format!("invalid size {}", request.size)));
        }
        if request.order_type.requires_price() && request.price.is_none() {
            return Err(EngineError::Gateway(format!(
                "{} order without price",
                request.order_type
            )));
        }
        let mut state = self.lock()?;
        let id = format!("paper-{}", state.next_id);
        state.next_id += 1;
        state.orders.insert(
            id.clone(),
            PaperOrder {
                request: request.clone(),
                state: GatewayOrderState::Live,
                avg_price: Decimal::ZERO,
                fee: Decimal::ZERO,
            },
        );
        info!(
            "Paper order accepted: {} | {} {} {} {}",
            id, request.symbol, request.side, request.order_type, request.size
        );
        Ok(id)
    }

    async fn cancel_order(&self, _symbol: &str, exchange_order_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        match state.orders.get_mut(exchange_order_id) {
            Some(order) if order.state == GatewayOrderState::Live => {
                order.state = GatewayOrderState::Cancelled;
                Ok(())
            }
            Some(order) => Err(EngineError::Gateway(format!(
                "paper order {} is {:?}",
                exchange_order_id, order.state
            ))),
            None => Err(EngineError::Gateway(format!(
                "unknown paper order {}",
                exchange_order_id
            ))),
        }
    }

    async fn get_order(&self, _symbol: &str, exchange_order_id: &str) -> Result<GatewayOrder> {
        let mut state = self.lock()?;
        self.settle(&mut state, exchange_order_id)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<MarketBar>> {
        let mut state = self.lock()?;
        let series = self.advance(&mut state, symbol, timeframe, Utc::now(), limit);
        let start = series.len().saturating_sub(limit);
        Ok(series[start..].to_vec())
    }

    async fn fetch_ticker_price(&self, symbol: &str) -> Result<Decimal> {
        let state = self.lock()?;
        Ok(self.current_price(&state, symbol))
    }

    fn available_timeframes(&self) -> Vec<Timeframe> {
        Timeframe::ALL.to_vec()
    }

    async fn reconnect(&self, credentials: Credentials) -> Result<()> {
        let mut state = self.lock()?;
        state.connections += 1;
        state.simulated = credentials.simulated;
        info!(
            "Paper gateway reconnected: {:?} | session {}",
            credentials, state.connections
        );
        Ok(())
    }
}
