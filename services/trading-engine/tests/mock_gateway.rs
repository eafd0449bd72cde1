//! Scripted exchange gateway and recording dashboard for tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use trading_engine::{
    monitor::{EngineEvent, MonitorSink, StatusReport},
    Credentials, EngineError, ExchangeGateway, GatewayOrder, GatewayOrderState, MarketBar,
    PlaceOrderRequest, Result, Timeframe,
};

pub const SYMBOL: &str = "BTC-USDT";

/// Candle `index` hours after a fixed origin
pub fn bar(index: i64, close: Decimal) -> MarketBar {
    let origin = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    MarketBar {
        symbol: SYMBOL.to_string(),
        timestamp: origin + Duration::hours(index),
        open: close,
        high: close + dec!(1),
        low: close - dec!(1),
        close,
        volume: dec!(10),
        bid: Decimal::ZERO,
        ask: Decimal::ZERO,
    }
}

#[derive(Default)]
struct MockState {
    placed: Vec<PlaceOrderRequest>,
    cancelled: Vec<String>,
    scripted: HashMap<String, GatewayOrder>,
    bars: Vec<MarketBar>,
    fail_place: bool,
    fail_cancel: bool,
    auto_fill: Option<Decimal>,
    reconnects: Vec<Credentials>,
}

/// Gateway whose responses are set by the test
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<MockState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bars(&self, bars: Vec<MarketBar>) {
        self.state.lock().unwrap().bars = bars;
    }

    pub fn fail_place(&self, fail: bool) {
        self.state.lock().unwrap().fail_place = fail;
    }

    pub fn fail_cancel(&self, fail: bool) {
        self.state.lock().unwrap().fail_cancel = fail;
    }

    /// Fill every market order completely at `price` on its first query.
    pub fn auto_fill_at(&self, price: Decimal) {
        self.state.lock().unwrap().auto_fill = Some(price);
    }

    pub fn script(
        &self,
        exchange_id: &str,
        state: GatewayOrderState,
        filled_size: Decimal,
        avg_price: Decimal,
        fee: Decimal,
    ) {
        self.state.lock().unwrap().scripted.insert(
            exchange_id.to_string(),
            GatewayOrder {
                exchange_order_id: exchange_id.to_string(),
                state,
                filled_size,
                avg_price,
                fee,
            },
        );
    }

    pub fn placed(&self) -> Vec<PlaceOrderRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn reconnects(&self) -> usize {
        self.state.lock().unwrap().reconnects.len()
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn place_order(&self, request: &PlaceOrderRequest) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_place {
            return Err(EngineError::Gateway("insufficient margin".to_string()));
        }
        state.placed.push(request.clone());
        Ok(format!("ex-{}", state.placed.len()))
    }

    async fn cancel_order(&self, _symbol: &str, exchange_order_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_cancel {
            return Err(EngineError::Gateway("order is being processed".to_string()));
        }
        state.cancelled.push(exchange_order_id.to_string());
        Ok(())
    }

    async fn get_order(&self, _symbol: &str, exchange_order_id: &str) -> Result<GatewayOrder> {
        let state = self.state.lock().unwrap();
        if let Some(order) = state.scripted.get(exchange_order_id) {
            return Ok(order.clone());
        }
        let index = exchange_order_id
            .trim_start_matches("ex-")
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1));
        let request = index.and_then(|i| state.placed.get(i));
        match (state.auto_fill, request) {
            (Some(price), Some(request)) => Ok(GatewayOrder {
                exchange_order_id: exchange_order_id.to_string(),
                state: GatewayOrderState::Filled,
                filled_size: request.size,
                avg_price: price,
                fee: Decimal::ZERO,
            }),
            _ => Ok(GatewayOrder {
                exchange_order_id: exchange_order_id.to_string(),
                state: GatewayOrderState::Live,
                filled_size: Decimal::ZERO,
                avg_price: Decimal::ZERO,
                fee: Decimal::ZERO,
            }),
        }
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<MarketBar>> {
        let state = self.state.lock().unwrap();
        let start = state.bars.len().saturating_sub(limit);
        Ok(state.bars[start..].to_vec())
    }

    async fn fetch_ticker_price(&self, _symbol: &str) -> Result<Decimal> {
        self.state
            .lock()
            .unwrap()
            .bars
            .last()
            .map(|b| b.close)
            .ok_or_else(|| EngineError::Gateway("no market data".to_string()))
    }

    fn available_timeframes(&self) -> Vec<Timeframe> {
        vec![Timeframe::M5, Timeframe::M15, Timeframe::H1]
    }

    async fn reconnect(&self, credentials: Credentials) -> Result<()> {
        self.state.lock().unwrap().reconnects.push(credentials);
        Ok(())
    }
}

/// Dashboard stand-in that keeps everything it receives
#[derive(Default)]
pub struct RecordingDashboard {
    statuses: Mutex<Vec<StatusReport>>,
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingDashboard {
    pub fn statuses(&self) -> Vec<StatusReport> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        self.events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.event_type == event_type)
    }
}

#[async_trait]
impl MonitorSink for RecordingDashboard {
    async fn push_status(&self, report: &StatusReport) -> anyhow::Result<()> {
        self.statuses.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn emit(&self, event: &EngineEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
