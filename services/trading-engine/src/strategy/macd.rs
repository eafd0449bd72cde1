//! Standalone MACD crossover strategy (`MACD`).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::cross::{macd_confidence, macd_cross, HeldPosition};
use super::params::{apply_patch, MacdStrategyParams, Validate};
use crate::error::Result;
use crate::indicators::{self, OhlcHistory};
use crate::types::{MacdSnapshot, MarketBar, Signal};

pub const NAME: &str = "MACD";
const HISTORY_CAP: usize = 500;
/// Extra bars beyond `max(slow, signal)` before crossovers count
pub const READY_MARGIN: usize = 3;

#[derive(Debug, Clone)]
struct SymbolState {
    history: OhlcHistory,
    last: MacdSnapshot,
    position: HeldPosition,
}

impl SymbolState {
    fn new() -> Self {
        Self {
            history: OhlcHistory::new(HISTORY_CAP),
            last: MacdSnapshot::default(),
            position: HeldPosition::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MacdStrategy {
    params: Arc<MacdStrategyParams>,
    symbols: HashMap<String, SymbolState>,
}

impl MacdStrategy {
    pub fn new(params: MacdStrategyParams) -> Self {
        Self {
            params: Arc::new(params),
            symbols: HashMap::new(),
        }
    }

    pub fn params(&self) -> Arc<MacdStrategyParams> {
        Arc::clone(&self.params)
    }

    pub fn analyze(&mut self, bar: &MarketBar) -> Signal {
        let params = Arc::clone(&self.params);
        let state = self
            .symbols
            .entry(bar.symbol.clone())
            .or_insert_with(SymbolState::new);

        state.history.push(bar);
        let macd = indicators::macd(
            state.history.closes(),
            params.macd.fast,
            params.macd.slow,
            params.macd.signal,
        )
        .unwrap_or_default();

        let required =
            indicators::macd_min_history(params.macd.slow, params.macd.signal, READY_MARGIN);
        let signal = if state.history.len() < required {
            Signal::hold(&bar.symbol, bar.close, NAME)
        } else {
            let close = bar.close.to_f64().unwrap_or(0.0);
            if let Some(direction) = state.position.exit_direction(close, &params.exits) {
                info!("{} exit triggered for {} at {}", NAME, bar.symbol, bar.close);
                Signal::new(&bar.symbol, direction, bar.close, 1.0, NAME).with_stop_trigger()
            } else {
                match macd_cross(state.last.macd, state.last.signal, &macd) {
                    Some(direction) => Signal::new(
                        &bar.symbol,
                        direction,
                        bar.close,
                        macd_confidence(params.exits.min_confidence, &macd),
                        NAME,
                    ),
                    None => Signal::hold(&bar.symbol, bar.close, NAME),
                }
            }
        };

        state.last = macd;
        signal.with_macd(macd)
    }

    pub fn update_parameters(&mut self, patch: &Value) -> Result<()> {
        let updated = apply_patch(self.params.as_ref(), patch)?;
        self.params = Arc::new(updated);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()
    }

    pub fn on_position_open(&mut self, symbol: &str, price: Decimal, size: Decimal) {
        self.symbols
            .entry(symbol.to_string())
            .or_insert_with(SymbolState::new)
            .position = HeldPosition::open(size, price);
    }

    pub fn on_position_close(&mut self, symbol: &str) {
        if let Some(state) = self.symbols.get_mut(symbol) {
            state.position = HeldPosition::default();
        }
    }

    pub fn indicator_values(&self) -> Value {
        let values: serde_json::Map<String, Value> = self
            .symbols
            .iter()
            .map(|(symbol, s)| (symbol.clone(), json!({ "macd": s.last })))
            .collect();
        Value::Object(values)
    }

    pub fn status(&self) -> Value {
        json!({
            "parameters": self.params.as_ref(),
            "indicators": self.indicator_values(),
            "history_len": self.symbols.values().map(|s| s.history.len()).max().unwrap_or(0),
        })
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
    }
}
