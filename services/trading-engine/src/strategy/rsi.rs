//! RSI band-exit strategy (`RSI`).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::cross::{rsi_confidence, rsi_cross, HeldPosition};
use super::params::{apply_patch, RsiParams, Validate};
use crate::error::Result;
use crate::indicators::{self, OhlcHistory};
use crate::types::{MarketBar, Signal};

pub const NAME: &str = "RSI";
const HISTORY_CAP: usize = 200;
/// Neutral reading assumed before the first RSI value
const RSI_SEED: f64 = 50.0;

#[derive(Debug, Clone)]
struct SymbolState {
    history: OhlcHistory,
    last_rsi: f64,
    position: HeldPosition,
}

impl SymbolState {
    fn new() -> Self {
        Self {
            history: OhlcHistory::new(HISTORY_CAP),
            last_rsi: RSI_SEED,
            position: HeldPosition::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RsiStrategy {
    params: Arc<RsiParams>,
    symbols: HashMap<String, SymbolState>,
}

impl RsiStrategy {
    pub fn new(params: RsiParams) -> Self {
        Self {
            params: Arc::new(params),
            symbols: HashMap::new(),
        }
    }

    pub fn params(&self) -> Arc<RsiParams> {
        Arc::clone(&self.params)
    }

    pub fn analyze(&mut self, bar: &MarketBar) -> Signal {
        let params = Arc::clone(&self.params);
        let state = self
            .symbols
            .entry(bar.symbol.clone())
            .or_insert_with(SymbolState::new);

        state.history.push(bar);
        let Some(rsi) = indicators::rsi(state.history.closes(), params.rsi_period) else {
            return Signal::hold(&bar.symbol, bar.close, NAME);
        };

        let mut signal = match rsi_cross(state.last_rsi, rsi, &params) {
            Some(direction) => Signal::new(
                &bar.symbol,
                direction,
                bar.close,
                rsi_confidence(params.exits.min_confidence, rsi, direction, &params),
                NAME,
            ),
            None => Signal::hold(&bar.symbol, bar.close, NAME),
        };

        let close = bar.close.to_f64().unwrap_or(0.0);
        if let Some(direction) = state.position.exit_direction(close, &params.exits) {
            info!(
                "{} exit triggered for {} at {} (rsi {:.2})",
                NAME, bar.symbol, bar.close, rsi
            );
            signal = Signal::new(&bar.symbol, direction, bar.close, 1.0, NAME).with_stop_trigger();
        }

        state.last_rsi = rsi;
        signal.with_indicator("rsi", rsi)
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
            .map(|(symbol, s)| (symbol.clone(), json!({ "rsi": s.last_rsi })))
            .collect();
        Value::Object(values)
    }

    pub fn status(&self) -> Value {
        let positions: HashMap<&String, &HeldPosition> = self
            .symbols
            .iter()
            .filter(|(_, s)| !s.position.is_flat())
            .map(|(symbol, s)| (symbol, &s.position))
            .collect();
        json!({
            "parameters": self.params.as_ref(),
            "indicators": self.indicator_values(),
            "positions": positions,
            "history_len": self.symbols.values().map(|s| s.history.len()).max().unwrap_or(0),
        })
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalDirection;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal) -> MarketBar {
        MarketBar {
            symbol: "SOL-USDT".to_string(),
            timestamp: Utc::now(),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(1),
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
        }
    }

    fn quick() -> RsiStrategy {
        RsiStrategy::new(RsiParams {
            rsi_period: 2,
            ..RsiParams::default()
        })
    }

    #[test]
    fn test_buy_when_leaving_oversold() {
        let mut s = quick();
        assert_eq!(s.analyze(&bar(dec!(100))).direction, SignalDirection::Hold);
        s.analyze(&bar(dec!(98)));
        // two losses -> RSI 0
        let low = s.analyze(&bar(dec!(96)));
        assert_eq!(low.direction, SignalDirection::Hold);
        assert_eq!(low.metadata.indicators["rsi"], 0.0);

        // loss 2, gain 4 -> RSI 66.7
        let up = s.analyze(&bar(dec!(100)));
        assert_eq!(up.direction, SignalDirection::Buy);
        assert_eq!(up.confidence, 0.6);
    }

    #[test]
    fn test_sell_when_leaving_overbought() {
        let mut s = quick();
        for close in [dec!(100), dec!(102), dec!(104)] {
            s.analyze(&bar(close));
        }
        let down = s.analyze(&bar(dec!(101)));
        assert_eq!(down.direction, SignalDirection::Sell);
    }

    #[test]
    fn test_stop_loss_exit() {
        let mut s = quick();
        s.on_position_open("SOL-USDT", dec!(100), dec!(1));
        for close in [dec!(100), dec!(100)] {
            s.analyze(&bar(close));
        }
        let exit = s.analyze(&bar(dec!(97)));
        assert!(exit.is_stop_trigger());
        assert_eq!(exit.direction, SignalDirection::Sell);
    }
}
