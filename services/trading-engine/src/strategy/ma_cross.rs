//! Moving-average crossover strategy (`MA_CROSS`).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::cross::{ma_confidence, ma_cross, HeldPosition};
use super::params::{apply_patch, MaCrossParams, MaType, Validate};
use crate::error::Result;
use crate::indicators::{self, OhlcHistory};
use crate::types::{MarketBar, Signal};

pub const NAME: &str = "MA_CROSS";
const HISTORY_CAP: usize = 200;
/// Closes used for the volatility damping of confidence
const VOLATILITY_WINDOW: usize = 20;

#[derive(Debug, Clone)]
struct SymbolState {
    history: OhlcHistory,
    /// (fast, slow) from the previous bar once both were defined
    last: Option<(f64, f64)>,
    position: HeldPosition,
}

impl SymbolState {
    fn new() -> Self {
        Self {
            history: OhlcHistory::new(HISTORY_CAP),
            last: None,
            position: HeldPosition::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MaCrossStrategy {
    params: Arc<MaCrossParams>,
    symbols: HashMap<String, SymbolState>,
}

impl MaCrossStrategy {
    pub fn new(params: MaCrossParams) -> Self {
        Self {
            params: Arc::new(params),
            symbols: HashMap::new(),
        }
    }

    pub fn params(&self) -> Arc<MaCrossParams> {
        Arc::clone(&self.params)
    }

    fn averages(history: &OhlcHistory, params: &MaCrossParams) -> Option<(f64, f64)> {
        match params.ma_type {
            MaType::Sma => Some((
                indicators::sma(history.closes(), params.fast_period)?,
                indicators::sma(history.closes(), params.slow_period)?,
            )),
            MaType::Ema => Some((
                indicators::ema(history.closes(), params.fast_period)?,
                indicators::ema(history.closes(), params.slow_period)?,
            )),
        }
    }

    pub fn analyze(&mut self, bar: &MarketBar) -> Signal {
        let params = Arc::clone(&self.params);
        let state = self
            .symbols
            .entry(bar.symbol.clone())
            .or_insert_with(SymbolState::new);

        state.history.push(bar);
        let averages = if state.history.len() < params.slow_period {
            None
        } else {
            Self::averages(&state.history, &params)
        };

        let close = bar.close.to_f64().unwrap_or(0.0);
        let crossed = match (state.last, averages) {
            (Some((prev_fast, prev_slow)), Some((fast, slow))) => {
                ma_cross(prev_fast, prev_slow, fast, slow).map(|d| (d, slow))
            }
            _ => None,
        };
        let mut signal = match crossed {
            Some((direction, slow)) => {
                let closes: Vec<f64> = state.history.closes().collect();
                let recent = &closes[closes.len().saturating_sub(VOLATILITY_WINDOW)..];
                Signal::new(
                    &bar.symbol,
                    direction,
                    bar.close,
                    ma_confidence(params.exits.min_confidence, close, slow, recent),
                    NAME,
                )
            }
            None => Signal::hold(&bar.symbol, bar.close, NAME),
        };

        if let Some(direction) = state.position.exit_direction(close, &params.exits) {
            info!("{} exit triggered for {} at {}", NAME, bar.symbol, bar.close);
            signal = Signal::new(&bar.symbol, direction, bar.close, 1.0, NAME).with_stop_trigger();
        }

        match averages {
            Some((fast, slow)) => {
                state.last = Some((fast, slow));
                signal
                    .with_indicator("fast_ma", fast)
                    .with_indicator("slow_ma", slow)
            }
            None => signal,
        }
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
            .map(|(symbol, s)| {
                let (fast, slow) = s.last.unzip();
                (symbol.clone(), json!({ "fast_ma": fast, "slow_ma": slow }))
            })
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
            symbol: "ETH-USDT".to_string(),
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

    fn short_sma() -> MaCrossStrategy {
        MaCrossStrategy::new(MaCrossParams {
            fast_period: 2,
            slow_period: 4,
            ma_type: MaType::Sma,
            ..MaCrossParams::default()
        })
    }

    #[test]
    fn test_golden_then_death_cross() {
        let mut s = short_sma();
        for close in [dec!(100), dec!(99), dec!(98), dec!(97)] {
            assert_eq!(s.analyze(&bar(close)).direction, SignalDirection::Hold);
        }
        // fast 98.5 vs slow 98.5, no strict cross yet
        assert_eq!(s.analyze(&bar(dec!(100))).direction, SignalDirection::Hold);
        let up = s.analyze(&bar(dec!(104)));
        assert_eq!(up.direction, SignalDirection::Buy);
        assert!(up.confidence > 0.0);
        assert_eq!(up.metadata.indicators["fast_ma"], 102.0);

        // fast 104 vs slow 101.25, still above
        assert_eq!(s.analyze(&bar(dec!(104))).direction, SignalDirection::Hold);
        // fast 100 vs slow 101
        let down = s.analyze(&bar(dec!(96)));
        assert_eq!(down.direction, SignalDirection::Sell);
    }

    #[test]
    fn test_take_profit_overrides_cross() {
        let mut s = short_sma();
        s.on_position_open("ETH-USDT", dec!(100), dec!(1));
        let sig = s.analyze(&bar(dec!(105)));
        assert!(sig.is_stop_trigger());
        assert_eq!(sig.direction, SignalDirection::Sell);
    }
}
