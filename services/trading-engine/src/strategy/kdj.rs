//! Standalone KDJ crossover strategy (`KDJ`).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::cross::{kdj_confidence, kdj_cross, HeldPosition};
use super::params::{apply_patch, KdjStrategyParams};
use crate::error::Result;
use crate::indicators::{self, OhlcHistory, KDJ_SEED};
use crate::types::{KdjSnapshot, MarketBar, Signal};

pub const NAME: &str = "KDJ";
const HISTORY_CAP: usize = 300;

#[derive(Debug, Clone)]
struct SymbolState {
    history: OhlcHistory,
    last: KdjSnapshot,
    position: HeldPosition,
}

impl SymbolState {
    fn new() -> Self {
        Self {
            history: OhlcHistory::new(HISTORY_CAP),
            last: KdjSnapshot {
                k: KDJ_SEED,
                d: KDJ_SEED,
                j: KDJ_SEED,
                rsv: 0.0,
            },
            position: HeldPosition::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KdjStrategy {
    params: Arc<KdjStrategyParams>,
    symbols: HashMap<String, SymbolState>,
}

impl KdjStrategy {
    pub fn new(params: KdjStrategyParams) -> Self {
        Self {
            params: Arc::new(params),
            symbols: HashMap::new(),
        }
    }

    pub fn params(&self) -> Arc<KdjStrategyParams> {
        Arc::clone(&self.params)
    }

    pub fn analyze(&mut self, bar: &MarketBar) -> Signal {
        let params = Arc::clone(&self.params);
        let state = self
            .symbols
            .entry(bar.symbol.clone())
            .or_insert_with(SymbolState::new);

        state.history.push(bar);
        let kdj = indicators::kdj(
            &state.history,
            params.kdj.period,
            (params.kdj.k_smooth, params.kdj.d_smooth),
            state.last.k,
            state.last.d,
        );

        let mut signal = match kdj_cross(state.last.k, state.last.d, &kdj, &params.kdj) {
            Some(direction) => Signal::new(
                &bar.symbol,
                direction,
                bar.close,
                kdj_confidence(params.exits.min_confidence, &kdj),
                NAME,
            ),
            None => Signal::hold(&bar.symbol, bar.close, NAME),
        };

        let close = bar.close.to_f64().unwrap_or(0.0);
        if let Some(direction) = state.position.exit_direction(close, &params.exits) {
            info!(
                "{} exit triggered for {} at {} (pnl ratio {:.4})",
                NAME,
                bar.symbol,
                bar.close,
                state.position.pnl_ratio(close).unwrap_or(0.0)
            );
            signal = Signal::new(&bar.symbol, direction, bar.close, 1.0, NAME).with_stop_trigger();
        }

        state.last = kdj;
        signal.with_kdj(kdj)
    }

    pub fn update_parameters(&mut self, patch: &Value) -> Result<()> {
        let updated = apply_patch(self.params.as_ref(), patch)?;
        self.params = Arc::new(updated);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        use super::params::Validate;
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
            .map(|(symbol, s)| (symbol.clone(), json!({ "kdj": s.last })))
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

    fn bar(high: Decimal, low: Decimal, close: Decimal) -> MarketBar {
        MarketBar {
            symbol: "BTC-USDT".to_string(),
            timestamp: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: dec!(1),
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
        }
    }

    #[test]
    fn test_holds_until_period_is_buffered() {
        let mut s = KdjStrategy::new(KdjStrategyParams::default());
        for _ in 0..8 {
            let sig = s.analyze(&bar(dec!(110), dec!(90), dec!(105)));
            assert_eq!(sig.direction, SignalDirection::Hold);
            assert_eq!(sig.confidence, 0.0);
        }
    }

    #[test]
    fn test_buy_on_cross_up_from_seed() {
        let mut s = KdjStrategy::new(KdjStrategyParams::default());
        for _ in 0..8 {
            s.analyze(&bar(dec!(110), dec!(90), dec!(100)));
        }
        // RSV = 75 -> K = 58.33, D = 52.78, K crosses above D below 80
        let sig = s.analyze(&bar(dec!(110), dec!(90), dec!(105)));
        assert_eq!(sig.direction, SignalDirection::Buy);
        assert!(sig.confidence > 0.0);
        assert!(sig.metadata.kdj.is_some());
    }

    #[test]
    fn test_stop_loss_overrides_cross() {
        let mut s = KdjStrategy::new(KdjStrategyParams::default());
        s.on_position_open("BTC-USDT", dec!(100), dec!(1));
        let sig = s.analyze(&bar(dec!(97), dec!(95), dec!(96)));
        assert_eq!(sig.direction, SignalDirection::Sell);
        assert_eq!(sig.confidence, 1.0);
        assert!(sig.is_stop_trigger());

        s.on_position_close("BTC-USDT");
        let sig = s.analyze(&bar(dec!(97), dec!(95), dec!(96)));
        assert!(!sig.is_stop_trigger());
    }

    #[test]
    fn test_rejected_patch_keeps_parameters() {
        let mut s = KdjStrategy::new(KdjStrategyParams::default());
        assert!(s.update_parameters(&json!({"period": 0})).is_err());
        assert_eq!(s.params().kdj.period, 9);
        s.update_parameters(&json!({"period": 14})).unwrap();
        assert_eq!(s.params().kdj.period, 14);
    }
}
