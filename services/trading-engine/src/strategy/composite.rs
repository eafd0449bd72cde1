//! Composite KDJ+MACD resonance strategy (`KDJ_MACD`).
//!
//! Both indicators are evaluated on every closed bar. A trade signal is
//! emitted only when the KDJ crossover and the MACD crossover fire in the same
//! direction on the same bar. An open position breaching stop-loss or
//! take-profit overrides the indicators entirely.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::cross::{kdj_confidence, kdj_cross, macd_confidence, macd_cross, HeldPosition};
use super::params::{apply_patch, CompositeParams, Validate};
use crate::error::Result;
use crate::indicators::{self, OhlcHistory, KDJ_SEED};
use crate::types::{KdjSnapshot, MacdSnapshot, MarketBar, Signal};

pub const NAME: &str = "KDJ_MACD";
pub const HISTORY_CAP: usize = 500;
pub const READY_MARGIN: usize = 3;

/// Per-symbol indicator memory
#[derive(Debug, Clone)]
struct SymbolState {
    history: OhlcHistory,
    kdj: KdjSnapshot,
    macd: MacdSnapshot,
    position: HeldPosition,
}

impl SymbolState {
    fn new(cap: usize) -> Self {
        Self {
            history: OhlcHistory::new(cap),
            kdj: KdjSnapshot {
                k: KDJ_SEED,
                d: KDJ_SEED,
                j: KDJ_SEED,
                rsv: 0.0,
            },
            macd: MacdSnapshot::default(),
            position: HeldPosition::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompositeStrategy {
    params: Arc<CompositeParams>,
    history_cap: usize,
    symbols: HashMap<String, SymbolState>,
}

impl CompositeStrategy {
    pub fn new(params: CompositeParams) -> Self {
        Self::with_history_cap(params, HISTORY_CAP)
    }

    pub fn with_history_cap(params: CompositeParams, history_cap: usize) -> Self {
        Self {
            params: Arc::new(params),
            history_cap,
            symbols: HashMap::new(),
        }
    }

    /// Current parameter set. Readers holding the `Arc` keep a consistent
    /// view even if an update lands afterwards.
    pub fn params(&self) -> Arc<CompositeParams> {
        Arc::clone(&self.params)
    }

    pub fn analyze(&mut self, bar: &MarketBar) -> Signal {
        let params = Arc::clone(&self.params);
        let cap = self.history_cap;
        let state = self
            .symbols
            .entry(bar.symbol.clone())
            .or_insert_with(|| SymbolState::new(cap));

        state.history.push(bar);

        let kdj = indicators::kdj(
            &state.history,
            params.kdj.period,
            (params.kdj.k_smooth, params.kdj.d_smooth),
            state.kdj.k,
            state.kdj.d,
        );
        let macd = indicators::macd(
            state.history.closes(),
            params.macd.fast,
            params.macd.slow,
            params.macd.signal,
        )
        .unwrap_or_default();

        let required =
            indicators::macd_min_history(params.macd.slow, params.macd.signal, READY_MARGIN);
        let close = bar.close.to_f64().unwrap_or(0.0);

        let signal = if state.history.len() < required {
            Signal::hold(&bar.symbol, bar.close, NAME)
        } else if let Some(direction) = state.position.exit_direction(close, &params.exits) {
            info!(
                "{} exit triggered for {}: {} at {} (pnl ratio {:.4})",
                NAME,
                bar.symbol,
                direction,
                bar.close,
                state.position.pnl_ratio(close).unwrap_or(0.0)
            );
            Signal::new(&bar.symbol, direction, bar.close, 1.0, NAME).with_stop_trigger()
        } else {
            let base = params.exits.min_confidence;
            let kdj_vote = kdj_cross(state.kdj.k, state.kdj.d, &kdj, &params.kdj)
                .map(|d| (d, kdj_confidence(base, &kdj)));
            let macd_vote = macd_cross(state.macd.macd, state.macd.signal, &macd)
                .map(|d| (d, macd_confidence(base, &macd)));

            match (kdj_vote, macd_vote) {
                (Some((kd, kc)), Some((md, mc))) if kd == md => {
                    Signal::new(&bar.symbol, kd, bar.close, kc.min(mc), NAME)
                }
                (None, None) => Signal::hold(&bar.symbol, bar.close, NAME),
                (k, m) => {
                    debug!(
                        "{} no resonance on {}: kdj={:?} macd={:?}",
                        NAME, bar.symbol, k, m
                    );
                    Signal::hold(&bar.symbol, bar.close, NAME)
                }
            }
        };

        // Indicator memory advances on every path, HOLD included.
        state.kdj = kdj;
        state.macd = macd;

        signal.with_kdj(kdj).with_macd(macd)
    }

    pub fn update_parameters(&mut self, patch: &Value) -> Result<()> {
        let updated = apply_patch(self.params.as_ref(), patch)?;
        self.params = Arc::new(updated);
        Ok(())
    }

    /// Swap in a complete parameter set after validating it.
    pub fn replace_parameters(&mut self, params: CompositeParams) -> Result<()> {
        params.validate()?;
        self.params = Arc::new(params);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()
    }

    pub fn on_position_open(&mut self, symbol: &str, price: Decimal, size: Decimal) {
        let cap = self.history_cap;
        self.symbols
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState::new(cap))
            .position = HeldPosition::open(size, price);
    }

    pub fn on_position_close(&mut self, symbol: &str) {
        if let Some(state) = self.symbols.get_mut(symbol) {
            state.position = HeldPosition::default();
        }
    }

    pub fn position(&self, symbol: &str) -> HeldPosition {
        self.symbols
            .get(symbol)
            .map(|s| s.position)
            .unwrap_or_default()
    }

    pub fn indicator_values(&self) -> Value {
        let values: serde_json::Map<String, Value> = self
            .symbols
            .iter()
            .map(|(symbol, s)| (symbol.clone(), json!({ "kdj": s.kdj, "macd": s.macd })))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalDirection;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal) -> MarketBar {
        MarketBar {
            symbol: "BTC-USDT-SWAP".to_string(),
            timestamp: Utc::now(),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(10),
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
        }
    }

    #[test]
    fn test_insufficient_history_holds_but_advances_state() {
        let mut s = CompositeStrategy::new(CompositeParams::default());
        // slow 13, signal 4 -> 16 bars required
        for i in 0..15 {
            let sig = s.analyze(&bar(Decimal::from(100 + i)));
            assert_eq!(sig.direction, SignalDirection::Hold);
            assert_eq!(sig.confidence, 0.0);
        }
        let state = &s.symbols["BTC-USDT-SWAP"];
        assert_ne!(state.kdj.k, KDJ_SEED);
        assert!(state.macd.macd > 0.0);
    }

    #[test]
    fn test_repeated_bar_does_not_refire() {
        let mut s = CompositeStrategy::new(CompositeParams::default());
        for i in 0..40 {
            s.analyze(&bar(Decimal::from(200 - 2 * i)));
        }
        let mut fired_on = None;
        for i in 0..15 {
            let b = bar(Decimal::from(122 + 4 * i));
            if s.analyze(&b).direction.is_actionable() {
                fired_on = Some(b);
                break;
            }
        }
        let repeat = fired_on.expect("no resonance after reversal");
        assert_eq!(s.analyze(&repeat).direction, SignalDirection::Hold);
    }

    #[test]
    fn test_resonance_buy_after_decline() {
        let mut s = CompositeStrategy::new(CompositeParams::default());
        for i in 0..40 {
            s.analyze(&bar(Decimal::from(200 - 2 * i)));
        }
        let mut fired = Vec::new();
        for i in 0..15 {
            let sig = s.analyze(&bar(Decimal::from(122 + 4 * i)));
            if sig.direction.is_actionable() {
                fired.push(sig);
            }
        }
        assert!(!fired.is_empty());
        let first = &fired[0];
        assert_eq!(first.direction, SignalDirection::Buy);
        assert!(first.confidence > 0.0 && first.confidence <= 1.0);
        assert!(first.metadata.kdj.is_some() && first.metadata.macd.is_some());
    }

    #[test]
    fn test_take_profit_has_priority() {
        let mut s = CompositeStrategy::new(CompositeParams::default());
        for _ in 0..20 {
            s.analyze(&bar(dec!(100)));
        }
        s.on_position_open("BTC-USDT-SWAP", dec!(100), dec!(0.5));
        let sig = s.analyze(&bar(dec!(105)));
        assert_eq!(sig.direction, SignalDirection::Sell);
        assert_eq!(sig.confidence, 1.0);
        assert!(sig.is_stop_trigger());
        assert_eq!(sig.strategy(), NAME);
    }

    #[test]
    fn test_patch_is_atomic() {
        let mut s = CompositeStrategy::new(CompositeParams::default());
        let before = s.params();
        s.update_parameters(&json!({"macd": {"fast": 8}})).unwrap();
        assert_eq!(before.macd.fast, 5);
        assert_eq!(s.params().macd.fast, 8);
        assert_eq!(s.params().macd.slow, 13);

        assert!(s.update_parameters(&json!({"macd": {"slow": 4}})).is_err());
        assert_eq!(s.params().macd.slow, 13);
    }
}
