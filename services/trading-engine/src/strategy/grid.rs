//! Grid trading strategy (`GRID`).
//!
//! Evenly spaced price levels span `price_range` around a base price. A
//! close just under a level buys one `grid_size` lot for that level; a close
//! just over a level that holds a lot sells it. Each level holds at most one
//! lot and the grid as a whole at most `max_position`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::params::{apply_patch, GridParams, Validate};
use crate::error::Result;
use crate::types::{MarketBar, Signal, SignalDirection};

pub const NAME: &str = "GRID";

#[derive(Debug, Clone, Default, Serialize)]
struct GridState {
    base_price: f64,
    levels: Vec<f64>,
    /// Lot held per level, parallel to `levels`
    holdings: Vec<f64>,
    total: f64,
}

impl GridState {
    fn build(base_price: f64, params: &GridParams) -> Self {
        let lower = base_price * (1.0 - params.price_range / 2.0);
        let upper = base_price * (1.0 + params.price_range / 2.0);
        let steps = params.grid_count.max(2) - 1;
        let levels: Vec<f64> = (0..=steps)
            .map(|i| lower + (upper - lower) * i as f64 / steps as f64)
            .collect();
        info!(
            "Grid built: {} levels between {:.4} and {:.4}",
            levels.len(),
            lower,
            upper
        );
        Self {
            base_price,
            holdings: vec![0.0; levels.len()],
            levels,
            total: 0.0,
        }
    }

    /// Trade at most one level per bar, lowest level first.
    fn step(&mut self, close: f64, params: &GridParams) -> Option<(SignalDirection, usize)> {
        for (i, level) in self.levels.iter().enumerate() {
            if (close - level).abs() / level >= params.tolerance {
                continue;
            }
            if close < *level {
                if self.total < params.max_position && self.holdings[i] < params.grid_size {
                    self.holdings[i] += params.grid_size;
                    self.total += params.grid_size;
                    return Some((SignalDirection::Buy, i));
                }
            } else if close > *level && self.holdings[i] > 0.0 {
                self.total -= self.holdings[i];
                self.holdings[i] = 0.0;
                return Some((SignalDirection::Sell, i));
            }
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct GridStrategy {
    params: Arc<GridParams>,
    grids: HashMap<String, GridState>,
}

impl GridStrategy {
    pub fn new(params: GridParams) -> Self {
        Self {
            params: Arc::new(params),
            grids: HashMap::new(),
        }
    }

    pub fn params(&self) -> Arc<GridParams> {
        Arc::clone(&self.params)
    }

    pub fn analyze(&mut self, bar: &MarketBar) -> Signal {
        let params = Arc::clone(&self.params);
        let close = bar.close.to_f64().unwrap_or(0.0);
        if close <= 0.0 {
            return Signal::hold(&bar.symbol, bar.close, NAME);
        }

        let grid = self
            .grids
            .entry(bar.symbol.clone())
            .or_insert_with(|| GridState::build(params.base_price.unwrap_or(close), &params));

        // an empty grid follows the market once it leaves the band by half again
        let deviation = (close - grid.base_price).abs() / grid.base_price;
        if grid.total == 0.0 && deviation > params.price_range * 1.5 {
            info!(
                "{} price {} drifted {:.4} from base, rebuilding grid",
                bar.symbol, close, deviation
            );
            *grid = GridState::build(close, &params);
        }

        match grid.step(close, &params) {
            Some((direction, level)) => {
                info!(
                    "Grid {} on {}: level {} @ {:.4} | held {}",
                    direction, bar.symbol, level, grid.levels[level], grid.total
                );
                Signal::new(&bar.symbol, direction, bar.close, params.min_confidence, NAME)
                    .with_indicator("grid_level", level as f64)
                    .with_indicator("grid_price", grid.levels[level])
            }
            None => Signal::hold(&bar.symbol, bar.close, NAME),
        }
    }

    pub fn update_parameters(&mut self, patch: &Value) -> Result<()> {
        let updated = apply_patch(self.params.as_ref(), patch)?;
        self.params = Arc::new(updated);
        // levels depend on the parameters
        self.grids.clear();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()
    }

    pub fn on_position_open(&mut self, _symbol: &str, _price: Decimal, _size: Decimal) {}

    /// The ledger went flat, so no level holds anything any more.
    pub fn on_position_close(&mut self, symbol: &str) {
        if let Some(grid) = self.grids.get_mut(symbol) {
            grid.holdings.iter_mut().for_each(|h| *h = 0.0);
            grid.total = 0.0;
        }
    }

    pub fn indicator_values(&self) -> Value {
        let values: serde_json::Map<String, Value> = self
            .grids
            .iter()
            .map(|(symbol, g)| {
                (
                    symbol.clone(),
                    json!({ "base_price": g.base_price, "total_position": g.total }),
                )
            })
            .collect();
        Value::Object(values)
    }

    pub fn status(&self) -> Value {
        json!({
            "parameters": self.params.as_ref(),
            "indicators": self.indicator_values(),
            "grids": self.grids,
        })
    }

    pub fn reset(&mut self) {
        self.grids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn bar(close: Decimal) -> MarketBar {
        MarketBar {
            symbol: "BTC-USDT".to_string(),
            timestamp: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1),
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
        }
    }

    /// Levels at 95, 97.5, 100, 102.5 and 105
    fn five_levels() -> GridStrategy {
        GridStrategy::new(GridParams {
            grid_count: 5,
            price_range: 0.1,
            base_price: Some(100.0),
            ..GridParams::default()
        })
    }

    #[test]
    fn test_levels_span_the_band() {
        let params = GridParams {
            grid_count: 5,
            price_range: 0.1,
            ..GridParams::default()
        };
        let grid = GridState::build(100.0, &params);
        assert_eq!(grid.levels.len(), 5);
        assert!((grid.levels[0] - 95.0).abs() < 1e-9);
        assert!((grid.levels[4] - 105.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_below_level_then_sell_above() {
        let mut s = five_levels();
        assert_eq!(s.analyze(&bar(dec!(101))).direction, SignalDirection::Hold);

        let buy = s.analyze(&bar(dec!(97.45)));
        assert_eq!(buy.direction, SignalDirection::Buy);
        assert_eq!(buy.confidence, 0.7);
        assert_eq!(buy.metadata.indicators["grid_level"], 1.0);

        // the level already holds its lot
        assert_eq!(s.analyze(&bar(dec!(97.45))).direction, SignalDirection::Hold);

        let sell = s.analyze(&bar(dec!(97.55)));
        assert_eq!(sell.direction, SignalDirection::Sell);
        assert_eq!(s.status()["grids"]["BTC-USDT"]["total"], 0.0);
    }

    #[test]
    fn test_empty_grid_recentres_after_drift() {
        let mut s = five_levels();
        s.analyze(&bar(dec!(100)));
        s.analyze(&bar(dec!(120)));
        let base = s.indicator_values()["BTC-USDT"]["base_price"].as_f64().unwrap();
        assert_eq!(base, 120.0);
    }

    #[test]
    fn test_flat_ledger_clears_lots() {
        let mut s = five_levels();
        s.analyze(&bar(dec!(97.45)));
        s.on_position_close("BTC-USDT");
        // nothing left to sell at the level
        assert_eq!(s.analyze(&bar(dec!(97.55))).direction, SignalDirection::Hold);
    }
}
