//! Auto-tuning grid search for the composite strategy.
//!
//! Every candidate parameter set is replayed on a fresh strategy over the
//! same historical bars. The search is pure CPU work and is meant to run on
//! a blocking thread, polling a cancellation predicate between candidates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::strategy::params::Validate;
use crate::strategy::{CompositeParams, CompositeStrategy};
use crate::types::{MarketBar, SignalDirection};

const KDJ_PERIODS: [usize; 2] = [9, 14];
const KDJ_OVERSOLD: [f64; 3] = [20.0, 25.0, 30.0];
const KDJ_OVERBOUGHT: [f64; 3] = [70.0, 75.0, 80.0];
const MACD_FAST: [usize; 3] = [5, 8, 12];
const MACD_SLOW: [usize; 3] = [13, 21, 26];
const MACD_SIGNAL: [usize; 3] = [4, 5, 9];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Candidates with fewer closed trades are ignored
    pub min_trades: usize,
    /// Historical candles fetched for a run
    pub history_limit: usize,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            min_trades: 3,
            history_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SimulationResult {
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuneOutcome {
    pub params: CompositeParams,
    pub win_rate: f64,
    pub trades: usize,
    pub evaluated: usize,
}

impl TuneOutcome {
    /// Whether this result should replace one recorded at `current` win rate.
    pub fn beats(&self, current: Option<f64>) -> bool {
        current.map_or(true, |rate| self.win_rate > rate)
    }
}

/// All valid candidates around `base`. Exit settings are kept from `base`.
pub fn grid(base: &CompositeParams) -> Vec<CompositeParams> {
    let mut out = Vec::new();
    for period in KDJ_PERIODS {
        for oversold in KDJ_OVERSOLD {
            for overbought in KDJ_OVERBOUGHT {
                for fast in MACD_FAST {
                    for slow in MACD_SLOW {
                        for signal in MACD_SIGNAL {
                            let mut candidate = base.clone();
                            candidate.kdj.period = period;
                            candidate.kdj.oversold = oversold;
                            candidate.kdj.overbought = overbought;
                            candidate.macd.fast = fast;
                            candidate.macd.slow = slow;
                            candidate.macd.signal = signal;
                            if candidate.validate().is_ok() {
                                out.push(candidate);
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// Long-only replay: BUY opens at the close, SELL or a stop exit closes.
pub fn simulate(params: &CompositeParams, bars: &[MarketBar]) -> SimulationResult {
    let mut strategy = CompositeStrategy::new(params.clone());
    let mut entry: Option<Decimal> = None;
    let mut result = SimulationResult::default();

    for bar in bars {
        let signal = strategy.analyze(bar);
        match (entry, signal.direction) {
            (None, SignalDirection::Buy) => {
                entry = Some(bar.close);
                strategy.on_position_open(&bar.symbol, bar.close, Decimal::ONE);
            }
            (Some(entry_price), SignalDirection::Sell) => {
                result.trades += 1;
                if bar.close > entry_price {
                    result.wins += 1;
                }
                entry = None;
                strategy.on_position_close(&bar.symbol);
            }
            _ => {}
        }
    }

    if result.trades > 0 {
        result.win_rate = result.wins as f64 / result.trades as f64;
    }
    result
}

/// Search the grid and return the best candidate, if any qualified.
///
/// Best is the highest win rate, ties broken by trade count. Returns `None`
/// when cancelled or when no candidate reached `min_trades`.
pub fn run_grid_search<F>(
    base: &CompositeParams,
    bars: &[MarketBar],
    config: &TunerConfig,
    should_cancel: F,
) -> Option<TuneOutcome>
where
    F: Fn() -> bool,
{
    let candidates = grid(base);
    info!(
        "Auto-tune: {} candidates over {} bars",
        candidates.len(),
        bars.len()
    );

    let mut best: Option<(CompositeParams, SimulationResult)> = None;
    for (evaluated, candidate) in candidates.iter().enumerate() {
        if should_cancel() {
            info!("Auto-tune cancelled after {} candidates", evaluated);
            return None;
        }
        let result = simulate(candidate, bars);
        if result.trades < config.min_trades {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, current)) => {
                result.win_rate > current.win_rate
                    || (result.win_rate == current.win_rate && result.trades > current.trades)
            }
        };
        if better {
            debug!(
                "Auto-tune candidate: win rate {:.3} over {} trades",
                result.win_rate, result.trades
            );
            best = Some((candidate.clone(), result));
        }
    }

    best.map(|(params, result)| TuneOutcome {
        params,
        win_rate: result.win_rate,
        trades: result.trades,
        evaluated: candidates.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::cell::Cell;

    fn wave(n: usize) -> Vec<MarketBar> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + 10.0 * (i as f64 / 6.0).sin();
                let close = Decimal::try_from(close).unwrap().round_dp(4);
                MarketBar {
                    symbol: "BTC-USDT".to_string(),
                    timestamp: start + Duration::minutes(i as i64),
                    open: close,
                    high: close + Decimal::ONE,
                    low: close - Decimal::ONE,
                    close,
                    volume: Decimal::ONE,
                    bid: Decimal::ZERO,
                    ask: Decimal::ZERO,
                }
            })
            .collect()
    }

    #[test]
    fn test_grid_covers_every_valid_combination() {
        let base = CompositeParams::default();
        let candidates = grid(&base);
        assert_eq!(candidates.len(), 2 * 3 * 3 * 3 * 3 * 3);
        assert!(candidates.iter().all(|c| c.validate().is_ok()));
        assert!(candidates.iter().all(|c| c.exits == base.exits));
    }

    #[test]
    fn test_grid_drops_invalid_base() {
        let mut base = CompositeParams::default();
        base.exits.min_confidence = 0.0;
        assert!(grid(&base).is_empty());
    }

    #[test]
    fn test_simulation_counts_closed_trades() {
        let result = simulate(&CompositeParams::default(), &wave(400));
        assert!(result.wins <= result.trades);
        if result.trades > 0 {
            assert!((0.0..=1.0).contains(&result.win_rate));
        }
    }

    #[test]
    fn test_cancellation_stops_search() {
        let calls = Cell::new(0);
        let outcome = run_grid_search(
            &CompositeParams::default(),
            &wave(100),
            &TunerConfig::default(),
            || {
                calls.set(calls.get() + 1);
                true
            },
        );
        assert!(outcome.is_none());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_min_trades_filters_candidates() {
        let config = TunerConfig {
            min_trades: usize::MAX,
            ..TunerConfig::default()
        };
        assert!(run_grid_search(&CompositeParams::default(), &wave(200), &config, || false).is_none());
    }

    #[test]
    fn test_outcome_must_beat_recorded_rate() {
        let outcome = TuneOutcome {
            params: CompositeParams::default(),
            win_rate: 0.6,
            trades: 5,
            evaluated: 10,
        };
        assert!(outcome.beats(None));
        assert!(outcome.beats(Some(0.5)));
        assert!(!outcome.beats(Some(0.6)));
    }
}
