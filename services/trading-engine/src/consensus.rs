//! Cross-strategy consensus for one closed bar.
//!
//! Turns the signals produced by all active strategies into the trade
//! candidates the engine should act on. Stop/take-profit exits always pass.
//! The composite strategy is already resonant so its signal passes as is.
//! Standalone KDJ and MACD signals only pass when they agree. MA-cross, RSI
//! and grid signals stand on their own and fill any symbol still open,
//! strongest first.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::strategy::{composite, kdj, macd, StrategyKind};
use crate::types::Signal;

/// Strategy name attached to synthesized consensus signals
pub const CONSENSUS_NAME: &str = "KDJ+MACD";

#[derive(Debug, Default)]
pub struct ConsensusCoordinator {
    resolved: u64,
    dropped_partial: u64,
}

impl ConsensusCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the bar's signals into at most one candidate per symbol.
    ///
    /// `composite_active` tells whether a resonant strategy ran this bar; when
    /// it did, standalone signals are not combined.
    pub fn resolve(&mut self, signals: Vec<Signal>, composite_active: bool) -> Vec<Signal> {
        let mut out = Vec::new();
        let mut handled: HashSet<String> = HashSet::new();

        // exits first, independent of everything else
        for signal in signals.iter().filter(|s| s.is_stop_trigger()) {
            if handled.insert(signal.symbol.clone()) {
                out.push(signal.clone());
            }
        }

        if composite_active {
            for signal in signals
                .iter()
                .filter(|s| s.strategy() == composite::NAME && s.direction.is_actionable())
            {
                if handled.insert(signal.symbol.clone()) {
                    out.push(signal.clone());
                }
            }
        } else {
            let mut by_symbol: HashMap<&str, (Option<&Signal>, Option<&Signal>)> = HashMap::new();
            for signal in signals.iter().filter(|s| s.direction.is_actionable()) {
                let slot = by_symbol.entry(signal.symbol.as_str()).or_default();
                match signal.strategy() {
                    kdj::NAME => slot.0 = Some(signal),
                    macd::NAME => slot.1 = Some(signal),
                    _ => {}
                }
            }

            let mut symbols: Vec<&str> = by_symbol.keys().copied().collect();
            symbols.sort_unstable();
            for symbol in symbols {
                if handled.contains(symbol) {
                    continue;
                }
                match by_symbol[symbol] {
                    (Some(k), Some(m)) if k.direction == m.direction => {
                        handled.insert(symbol.to_string());
                        out.push(merge(k, m));
                    }
                    (None, None) => {}
                    (k, m) => {
                        self.dropped_partial += 1;
                        debug!(
                            "No consensus for {}: KDJ={:?} MACD={:?}",
                            symbol,
                            k.map(|s| s.direction),
                            m.map(|s| s.direction)
                        );
                    }
                }
            }
        }

        let mut independent: Vec<&Signal> = signals
            .iter()
            .filter(|s| {
                s.direction.is_actionable()
                    && s.strategy() != composite::NAME
                    && !StrategyKind::needs_consensus(s.strategy())
            })
            .collect();
        independent.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        for signal in independent {
            if handled.insert(signal.symbol.clone()) {
                out.push(signal.clone());
            }
        }

        self.resolved += out.len() as u64;
        out
    }

    pub fn resolved_count(&self) -> u64 {
        self.resolved
    }

    pub fn dropped_partial_count(&self) -> u64 {
        self.dropped_partial
    }
}

fn merge(kdj_signal: &Signal, macd_signal: &Signal) -> Signal {
    let price = if kdj_signal.price.is_zero() {
        macd_signal.price
    } else {
        kdj_signal.price
    };
    let mut merged = Signal::new(
        &kdj_signal.symbol,
        kdj_signal.direction,
        price,
        kdj_signal.confidence.min(macd_signal.confidence),
        CONSENSUS_NAME,
    );
    merged.metadata.kdj = kdj_signal.metadata.kdj;
    merged.metadata.macd = macd_signal.metadata.macd;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KdjSnapshot, MacdSnapshot, SignalDirection};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sig(strategy: &str, dir: SignalDirection, conf: f64) -> Signal {
        Signal::new("BTC-USDT", dir, dec!(100), conf, strategy)
    }

    #[test]
    fn test_agreement_takes_min_confidence() {
        let mut c = ConsensusCoordinator::new();
        let k = sig("KDJ", SignalDirection::Buy, 0.8).with_kdj(KdjSnapshot::default());
        let m = sig("MACD", SignalDirection::Buy, 0.65).with_macd(MacdSnapshot::default());
        let out = c.resolve(vec![k, m], false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].direction, SignalDirection::Buy);
        assert_eq!(out[0].confidence, 0.65);
        assert_eq!(out[0].strategy(), CONSENSUS_NAME);
        assert!(out[0].metadata.kdj.is_some() && out[0].metadata.macd.is_some());
    }

    #[test]
    fn test_disagreement_never_trades() {
        let mut c = ConsensusCoordinator::new();
        for (kc, mc) in [(0.1, 0.9), (1.0, 1.0), (0.6, 0.55)] {
            let out = c.resolve(
                vec![
                    sig("KDJ", SignalDirection::Buy, kc),
                    sig("MACD", SignalDirection::Sell, mc),
                ],
                false,
            );
            assert!(out.is_empty());
        }
        assert_eq!(c.dropped_partial_count(), 3);
    }

    #[test]
    fn test_single_side_is_dropped() {
        let mut c = ConsensusCoordinator::new();
        let out = c.resolve(vec![sig("MACD", SignalDirection::Sell, 0.9)], false);
        assert!(out.is_empty());
    }

    #[test]
    fn test_stop_trigger_passes_unconditionally() {
        let mut c = ConsensusCoordinator::new();
        let stop = sig("MACD", SignalDirection::Sell, 1.0).with_stop_trigger();
        let k = sig("KDJ", SignalDirection::Buy, 0.9);
        let out = c.resolve(vec![k, stop], false);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_stop_trigger());
        assert_eq!(out[0].direction, SignalDirection::Sell);
    }

    #[test]
    fn test_composite_used_directly() {
        let mut c = ConsensusCoordinator::new();
        let comp = sig("KDJ_MACD", SignalDirection::Buy, 0.7);
        let out = c.resolve(vec![comp.clone()], true);
        assert_eq!(out, vec![comp]);
    }

    #[test]
    fn test_independent_signals_pass_strongest_first() {
        let mut c = ConsensusCoordinator::new();
        let rsi = sig("RSI", SignalDirection::Buy, 0.6);
        let grid = sig("GRID", SignalDirection::Sell, 0.7);
        let out = c.resolve(vec![rsi, grid.clone()], false);
        assert_eq!(out, vec![grid]);
        assert_eq!(c.dropped_partial_count(), 0);
    }

    #[test]
    fn test_resonant_signal_outranks_independent() {
        let mut c = ConsensusCoordinator::new();
        let comp = sig("KDJ_MACD", SignalDirection::Buy, 0.55);
        let ma = sig("MA_CROSS", SignalDirection::Sell, 0.9);
        let out = c.resolve(vec![ma, comp.clone()], true);
        assert_eq!(out, vec![comp]);

        // a lone half never trades, but an independent signal still does
        let out = c.resolve(
            vec![
                sig("KDJ", SignalDirection::Buy, 0.9),
                sig("MA_CROSS", SignalDirection::Buy, 0.6),
            ],
            false,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].strategy(), "MA_CROSS");
        assert_eq!(c.dropped_partial_count(), 1);
    }

    #[test]
    fn test_price_falls_back_to_macd() {
        let mut c = ConsensusCoordinator::new();
        let mut k = sig("KDJ", SignalDirection::Sell, 0.7);
        k.price = Decimal::ZERO;
        let m = sig("MACD", SignalDirection::Sell, 0.7);
        let out = c.resolve(vec![k, m], false);
        assert_eq!(out[0].price, dec!(100));
    }
}
