//! Crossover detection, confidence scoring and stop/take-profit exits.
//!
//! Crossovers compare this bar's values against the previous call's values;
//! threshold levels only filter, they never fire on their own.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::params::{ExitParams, KdjParams, RsiParams};
use crate::types::{KdjSnapshot, MacdSnapshot, SignalDirection};

/// Position a strategy believes it holds, as reported by the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HeldPosition {
    /// Signed size, positive for long
    pub size: f64,
    pub entry_price: f64,
}

impl HeldPosition {
    pub fn open(size: Decimal, entry_price: Decimal) -> Self {
        Self {
            size: size.to_f64().unwrap_or(0.0),
            entry_price: entry_price.to_f64().unwrap_or(0.0),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size == 0.0 || self.entry_price == 0.0
    }

    /// Unrealized PnL ratio from the holder's point of view.
    pub fn pnl_ratio(&self, price: f64) -> Option<f64> {
        if self.is_flat() {
            return None;
        }
        let ratio = if self.size > 0.0 {
            (price - self.entry_price) / self.entry_price
        } else {
            (self.entry_price - price) / self.entry_price
        };
        Some(ratio)
    }

    /// Closing direction when the stop-loss or take-profit threshold is breached.
    pub fn exit_direction(&self, price: f64, exits: &ExitParams) -> Option<SignalDirection> {
        let ratio = self.pnl_ratio(price)?;
        if ratio <= -exits.stop_loss || ratio >= exits.take_profit {
            Some(if self.size > 0.0 {
                SignalDirection::Sell
            } else {
                SignalDirection::Buy
            })
        } else {
            None
        }
    }
}

/// K crossing D, filtered by the overbought / oversold band.
pub fn kdj_cross(
    prev_k: f64,
    prev_d: f64,
    now: &KdjSnapshot,
    params: &KdjParams,
) -> Option<SignalDirection> {
    if prev_k <= prev_d && now.k > now.d && now.k < params.overbought {
        Some(SignalDirection::Buy)
    } else if prev_k >= prev_d && now.k < now.d && now.k > params.oversold {
        Some(SignalDirection::Sell)
    } else {
        None
    }
}

/// Wider K/D gap raises confidence; J far from 50 lowers it.
pub fn kdj_confidence(base: f64, now: &KdjSnapshot) -> f64 {
    let kd_gap = (now.k - now.d).abs() / 100.0;
    let j_penalty = ((now.j - 50.0).abs() / 50.0 * 0.3).max(0.0);
    (base * (1.0 + kd_gap) * (1.0 - j_penalty)).clamp(0.0, 1.0)
}

/// MACD line crossing its signal line.
pub fn macd_cross(prev_macd: f64, prev_signal: f64, now: &MacdSnapshot) -> Option<SignalDirection> {
    if prev_macd <= prev_signal && now.macd > now.signal {
        Some(SignalDirection::Buy)
    } else if prev_macd >= prev_signal && now.macd < now.signal {
        Some(SignalDirection::Sell)
    } else {
        None
    }
}

pub fn macd_confidence(base: f64, now: &MacdSnapshot) -> f64 {
    let cross_strength = (now.macd - now.signal).abs().min(1.0);
    let hist_factor = now.hist.abs().min(1.0);
    (base * (1.0 + cross_strength) * (1.0 + 0.3 * hist_factor)).clamp(0.0, 1.0)
}

/// Fast average crossing the slow one (golden / death cross).
pub fn ma_cross(prev_fast: f64, prev_slow: f64, fast: f64, slow: f64) -> Option<SignalDirection> {
    if prev_fast <= prev_slow && fast > slow {
        Some(SignalDirection::Buy)
    } else if prev_fast >= prev_slow && fast < slow {
        Some(SignalDirection::Sell)
    } else {
        None
    }
}

/// Distance from the slow average raises confidence; recent volatility
/// (std / mean of `recent` closes) lowers it, never below half.
pub fn ma_confidence(base: f64, price: f64, slow: f64, recent: &[f64]) -> f64 {
    let distance = if slow > 0.0 { (price - slow).abs() / slow } else { 0.0 };
    let volatility_factor = if recent.len() >= 2 {
        let n = recent.len() as f64;
        let mean = recent.iter().sum::<f64>() / n;
        let var = recent.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        if mean > 0.0 {
            (1.0 - var.sqrt() / mean).max(0.5)
        } else {
            1.0
        }
    } else {
        1.0
    };
    (base * (1.0 + distance * 0.2) * volatility_factor).clamp(0.0, 1.0)
}

/// RSI leaving the oversold band upward buys; leaving overbought downward sells.
pub fn rsi_cross(prev: f64, now: f64, params: &RsiParams) -> Option<SignalDirection> {
    if prev <= params.oversold && now > params.oversold {
        Some(SignalDirection::Buy)
    } else if prev >= params.overbought && now < params.overbought {
        Some(SignalDirection::Sell)
    } else {
        None
    }
}

/// Strength is how far RSI still sits inside the band it is leaving.
pub fn rsi_confidence(base: f64, rsi: f64, direction: SignalDirection, params: &RsiParams) -> f64 {
    let strength = match direction {
        SignalDirection::Buy => (params.oversold - rsi) / params.oversold,
        SignalDirection::Sell => (rsi - params.overbought) / (100.0 - params.overbought),
        SignalDirection::Hold => 0.0,
    };
    (base * (1.0 + strength.clamp(0.0, 1.0) * 0.3)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snap(k: f64, d: f64) -> KdjSnapshot {
        KdjSnapshot {
            k,
            d,
            j: 3.0 * k - 2.0 * d,
            rsv: 0.0,
        }
    }

    #[test]
    fn test_kdj_cross_up_below_overbought() {
        let p = KdjParams::default();
        assert_eq!(kdj_cross(40.0, 45.0, &snap(50.0, 48.0), &p), Some(SignalDirection::Buy));
        // K above overbought suppresses the buy
        assert_eq!(kdj_cross(80.0, 82.0, &snap(85.0, 83.0), &p), None);
    }

    #[test]
    fn test_kdj_cross_down_above_oversold() {
        let p = KdjParams::default();
        assert_eq!(kdj_cross(60.0, 55.0, &snap(50.0, 52.0), &p), Some(SignalDirection::Sell));
        assert_eq!(kdj_cross(20.0, 15.0, &snap(10.0, 12.0), &p), None);
    }

    #[test]
    fn test_no_cross_when_unchanged() {
        let p = KdjParams::default();
        let now = snap(55.0, 50.0);
        assert_eq!(kdj_cross(now.k, now.d, &now, &p), None);
    }

    #[test]
    fn test_kdj_confidence_formula() {
        // K-D gap 10, J = 80 -> penalty 0.18
        let c = kdj_confidence(0.6, &snap(60.0, 50.0));
        assert!((c - 0.6 * 1.1 * 0.82).abs() < 1e-12);
    }

    #[test]
    fn test_macd_confidence_capped() {
        let now = MacdSnapshot {
            macd: 5.0,
            signal: 1.0,
            hist: 4.0,
        };
        assert_eq!(macd_confidence(0.6, &now), 1.0);
        let small = MacdSnapshot {
            macd: 0.2,
            signal: 0.1,
            hist: 0.1,
        };
        assert!((macd_confidence(0.5, &small) - 0.5 * 1.1 * 1.03).abs() < 1e-12);
    }

    #[test]
    fn test_ma_cross_both_ways() {
        assert_eq!(ma_cross(9.0, 10.0, 11.0, 10.0), Some(SignalDirection::Buy));
        assert_eq!(ma_cross(11.0, 10.0, 9.0, 10.0), Some(SignalDirection::Sell));
        assert_eq!(ma_cross(11.0, 10.0, 12.0, 10.0), None);
        // flat closes carry no volatility penalty
        let c = ma_confidence(0.6, 110.0, 100.0, &[100.0; 20]);
        assert!((c - 0.6 * 1.02).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_band_exits() {
        let p = RsiParams::default();
        assert_eq!(rsi_cross(25.0, 35.0, &p), Some(SignalDirection::Buy));
        assert_eq!(rsi_cross(75.0, 65.0, &p), Some(SignalDirection::Sell));
        assert_eq!(rsi_cross(40.0, 50.0, &p), None);
        assert_eq!(rsi_confidence(0.6, 35.0, SignalDirection::Buy, &p), 0.6);
        let c = rsi_confidence(0.6, 85.0, SignalDirection::Sell, &p);
        assert!((c - 0.6 * 1.15).abs() < 1e-12);
    }

    #[test]
    fn test_exit_direction_long_and_short() {
        let exits = ExitParams::default();
        let long = HeldPosition::open(dec!(1), dec!(100));
        assert_eq!(long.exit_direction(97.9, &exits), Some(SignalDirection::Sell));
        assert_eq!(long.exit_direction(104.0, &exits), Some(SignalDirection::Sell));
        assert_eq!(long.exit_direction(101.0, &exits), None);

        let short = HeldPosition::open(dec!(-1), dec!(100));
        assert_eq!(short.exit_direction(102.5, &exits), Some(SignalDirection::Buy));
        assert_eq!(short.exit_direction(99.0, &exits), None);

        assert_eq!(HeldPosition::default().exit_direction(1.0, &exits), None);
    }
}
