//! Pure computation module for the KDJ, MACD, moving-average and RSI indicators.
//!
//! No I/O, no side effects. Takes buffered OHLC series and returns indicator
//! values. Computation happens in `f64`; prices are converted from `Decimal`
//! at the history boundary.

use rust_decimal::prelude::ToPrimitive;
use std::collections::VecDeque;

use crate::types::{KdjSnapshot, MacdSnapshot, MarketBar};

/// Seed for K and D before any bar has been seen.
pub const KDJ_SEED: f64 = 50.0;

/// Bounded append-only OHLC history. Oldest bars drop off past `capacity`.
#[derive(Debug, Clone)]
pub struct OhlcHistory {
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    closes: VecDeque<f64>,
    capacity: usize,
}

impl OhlcHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            highs: VecDeque::with_capacity(capacity.min(1024)),
            lows: VecDeque::with_capacity(capacity.min(1024)),
            closes: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, bar: &MarketBar) {
        self.push_values(
            bar.high.to_f64().unwrap_or(0.0),
            bar.low.to_f64().unwrap_or(0.0),
            bar.close.to_f64().unwrap_or(0.0),
        );
    }

    pub fn push_values(&mut self, high: f64, low: f64, close: f64) {
        self.highs.push_back(high);
        self.lows.push_back(low);
        self.closes.push_back(close);
        while self.closes.len() > self.capacity {
            self.highs.pop_front();
            self.lows.pop_front();
            self.closes.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_close(&self) -> Option<f64> {
        self.closes.back().copied()
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.closes.iter().copied()
    }

    /// Raw stochastic value over the trailing `period` bars.
    ///
    /// `None` when fewer than `period` bars are buffered; `0` on a flat range.
    pub fn rsv(&self, period: usize) -> Option<f64> {
        if period == 0 || self.len() < period {
            return None;
        }
        let start = self.len() - period;
        let lowest = self.lows.iter().skip(start).copied().fold(f64::INFINITY, f64::min);
        let highest = self
            .highs
            .iter()
            .skip(start)
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let close = self.last_close()?;
        if highest == lowest {
            return Some(0.0);
        }
        Some((close - lowest) / (highest - lowest) * 100.0)
    }

    pub fn clear(&mut self) {
        self.highs.clear();
        self.lows.clear();
        self.closes.clear();
    }
}

/// One recursive KDJ step with the classic 3/3 smoothing:
/// `K = 2/3·K_prev + 1/3·RSV`, `D = 2/3·D_prev + 1/3·K`, `J = 3K − 2D`.
pub fn kdj_step(prev_k: f64, prev_d: f64, rsv: f64) -> KdjSnapshot {
    kdj_step_smoothed(prev_k, prev_d, rsv, 3, 3)
}

/// KDJ step with explicit smoothing windows; a window of `n` weighs the new
/// input by `1/n`.
pub fn kdj_step_smoothed(
    prev_k: f64,
    prev_d: f64,
    rsv: f64,
    k_smooth: usize,
    d_smooth: usize,
) -> KdjSnapshot {
    let wk = 1.0 / k_smooth.max(1) as f64;
    let wd = 1.0 / d_smooth.max(1) as f64;
    let k = (1.0 - wk) * prev_k + wk * rsv;
    let d = (1.0 - wd) * prev_d + wd * k;
    KdjSnapshot {
        k,
        d,
        j: 3.0 * k - 2.0 * d,
        rsv,
    }
}

/// Advance KDJ against the buffered history.
///
/// With fewer than `period` bars the previous K/D carry over unchanged.
pub fn kdj(
    history: &OhlcHistory,
    period: usize,
    smoothing: (usize, usize),
    prev_k: f64,
    prev_d: f64,
) -> KdjSnapshot {
    match history.rsv(period) {
        Some(rsv) => kdj_step_smoothed(prev_k, prev_d, rsv, smoothing.0, smoothing.1),
        None => KdjSnapshot {
            k: prev_k,
            d: prev_d,
            j: 3.0 * prev_k - 2.0 * prev_d,
            rsv: 0.0,
        },
    }
}

/// Exponential moving average with span-adjusted weighting.
///
/// `alpha = 2 / (span + 1)`; each output is the weighted mean of all
/// observations so far with weights `(1 - alpha)^i`, so the series is defined
/// from the first value on without an SMA seed.
pub fn ema_series<I>(values: I, span: usize) -> Vec<f64>
where
    I: IntoIterator<Item = f64>,
{
    if span == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let decay = 1.0 - alpha;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    values
        .into_iter()
        .map(|x| {
            numerator = x + decay * numerator;
            denominator = 1.0 + decay * denominator;
            numerator / denominator
        })
        .collect()
}

/// Latest MACD line, signal line and histogram over `closes`.
///
/// Returns `None` for an empty series or zero periods.
pub fn macd<I>(closes: I, fast: usize, slow: usize, signal: usize) -> Option<MacdSnapshot>
where
    I: IntoIterator<Item = f64>,
{
    if fast == 0 || slow == 0 || signal == 0 {
        return None;
    }
    let closes: Vec<f64> = closes.into_iter().collect();
    if closes.is_empty() {
        return None;
    }
    let fast_ema = ema_series(closes.iter().copied(), fast);
    let slow_ema = ema_series(closes.iter().copied(), slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal_series = ema_series(line.iter().copied(), signal);

    let macd = *line.last()?;
    let signal = *signal_series.last()?;
    Some(MacdSnapshot {
        macd,
        signal,
        hist: macd - signal,
    })
}

/// Simple mean of the trailing `window` values. `None` while fewer are buffered.
pub fn sma<I>(values: I, window: usize) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    if window == 0 || values.len() < window {
        return None;
    }
    let tail = &values[values.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Latest span-adjusted EMA of `values`.
pub fn ema<I>(values: I, span: usize) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    ema_series(values, span).last().copied()
}

/// Relative strength over the trailing `window` price changes, using plain
/// means of gains and losses.
///
/// Needs `window + 1` values. A window without losses reads 100; a window
/// without any movement reads 50.
pub fn rsi<I>(values: I, window: usize) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    if window == 0 || values.len() <= window {
        return None;
    }
    let tail = &values[values.len() - window - 1..];
    let (gains, losses) = tail.windows(2).fold((0.0, 0.0), |(g, l), pair| {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });
    if gains == 0.0 && losses == 0.0 {
        return Some(50.0);
    }
    if losses == 0.0 {
        return Some(100.0);
    }
    let rs = gains / losses;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Bars needed before MACD is considered meaningful.
pub fn macd_min_history(slow: usize, signal: usize, margin: usize) -> usize {
    slow.max(signal) + margin
}
