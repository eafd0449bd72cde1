//! Candle timeframes and closed-candle deduplication.
//!
//! Bars can reach the engine through a pushed feed and through polling. Both
//! paths canonicalize the candle open time to the start of its timeframe
//! interval; a symbol's bar is analysed only when its canonical time is
//! strictly newer than the last one analysed.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::EngineError;
use crate::types::MarketBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M1,
        Timeframe::M3,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn duration_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M3 => 180,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::H4 => 14_400,
            Timeframe::D1 => 86_400,
        }
    }

    /// Floor a timestamp to the start of its interval (UTC epoch aligned).
    pub fn canonicalize(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let floored = secs - secs.rem_euclid(self.duration_secs());
        Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Timeframe::ALL
            .iter()
            .find(|tf| tf.as_str() == normalized)
            .copied()
            .ok_or_else(|| EngineError::InvalidTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

/// Last analysed canonical candle time per symbol
#[derive(Debug, Clone, Default)]
pub struct CandleTracker {
    last: HashMap<String, DateTime<Utc>>,
}

impl CandleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the bar if it is newer than the last one seen for its symbol.
    ///
    /// Returns `true` when the bar should be analysed.
    pub fn observe(&mut self, bar: &MarketBar, timeframe: Timeframe) -> bool {
        let canonical = timeframe.canonicalize(bar.timestamp);
        match self.last.get(&bar.symbol) {
            Some(prev) if canonical <= *prev => {
                debug!(
                    "Skipping candle {} @ {} (last processed {})",
                    bar.symbol, canonical, prev
                );
                false
            }
            _ => {
                self.last.insert(bar.symbol.clone(), canonical);
                true
            }
        }
    }

    pub fn last_processed(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last.get(symbol).copied()
    }

    /// Forget all history, e.g. after a timeframe change.
    pub fn reset(&mut self) {
        self.last.clear();
    }
}

/// Latest closed candle from an ascending OHLCV snapshot.
///
/// The newest bar is still forming, so the one before it is returned.
pub fn latest_closed(bars: &[MarketBar]) -> Option<&MarketBar> {
    if bars.len() < 2 {
        return None;
    }
    bars.get(bars.len() - 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn bar_at(secs: i64) -> MarketBar {
        MarketBar {
            symbol: "BTC-USDT".to_string(),
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            close: Decimal::ONE,
            volume: Decimal::ONE,
            bid: Decimal::ZERO,
            ask: Decimal::ZERO,
        }
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert_eq!("1H".parse::<Timeframe>().unwrap(), Timeframe::H1);
        assert!("2h".parse::<Timeframe>().is_err());
        assert_eq!(Timeframe::D1.to_string(), "1d");
        let json = serde_json::to_string(&Timeframe::M5).unwrap();
        assert_eq!(json, "\"5m\"");
        let tf: Timeframe = serde_json::from_str("\"4h\"").unwrap();
        assert_eq!(tf, Timeframe::H4);
    }

    #[test]
    fn test_canonicalize_floors_to_interval() {
        let ts = Utc.timestamp_opt(1_700_000_123, 0).unwrap();
        let floored = Timeframe::M5.canonicalize(ts);
        assert_eq!(floored.timestamp() % 300, 0);
        assert!(floored <= ts);
    }

    #[test]
    fn test_tracker_dedups_push_and_poll() {
        let mut t = CandleTracker::new();
        // push path reports the open time, poll path a few ms later in the same candle
        assert!(t.observe(&bar_at(1_700_000_100), Timeframe::M1));
        assert!(!t.observe(&bar_at(1_700_000_110), Timeframe::M1));
        assert!(!t.observe(&bar_at(1_700_000_040), Timeframe::M1));
        assert!(t.observe(&bar_at(1_700_000_160), Timeframe::M1));
        assert!(t.last_processed("BTC-USDT").is_some());
        t.reset();
        assert!(t.observe(&bar_at(1_700_000_160), Timeframe::M1));
    }

    #[test]
    fn test_latest_closed_skips_forming_bar() {
        let bars = vec![bar_at(0), bar_at(60), bar_at(120)];
        assert_eq!(latest_closed(&bars).unwrap().timestamp.timestamp(), 60);
        assert!(latest_closed(&bars[..1]).is_none());
    }
}
