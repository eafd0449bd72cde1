//! Strategy variants and the name-keyed registry that drives them.
//!
//! The variant set is closed: `KDJ_MACD` (composite resonance), `KDJ`,
//! `MACD`, `MA_CROSS`, `RSI` and `GRID`. The registry dispatches by name and
//! keeps a bounded log of the non-HOLD signals produced.

pub mod composite;
pub mod cross;
pub mod grid;
pub mod kdj;
pub mod ma_cross;
pub mod macd;
pub mod params;
pub mod rsi;

use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::types::{MarketBar, Signal};

pub use composite::CompositeStrategy;
pub use grid::GridStrategy;
pub use kdj::KdjStrategy;
pub use ma_cross::MaCrossStrategy;
pub use macd::MacdStrategy;
pub use params::{
    CompositeParams, ExitParams, GridParams, KdjParams, KdjStrategyParams, MaCrossParams, MaType,
    MacdParams, MacdStrategyParams, RsiParams,
};
pub use rsi::RsiStrategy;

/// Registered signal generator
#[derive(Debug, Clone)]
pub enum StrategyKind {
    Composite(CompositeStrategy),
    Kdj(KdjStrategy),
    Macd(MacdStrategy),
    MaCross(MaCrossStrategy),
    Rsi(RsiStrategy),
    Grid(GridStrategy),
}

impl StrategyKind {
    /// Every registry name, composite first
    pub const NAMES: [&'static str; 6] = [
        composite::NAME,
        kdj::NAME,
        macd::NAME,
        ma_cross::NAME,
        rsi::NAME,
        grid::NAME,
    ];

    /// Build a strategy with default parameters from its registry name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            composite::NAME => Ok(Self::Composite(CompositeStrategy::new(
                CompositeParams::default(),
            ))),
            kdj::NAME => Ok(Self::Kdj(KdjStrategy::new(KdjStrategyParams::default()))),
            macd::NAME => Ok(Self::Macd(MacdStrategy::new(MacdStrategyParams::default()))),
            ma_cross::NAME => Ok(Self::MaCross(MaCrossStrategy::new(MaCrossParams::default()))),
            rsi::NAME => Ok(Self::Rsi(RsiStrategy::new(RsiParams::default()))),
            grid::NAME => Ok(Self::Grid(GridStrategy::new(GridParams::default()))),
            other => Err(EngineError::UnknownStrategy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Composite(_) => composite::NAME,
            Self::Kdj(_) => kdj::NAME,
            Self::Macd(_) => macd::NAME,
            Self::MaCross(_) => ma_cross::NAME,
            Self::Rsi(_) => rsi::NAME,
            Self::Grid(_) => grid::NAME,
        }
    }

    /// Whether this strategy already requires KDJ/MACD agreement on its own.
    pub fn is_resonant(&self) -> bool {
        matches!(self, Self::Composite(_))
    }

    /// Whether a strategy's signals need a partner before they trade.
    /// Only the standalone KDJ and MACD halves do.
    pub fn needs_consensus(name: &str) -> bool {
        name == kdj::NAME || name == macd::NAME
    }

    pub fn analyze(&mut self, bar: &MarketBar) -> Signal {
        match self {
            Self::Composite(s) => s.analyze(bar),
            Self::Kdj(s) => s.analyze(bar),
            Self::Macd(s) => s.analyze(bar),
            Self::MaCross(s) => s.analyze(bar),
            Self::Rsi(s) => s.analyze(bar),
            Self::Grid(s) => s.analyze(bar),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Composite(s) => s.validate(),
            Self::Kdj(s) => s.validate(),
            Self::Macd(s) => s.validate(),
            Self::MaCross(s) => s.validate(),
            Self::Rsi(s) => s.validate(),
            Self::Grid(s) => s.validate(),
        }
    }

    pub fn update_parameters(&mut self, patch: &Value) -> Result<()> {
        match self {
            Self::Composite(s) => s.update_parameters(patch),
            Self::Kdj(s) => s.update_parameters(patch),
            Self::Macd(s) => s.update_parameters(patch),
            Self::MaCross(s) => s.update_parameters(patch),
            Self::Rsi(s) => s.update_parameters(patch),
            Self::Grid(s) => s.update_parameters(patch),
        }
    }

    pub fn parameters(&self) -> Value {
        let value = match self {
            Self::Composite(s) => serde_json::to_value(s.params().as_ref()),
            Self::Kdj(s) => serde_json::to_value(s.params().as_ref()),
            Self::Macd(s) => serde_json::to_value(s.params().as_ref()),
            Self::MaCross(s) => serde_json::to_value(s.params().as_ref()),
            Self::Rsi(s) => serde_json::to_value(s.params().as_ref()),
            Self::Grid(s) => serde_json::to_value(s.params().as_ref()),
        };
        value.unwrap_or(Value::Null)
    }

    pub fn indicator_values(&self) -> Value {
        match self {
            Self::Composite(s) => s.indicator_values(),
            Self::Kdj(s) => s.indicator_values(),
            Self::Macd(s) => s.indicator_values(),
            Self::MaCross(s) => s.indicator_values(),
            Self::Rsi(s) => s.indicator_values(),
            Self::Grid(s) => s.indicator_values(),
        }
    }

    pub fn status(&self) -> Value {
        match self {
            Self::Composite(s) => s.status(),
            Self::Kdj(s) => s.status(),
            Self::Macd(s) => s.status(),
            Self::MaCross(s) => s.status(),
            Self::Rsi(s) => s.status(),
            Self::Grid(s) => s.status(),
        }
    }

    pub fn on_position_open(&mut self, symbol: &str, price: Decimal, size: Decimal) {
        match self {
            Self::Composite(s) => s.on_position_open(symbol, price, size),
            Self::Kdj(s) => s.on_position_open(symbol, price, size),
            Self::Macd(s) => s.on_position_open(symbol, price, size),
            Self::MaCross(s) => s.on_position_open(symbol, price, size),
            Self::Rsi(s) => s.on_position_open(symbol, price, size),
            Self::Grid(s) => s.on_position_open(symbol, price, size),
        }
    }

    pub fn on_position_close(&mut self, symbol: &str) {
        match self {
            Self::Composite(s) => s.on_position_close(symbol),
            Self::Kdj(s) => s.on_position_close(symbol),
            Self::Macd(s) => s.on_position_close(symbol),
            Self::MaCross(s) => s.on_position_close(symbol),
            Self::Rsi(s) => s.on_position_close(symbol),
            Self::Grid(s) => s.on_position_close(symbol),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Composite(s) => s.reset(),
            Self::Kdj(s) => s.reset(),
            Self::Macd(s) => s.reset(),
            Self::MaCross(s) => s.reset(),
            Self::Rsi(s) => s.reset(),
            Self::Grid(s) => s.reset(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    strategy: StrategyKind,
    active: bool,
}

/// Name-keyed table of strategies, in registration order.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
    recent: VecDeque<Signal>,
    recent_cap: usize,
    signal_count: u64,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRegistry {
    pub const RECENT_SIGNAL_CAP: usize = 1000;

    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
            recent: VecDeque::new(),
            recent_cap: Self::RECENT_SIGNAL_CAP,
            signal_count: 0,
        }
    }

    /// Register (or replace) a strategy. New strategies start inactive.
    pub fn register(&mut self, strategy: StrategyKind) {
        let name = strategy.name().to_string();
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        info!("Strategy registered: {}", name);
        self.entries.insert(
            name,
            Entry {
                strategy,
                active: false,
            },
        );
    }

    /// Activate after re-validating the strategy's parameters.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStrategy(name.to_string()))?;
        entry.strategy.validate()?;
        entry.active = true;
        info!("Strategy activated: {}", name);
        Ok(())
    }

    pub fn deactivate(&mut self, name: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStrategy(name.to_string()))?;
        entry.active = false;
        info!("Strategy deactivated: {}", name);
        Ok(())
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.entries.get(name).map(|e| e.active).unwrap_or(false)
    }

    pub fn active_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|name| self.is_active(name))
            .cloned()
            .collect()
    }

    /// True when an active strategy already enforces resonance itself.
    pub fn composite_active(&self) -> bool {
        self.entries
            .values()
            .any(|e| e.active && e.strategy.is_resonant())
    }

    pub fn get(&self, name: &str) -> Option<&StrategyKind> {
        self.entries.get(name).map(|e| &e.strategy)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut StrategyKind> {
        self.entries.get_mut(name).map(|e| &mut e.strategy)
    }

    /// Run every active strategy over the bar and return the non-HOLD signals.
    ///
    /// Inactive strategies are skipped and their state is left untouched.
    pub fn analyze_all(&mut self, bar: &MarketBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        for name in &self.order {
            let Some(entry) = self.entries.get_mut(name) else {
                continue;
            };
            if !entry.active {
                continue;
            }
            let signal = entry.strategy.analyze(bar);
            if signal.direction.is_actionable() {
                debug!(
                    "{} signal: {} {} @ {} (confidence {:.3})",
                    name, signal.direction, signal.symbol, signal.price, signal.confidence
                );
                signals.push(signal);
            }
        }

        for signal in &signals {
            self.signal_count += 1;
            self.recent.push_back(signal.clone());
            while self.recent.len() > self.recent_cap {
                self.recent.pop_front();
            }
        }
        signals
    }

    /// Most recent signals, newest last.
    pub fn recent_signals(&self, count: usize) -> Vec<Signal> {
        let skip = self.recent.len().saturating_sub(count);
        self.recent.iter().skip(skip).cloned().collect()
    }

    pub fn signal_count(&self) -> u64 {
        self.signal_count
    }

    /// Apply a partial patch to one strategy. Returns the new parameter set.
    pub fn update_parameters(&mut self, name: &str, patch: &Value) -> Result<Value> {
        let strategy = self
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStrategy(name.to_string()))?;
        if let Err(e) = strategy.update_parameters(patch) {
            warn!("Parameter update for {} rejected: {}", name, e);
            return Err(e);
        }
        let params = strategy.parameters();
        info!("Parameters updated for {}: {}", name, params);
        Ok(params)
    }

    pub fn status(&self, name: &str) -> Option<Value> {
        self.entries.get(name).map(|e| {
            let mut status = e.strategy.status();
            if let Value::Object(map) = &mut status {
                map.insert("name".to_string(), json!(name));
                map.insert("active".to_string(), json!(e.active));
            }
            status
        })
    }

    /// Parameters and latest indicator values per strategy, for status pushes.
    pub fn snapshot(&self) -> Value {
        let map: serde_json::Map<String, Value> = self
            .order
            .iter()
            .filter_map(|name| {
                self.entries.get(name).map(|e| {
                    (
                        name.clone(),
                        json!({
                            "active": e.active,
                            "parameters": e.strategy.parameters(),
                            "indicators": e.strategy.indicator_values(),
                        }),
                    )
                })
            })
            .collect();
        Value::Object(map)
    }

    pub fn on_position_open(&mut self, symbol: &str, price: Decimal, size: Decimal) {
        for entry in self.entries.values_mut() {
            entry.strategy.on_position_open(symbol, price, size);
        }
    }

    pub fn on_position_close(&mut self, symbol: &str) {
        for entry in self.entries.values_mut() {
            entry.strategy.on_position_close(symbol);
        }
    }

    pub fn clear_history(&mut self) {
        self.recent.clear();
    }

    /// Drop indicator history and held positions of every strategy.
    pub fn reset_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.strategy.reset();
        }
    }
}
