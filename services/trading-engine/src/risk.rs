//! Risk ledger: per-trade and aggregate risk budgets plus a drawdown ceiling.
//!
//! The manager owns the risk budget (balance, peak balance, drawdown and the
//! sum of open risk). It is mutated only from the control loop, on position
//! open/close and on balance refresh.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::{Signed, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};

use crate::types::{OrderSide, Signal};

/// Risk limits, all expressed as fractions of account balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub max_risk_per_trade: Decimal,
    pub max_total_risk: Decimal,
    pub max_drawdown: Decimal,
    pub max_position_size: Decimal,
    /// Distance from entry used to derive a stop price for sizing
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: dec!(0.02),
            max_total_risk: dec!(0.06),
            max_drawdown: dec!(0.10),
            max_position_size: dec!(0.5),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.04),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub allowed: bool,
    pub level: RiskLevel,
    pub reason: String,
    pub size: Decimal,
    pub risk_amount: Decimal,
    pub risk_percentage: Decimal,
    pub stop_price: Decimal,
}

/// Risk carried by one open position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionRisk {
    pub symbol: String,
    /// Signed size, positive for long
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub risk_amount: Decimal,
    pub risk_percentage: Decimal,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub realized_pnl: Decimal,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub pnl: Decimal,
    pub trades: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetrics {
    pub max_drawdown: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub win_rate: f64,
    /// `None` when there were no losing days
    pub profit_factor: Option<f64>,
    pub level: RiskLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub account_balance: Decimal,
    pub peak_balance: Decimal,
    pub total_risk: Decimal,
    pub risk_percentage: Decimal,
    pub current_drawdown: Decimal,
    pub max_drawdown: Decimal,
    pub position_count: usize,
    pub metrics: RiskMetrics,
    pub should_stop_trading: bool,
    pub stop_reason: Option<String>,
    pub trade_count: usize,
    pub daily_buckets: usize,
}

#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    account_balance: Decimal,
    peak_balance: Decimal,
    current_drawdown: Decimal,
    total_risk: Decimal,
    positions: HashMap<String, PositionRisk>,
    trade_history: VecDeque<ClosedTrade>,
    trade_cap: usize,
    daily_pnl: VecDeque<DailyPnl>,
    daily_cap: usize,
}

impl RiskManager {
    pub const TRADE_HISTORY_CAP: usize = 1000;
    /// Daily buckets kept for metrics, one year
    pub const DAILY_PNL_CAP: usize = 365;

    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            account_balance: Decimal::ZERO,
            peak_balance: Decimal::ZERO,
            current_drawdown: Decimal::ZERO,
            total_risk: Decimal::ZERO,
            positions: HashMap::new(),
            trade_history: VecDeque::new(),
            trade_cap: Self::TRADE_HISTORY_CAP,
            daily_pnl: VecDeque::new(),
            daily_cap: Self::DAILY_PNL_CAP,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn account_balance(&self) -> Decimal {
        self.account_balance
    }

    pub fn current_drawdown(&self) -> Decimal {
        self.current_drawdown
    }

    pub fn total_risk(&self) -> Decimal {
        self.total_risk
    }

    /// Refresh the balance, the peak and the drawdown from peak.
    pub fn update_account_balance(&mut self, balance: Decimal) {
        self.account_balance = balance;
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
        if self.peak_balance > Decimal::ZERO {
            self.current_drawdown = (self.peak_balance - balance) / self.peak_balance;
        }
    }

    /// Size a position so that the loss at `stop_price` stays within budget.
    ///
    /// Returns `(size, risk_amount)`. The risk is clipped to what remains of
    /// the aggregate budget, then the notional is clipped to the max position
    /// fraction of balance.
    pub fn calculate_position_size(
        &self,
        entry_price: Decimal,
        stop_price: Decimal,
        confidence: f64,
    ) -> (Decimal, Decimal) {
        let confidence = Decimal::try_from(confidence.clamp(0.0, 1.0)).unwrap_or(Decimal::ONE);
        let price_risk = (entry_price - stop_price).abs();
        if price_risk.is_zero() || entry_price <= Decimal::ZERO {
            warn!("Stop price equals entry price; cannot size position");
            return (Decimal::ZERO, Decimal::ZERO);
        }

        let mut risk = self.account_balance * self.config.max_risk_per_trade * confidence;
        let available = self.account_balance * self.config.max_total_risk - self.total_risk;
        if risk > available {
            warn!(
                "Aggregate risk budget exceeded, clipping risk {} -> {}",
                risk,
                available.max(Decimal::ZERO)
            );
            risk = available.max(Decimal::ZERO);
        }
        let mut size = risk / price_risk;

        let max_notional = self.account_balance * self.config.max_position_size;
        if size * entry_price > max_notional {
            size = max_notional / entry_price;
            risk = size * price_risk;
        }
        (size, risk)
    }

    /// Stop price at the configured distance against the trade.
    pub fn stop_price_for(&self, side: OrderSide, entry_price: Decimal) -> Decimal {
        match side {
            OrderSide::Buy => entry_price * (Decimal::ONE - self.config.stop_loss_pct),
            OrderSide::Sell => entry_price * (Decimal::ONE + self.config.stop_loss_pct),
        }
    }

    fn classify(&self, risk_percentage: Decimal) -> RiskLevel {
        let cap = self.config.max_risk_per_trade;
        if risk_percentage > cap * dec!(1.5) {
            RiskLevel::Critical
        } else if risk_percentage > cap {
            RiskLevel::High
        } else if risk_percentage > cap * dec!(0.5) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Classify a concrete trade. Critical risk or excess drawdown is a hard
    /// rejection; anything else is allowed with an informational level.
    pub fn assess_trade(&self, size: Decimal, entry_price: Decimal, stop_price: Decimal) -> RiskAssessment {
        let risk_amount = size * (entry_price - stop_price).abs();
        if self.account_balance <= Decimal::ZERO {
            return RiskAssessment {
                allowed: false,
                level: RiskLevel::Critical,
                reason: "account balance is zero".to_string(),
                size,
                risk_amount,
                risk_percentage: Decimal::ZERO,
                stop_price,
            };
        }

        let risk_percentage = risk_amount / self.account_balance;
        let mut level = self.classify(risk_percentage);
        let mut reason = format!("{} risk: {:.4}", level, risk_percentage);
        if self.current_drawdown > self.config.max_drawdown {
            level = RiskLevel::Critical;
            reason = format!(
                "drawdown {:.4} exceeds limit {}",
                self.current_drawdown, self.config.max_drawdown
            );
            warn!("{}", reason);
        } else if level == RiskLevel::Critical {
            reason = format!("risk too high: {:.4}", risk_percentage);
        }

        RiskAssessment {
            allowed: level != RiskLevel::Critical,
            level,
            reason,
            size,
            risk_amount,
            risk_percentage,
            stop_price,
        }
    }

    /// Admission check for a strategy signal, sized at the configured stop.
    pub fn check_trade_signal(&self, signal: &Signal) -> RiskAssessment {
        let side = signal.direction.side().unwrap_or(OrderSide::Buy);
        let stop_price = self.stop_price_for(side, signal.price);
        let (size, _) = self.calculate_position_size(signal.price, stop_price, signal.confidence);
        self.assess_trade(size, signal.price, stop_price)
    }

    /// Admission check for an order. Orders that only reduce an existing
    /// exposure are always allowed so exits cannot be blocked.
    pub fn check_order(
        &self,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
        stop_price: Option<Decimal>,
        reduces_exposure: bool,
    ) -> RiskAssessment {
        let stop_price = stop_price.unwrap_or_else(|| self.stop_price_for(side, price));
        let mut assessment = self.assess_trade(size, price, stop_price);
        if reduces_exposure && !assessment.allowed {
            assessment.allowed = true;
            assessment.reason = format!("exposure-reducing order ({})", assessment.reason);
        }
        assessment
    }

    /// Track a newly opened (or enlarged) position and its risk.
    pub fn add_position(
        &mut self,
        symbol: &str,
        side: OrderSide,
        size: Decimal,
        entry_price: Decimal,
        risk_amount: Decimal,
    ) {
        let signed = match side {
            OrderSide::Buy => size,
            OrderSide::Sell => -size,
        };
        self.total_risk += risk_amount;
        let balance = self.account_balance;

        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| PositionRisk {
                symbol: symbol.to_string(),
                size: Decimal::ZERO,
                entry_price,
                current_price: entry_price,
                unrealized_pnl: Decimal::ZERO,
                risk_amount: Decimal::ZERO,
                risk_percentage: Decimal::ZERO,
                level: RiskLevel::Medium,
            });

        let new_size = position.size + signed;
        if !new_size.is_zero() && position.size.signum() == signed.signum() {
            position.entry_price = (position.size.abs() * position.entry_price
                + size * entry_price)
                / new_size.abs();
        }
        position.size = new_size;
        position.risk_amount += risk_amount;
        position.risk_percentage = if balance > Decimal::ZERO {
            position.risk_amount / balance
        } else {
            Decimal::ZERO
        };

        info!(
            "Risk position added: {} {} {} @ {} | risk {}",
            symbol, side, size, entry_price, risk_amount
        );
    }

    /// Mark a tracked position and refresh its unrealized PnL and level.
    pub fn update_position(&mut self, symbol: &str, current_price: Decimal) {
        let cap = self.config.max_risk_per_trade;
        let Some(position) = self.positions.get_mut(symbol) else {
            return;
        };
        position.current_price = current_price;
        position.unrealized_pnl = (current_price - position.entry_price) * position.size;
        let pct = position.risk_percentage.abs();
        position.level = if pct > cap * dec!(1.5) {
            RiskLevel::Critical
        } else if pct > cap {
            RiskLevel::High
        } else if pct > cap * dec!(0.5) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };
    }

    /// Release risk for `size` units closed at `exit_price`. The position is
    /// dropped once its size reaches zero.
    pub fn reduce_position(
        &mut self,
        symbol: &str,
        size: Decimal,
        exit_price: Decimal,
        realized_pnl: Decimal,
    ) {
        let Some(position) = self.positions.get_mut(symbol) else {
            return;
        };
        let held = position.size.abs();
        if held.is_zero() || size >= held {
            self.remove_position(symbol, exit_price, realized_pnl);
            return;
        }

        let released = position.risk_amount * size / held;
        position.risk_amount -= released;
        position.size -= size * position.size.signum();
        let entry_price = position.entry_price;
        self.total_risk -= released;
        self.record_trade(symbol, entry_price, exit_price, size, realized_pnl);
    }

    /// Close a tracked position entirely.
    pub fn remove_position(&mut self, symbol: &str, exit_price: Decimal, realized_pnl: Decimal) {
        let Some(position) = self.positions.remove(symbol) else {
            return;
        };
        self.total_risk -= position.risk_amount;
        if self.total_risk < Decimal::ZERO {
            self.total_risk = Decimal::ZERO;
        }
        self.record_trade(
            symbol,
            position.entry_price,
            exit_price,
            position.size,
            realized_pnl,
        );
        info!("Risk position removed: {} | realized {}", symbol, realized_pnl);
    }

    fn record_trade(
        &mut self,
        symbol: &str,
        entry_price: Decimal,
        exit_price: Decimal,
        size: Decimal,
        realized_pnl: Decimal,
    ) {
        let now = Utc::now();
        self.trade_history.push_back(ClosedTrade {
            symbol: symbol.to_string(),
            entry_price,
            exit_price,
            size,
            realized_pnl,
            closed_at: now,
        });
        while self.trade_history.len() > self.trade_cap {
            self.trade_history.pop_front();
        }

        let today = now.date_naive();
        match self.daily_pnl.back_mut() {
            Some(bucket) if bucket.date == today => {
                bucket.pnl += realized_pnl;
                bucket.trades += 1;
            }
            _ => {
                self.daily_pnl.push_back(DailyPnl {
                    date: today,
                    pnl: realized_pnl,
                    trades: 1,
                });
                while self.daily_pnl.len() > self.daily_cap {
                    self.daily_pnl.pop_front();
                }
            }
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&PositionRisk> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &PositionRisk> {
        self.positions.values()
    }

    /// Closed trades, oldest first. Only the newest `TRADE_HISTORY_CAP` are kept.
    pub fn trade_history(&self) -> &VecDeque<ClosedTrade> {
        &self.trade_history
    }

    pub fn risk_percentage(&self) -> Decimal {
        if self.account_balance > Decimal::ZERO {
            self.total_risk / self.account_balance
        } else {
            Decimal::ZERO
        }
    }

    /// Reason to halt new entries, if any.
    pub fn should_stop_trading(&self) -> Option<String> {
        if self.current_drawdown > self.config.max_drawdown {
            return Some(format!(
                "drawdown {:.4} exceeds limit {}",
                self.current_drawdown, self.config.max_drawdown
            ));
        }
        let risk_pct = self.risk_percentage();
        if risk_pct > self.config.max_total_risk {
            return Some(format!(
                "total risk {:.4} exceeds limit {}",
                risk_pct, self.config.max_total_risk
            ));
        }
        if self.account_balance <= Decimal::ZERO {
            return Some("account balance exhausted".to_string());
        }
        None
    }

    /// Statistics over the daily realized PnL buckets.
    pub fn calculate_risk_metrics(&self) -> RiskMetrics {
        let now = Utc::now();
        let balance = self.account_balance.to_f64().unwrap_or(0.0);
        if self.daily_pnl.is_empty() || balance <= 0.0 {
            return RiskMetrics {
                max_drawdown: 0.0,
                volatility: 0.0,
                sharpe_ratio: 0.0,
                win_rate: 0.0,
                profit_factor: None,
                level: RiskLevel::Low,
                timestamp: now,
            };
        }

        let pnl: Vec<f64> = self
            .daily_pnl
            .iter()
            .map(|d| d.pnl.to_f64().unwrap_or(0.0))
            .collect();
        let n = pnl.len() as f64;

        let mut cumulative = 0.0;
        let mut running_max = f64::NEG_INFINITY;
        let mut max_drawdown: f64 = 0.0;
        for p in &pnl {
            cumulative += p;
            running_max = running_max.max(cumulative);
            max_drawdown = max_drawdown.max((running_max - cumulative) / balance);
        }

        let mean = pnl.iter().sum::<f64>() / n;
        let volatility = if pnl.len() > 1 {
            let var = pnl.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
            var.sqrt() / balance
        } else {
            0.0
        };
        let sharpe_ratio = if volatility > 0.0 { mean / volatility } else { 0.0 };

        let wins = pnl.iter().filter(|p| **p > 0.0).count() as f64;
        let gross_profit: f64 = pnl.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = pnl.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
        let profit_factor = if gross_loss > 0.0 {
            Some(gross_profit / gross_loss)
        } else {
            None
        };

        let limit = self.config.max_drawdown.to_f64().unwrap_or(0.1);
        let level = if max_drawdown > limit || volatility > 0.05 {
            RiskLevel::High
        } else if max_drawdown > limit * 0.5 || volatility > 0.02 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        RiskMetrics {
            max_drawdown,
            volatility,
            sharpe_ratio,
            win_rate: wins / n,
            profit_factor,
            level,
            timestamp: now,
        }
    }

    pub fn status(&self) -> RiskStatus {
        let stop_reason = self.should_stop_trading();
        RiskStatus {
            account_balance: self.account_balance,
            peak_balance: self.peak_balance,
            total_risk: self.total_risk,
            risk_percentage: self.risk_percentage(),
            current_drawdown: self.current_drawdown,
            max_drawdown: self.config.max_drawdown,
            position_count: self.positions.len(),
            metrics: self.calculate_risk_metrics(),
            should_stop_trading: stop_reason.is_some(),
            stop_reason,
            trade_count: self.trade_history.len(),
            daily_buckets: self.daily_pnl.len(),
        }
    }
}
