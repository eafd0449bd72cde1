//! Portfolio ledger - cash, positions and mark-to-market PnL

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::types::OrderSide;

/// Loss of initial capital beyond which all trading halts
pub const CAPITAL_LOSS_BREAKER: Decimal = dec!(-0.25);

/// Decimal places kept on rebalance quantities
const QTY_SCALE: u32 = 8;

/// Portfolio state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub initial_cash: Decimal,
    pub cash: Decimal,
    /// Current positions by symbol
    pub positions: HashMap<String, Position>,
    /// Realized PnL over the lifetime of the ledger
    pub realized_pnl: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// A single long position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    /// Last mark; the entry price until the first mark arrives
    pub last_price: Decimal,
    pub realized_pnl: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.last_price
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.last_price - self.avg_entry_price) * self.quantity
    }
}

/// Itemized position in a status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_entry: Decimal,
    pub last_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_ratio: Decimal,
}

/// Read surface for risk and monitoring
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioStatus {
    pub cash: Decimal,
    pub holdings_value: Decimal,
    pub total_value: Decimal,
    pub initial_cash: Decimal,
    pub pnl: Decimal,
    pub pnl_ratio: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub exposure: Decimal,
    pub cash_ratio: Decimal,
    pub position_count: usize,
    pub positions: Vec<PositionSnapshot>,
}

/// One leg of a rebalance plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl Portfolio {
    /// Create new portfolio with starting cash
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            initial_cash,
            cash: initial_cash,
            positions: HashMap::new(),
            realized_pnl: Decimal::ZERO,
            last_updated: Utc::now(),
        }
    }

    /// Capacity check: cash for buys, holdings for sells.
    pub fn can_open_position(
        &self,
        symbol: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<()> {
        if size <= Decimal::ZERO {
            return Err(EngineError::Validation(format!(
                "size must be positive, got {}",
                size
            )));
        }
        match side {
            OrderSide::Buy => {
                let cost = size * price;
                if cost > self.cash {
                    return Err(EngineError::Admission(format!(
                        "insufficient cash: need {}, have {}",
                        cost, self.cash
                    )));
                }
            }
            OrderSide::Sell => {
                let held = self.quantity(symbol);
                if held < size {
                    return Err(EngineError::Admission(format!(
                        "insufficient {} position: need {}, have {}",
                        symbol, size, held
                    )));
                }
            }
        }
        Ok(())
    }

    /// Admit and apply a trade. Returns the PnL realized by a sell (zero for buys).
    pub fn execute_order(
        &mut self,
        symbol: &str,
        qty: Decimal,
        price: Decimal,
        side: OrderSide,
    ) -> Result<Decimal> {
        self.can_open_position(symbol, side, qty, price)?;
        Ok(self.apply_fill(symbol, qty, price, side))
    }

    /// Book a fill the exchange already executed.
    ///
    /// No capacity check: cash may go negative when a market buy fills above
    /// its reference price. A sell beyond the held quantity closes the
    /// position and realizes PnL on the held part only.
    pub fn apply_fill(&mut self, symbol: &str, qty: Decimal, price: Decimal, side: OrderSide) -> Decimal {
        let now = Utc::now();

        let realized = match side {
            OrderSide::Buy => {
                self.cash -= qty * price;
                match self.positions.get_mut(symbol) {
                    Some(pos) => {
                        let new_qty = pos.quantity + qty;
                        pos.avg_entry_price =
                            (pos.quantity * pos.avg_entry_price + qty * price) / new_qty;
                        pos.quantity = new_qty;
                        pos.last_price = price;
                        pos.last_updated = now;
                        debug!(
                            "Position increased: {} | Qty: {} | Avg: {}",
                            symbol, new_qty, pos.avg_entry_price
                        );
                    }
                    None => {
                        self.positions.insert(
                            symbol.to_string(),
                            Position {
                                symbol: symbol.to_string(),
                                quantity: qty,
                                avg_entry_price: price,
                                last_price: price,
                                realized_pnl: Decimal::ZERO,
                                last_updated: now,
                            },
                        );
                        info!("New position: {} | Qty: {} | Entry: {}", symbol, qty, price);
                    }
                }
                Decimal::ZERO
            }
            OrderSide::Sell => {
                self.cash += qty * price;
                let mut closed = false;
                let mut realized = Decimal::ZERO;
                if let Some(pos) = self.positions.get_mut(symbol) {
                    let closing = qty.min(pos.quantity);
                    if closing < qty {
                        warn!(
                            "Sell fill {} exceeds held {} for {}",
                            qty, pos.quantity, symbol
                        );
                    }
                    realized = (price - pos.avg_entry_price) * closing;
                    pos.quantity -= closing;
                    pos.realized_pnl += realized;
                    pos.last_price = price;
                    pos.last_updated = now;
                    closed = pos.quantity.is_zero();
                }
                if closed {
                    self.positions.remove(symbol);
                    info!("Position closed: {} | Realized PnL: {}", symbol, realized);
                }
                self.realized_pnl += realized;
                realized
            }
        };

        self.last_updated = now;
        realized
    }

    /// Record the latest mark for a symbol.
    pub fn update_price(&mut self, symbol: &str, price: Decimal) {
        if let Some(pos) = self.positions.get_mut(symbol) {
            pos.last_price = price;
            pos.last_updated = Utc::now();
        }
        self.last_updated = Utc::now();
    }

    /// Update current prices for all positions
    pub fn mark_to_market(&mut self, prices: &HashMap<String, Decimal>) {
        for (symbol, price) in prices {
            self.update_price(symbol, *price);
        }
    }

    pub fn quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn holdings_value(&self) -> Decimal {
        self.positions.values().map(Position::market_value).sum()
    }

    /// cash + Σ(qty × mark)
    pub fn total_value(&self) -> Decimal {
        self.cash + self.holdings_value()
    }

    pub fn pnl_ratio(&self) -> Decimal {
        if self.initial_cash > Decimal::ZERO {
            (self.total_value() - self.initial_cash) / self.initial_cash
        } else {
            Decimal::ZERO
        }
    }

    /// Fatal condition: capital exhausted or the loss breaker tripped.
    pub fn breaker_tripped(&self) -> Option<String> {
        let total = self.total_value();
        if total <= Decimal::ZERO {
            return Some(format!("portfolio value exhausted: {}", total));
        }
        let ratio = self.pnl_ratio();
        if ratio < CAPITAL_LOSS_BREAKER {
            return Some(format!(
                "capital loss {:.4} beyond breaker {}",
                ratio, CAPITAL_LOSS_BREAKER
            ));
        }
        None
    }

    /// Get portfolio status
    pub fn status(&self) -> PortfolioStatus {
        let positions: Vec<PositionSnapshot> = self
            .positions
            .values()
            .map(|pos| PositionSnapshot {
                symbol: pos.symbol.clone(),
                quantity: pos.quantity,
                avg_entry: pos.avg_entry_price,
                last_price: pos.last_price,
                market_value: pos.market_value(),
                unrealized_pnl: pos.unrealized_pnl(),
                unrealized_pnl_ratio: if pos.avg_entry_price > Decimal::ZERO {
                    (pos.last_price - pos.avg_entry_price) / pos.avg_entry_price
                } else {
                    Decimal::ZERO
                },
            })
            .collect();

        let holdings_value: Decimal = positions.iter().map(|p| p.market_value).sum();
        let unrealized_pnl: Decimal = positions.iter().map(|p| p.unrealized_pnl).sum();
        let total_value = self.cash + holdings_value;
        let (exposure, cash_ratio) = if total_value > Decimal::ZERO {
            (holdings_value / total_value, self.cash / total_value)
        } else {
            (Decimal::ZERO, Decimal::ONE)
        };

        PortfolioStatus {
            cash: self.cash,
            holdings_value,
            total_value,
            initial_cash: self.initial_cash,
            pnl: total_value - self.initial_cash,
            pnl_ratio: self.pnl_ratio(),
            realized_pnl: self.realized_pnl,
            unrealized_pnl,
            exposure,
            cash_ratio,
            position_count: positions.len(),
            positions,
        }
    }

    /// Plan the orders that move holdings to `target_weights` of total value.
    ///
    /// Symbols without a positive price are skipped. Sells come first so their
    /// proceeds fund the buys.
    pub fn plan_rebalance(
        &self,
        target_weights: &HashMap<String, Decimal>,
        prices: &HashMap<String, Decimal>,
    ) -> Vec<RebalanceOrder> {
        let total = self.total_value();
        let mut orders: Vec<RebalanceOrder> = target_weights
            .iter()
            .filter_map(|(symbol, weight)| {
                let price = *prices.get(symbol)?;
                if price <= Decimal::ZERO {
                    return None;
                }
                let target_qty = (total * *weight / price)
                    .round_dp_with_strategy(QTY_SCALE, RoundingStrategy::ToZero);
                let delta = target_qty - self.quantity(symbol);
                if delta.is_zero() {
                    return None;
                }
                Some(RebalanceOrder {
                    symbol: symbol.clone(),
                    side: if delta > Decimal::ZERO {
                        OrderSide::Buy
                    } else {
                        OrderSide::Sell
                    },
                    quantity: delta.abs(),
                    price,
                })
            })
            .collect();
        orders.sort_by(|a, b| {
            let rank = |o: &RebalanceOrder| matches!(o.side, OrderSide::Buy);
            rank(a).cmp(&rank(b)).then_with(|| a.symbol.cmp(&b.symbol))
        });
        orders
    }

    /// Rebalance toward target weights, executing every leg against the ledger.
    /// Legs that fail the capacity check are skipped and logged.
    pub fn rebalance(
        &mut self,
        target_weights: &HashMap<String, Decimal>,
        prices: &HashMap<String, Decimal>,
    ) -> Vec<RebalanceOrder> {
        let plan = self.plan_rebalance(target_weights, prices);
        let mut executed = Vec::with_capacity(plan.len());
        for order in plan {
            match self.execute_order(&order.symbol, order.quantity, order.price, order.side) {
                Ok(_) => executed.push(order),
                Err(e) => warn!("Rebalance leg {} {} skipped: {}", order.side, order.symbol, e),
            }
        }
        executed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portfolio_new() {
        let portfolio = Portfolio::new(dec!(10000));
        assert_eq!(portfolio.cash, dec!(10000));
        assert!(portfolio.positions.is_empty());
        assert_eq!(portfolio.total_value(), dec!(10000));
    }

    #[test]
    fn test_buy_then_sell_round_trip() {
        let mut p = Portfolio::new(dec!(1000));
        p.execute_order("BTC", dec!(10), dec!(100), OrderSide::Buy).unwrap();
        assert_eq!(p.cash, Decimal::ZERO);
        let realized = p.execute_order("BTC", dec!(10), dec!(110), OrderSide::Sell).unwrap();
        assert_eq!(p.cash, dec!(1100));
        assert_eq!(realized, dec!(100));
        assert!(p.get_position("BTC").is_none());
    }

    #[test]
    fn test_weighted_average_entry() {
        let mut p = Portfolio::new(dec!(10000));
        p.execute_order("ETH", dec!(2), dec!(100), OrderSide::Buy).unwrap();
        p.execute_order("ETH", dec!(2), dec!(200), OrderSide::Buy).unwrap();
        assert_eq!(p.get_position("ETH").unwrap().avg_entry_price, dec!(150));
    }

    #[test]
    fn test_capacity_checks() {
        let mut p = Portfolio::new(dec!(100));
        let err = p.can_open_position("ETH", OrderSide::Buy, dec!(2), dec!(100)).unwrap_err();
        assert!(err.is_admission());
        let err = p.can_open_position("ETH", OrderSide::Sell, dec!(1), dec!(100)).unwrap_err();
        assert!(err.is_admission());
        assert!(p.execute_order("ETH", dec!(1), dec!(200), OrderSide::Buy).is_err());
        assert!(matches!(
            p.can_open_position("ETH", OrderSide::Buy, Decimal::ZERO, dec!(1)),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_apply_fill_skips_capacity_check() {
        let mut p = Portfolio::new(dec!(10000));
        // exchange filled above the admitted price
        p.apply_fill("BTC", dec!(100), dec!(101), OrderSide::Buy);
        assert_eq!(p.cash, dec!(-100));
        assert_eq!(p.quantity("BTC"), dec!(100));

        let realized = p.apply_fill("BTC", dec!(120), dec!(102), OrderSide::Sell);
        assert_eq!(realized, dec!(100));
        assert!(p.get_position("BTC").is_none());
    }

    #[test]
    fn test_status_marks_to_market() {
        let mut p = Portfolio::new(dec!(10000));
        p.execute_order("SOL", dec!(10), dec!(100), OrderSide::Buy).unwrap();
        p.update_price("SOL", dec!(120));
        let s = p.status();
        assert_eq!(s.holdings_value, dec!(1200));
        assert_eq!(s.total_value, dec!(10200));
        assert_eq!(s.pnl, dec!(200));
        assert_eq!(s.pnl_ratio, dec!(0.02));
        assert_eq!(s.positions[0].unrealized_pnl, dec!(200));
        assert_eq!(s.position_count, 1);
    }

    #[test]
    fn test_breaker_boundary() {
        let mut p = Portfolio::new(dec!(1000));
        p.execute_order("X", dec!(10), dec!(100), OrderSide::Buy).unwrap();
        p.update_price("X", dec!(75));
        // exactly -25%
        assert!(p.breaker_tripped().is_none());
        p.update_price("X", dec!(74.99));
        assert!(p.breaker_tripped().is_some());
    }

    #[test]
    fn test_rebalance_sells_before_buys() {
        let mut p = Portfolio::new(dec!(1000));
        p.execute_order("A", dec!(8), dec!(100), OrderSide::Buy).unwrap();
        let weights = HashMap::from([
            ("A".to_string(), dec!(0.2)),
            ("B".to_string(), dec!(0.5)),
        ]);
        let prices = HashMap::from([("A".to_string(), dec!(100)), ("B".to_string(), dec!(50))]);
        let executed = p.rebalance(&weights, &prices);
        assert_eq!(executed.len(), 2);
        assert_eq!(executed[0].side, OrderSide::Sell);
        assert_eq!(executed[0].quantity, dec!(6));
        assert_eq!(executed[1].symbol, "B");
        assert_eq!(executed[1].quantity, dec!(10));
        assert_eq!(p.quantity("A"), dec!(2));
        assert_eq!(p.cash, dec!(300));
    }
}
