//! Order lifecycle management
//!
//! Orders are created locally as `Pending` after validation, risk admission
//! and a portfolio capacity check. Submission hands them to the exchange
//! gateway; the monitor tick polls live orders, applies fills to the
//! portfolio and sweeps stale orders.
//!
//! ```text
//! Pending -> Submitted -> PartiallyFilled -> Filled
//!                      \-> Cancelled | Rejected | Expired
//! ```

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::gateway::{ExchangeGateway, GatewayOrder, GatewayOrderState, PlaceOrderRequest};
use crate::portfolio::Portfolio;
use crate::risk::RiskManager;
use crate::types::{OrderSide, OrderType};

/// Local order state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Orders in these states are polled by the monitor
    pub fn is_live(&self) -> bool {
        matches!(self, OrderStatus::Submitted | OrderStatus::PartiallyFilled)
    }
}

impl From<GatewayOrderState> for OrderStatus {
    fn from(state: GatewayOrderState) -> Self {
        match state {
            GatewayOrderState::Live => OrderStatus::Submitted,
            GatewayOrderState::PartiallyFilled => OrderStatus::PartiallyFilled,
            GatewayOrderState::Filled => OrderStatus::Filled,
            GatewayOrderState::Cancelled => OrderStatus::Cancelled,
            GatewayOrderState::Expired => OrderStatus::Expired,
            GatewayOrderState::Rejected => OrderStatus::Rejected,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Provenance carried from the signal that produced the order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    pub signal_id: Option<Uuid>,
    pub strategy: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub stop_trigger: bool,
    /// Risk budget consumed if the order fills
    #[serde(default)]
    pub risk_amount: Decimal,
    pub stop_price: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: Decimal,
    pub price: Option<Decimal>,
    /// Mark at creation, used to book fills reported without a price
    pub reference_price: Option<Decimal>,
    pub status: OrderStatus,
    pub filled_size: Decimal,
    pub avg_fill_price: Decimal,
    pub fee: Decimal,
    pub exchange_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: OrderMetadata,
}

/// Order creation request
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub size: Decimal,
    pub price: Option<Decimal>,
    /// Price used for admission when the order carries none (market orders)
    pub reference_price: Option<Decimal>,
    pub metadata: OrderMetadata,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, size: Decimal, reference_price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            size,
            price: None,
            reference_price: Some(reference_price),
            metadata: OrderMetadata::default(),
        }
    }

    pub fn limit(symbol: &str, side: OrderSide, size: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            size,
            price: Some(price),
            reference_price: None,
            metadata: OrderMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: OrderMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn admission_price(&self) -> Option<Decimal> {
        self.price.or(self.reference_price)
    }

    fn validate(&self) -> Result<Decimal> {
        let mut errors = Vec::new();
        if self.symbol.trim().is_empty() {
            errors.push("symbol must not be empty".to_string());
        }
        if self.size <= Decimal::ZERO {
            errors.push(format!("size must be positive, got {}", self.size));
        }
        if self.order_type.requires_price() && self.price.is_none() {
            errors.push(format!("{} orders require a price", self.order_type));
        }
        if let Some(price) = self.price {
            if price <= Decimal::ZERO {
                errors.push(format!("price must be positive, got {}", price));
            }
        }
        let admission_price = self.admission_price();
        if admission_price.is_none() && !self.order_type.requires_price() {
            errors.push("market orders need a reference price".to_string());
        }
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors.join("; ")));
        }
        Ok(admission_price.unwrap_or(Decimal::ZERO))
    }
}

/// Per-order outcome of submit / cancel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderResult {
    pub order_id: String,
    pub success: bool,
    pub exchange_order_id: Option<String>,
    pub error: Option<String>,
}

impl OrderResult {
    fn ok(order_id: &str, exchange_order_id: Option<String>) -> Self {
        Self {
            order_id: order_id.to_string(),
            success: true,
            exchange_order_id,
            error: None,
        }
    }

    fn failed(order_id: &str, error: impl Into<String>) -> Self {
        Self {
            order_id: order_id.to_string(),
            success: false,
            exchange_order_id: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Submitted,
    Cancelled,
    StatusChanged,
}

pub type OrderCallback = Box<dyn Fn(OrderEvent, &Order) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Submitted orders older than this are auto-cancelled
    pub cancel_after_secs: u64,
    pub enable_auto_cancel: bool,
    pub monitor_interval_secs: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            cancel_after_secs: 3600,
            enable_auto_cancel: true,
            monitor_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub successful_orders: u64,
    pub failed_orders: u64,
    pub cancelled_orders: u64,
    pub filled_orders: u64,
    pub total_fees: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub total_orders: u64,
    pub active_orders: usize,
    pub order_history: usize,
    pub status_distribution: BTreeMap<String, usize>,
    pub success_rate: f64,
    pub total_fees: Decimal,
}

/// A completed fill, applied to the portfolio by the monitor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub price: Decimal,
    pub fee: Decimal,
    /// PnL realized on the portfolio by a closing fill
    pub realized_pnl: Decimal,
    pub metadata: OrderMetadata,
}

fn new_order_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ord-{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

pub struct OrderManager {
    gateway: Arc<dyn ExchangeGateway>,
    config: OrderConfig,
    active: HashMap<String, Order>,
    history: VecDeque<Order>,
    history_cap: usize,
    callbacks: HashMap<String, Vec<OrderCallback>>,
    stats: OrderStats,
}

impl OrderManager {
    /// Terminal orders kept for lookup and summaries
    pub const HISTORY_CAP: usize = 1000;

    pub fn new(gateway: Arc<dyn ExchangeGateway>, config: OrderConfig) -> Self {
        Self {
            gateway,
            config,
            active: HashMap::new(),
            history: VecDeque::new(),
            history_cap: Self::HISTORY_CAP,
            callbacks: HashMap::new(),
            stats: OrderStats::default(),
        }
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    /// Swap the gateway, e.g. after a credential change.
    pub fn set_gateway(&mut self, gateway: Arc<dyn ExchangeGateway>) {
        self.gateway = gateway;
    }

    /// Validate, admit and store a new order as `Pending`.
    ///
    /// Nothing reaches the exchange here. Validation failures and admission
    /// rejections are returned as errors and leave no trace.
    pub fn create_order(
        &mut self,
        request: OrderRequest,
        risk: &RiskManager,
        portfolio: &Portfolio,
    ) -> Result<String> {
        let price = request.validate()?;

        let reduces_exposure =
            request.side == OrderSide::Sell && portfolio.quantity(&request.symbol) > Decimal::ZERO;
        let assessment = risk.check_order(
            request.side,
            request.size,
            price,
            request.metadata.stop_price,
            reduces_exposure,
        );
        if !assessment.allowed {
            return Err(EngineError::Admission(format!(
                "risk check failed: {}",
                assessment.reason
            )));
        }
        portfolio.can_open_position(&request.symbol, request.side, request.size, price)?;

        let now = Utc::now();
        let order = Order {
            id: new_order_id(),
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            size: request.size,
            price: request.price,
            reference_price: request.reference_price,
            status: OrderStatus::Pending,
            filled_size: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            exchange_order_id: None,
            created_at: now,
            updated_at: now,
            metadata: request.metadata,
        };
        info!(
            "Order created: {} | {} {} {} {} @ {:?}",
            order.id, order.symbol, order.side, order.order_type, order.size, order.price
        );
        let id = order.id.clone();
        self.active.insert(id.clone(), order);
        self.stats.total_orders += 1;
        Ok(id)
    }

    /// The order stays `Pending` until the gateway answers. A placement that
    /// never completes (shutdown mid-await) leaves it `Pending` with no
    /// exchange id, and the stale sweep cancels it locally.
    fn prepare_submit(&self, order_id: &str) -> std::result::Result<PlaceOrderRequest, OrderResult> {
        let Some(order) = self.active.get(order_id) else {
            return Err(OrderResult::failed(order_id, "order not found"));
        };
        if order.status != OrderStatus::Pending {
            return Err(OrderResult::failed(
                order_id,
                format!("order is {}, only pending orders can be submitted", order.status),
            ));
        }
        Ok(PlaceOrderRequest {
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            size: order.size,
            price: order.price,
            client_order_id: order.id.clone(),
        })
    }

    fn finish_submit(&mut self, order_id: &str, placed: Result<String>) -> OrderResult {
        match placed {
            Ok(exchange_id) => {
                let Some(order) = self.active.get_mut(order_id) else {
                    return OrderResult::failed(order_id, "order not found");
                };
                order.exchange_order_id = Some(exchange_id.clone());
                order.status = OrderStatus::Submitted;
                order.updated_at = Utc::now();
                self.stats.successful_orders += 1;
                info!("Order submitted: {} | exchange id {}", order_id, exchange_id);
                self.trigger_callbacks(order_id, OrderEvent::Submitted);
                OrderResult::ok(order_id, Some(exchange_id))
            }
            Err(e) => {
                self.stats.failed_orders += 1;
                error!("Order submission failed: {} | {}", order_id, e);
                self.finalize(order_id, OrderStatus::Rejected);
                OrderResult::failed(order_id, e.to_string())
            }
        }
    }

    /// Place a pending order on the exchange. A gateway failure rejects it.
    pub async fn submit_order(&mut self, order_id: &str) -> OrderResult {
        let request = match self.prepare_submit(order_id) {
            Ok(r) => r,
            Err(result) => return result,
        };
        let placed = self.gateway.place_order(&request).await;
        self.finish_submit(order_id, placed)
    }

    /// Submit several orders concurrently. Each order gets its own result.
    pub async fn batch_submit_orders(&mut self, order_ids: &[String]) -> Vec<OrderResult> {
        let mut results = Vec::with_capacity(order_ids.len());
        let mut requests = Vec::new();
        for id in order_ids {
            if requests.iter().any(|(queued, _)| queued == id) {
                results.push(OrderResult::failed(id, "duplicate order id in batch"));
                continue;
            }
            match self.prepare_submit(id) {
                Ok(req) => requests.push((id.clone(), req)),
                Err(result) => results.push(result),
            }
        }

        let gateway = Arc::clone(&self.gateway);
        let placed = join_all(
            requests
                .iter()
                .map(|(_, req)| gateway.place_order(req)),
        )
        .await;

        for ((id, _), outcome) in requests.iter().zip(placed) {
            results.push(self.finish_submit(id, outcome));
        }
        results
    }

    fn prepare_cancel(&mut self, order_id: &str) -> std::result::Result<Option<(String, String)>, OrderResult> {
        let Some(order) = self.active.get(order_id) else {
            return Err(OrderResult::failed(order_id, "order not found"));
        };
        if order.status.is_terminal() {
            return Err(OrderResult::failed(
                order_id,
                format!("order is {}, cannot cancel", order.status),
            ));
        }
        Ok(order
            .exchange_order_id
            .clone()
            .map(|exchange_id| (order.symbol.clone(), exchange_id)))
    }

    fn finish_cancel(&mut self, order_id: &str, outcome: Result<()>) -> OrderResult {
        match outcome {
            Ok(()) => {
                self.stats.cancelled_orders += 1;
                info!("Order cancelled: {}", order_id);
                if let Some(order) = self.active.get_mut(order_id) {
                    order.status = OrderStatus::Cancelled;
                }
                self.trigger_callbacks(order_id, OrderEvent::Cancelled);
                self.finalize(order_id, OrderStatus::Cancelled);
                OrderResult::ok(order_id, None)
            }
            Err(e) => {
                // still tracked; the next sweep retries
                error!("Order cancel failed: {} | {}", order_id, e);
                OrderResult::failed(order_id, e.to_string())
            }
        }
    }

    /// Cancel a non-terminal order. Pending orders never reached the exchange
    /// and are cancelled locally.
    pub async fn cancel_order(&mut self, order_id: &str) -> OrderResult {
        let target = match self.prepare_cancel(order_id) {
            Ok(t) => t,
            Err(result) => return result,
        };
        let outcome = match target {
            Some((symbol, exchange_id)) => self.gateway.cancel_order(&symbol, &exchange_id).await,
            None => Ok(()),
        };
        self.finish_cancel(order_id, outcome)
    }

    pub async fn batch_cancel_orders(&mut self, order_ids: &[String]) -> Vec<OrderResult> {
        let mut results = Vec::with_capacity(order_ids.len());
        let mut targets = Vec::new();
        for id in order_ids {
            match self.prepare_cancel(id) {
                Ok(target) => targets.push((id.clone(), target)),
                Err(result) => results.push(result),
            }
        }

        let gateway = Arc::clone(&self.gateway);
        let outcomes = join_all(targets.iter().map(|(_, target)| {
            let gateway = Arc::clone(&gateway);
            async move {
                match target {
                    Some((symbol, exchange_id)) => gateway.cancel_order(symbol, exchange_id).await,
                    None => Ok(()),
                }
            }
        }))
        .await;

        for ((id, _), outcome) in targets.iter().zip(outcomes) {
            results.push(self.finish_cancel(id, outcome));
        }
        results
    }

    /// Poll every live order and apply status changes.
    ///
    /// Filled orders are applied to the portfolio and returned. Query failures
    /// are logged; the order is polled again on the next tick.
    pub async fn poll_orders(&mut self, portfolio: &mut Portfolio) -> Vec<Fill> {
        let targets: Vec<(String, String, String)> = self
            .active
            .values()
            .filter(|o| o.status.is_live())
            .filter_map(|o| {
                o.exchange_order_id
                    .as_ref()
                    .map(|x| (o.id.clone(), o.symbol.clone(), x.clone()))
            })
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }
        debug!("Checking {} live orders", targets.len());

        let gateway = Arc::clone(&self.gateway);
        let responses = join_all(
            targets
                .iter()
                .map(|(_, symbol, exchange_id)| gateway.get_order(symbol, exchange_id)),
        )
        .await;

        let mut fills = Vec::new();
        for ((order_id, _, _), response) in targets.iter().zip(responses) {
            match response {
                Ok(update) => {
                    if let Some(fill) = self.apply_update(order_id, update, portfolio) {
                        fills.push(fill);
                    }
                }
                Err(e) => error!("Order status query failed: {} | {}", order_id, e),
            }
        }
        fills
    }

    fn apply_update(
        &mut self,
        order_id: &str,
        update: GatewayOrder,
        portfolio: &mut Portfolio,
    ) -> Option<Fill> {
        let order = self.active.get_mut(order_id)?;
        let new_status = OrderStatus::from(update.state);
        let mut reported = update.filled_size.min(order.size).max(Decimal::ZERO);
        if new_status == OrderStatus::Filled && reported.is_zero() {
            reported = order.size;
        }
        // filled quantity never shrinks
        let filled_size = reported.max(order.filled_size);
        let delta = filled_size - order.filled_size;
        if new_status == order.status && delta.is_zero() {
            return None;
        }

        let old_status = order.status;
        order.status = new_status;
        order.updated_at = Utc::now();
        let mut fee_delta = Decimal::ZERO;
        if update.fee > order.fee {
            fee_delta = update.fee - order.fee;
            self.stats.total_fees += fee_delta;
            order.fee = update.fee;
        }
        if old_status != new_status {
            info!("Order status: {} | {} -> {}", order_id, old_status, new_status);
        }

        // every increment is booked, whatever state the order ends in
        let mut fill = None;
        if delta > Decimal::ZERO {
            let prev_filled = order.filled_size;
            let prev_avg = order.avg_fill_price;
            let avg = [update.avg_price, prev_avg]
                .into_iter()
                .chain(order.price)
                .chain(order.reference_price)
                .find(|p| *p > Decimal::ZERO)
                .unwrap_or(Decimal::ZERO);
            let price = if update.avg_price > Decimal::ZERO && prev_filled > Decimal::ZERO {
                let increment = (avg * filled_size - prev_avg * prev_filled) / delta;
                if increment > Decimal::ZERO {
                    increment
                } else {
                    avg
                }
            } else {
                avg
            };
            order.filled_size = filled_size;
            order.avg_fill_price = avg;

            let realized_pnl = portfolio.apply_fill(&order.symbol, delta, price, order.side);
            let mut metadata = order.metadata.clone();
            metadata.risk_amount = order.metadata.risk_amount * delta / order.size;
            debug!(
                "Fill booked: {} | {} {} @ {} ({} of {})",
                order_id, order.side, delta, price, filled_size, order.size
            );
            fill = Some(Fill {
                order_id: order.id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                size: delta,
                price,
                fee: fee_delta,
                realized_pnl,
                metadata,
            });
        }

        if new_status == OrderStatus::Filled {
            self.stats.filled_orders += 1;
        }
        self.trigger_callbacks(order_id, OrderEvent::StatusChanged);
        if new_status.is_terminal() {
            self.finalize(order_id, new_status);
        }
        fill
    }

    /// Pending or submitted orders older than the cancel-after window at `now`.
    /// Partially filled orders are left to the exchange.
    pub fn stale_orders(&self, now: DateTime<Utc>) -> Vec<String> {
        let limit = Duration::seconds(self.config.cancel_after_secs as i64);
        let mut ids: Vec<String> = self
            .active
            .values()
            .filter(|o| {
                matches!(o.status, OrderStatus::Pending | OrderStatus::Submitted)
                    && now - o.created_at > limit
            })
            .map(|o| o.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Cancel stale orders by wall-clock age.
    pub async fn cancel_stale_orders(&mut self, now: DateTime<Utc>) -> Vec<OrderResult> {
        let stale = self.stale_orders(now);
        if stale.is_empty() {
            return Vec::new();
        }
        info!("Cancelling {} stale orders", stale.len());
        self.batch_cancel_orders(&stale).await
    }

    /// One monitor pass: status poll then timeout sweep.
    pub async fn monitor_tick(&mut self, portfolio: &mut Portfolio, now: DateTime<Utc>) -> Vec<Fill> {
        let fills = self.poll_orders(portfolio).await;
        if self.config.enable_auto_cancel {
            for result in self.cancel_stale_orders(now).await {
                if !result.success {
                    warn!(
                        "Stale order {} still live: {}",
                        result.order_id,
                        result.error.unwrap_or_default()
                    );
                }
            }
        }
        fills
    }

    pub fn register_callback(&mut self, order_id: &str, callback: OrderCallback) {
        self.callbacks
            .entry(order_id.to_string())
            .or_default()
            .push(callback);
    }

    fn trigger_callbacks(&self, order_id: &str, event: OrderEvent) {
        let (Some(callbacks), Some(order)) = (self.callbacks.get(order_id), self.find(order_id)) else {
            return;
        };
        for callback in callbacks {
            if let Err(e) = callback(event, order) {
                error!("Order callback failed for {} ({:?}): {}", order_id, event, e);
            }
        }
    }

    fn find(&self, order_id: &str) -> Option<&Order> {
        self.active
            .get(order_id)
            .or_else(|| self.history.iter().rev().find(|o| o.id == order_id))
    }

    fn finalize(&mut self, order_id: &str, status: OrderStatus) {
        if let Some(mut order) = self.active.remove(order_id) {
            order.status = status;
            order.updated_at = Utc::now();
            self.history.push_back(order);
            while self.history.len() > self.history_cap {
                self.history.pop_front();
            }
        }
        self.callbacks.remove(order_id);
    }

    pub fn get_order(&self, order_id: &str) -> Result<&Order> {
        self.find(order_id)
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))
    }

    pub fn is_active(&self, order_id: &str) -> bool {
        self.active.contains_key(order_id)
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.active.values()
    }

    pub fn orders_by_symbol(&self, symbol: &str) -> Vec<&Order> {
        self.active.values().filter(|o| o.symbol == symbol).collect()
    }

    pub fn orders_by_status(&self, status: OrderStatus) -> Vec<&Order> {
        self.active.values().filter(|o| o.status == status).collect()
    }

    pub fn history(&self) -> &VecDeque<Order> {
        &self.history
    }

    /// Count of orders that reached the exchange and filled
    pub fn executed_count(&self) -> usize {
        self.stats.filled_orders as usize
    }

    pub fn stats(&self) -> &OrderStats {
        &self.stats
    }

    pub fn summary(&self) -> OrderSummary {
        let mut status_distribution = BTreeMap::new();
        for order in self.active.values() {
            *status_distribution.entry(order.status.to_string()).or_insert(0) += 1;
        }
        OrderSummary {
            total_orders: self.stats.total_orders,
            active_orders: self.active.len(),
            order_history: self.history.len(),
            status_distribution,
            success_rate: self.stats.successful_orders as f64 / self.stats.total_orders.max(1) as f64,
            total_fees: self.stats.total_fees,
        }
    }
}
