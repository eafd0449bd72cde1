//! Trading engine - main control loop
//!
//! One task owns every piece of mutable trading state (strategies, risk,
//! portfolio, orders) and interleaves its periodic work with
//! `tokio::select!`. State changes only happen between `.await` points of
//! this task, so no locks are needed.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::consensus::ConsensusCoordinator;
use crate::error::{EngineError, Result};
use crate::gateway::{Credentials, ExchangeGateway};
use crate::market_data::{latest_closed, CandleTracker, Timeframe};
use crate::monitor::{
    events, ControlCommand, EngineEvent, EngineHandle, IndicatorReport, MonitorSink, Severity,
    StatusReport, COMMAND_BUFFER,
};
use crate::orders::{Fill, OrderManager, OrderMetadata, OrderRequest};
use crate::portfolio::Portfolio;
use crate::risk::RiskManager;
use crate::settings::SettingsStore;
use crate::strategy::{composite, CompositeParams, CompositeStrategy, StrategyKind, StrategyRegistry};
use crate::tuner::{self, TuneOutcome};
use crate::types::{MarketBar, OrderSide, Signal};

/// Decimal places kept on order sizes
const SIZE_SCALE: u32 = 8;

/// Run `fut` unless `token` fires first.
async fn until_cancelled<F: Future>(token: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

async fn join_tune(
    task: &mut Option<JoinHandle<Option<TuneOutcome>>>,
) -> std::result::Result<Option<TuneOutcome>, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn next_bar(feed: &mut Option<mpsc::Receiver<MarketBar>>) -> Option<MarketBar> {
    match feed {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub struct TradingEngine {
    config: EngineConfig,
    gateway: Arc<dyn ExchangeGateway>,
    monitor: Arc<dyn MonitorSink>,
    settings: SettingsStore,
    registry: StrategyRegistry,
    consensus: ConsensusCoordinator,
    risk: RiskManager,
    portfolio: Portfolio,
    orders: OrderManager,
    candles: CandleTracker,
    timeframe: Timeframe,
    /// Latest closed candle seen by the market poll, not yet analysed
    pending_bar: Option<MarketBar>,
    current_price: Decimal,
    trading: bool,
    halted: Option<String>,
    commands: Option<mpsc::Receiver<ControlCommand>>,
    bar_feed: Option<mpsc::Receiver<MarketBar>>,
    shutdown: CancellationToken,
    tune_task: Option<JoinHandle<Option<TuneOutcome>>>,
}

impl TradingEngine {
    /// Wire up the engine. Persisted settings override the configured
    /// timeframe and strategy parameters where they are still valid.
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn ExchangeGateway>,
        monitor: Arc<dyn MonitorSink>,
        settings: SettingsStore,
    ) -> Result<(Self, EngineHandle)> {
        config.validate()?;

        let available = gateway.available_timeframes();
        let timeframe = match settings.timeframe().map(str::parse::<Timeframe>) {
            Some(Ok(tf)) if available.contains(&tf) => tf,
            Some(_) => {
                warn!(
                    "Persisted timeframe {:?} is not usable, falling back to {}",
                    settings.timeframe(),
                    config.timeframe
                );
                config.timeframe
            }
            None => config.timeframe,
        };

        let mut registry = StrategyRegistry::new();
        registry.register(StrategyKind::Composite(CompositeStrategy::new(
            config.strategy.clone(),
        )));
        for name in StrategyKind::NAMES.iter().filter(|n| **n != composite::NAME) {
            registry.register(StrategyKind::from_name(name)?);
        }
        for (name, tuned) in &settings.settings().tuned {
            match registry.update_parameters(name, &tuned.params) {
                Ok(_) => info!(
                    "Restored tuned parameters for {} (win rate {:.3})",
                    name, tuned.win_rate
                ),
                Err(e) => warn!("Ignoring persisted parameters for {}: {}", name, e),
            }
        }
        for name in &config.strategies {
            registry.activate(name)?;
        }

        let mut risk = RiskManager::new(config.risk.clone());
        risk.update_account_balance(config.initial_cash);
        let portfolio = Portfolio::new(config.initial_cash);
        let orders = OrderManager::new(Arc::clone(&gateway), config.orders.clone());

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let shutdown = CancellationToken::new();
        let handle = EngineHandle::new(tx, shutdown.clone());

        info!(
            "Engine configured | symbol: {} | timeframe: {} | gateway: {} | strategies: {:?}",
            config.symbol,
            timeframe,
            gateway.name(),
            registry.active_names()
        );

        let engine = Self {
            config,
            gateway,
            monitor,
            settings,
            registry,
            consensus: ConsensusCoordinator::new(),
            risk,
            portfolio,
            orders,
            candles: CandleTracker::new(),
            timeframe,
            pending_bar: None,
            current_price: Decimal::ZERO,
            trading: false,
            halted: None,
            commands: Some(rx),
            bar_feed: None,
            shutdown,
            tune_task: None,
        };
        Ok((engine, handle))
    }

    /// Attach a push feed of closed candles (e.g. a websocket adapter).
    pub fn with_bar_feed(mut self, feed: mpsc::Receiver<MarketBar>) -> Self {
        self.bar_feed = Some(feed);
        self
    }

    /// Run until the shutdown token fires.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("Engine starting main loop...");

        let token = self.shutdown.clone();
        let mut commands = self
            .commands
            .take()
            .ok_or_else(|| anyhow::anyhow!("engine is already running"))?;
        let mut bar_feed = self.bar_feed.take();

        let mut trading_interval = interval(Duration::from_secs(self.config.loops.trading_secs));
        let mut market_interval = interval(Duration::from_secs(self.config.loops.market_poll_secs));
        let mut order_interval =
            interval(Duration::from_secs(self.config.orders.monitor_interval_secs));
        let mut status_interval = interval(Duration::from_secs(self.config.loops.status_secs));
        for ticker in [
            &mut trading_interval,
            &mut market_interval,
            &mut order_interval,
            &mut status_interval,
        ] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        if let Some(Err(e)) = until_cancelled(&token, self.poll_market()).await {
            error!("Initial market poll error: {}", e);
        }
        self.start_trading().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                _ = market_interval.tick() => {
                    if let Some(Err(e)) = until_cancelled(&token, self.poll_market()).await {
                        error!("Market poll error: {}", e);
                    }
                }
                _ = trading_interval.tick() => {
                    if let Some(Err(e)) = until_cancelled(&token, self.run_trading_cycle()).await {
                        error!("Trading cycle error: {}", e);
                    }
                }
                _ = order_interval.tick() => {
                    until_cancelled(&token, self.monitor_tick(Utc::now())).await;
                }
                _ = status_interval.tick() => {
                    until_cancelled(&token, self.push_status()).await;
                }
                Some(command) = commands.recv() => {
                    until_cancelled(&token, self.handle_command(command)).await;
                }
                Some(bar) = next_bar(&mut bar_feed) => {
                    if let Some(Err(e)) = until_cancelled(&token, self.process_bar(bar)).await {
                        error!("Pushed candle error: {}", e);
                    }
                }
                result = join_tune(&mut self.tune_task), if self.tune_task.is_some() => {
                    self.tune_task = None;
                    match result {
                        Ok(Some(outcome)) => {
                            until_cancelled(&token, self.apply_tune_outcome(outcome)).await;
                        }
                        Ok(None) => info!("Auto-tune finished without a qualifying candidate"),
                        Err(e) => error!("Auto-tune task error: {}", e),
                    }
                }
            }
        }

        self.finish().await;
        Ok(())
    }

    async fn finish(&mut self) {
        if let Some(task) = self.tune_task.take() {
            // the search polls the cancelled token and returns promptly
            if let Err(e) = task.await {
                error!("Auto-tune task error: {}", e);
            }
        }
        self.trading = false;
        if let Err(e) = self.settings.save().await {
            error!("Settings save error: {}", e);
        }
        info!(
            "Engine stopped | active orders left: {} | equity: {}",
            self.orders.active_orders().count(),
            self.portfolio.total_value()
        );
    }

    /// Pull the latest candles; remember the latest closed one and mark prices.
    pub async fn poll_market(&mut self) -> Result<()> {
        let bars = self
            .gateway
            .fetch_ohlcv(&self.config.symbol, self.timeframe, self.config.ohlcv_limit)
            .await?;
        match bars.last() {
            Some(forming) => self.mark_price(&forming.symbol, forming.close),
            None => {
                let price = self.gateway.fetch_ticker_price(&self.config.symbol).await?;
                let symbol = self.config.symbol.clone();
                self.mark_price(&symbol, price);
            }
        }
        if let Some(closed) = latest_closed(&bars) {
            let canonical = self.timeframe.canonicalize(closed.timestamp);
            let is_new = self
                .candles
                .last_processed(&closed.symbol)
                .map_or(true, |last| canonical > last);
            if is_new {
                debug!("Closed candle queued: {} @ {}", closed.symbol, closed.timestamp);
                self.pending_bar = Some(closed.clone());
            }
        }
        Ok(())
    }

    async fn run_trading_cycle(&mut self) -> Result<()> {
        match self.pending_bar.take() {
            Some(bar) => self.process_bar(bar).await.map(|_| ()),
            None => {
                debug!("No new closed candle, skipping trading cycle");
                Ok(())
            }
        }
    }

    fn mark_price(&mut self, symbol: &str, price: Decimal) {
        if price <= Decimal::ZERO {
            return;
        }
        if symbol == self.config.symbol {
            self.current_price = price;
        }
        self.portfolio.update_price(symbol, price);
        self.risk.update_position(symbol, price);
        self.risk.update_account_balance(self.portfolio.total_value());
    }

    /// Analyse one closed candle and act on the resulting candidates.
    ///
    /// Each canonical candle time is analysed at most once per symbol.
    /// Returns the ids of the orders submitted.
    pub async fn process_bar(&mut self, bar: MarketBar) -> Result<Vec<String>> {
        if !self.candles.observe(&bar, self.timeframe) {
            return Ok(Vec::new());
        }
        self.mark_price(&bar.symbol, bar.close);

        // indicators advance even while trading is stopped or halted
        let signals = self.registry.analyze_all(&bar);
        if self.check_breakers().await {
            debug!("Trading halted, {} signals ignored", signals.len());
            return Ok(Vec::new());
        }
        if !self.trading {
            debug!("Trading stopped, {} signals ignored", signals.len());
            return Ok(Vec::new());
        }

        let candidates = self
            .consensus
            .resolve(signals, self.registry.composite_active());
        let mut placed = Vec::new();
        for signal in candidates {
            if let Some(order_id) = self.execute_signal(&signal).await {
                placed.push(order_id);
            }
        }
        Ok(placed)
    }

    async fn execute_signal(&mut self, signal: &Signal) -> Option<String> {
        let side = signal.direction.side()?;
        let symbol = signal.symbol.as_str();
        info!(
            "Trade signal: {} {} @ {} | confidence: {:.3} | strategy: {}",
            symbol,
            signal.direction,
            signal.price,
            signal.confidence,
            signal.strategy()
        );

        if !self.orders.orders_by_symbol(symbol).is_empty() {
            debug!("Order already working for {}, signal skipped", symbol);
            return None;
        }

        let held = self.portfolio.quantity(symbol);
        let (size, risk_amount, stop_price) = match side {
            OrderSide::Sell if held <= Decimal::ZERO => {
                debug!("No {} position to sell", symbol);
                return None;
            }
            OrderSide::Sell => (held, Decimal::ZERO, None),
            OrderSide::Buy => {
                if let Some(reason) = self.risk.should_stop_trading() {
                    warn!("Entry blocked for {}: {}", symbol, reason);
                    return None;
                }
                let assessment = self.risk.check_trade_signal(signal);
                if !assessment.allowed {
                    warn!("Signal rejected by risk manager: {}", assessment.reason);
                    return None;
                }
                let stop = self.risk.stop_price_for(side, signal.price);
                let (mut size, mut risk_amount) =
                    self.risk
                        .calculate_position_size(signal.price, stop, signal.confidence);
                if self.config.order_notional > Decimal::ZERO && signal.price > Decimal::ZERO {
                    let capped = self.config.order_notional / signal.price;
                    if capped < size {
                        risk_amount = risk_amount * capped / size;
                        size = capped;
                    }
                }
                (size, risk_amount, Some(stop))
            }
        };

        let size = size.round_dp_with_strategy(SIZE_SCALE, RoundingStrategy::ToZero);
        if size <= Decimal::ZERO {
            warn!("Position size for {} rounds to zero, signal dropped", symbol);
            return None;
        }

        let request = OrderRequest::market(symbol, side, size, signal.price).with_metadata(
            OrderMetadata {
                signal_id: Some(signal.metadata.signal_id),
                strategy: Some(signal.strategy().to_string()),
                confidence: Some(signal.confidence),
                stop_trigger: signal.is_stop_trigger(),
                risk_amount,
                stop_price,
            },
        );
        let order_id = match self.orders.create_order(request, &self.risk, &self.portfolio) {
            Ok(id) => id,
            Err(e) if e.is_admission() => {
                warn!("Order for {} not admitted: {}", symbol, e);
                return None;
            }
            Err(e) => {
                error!("Order creation failed for {}: {}", symbol, e);
                return None;
            }
        };

        let result = self.orders.submit_order(&order_id).await;
        if result.success {
            Some(order_id)
        } else {
            error!(
                "Order submission failed: {} | {}",
                order_id,
                result.error.unwrap_or_default()
            );
            None
        }
    }

    /// One order-monitor pass at wall-clock `now`; fills flow into risk and
    /// strategy position tracking.
    pub async fn monitor_tick(&mut self, now: DateTime<Utc>) -> Vec<Fill> {
        let fills = self.orders.monitor_tick(&mut self.portfolio, now).await;
        for fill in &fills {
            self.apply_fill(fill);
        }
        if !fills.is_empty() {
            self.check_breakers().await;
        }
        fills
    }

    fn apply_fill(&mut self, fill: &Fill) {
        let symbol = fill.symbol.as_str();
        match fill.side {
            OrderSide::Buy => {
                self.risk.add_position(
                    symbol,
                    OrderSide::Buy,
                    fill.size,
                    fill.price,
                    fill.metadata.risk_amount,
                );
            }
            OrderSide::Sell => {
                self.risk
                    .reduce_position(symbol, fill.size, fill.price, fill.realized_pnl);
            }
        }

        match self.portfolio.get_position(symbol) {
            Some(position) => {
                let (entry, quantity) = (position.avg_entry_price, position.quantity);
                self.registry.on_position_open(symbol, entry, quantity);
            }
            None => self.registry.on_position_close(symbol),
        }
        self.risk.update_account_balance(self.portfolio.total_value());
        info!(
            "Fill applied: {} {} {} @ {} | realized: {} | equity: {}",
            fill.side,
            fill.size,
            symbol,
            fill.price,
            fill.realized_pnl,
            self.portfolio.total_value()
        );
    }

    /// Halt on a fatal condition. Returns true while halted.
    async fn check_breakers(&mut self) -> bool {
        if self.halted.is_some() {
            return true;
        }
        let Some(reason) = self.portfolio.breaker_tripped() else {
            return false;
        };
        error!("Risk breaker triggered, trading halted: {}", reason);
        self.trading = false;
        self.halted = Some(reason.clone());
        let event = EngineEvent::new(events::RISK_BREAKER, Severity::Critical, reason).with_payload(
            json!({
                "total_value": self.portfolio.total_value(),
                "pnl_ratio": self.portfolio.pnl_ratio(),
                "drawdown": self.risk.current_drawdown(),
            }),
        );
        self.emit(event).await;
        true
    }

    pub async fn start_trading(&mut self) {
        if let Some(reason) = self.halted.take() {
            warn!("Trading re-enabled after halt: {}", reason);
        }
        if self.trading {
            return;
        }
        self.trading = true;
        info!("Trading started");
        let event = EngineEvent::new(events::TRADING_STARTED, Severity::Info, "trading started")
            .with_payload(json!({
                "symbol": self.config.symbol,
                "timeframe": self.timeframe,
                "strategies": self.registry.active_names(),
            }));
        self.emit(event).await;
    }

    pub async fn stop_trading(&mut self) {
        if !self.trading {
            return;
        }
        self.trading = false;
        info!("Trading stopped");
        self.emit(EngineEvent::new(
            events::TRADING_STOPPED,
            Severity::Info,
            "trading stopped",
        ))
        .await;
    }

    /// Apply one dashboard command.
    pub async fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::StartTrading => self.start_trading().await,
            ControlCommand::StopTrading => self.stop_trading().await,
            ControlCommand::UpdateParameters { strategy, patch } => {
                self.update_parameters(&strategy, &patch).await;
            }
            ControlCommand::ChangeTimeframe(tf) => {
                if let Err(e) = self.change_timeframe(&tf).await {
                    warn!("Timeframe change rejected: {}", e);
                }
            }
            ControlCommand::UpdateCredentials(credentials) => {
                self.update_credentials(credentials).await;
            }
            ControlCommand::RunAutoTune => {
                if let Err(e) = self.start_auto_tune().await {
                    error!("Auto-tune start error: {}", e);
                }
            }
        }
    }

    async fn update_parameters(&mut self, strategy: &str, patch: &serde_json::Value) {
        match self.registry.update_parameters(strategy, patch) {
            Ok(params) => {
                let event = EngineEvent::new(
                    events::PARAMETERS_UPDATED,
                    Severity::Info,
                    format!("{} parameters updated", strategy),
                )
                .with_payload(json!({ "strategy": strategy, "parameters": params }));
                self.emit(event).await;
            }
            Err(e) => {
                let event = EngineEvent::new(
                    events::PARAMETERS_UPDATED,
                    Severity::Warning,
                    format!("{} parameter update rejected: {}", strategy, e),
                )
                .with_payload(json!({ "strategy": strategy, "patch": patch }));
                self.emit(event).await;
            }
        }
    }

    /// Switch candle timeframe. Indicator history is rebuilt from scratch;
    /// held positions are carried over to the strategies.
    pub async fn change_timeframe(&mut self, value: &str) -> Result<()> {
        let timeframe: Timeframe = value.parse()?;
        if !self.gateway.available_timeframes().contains(&timeframe) {
            return Err(EngineError::InvalidTimeframe(format!(
                "{} not offered by {}",
                value,
                self.gateway.name()
            )));
        }
        if timeframe == self.timeframe {
            return Ok(());
        }

        let previous = self.timeframe;
        self.timeframe = timeframe;
        self.candles.reset();
        self.pending_bar = None;
        self.registry.reset_all();
        let held: Vec<(String, Decimal, Decimal)> = self
            .portfolio
            .positions
            .values()
            .map(|p| (p.symbol.clone(), p.avg_entry_price, p.quantity))
            .collect();
        for (symbol, entry, quantity) in held {
            self.registry.on_position_open(&symbol, entry, quantity);
        }

        self.settings.set_timeframe(timeframe.as_str());
        if let Err(e) = self.settings.save().await {
            error!("Settings save error: {}", e);
        }
        info!("Timeframe changed: {} -> {}", previous, timeframe);
        let event = EngineEvent::new(
            events::TIMEFRAME_CHANGED,
            Severity::Info,
            format!("timeframe changed to {}", timeframe),
        )
        .with_payload(json!({ "from": previous, "to": timeframe }));
        self.emit(event).await;
        Ok(())
    }

    async fn update_credentials(&mut self, credentials: Credentials) {
        info!("Updating exchange credentials: {:?}", credentials);
        match self.gateway.reconnect(credentials).await {
            Ok(()) => {
                let backend = self.gateway.name().to_string();
                self.settings.set_exchange_backend(&backend);
                if let Err(e) = self.settings.save().await {
                    error!("Settings save error: {}", e);
                }
                self.emit(EngineEvent::new(
                    events::CREDENTIALS_UPDATED,
                    Severity::Info,
                    format!("reconnected to {}", backend),
                ))
                .await;
                // resume polling right away
                if let Err(e) = self.poll_market().await {
                    error!("Market poll error after reconnect: {}", e);
                }
            }
            Err(e) => {
                error!("Gateway reconnect failed: {}", e);
                self.emit(EngineEvent::new(
                    events::CREDENTIALS_UPDATED,
                    Severity::Warning,
                    format!("reconnect failed: {}", e),
                ))
                .await;
            }
        }
    }

    fn composite_params(&self) -> CompositeParams {
        match self.registry.get(composite::NAME) {
            Some(StrategyKind::Composite(strategy)) => (*strategy.params()).clone(),
            _ => self.config.strategy.clone(),
        }
    }

    /// Launch the grid search on a blocking thread. No-op while one runs.
    pub async fn start_auto_tune(&mut self) -> Result<()> {
        if self.tune_task.is_some() {
            info!("Auto-tune already running");
            return Ok(());
        }
        let mut bars = self
            .gateway
            .fetch_ohlcv(
                &self.config.symbol,
                self.timeframe,
                self.config.tuner.history_limit,
            )
            .await?;
        // the newest candle is still forming
        bars.pop();

        let base = self.composite_params();
        let tuner_config = self.config.tuner.clone();
        let token = self.shutdown.child_token();
        info!("Auto-tune started over {} candles", bars.len());
        self.tune_task = Some(tokio::task::spawn_blocking(move || {
            tuner::run_grid_search(&base, &bars, &tuner_config, || token.is_cancelled())
        }));
        Ok(())
    }

    /// Adopt a tuning result if it beats the recorded win rate.
    pub async fn apply_tune_outcome(&mut self, outcome: TuneOutcome) {
        let current = self.settings.tuned(composite::NAME).map(|t| t.win_rate);
        if !outcome.beats(current) {
            info!(
                "Auto-tune result {:.3} does not beat recorded {:?}, keeping parameters",
                outcome.win_rate, current
            );
            return;
        }

        let params = match serde_json::to_value(&outcome.params) {
            Ok(v) => v,
            Err(e) => {
                error!("Auto-tune result not serializable: {}", e);
                return;
            }
        };
        if let Err(e) = self.registry.update_parameters(composite::NAME, &params) {
            warn!("Auto-tune parameters rejected: {}", e);
            return;
        }
        self.settings
            .set_tuned(composite::NAME, params.clone(), outcome.win_rate);
        if let Err(e) = self.settings.save().await {
            error!("Settings save error: {}", e);
        }
        info!(
            "Auto-tune applied | win rate: {:.3} | trades: {} | evaluated: {}",
            outcome.win_rate, outcome.trades, outcome.evaluated
        );
        let event = EngineEvent::new(
            events::AUTO_TUNE_COMPLETED,
            Severity::Info,
            format!("auto-tune applied with win rate {:.3}", outcome.win_rate),
        )
        .with_payload(json!({
            "strategy": composite::NAME,
            "parameters": params,
            "win_rate": outcome.win_rate,
            "trades": outcome.trades,
            "evaluated": outcome.evaluated,
        }));
        self.emit(event).await;
    }

    /// Wait for a running auto-tune and apply its result.
    pub async fn wait_for_auto_tune(&mut self) -> Option<TuneOutcome> {
        let task = self.tune_task.take()?;
        match task.await {
            Ok(Some(outcome)) => {
                self.apply_tune_outcome(outcome.clone()).await;
                Some(outcome)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Auto-tune task error: {}", e);
                None
            }
        }
    }

    pub fn status_report(&self) -> StatusReport {
        let mut indicators = BTreeMap::new();
        if let serde_json::Value::Object(map) = self.registry.snapshot() {
            for (name, entry) in map {
                indicators.insert(
                    name,
                    IndicatorReport {
                        parameters: entry["parameters"].clone(),
                        values: entry["indicators"].clone(),
                    },
                );
            }
        }
        StatusReport {
            running: self.trading,
            halted: self.halted.clone(),
            symbol: self.config.symbol.clone(),
            active_strategies: self.registry.active_names(),
            recent_signal_count: self.registry.signal_count(),
            executed_order_count: self.orders.executed_count(),
            active_order_count: self.orders.active_orders().count(),
            open_position_count: self.portfolio.positions.len(),
            indicators,
            timeframe: self.timeframe.to_string(),
            timeframe_options: self
                .gateway
                .available_timeframes()
                .iter()
                .map(|tf| tf.to_string())
                .collect(),
            current_price: self.current_price,
            portfolio: self.portfolio.status(),
            risk: self.risk.status(),
            timestamp: Utc::now(),
        }
    }

    pub async fn push_status(&self) {
        let report = self.status_report();
        if let Err(e) = self.monitor.push_status(&report).await {
            error!("Status push error: {}", e);
        }
    }

    async fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.monitor.emit(&event).await {
            error!("Event emit error ({}): {}", event.event_type, e);
        }
    }

    pub fn is_trading(&self) -> bool {
        self.trading
    }

    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}
