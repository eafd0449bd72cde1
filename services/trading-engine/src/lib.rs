//! Trading Engine Library
//!
//! Signal-driven crypto trading agent: KDJ/MACD strategies, risk gating,
//! order lifecycle tracking and a dashboard-facing control loop.

pub mod client;
pub mod config;
pub mod consensus;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod indicators;
pub mod market_data;
pub mod monitor;
pub mod orders;
pub mod paper;
pub mod portfolio;
pub mod risk;
pub mod settings;
pub mod strategy;
pub mod tuner;
pub mod types;

// Re-export main types for convenience
pub use client::DashboardClient;
pub use config::{EngineConfig, LoopConfig};
pub use engine::TradingEngine;
pub use error::{EngineError, Result};
pub use gateway::{Credentials, ExchangeGateway, GatewayOrder, GatewayOrderState, PlaceOrderRequest};
pub use market_data::{CandleTracker, Timeframe};
pub use monitor::{ControlCommand, EngineEvent, EngineHandle, LogSink, MonitorSink, Severity, StatusReport};
pub use orders::{Fill, Order, OrderConfig, OrderManager, OrderRequest, OrderResult, OrderStatus};
pub use paper::{PaperConfig, PaperGateway};
pub use portfolio::{Portfolio, PortfolioStatus, Position};
pub use risk::{RiskConfig, RiskManager};
pub use settings::SettingsStore;
pub use strategy::{StrategyKind, StrategyRegistry};
pub use types::{MarketBar, OrderSide, OrderType, Signal, SignalDirection};
