//! Monitoring surface: outbound status and events, inbound control commands.
//!
//! The engine owns one [`MonitorSink`] handed to it at startup. Commands from
//! the dashboard travel over a bounded channel and are applied by the control
//! loop itself, never from inside a callback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::gateway::Credentials;
use crate::portfolio::PortfolioStatus;
use crate::risk::RiskStatus;

/// Capacity of the control command channel
pub const COMMAND_BUFFER: usize = 64;

/// Per-strategy parameters and latest indicator values
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorReport {
    pub parameters: Value,
    pub values: Value,
}

/// Snapshot pushed to the dashboard on every status tick
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub halted: Option<String>,
    pub symbol: String,
    pub active_strategies: Vec<String>,
    pub recent_signal_count: u64,
    pub executed_order_count: usize,
    pub active_order_count: usize,
    pub open_position_count: usize,
    pub indicators: BTreeMap<String, IndicatorReport>,
    pub timeframe: String,
    pub timeframe_options: Vec<String>,
    pub current_price: Decimal,
    pub portfolio: PortfolioStatus,
    pub risk: RiskStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Discrete engine event
#[derive(Debug, Clone, Serialize)]
pub struct EngineEvent {
    pub event_type: String,
    pub severity: Severity,
    pub message: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub fn new(event_type: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.to_string(),
            severity,
            message: message.into(),
            payload: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Event type names
pub mod events {
    pub const TRADING_STARTED: &str = "trading_started";
    pub const TRADING_STOPPED: &str = "trading_stopped";
    pub const RISK_BREAKER: &str = "risk_breaker_triggered";
    pub const AUTO_TUNE_COMPLETED: &str = "auto_tune_completed";
    pub const PARAMETERS_UPDATED: &str = "parameters_updated";
    pub const TIMEFRAME_CHANGED: &str = "timeframe_changed";
    pub const CREDENTIALS_UPDATED: &str = "credentials_updated";
}

/// Where the engine reports to
#[async_trait]
pub trait MonitorSink: Send + Sync {
    async fn push_status(&self, report: &StatusReport) -> anyhow::Result<()>;

    async fn emit(&self, event: &EngineEvent) -> anyhow::Result<()>;
}

/// Sink that writes through `tracing` when no dashboard is configured
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl MonitorSink for LogSink {
    async fn push_status(&self, report: &StatusReport) -> anyhow::Result<()> {
        info!(
            "Status | running: {} | strategies: {:?} | signals: {} | orders: {} | positions: {} | price: {} | equity: {}",
            report.running,
            report.active_strategies,
            report.recent_signal_count,
            report.executed_order_count,
            report.open_position_count,
            report.current_price,
            report.portfolio.total_value
        );
        Ok(())
    }

    async fn emit(&self, event: &EngineEvent) -> anyhow::Result<()> {
        match event.severity {
            Severity::Info => info!("Event {}: {}", event.event_type, event.message),
            Severity::Warning => warn!("Event {}: {}", event.event_type, event.message),
            Severity::Critical => error!("Event {}: {}", event.event_type, event.message),
        }
        Ok(())
    }
}

/// Inbound control from the dashboard
#[derive(Debug, Clone)]
pub enum ControlCommand {
    StartTrading,
    StopTrading,
    /// Deep-merge `patch` into the named strategy's parameters
    UpdateParameters { strategy: String, patch: Value },
    ChangeTimeframe(String),
    UpdateCredentials(Credentials),
    RunAutoTune,
}

/// Handle for driving a running engine from outside the control loop
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<ControlCommand>,
    shutdown: CancellationToken,
}

impl EngineHandle {
    pub fn new(commands: mpsc::Sender<ControlCommand>, shutdown: CancellationToken) -> Self {
        Self { commands, shutdown }
    }

    pub async fn send(&self, command: ControlCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("engine control loop has stopped"))
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_delivers_commands() {
        let (tx, mut rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = EngineHandle::new(tx, CancellationToken::new());
        handle
            .send(ControlCommand::ChangeTimeframe("5m".to_string()))
            .await
            .unwrap();
        match rx.recv().await {
            Some(ControlCommand::ChangeTimeframe(tf)) => assert_eq!(tf, "5m"),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(!handle.is_shutdown());
        handle.shutdown();
        assert!(handle.shutdown_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_send_after_loop_exit_fails() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = EngineHandle::new(tx, CancellationToken::new());
        assert!(handle.send(ControlCommand::StopTrading).await.is_err());
    }

    #[test]
    fn test_event_serializes_severity() {
        let event = EngineEvent::new(events::RISK_BREAKER, Severity::Critical, "halt")
            .with_payload(serde_json::json!({"ratio": -0.3}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["event_type"], "risk_breaker_triggered");
        assert_eq!(json["payload"]["ratio"], -0.3);
    }

    #[test]
    fn test_log_sink_accepts_every_severity() {
        let sink = LogSink;
        for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
            let event = EngineEvent::new(events::TRADING_STOPPED, severity, "stopped");
            tokio_test::block_on(sink.emit(&event)).unwrap();
        }
    }
}
