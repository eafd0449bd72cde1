//! Engine configuration
//!
//! Loaded from an optional file (path in `ENGINE_CONFIG`) overlaid with
//! `ENGINE__`-prefixed environment variables, e.g.
//! `ENGINE__RISK__MAX_DRAWDOWN=0.15` or `ENGINE__TIMEFRAME=5m`.

use anyhow::Context;
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::market_data::Timeframe;
use crate::orders::OrderConfig;
use crate::paper::PaperConfig;
use crate::risk::RiskConfig;
use crate::strategy::params::Validate;
use crate::strategy::{composite, CompositeParams, StrategyKind};
use crate::tuner::TunerConfig;

/// Environment variable naming the config file
pub const CONFIG_PATH_VAR: &str = "ENGINE_CONFIG";
const ENV_PREFIX: &str = "ENGINE";

/// Loop cadences in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub trading_secs: u64,
    pub market_poll_secs: u64,
    pub status_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            trading_secs: 60,
            market_poll_secs: 3,
            status_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub initial_cash: Decimal,
    pub log_level: String,
    /// Settings file; the platform data dir when unset
    pub settings_path: Option<PathBuf>,
    /// Dashboard base URL; status goes to the log when unset
    pub dashboard_url: Option<String>,
    /// Strategies activated at startup, in registry order
    pub strategies: Vec<String>,
    /// Candles fetched per market poll
    pub ohlcv_limit: usize,
    /// Cap on the quote amount of a single entry (zero disables the cap)
    pub order_notional: Decimal,
    pub risk: RiskConfig,
    pub orders: OrderConfig,
    pub strategy: CompositeParams,
    pub loops: LoopConfig,
    pub tuner: TunerConfig,
    pub paper: PaperConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC-USDT".to_string(),
            timeframe: Timeframe::H1,
            initial_cash: dec!(10000),
            log_level: "info".to_string(),
            settings_path: None,
            dashboard_url: None,
            strategies: vec![composite::NAME.to_string()],
            ohlcv_limit: 200,
            order_notional: Decimal::ZERO,
            risk: RiskConfig::default(),
            orders: OrderConfig::default(),
            strategy: CompositeParams::default(),
            loops: LoopConfig::default(),
            tuner: TunerConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load using the file named by `ENGINE_CONFIG`, if any.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load from an optional file with environment overrides.
    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading engine config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // Override with environment variables (ENGINE__ prefix)
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("strategies")
                .try_parsing(true),
        );

        let config: EngineConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(crate::settings::SettingsStore::default_path)
    }

    /// Check every section, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.symbol.trim().is_empty() {
            errors.push("symbol must not be empty".to_string());
        }
        if self.initial_cash <= Decimal::ZERO {
            errors.push(format!("initial_cash must be > 0, got {}", self.initial_cash));
        }
        if self.order_notional < Decimal::ZERO {
            errors.push("order_notional must be >= 0".to_string());
        }
        if self.ohlcv_limit < 2 {
            errors.push("ohlcv_limit must be at least 2".to_string());
        }

        for (name, value) in [
            ("risk.max_risk_per_trade", self.risk.max_risk_per_trade),
            ("risk.max_total_risk", self.risk.max_total_risk),
            ("risk.max_drawdown", self.risk.max_drawdown),
            ("risk.max_position_size", self.risk.max_position_size),
            ("risk.stop_loss_pct", self.risk.stop_loss_pct),
            ("risk.take_profit_pct", self.risk.take_profit_pct),
        ] {
            if value <= Decimal::ZERO || value > Decimal::ONE {
                errors.push(format!("{} must be in (0, 1], got {}", name, value));
            }
        }
        if self.risk.max_risk_per_trade > self.risk.max_total_risk {
            errors.push("risk.max_risk_per_trade must not exceed risk.max_total_risk".to_string());
        }

        for (name, value) in [
            ("loops.trading_secs", self.loops.trading_secs),
            ("loops.market_poll_secs", self.loops.market_poll_secs),
            ("loops.status_secs", self.loops.status_secs),
            ("orders.monitor_interval_secs", self.orders.monitor_interval_secs),
        ] {
            if value == 0 {
                errors.push(format!("{} must be > 0", name));
            }
        }

        if self.strategies.is_empty() {
            errors.push("at least one strategy must be enabled".to_string());
        }
        for name in &self.strategies {
            if StrategyKind::from_name(name).is_err() {
                errors.push(format!("unknown strategy '{}'", name));
            }
        }
        self.strategy.collect_errors(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.strategies, vec!["KDJ_MACD".to_string()]);
        assert_eq!(config.orders.cancel_after_secs, 3600);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.symbol = String::new();
        config.risk.max_drawdown = dec!(1.5);
        config.strategies = vec!["BOLLINGER".to_string()];
        config.loops.status_secs = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("symbol"));
        assert!(err.contains("risk.max_drawdown"));
        assert!(err.contains("unknown strategy 'BOLLINGER'"));
        assert!(err.contains("loops.status_secs"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
symbol = "ETH-USDT"
timeframe = "15m"
strategies = ["KDJ", "MACD"]

[risk]
max_drawdown = 0.2

[strategy.macd]
fast = 8
"#
        )
        .unwrap();

        let config = EngineConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.symbol, "ETH-USDT");
        assert_eq!(config.timeframe, Timeframe::M15);
        assert_eq!(config.strategies.len(), 2);
        assert_eq!(config.risk.max_drawdown, dec!(0.2));
        assert_eq!(config.risk.max_total_risk, dec!(0.06));
        assert_eq!(config.strategy.macd.fast, 8);
        assert_eq!(config.strategy.macd.slow, 13);
    }

    #[test]
    fn test_invalid_timeframe_fails_to_load() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "timeframe = \"2h\"").unwrap();
        assert!(EngineConfig::load_from(Some(file.path())).is_err());
    }
}
