//! Trading Engine - signal-driven trading agent
//!
//! 1. Loads configuration (file + `ENGINE__` environment overrides)
//! 2. Restores persisted settings
//! 3. Polls candles from the exchange gateway and runs the strategies
//! 4. Places and tracks orders under risk control
//! 5. Reports status and events to the dashboard

use std::sync::Arc;
use tracing::{error, info, warn, Level};

use trading_engine::{
    DashboardClient, EngineConfig, ExchangeGateway, LogSink, MonitorSink, PaperGateway,
    SettingsStore, TradingEngine,
};

/// Trading engine entry point
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load()?;

    // Initialize logging
    let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("Starting Trading Engine...");
    info!(
        "Symbol: {}, Timeframe: {}, Strategies: {:?}",
        config.symbol, config.timeframe, config.strategies
    );

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(PaperGateway::new(config.paper.clone()));

    let monitor: Arc<dyn MonitorSink> = match &config.dashboard_url {
        Some(url) => {
            info!("Dashboard: {}", url);
            Arc::new(DashboardClient::new(url)?)
        }
        None => {
            warn!("No dashboard configured, reporting to the log");
            Arc::new(LogSink)
        }
    };

    let settings = SettingsStore::load_or_default(config.settings_path()).await;

    let (engine, handle) = TradingEngine::new(config, gateway, monitor, settings)?;

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                handle.shutdown();
            }
            Err(e) => error!("Signal handler error: {}", e),
        }
    });

    engine.run().await
}
