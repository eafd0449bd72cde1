//! End-to-end engine flow against a scripted exchange
//!
//! candles → strategies → consensus → risk → orders → fills → status/events

mod mock_gateway;

use mock_gateway::{bar, MockGateway, RecordingDashboard, SYMBOL};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use trading_engine::{
    monitor::events, ControlCommand, EngineConfig, EngineHandle, OrderSide, OrderType,
    SettingsStore, Timeframe, TradingEngine,
};

struct Rig {
    engine: TradingEngine,
    handle: EngineHandle,
    gateway: MockGateway,
    dashboard: Arc<RecordingDashboard>,
    dir: tempfile::TempDir,
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.loops.trading_secs = 1;
    config.loops.market_poll_secs = 1;
    config.loops.status_secs = 1;
    config.orders.monitor_interval_secs = 1;
    config
}

async fn rig_with(config: EngineConfig, settings: Option<SettingsStore>) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let settings =
        settings.unwrap_or_else(|| SettingsStore::in_memory(dir.path().join("settings.json")));
    let gateway = MockGateway::new();
    let dashboard = Arc::new(RecordingDashboard::default());
    let (engine, handle) = TradingEngine::new(
        config,
        Arc::new(gateway.clone()),
        dashboard.clone(),
        settings,
    )
    .unwrap();
    Rig {
        engine,
        handle,
        gateway,
        dashboard,
        dir,
    }
}

/// Closing prices of a decline followed by a sharp reversal
fn reversal() -> Vec<Decimal> {
    let mut closes: Vec<Decimal> = (0..40).map(|i| Decimal::from(200 - 2 * i)).collect();
    closes.extend((0..15).map(|i| Decimal::from(122 + 4 * i)));
    closes
}

#[tokio::test]
async fn test_resonance_entry_is_sized_and_filled() {
    let mut rig = rig_with(test_config(), None).await;
    rig.engine.start_trading().await;

    let mut placed = Vec::new();
    let mut entry_close = Decimal::ZERO;
    for (i, close) in reversal().into_iter().enumerate() {
        placed = rig.engine.process_bar(bar(i as i64, close)).await.unwrap();
        if !placed.is_empty() {
            entry_close = close;
            break;
        }
    }
    assert_eq!(placed.len(), 1);

    let requests = rig.gateway.placed();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.side, OrderSide::Buy);
    assert_eq!(request.order_type, OrderType::Market);
    assert_eq!(request.client_order_id, placed[0]);
    // notional stays within the max position fraction of balance
    assert!(request.size * entry_close <= dec!(5000));
    assert!(request.size.scale() <= 8);

    rig.gateway.auto_fill_at(entry_close);
    let fills = rig.engine.monitor_tick(chrono::Utc::now()).await;
    assert_eq!(fills.len(), 1);

    let report = rig.engine.status_report();
    assert_eq!(report.open_position_count, 1);
    assert_eq!(report.executed_order_count, 1);
    assert_eq!(report.active_order_count, 0);
    assert!(report.recent_signal_count >= 1);
    assert_eq!(report.timeframe_options, vec!["5m", "15m", "1h"]);
    assert!(report.risk.total_risk > Decimal::ZERO);
}

#[tokio::test]
async fn test_one_working_order_per_symbol() {
    let mut rig = rig_with(test_config(), None).await;
    rig.engine.start_trading().await;
    let mut total = 0;
    for (i, close) in reversal().into_iter().enumerate() {
        total += rig.engine.process_bar(bar(i as i64, close)).await.unwrap().len();
    }
    // the gateway never fills, so later signals find the first order working
    assert_eq!(total, 1);
    assert_eq!(rig.gateway.placed().len(), 1);
}

#[tokio::test]
async fn test_timeframe_must_be_offered_by_gateway() {
    let mut rig = rig_with(test_config(), None).await;
    assert!(rig.engine.change_timeframe("4h").await.is_err());
    rig.engine.change_timeframe("5m").await.unwrap();
    assert_eq!(rig.engine.timeframe(), Timeframe::M5);
    assert!(rig.dashboard.has_event(events::TIMEFRAME_CHANGED));
}

#[tokio::test]
async fn test_unusable_persisted_timeframe_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = SettingsStore::in_memory(dir.path().join("settings.json"));
    settings.set_timeframe("4h");
    let rig = rig_with(test_config(), Some(settings)).await;
    assert_eq!(rig.engine.timeframe(), Timeframe::H1);
}

#[tokio::test]
async fn test_auto_tune_records_only_winning_results() {
    let mut config = test_config();
    config.tuner.min_trades = 1;
    let mut rig = rig_with(config, None).await;

    let bars: Vec<_> = (0..240)
        .map(|i| {
            let wave = 100.0 + 12.0 * (i as f64 / 7.0).sin();
            bar(i, Decimal::try_from(wave).unwrap().round_dp(2))
        })
        .collect();
    rig.gateway.set_bars(bars);

    rig.engine.start_auto_tune().await.unwrap();
    match rig.engine.wait_for_auto_tune().await {
        Some(outcome) => {
            assert_eq!(outcome.evaluated, 486);
            let tuned = rig.engine.settings().tuned("KDJ_MACD").unwrap();
            assert_eq!(tuned.win_rate, outcome.win_rate);
            assert!(rig.dashboard.has_event(events::AUTO_TUNE_COMPLETED));
        }
        None => {
            assert!(rig.engine.settings().tuned("KDJ_MACD").is_none());
            assert!(!rig.dashboard.has_event(events::AUTO_TUNE_COMPLETED));
        }
    }
    assert!(rig.engine.wait_for_auto_tune().await.is_none());
}

#[tokio::test]
async fn test_control_loop_serves_commands_until_shutdown() {
    let rig = rig_with(test_config(), None).await;
    rig.gateway
        .set_bars((0..30).map(|i| bar(i, Decimal::from(100 + i))).collect());
    let settings_path = rig.dir.path().join("settings.json");
    let dashboard = rig.dashboard.clone();
    let gateway = rig.gateway.clone();
    let handle = rig.handle.clone();

    let task = tokio::spawn(rig.engine.run());
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle.send(ControlCommand::StopTrading).await.unwrap();
    handle
        .send(ControlCommand::UpdateCredentials(trading_engine::Credentials {
            api_key: "demo-key".to_string(),
            api_secret: "demo-secret".to_string(),
            ..Default::default()
        }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    handle.shutdown();
    task.await.unwrap().unwrap();
    assert!(handle.send(ControlCommand::StartTrading).await.is_err());

    assert!(dashboard.has_event(events::TRADING_STARTED));
    assert!(dashboard.has_event(events::TRADING_STOPPED));
    assert!(dashboard.has_event(events::CREDENTIALS_UPDATED));
    assert_eq!(gateway.reconnects(), 1);

    let statuses = dashboard.statuses();
    assert!(!statuses.is_empty());
    assert_eq!(statuses[0].symbol, SYMBOL);
    assert_eq!(statuses[0].current_price, Decimal::from(129));

    let saved = SettingsStore::load(&settings_path).await.unwrap();
    assert_eq!(saved.exchange_backend(), Some("mock"));
}
