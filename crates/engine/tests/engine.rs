use api_client::mock::{MockExchange, MockFailure, MockOp};
use api_client::{ExchangeGateway, GatewayConfig};
use chrono::{DateTime, TimeZone, Utc};
use configuration::{EngineSettings, TradingConfig};
use core_types::Tick;
use engine::{Engine, EngineError, PriceFeed};
use executor::{ExecutionMode, LiveMode, SimulationMode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signals::scripted_factory;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CONFIG: &str = "\
MACD change indicator:0.1
RSI positive side minimum:15
RSI positive side maximum:30
RSI negative side minimum:70
RSI negative side maximum:80
Simulation mode starting value:1000
Currencies to track:BTCUSDT, ETHUSDT
Percentage of money per trade:0.1
Trailing SL:0.05
Take profit:0.1
Confluence:3
Close confluence:2
";

fn config() -> Arc<TradingConfig> {
    Arc::new(CONFIG.parse().unwrap())
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn tick(symbol: &str, price: Decimal, secs: i64) -> Tick {
    Tick {
        symbol: symbol.to_string(),
        price,
        timestamp: at(secs),
    }
}

fn scripts(entries: &[(&str, &[i32])]) -> HashMap<String, Vec<i32>> {
    entries
        .iter()
        .map(|(symbol, script)| (symbol.to_string(), script.to_vec()))
        .collect()
}

async fn simulation() -> Arc<SimulationMode> {
    let mode = Arc::new(SimulationMode::new(config(), "engine-test"));
    mode.initialize().await.unwrap();
    mode
}

#[tokio::test]
async fn routes_ticks_to_their_currency() {
    let mode = simulation().await;
    let engine = Engine::new(
        mode.clone(),
        scripted_factory(scripts(&[("BTCUSDT", &[3, 0, 0])])),
        EngineSettings::default(),
    );

    let (tx, rx) = mpsc::channel(16);
    for t in [
        tick("BTCUSDT", dec!(100), 0),
        tick("DOGEUSDT", dec!(1), 0),
        tick("BTCUSDT", dec!(105), 60),
        tick("BTCUSDT", dec!(111), 120),
    ] {
        tx.send(t).await.unwrap();
    }
    drop(tx);

    let summary = engine.run(rx, CancellationToken::new()).await.unwrap();
    assert_eq!(summary.ticks, 3);
    assert_eq!(summary.opened, 1);
    assert_eq!(summary.closed, 1);
    assert_eq!(mode.account().fiat(), dec!(1011));
    assert!(mode.account().active_trades().is_empty());
}

#[tokio::test]
async fn close_all_flattens_the_account() {
    let mode = simulation().await;
    let engine = Engine::new(
        mode.clone(),
        scripted_factory(scripts(&[("BTCUSDT", &[3]), ("ETHUSDT", &[4])])),
        EngineSettings::default(),
    );

    let (tx, rx) = mpsc::channel(16);
    tx.send(tick("BTCUSDT", dec!(100), 0)).await.unwrap();
    tx.send(tick("ETHUSDT", dec!(50), 0)).await.unwrap();
    drop(tx);
    engine.run(rx, CancellationToken::new()).await.unwrap();

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.active_trades, 2);
    assert_eq!(snapshot.total_value, Some(dec!(1000)));
    assert_eq!(snapshot.profit, Some(Decimal::ZERO));

    let closed = engine.close_all(at(10)).await;
    assert_eq!(closed.len(), 2);
    assert!(mode.account().active_trades().is_empty());
    assert_eq!(mode.account().fiat(), dec!(1000));
}

#[tokio::test]
async fn external_shutdown_stops_the_run() {
    let mode = simulation().await;
    let engine = Engine::new(mode, scripted_factory(HashMap::new()), EngineSettings::default());
    let (_tx, rx) = mpsc::channel::<Tick>(16);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let summary = engine.run(rx, shutdown).await.unwrap();
    assert_eq!(summary.ticks, 0);
}

async fn gateway(mock: &Arc<MockExchange>) -> Arc<ExchangeGateway> {
    let config = GatewayConfig {
        fiat: "USDT".to_string(),
        request_timeout: Duration::from_millis(100),
        max_attempts: 2,
        backoff_base: Duration::from_millis(10),
        backoff_max: Duration::from_millis(10),
    };
    Arc::new(ExchangeGateway::connect(mock.clone(), config).await.unwrap())
}

fn exchange() -> Arc<MockExchange> {
    Arc::new(
        MockExchange::new("USDT")
            .with_price("BTCUSDT", dec!(20000))
            .with_price("ETHUSDT", dec!(1000))
            .with_balance("USDT", dec!(1000)),
    )
}

#[tokio::test]
async fn fatal_gateway_error_halts_the_engine() {
    let mock = exchange();
    let mode = Arc::new(LiveMode::new(config(), "live", gateway(&mock).await));
    mode.initialize().await.unwrap();
    mock.fail_next(MockOp::PlaceOrder, MockFailure::Unauthorized);

    let engine = Engine::new(
        mode.clone(),
        scripted_factory(scripts(&[("BTCUSDT", &[3])])),
        EngineSettings::default(),
    );
    // The sender stays open: only the halt can end this run.
    let (tx, rx) = mpsc::channel(16);
    tx.send(tick("BTCUSDT", dec!(20000), 0)).await.unwrap();

    let shutdown = CancellationToken::new();
    let result = engine.run(rx, shutdown.clone()).await;
    assert!(matches!(result, Err(EngineError::Halted(_))));
    assert!(!shutdown.is_cancelled());
    assert!(mode.halt_reason().is_some());
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn price_feed_polls_every_symbol() {
    let mock = exchange();
    let feed = PriceFeed::new(
        gateway(&mock).await,
        vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        Duration::from_secs(60),
    );
    let (tx, mut rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(feed.run(tx, shutdown.clone()));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.symbol, "BTCUSDT");
    assert_eq!(first.price, dec!(20000));
    assert_eq!(second.symbol, "ETHUSDT");

    mock.set_price("BTCUSDT", dec!(20500));
    let next = rx.recv().await.unwrap();
    assert_eq!(next.price, dec!(20500));

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn price_feed_stops_on_fatal_error() {
    let mock = exchange();
    let feed = PriceFeed::new(
        gateway(&mock).await,
        vec!["BTCUSDT".to_string()],
        Duration::from_secs(60),
    );
    mock.fail_next(MockOp::Price, MockFailure::Unauthorized);
    let (tx, _rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();

    feed.run(tx, shutdown.clone()).await;
    assert!(shutdown.is_cancelled());
}
