use anyhow::{Context, Result};
use api_client::{ApiClient, BinanceClient, ExchangeGateway, GatewayConfig};
use backtester::Backtester;
use chrono::Utc;
use clap::{Parser, Subcommand};
use configuration::{LogSettings, Settings, TradingConfig, load_settings};
use engine::{Engine, EngineError, PriceFeed};
use executor::{ExecutionMode, LiveMode, SimulationMode};
use signals::indicator_factory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// The main entry point for the Meridian trading application.
#[tokio::main]
async fn main() -> Result<()> {
    // Credentials may also come straight from the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = load_settings(cli.settings.as_deref()).context("loading runtime settings")?;
    let _log_guard = init_tracing(&settings.log)?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.trading_config_path));
    let config = TradingConfig::load(&config_path)
        .with_context(|| format!("loading trading config {}", config_path.display()))?;
    let config = Arc::new(config);

    match cli.command {
        Commands::CheckConfig => {
            println!("{} is complete and valid:\n{config}", config_path.display());
            Ok(())
        }
        Commands::Live => handle_live(settings, config).await,
        Commands::Simulate => handle_simulate(settings, config).await,
        Commands::Backtest(args) => handle_backtest(args, config).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A multi-currency spot trading bot with live, simulated and backtest modes.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Runtime settings file. `meridian.toml` is used when present.
    #[arg(long, global = true)]
    settings: Option<String>,

    /// Trading config file. Overrides `trading_config_path` from the settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trade on the exchange with real funds.
    Live,
    /// Trade live prices against a local account.
    Simulate,
    /// Replay a historical tick file.
    Backtest(BacktestArgs),
    /// Validate the trading config and print it.
    CheckConfig,
}

#[derive(Parser)]
struct BacktestArgs {
    /// JSON array of `{ "symbol", "price", "timestamp" }` ticks.
    #[arg(long)]
    data: PathBuf,

    /// Also write the report as JSON to this file.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Hide the progress bar.
    #[arg(long)]
    quiet: bool,
}

// ==============================================================================
// Logging
// ==============================================================================

/// Console logging always; a daily rolling file as well when a log directory
/// is configured. The returned guard must live until exit to flush the file.
fn init_tracing(log: &LogSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.filter))?;

    let (file_layer, guard) = match &log.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "meridian.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn connect_gateway(settings: &Settings) -> Result<Arc<ExchangeGateway>> {
    let client: Arc<dyn ApiClient> = Arc::new(BinanceClient::new(&settings.exchange)?);
    let gateway = ExchangeGateway::connect(
        client,
        GatewayConfig::from_settings(&settings.exchange, settings.fiat.clone()),
    )
    .await
    .context("connecting to the exchange")?;
    Ok(Arc::new(gateway))
}

async fn handle_live(settings: Settings, config: Arc<TradingConfig>) -> Result<()> {
    let gateway = connect_gateway(&settings).await?;
    let mode = Arc::new(
        LiveMode::new(config.clone(), settings.username.clone(), gateway.clone())
            .with_pause_cooldown(Duration::from_secs(settings.engine.pause_cooldown_secs)),
    );
    run_engine(mode, gateway, &settings, config).await
}

async fn handle_simulate(settings: Settings, config: Arc<TradingConfig>) -> Result<()> {
    // Only the price feed talks to the exchange; fills stay local.
    let gateway = connect_gateway(&settings).await?;
    let mode = Arc::new(SimulationMode::new(config.clone(), settings.username.clone()));
    run_engine(mode, gateway, &settings, config).await
}

/// Feeds polled prices through the engine until Ctrl-C, a halt, or the feed
/// failing for good.
async fn run_engine(
    mode: Arc<dyn ExecutionMode>,
    gateway: Arc<ExchangeGateway>,
    settings: &Settings,
    config: Arc<TradingConfig>,
) -> Result<()> {
    mode.initialize()
        .await
        .with_context(|| format!("starting the {} session", mode.kind()))?;

    let engine = Engine::new(
        mode.clone(),
        indicator_factory(config.clone()),
        settings.engine.clone(),
    );
    let shutdown = CancellationToken::new();

    let (tx, rx) = mpsc::channel(settings.engine.channel_capacity.max(1));
    let feed = PriceFeed::new(
        gateway,
        config.currencies.clone(),
        Duration::from_secs(settings.engine.poll_interval_secs.max(1)),
    );
    let feed_task = tokio::spawn(feed.run(tx, shutdown.clone()));

    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            on_ctrl_c.cancel();
        }
    });

    let outcome = engine.run(rx, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = feed_task.await {
        warn!(error = %e, "Price feed ended abnormally");
    }

    let halted = matches!(outcome, Err(EngineError::Halted(_)));
    if settings.engine.close_on_shutdown && !halted {
        let closed = engine.close_all(Utc::now()).await;
        println!("Closed {} trade(s) on shutdown.", closed.len());
    }

    let snapshot = engine.snapshot();
    println!(
        "Active trades: {} | unrealized: {} | total value: {} | profit: {}",
        snapshot.active_trades,
        snapshot.unrealized,
        snapshot
            .total_value
            .map_or_else(|| "unknown".to_string(), |v| v.to_string()),
        snapshot
            .profit
            .map_or_else(|| "undefined".to_string(), |p| p.to_string()),
    );

    let report = outcome?;
    println!(
        "Processed {} tick(s): {} opened, {} closed, {} error(s).",
        report.ticks, report.opened, report.closed, report.errors
    );
    Ok(())
}

async fn handle_backtest(args: BacktestArgs, config: Arc<TradingConfig>) -> Result<()> {
    let ticks = backtester::load_ticks(&args.data)
        .with_context(|| format!("reading ticks from {}", args.data.display()))?;
    println!("Replaying {} tick(s) from {}", ticks.len(), args.data.display());

    let report = Backtester::new(config.clone(), indicator_factory(config))
        .with_progress(!args.quiet)
        .run(ticks)
        .await?;

    println!("Starting value: {}", report.starting_value);
    println!("Final value:    {}", report.final_value);
    match report.profit {
        Some(profit) => println!("Profit:         {profit}"),
        None => println!("Profit:         undefined"),
    }
    println!(
        "Trades:         {} ({} won, {} lost, {} open)",
        report.trades.len(),
        report.wins,
        report.losses,
        report.open_trades().count()
    );
    println!("Max drawdown:   {}", report.max_drawdown);

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}
