//! # Meridian Backtester
//!
//! Replays a historical tick series through `BacktestMode`, one tick at a
//! time in timestamp order, and summarizes the outcome. A run never touches
//! the exchange and never shares its account, so the same series always
//! yields the same report.

use configuration::TradingConfig;
use core_types::Tick;
use executor::{BacktestMode, ExecutionMode, Trade, TradeEvent};
use indicatif::{ProgressBar, ProgressStyle};
use rust_decimal::Decimal;
use serde::Serialize;
use signals::{ProviderFactory, SignalProvider};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod error;

pub use error::BacktestError;

/// The outcome of one replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub starting_value: Decimal,
    pub final_value: Decimal,
    /// Fractional change from the starting value. `None` when the run
    /// started with nothing.
    pub profit: Option<Decimal>,
    /// Closed and still-open trades, ordered by trade id.
    pub trades: Vec<Trade>,
    pub wins: usize,
    pub losses: usize,
    /// Largest peak-to-trough fall of the per-tick equity curve, as a
    /// fraction of the peak.
    pub max_drawdown: Decimal,
    pub ticks: usize,
    pub errors: usize,
}

impl BacktestReport {
    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(|t| t.is_open())
    }
}

/// Reads a JSON array of ticks from `path`.
pub fn load_ticks(path: impl AsRef<Path>) -> Result<Vec<Tick>, BacktestError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Drops untracked symbols and orders the rest by `(timestamp, symbol)`.
///
/// Two ticks for the same symbol at the same instant make the series
/// ambiguous and are rejected.
pub fn prepare_ticks(ticks: Vec<Tick>, tracked: &[String]) -> Result<Vec<Tick>, BacktestError> {
    let total = ticks.len();
    let mut ticks: Vec<Tick> = ticks
        .into_iter()
        .filter(|t| tracked.iter().any(|s| s == &t.symbol))
        .collect();
    if ticks.len() < total {
        debug!(skipped = total - ticks.len(), "Skipping ticks for untracked symbols");
    }
    ticks.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    if let Some(pair) = ticks
        .windows(2)
        .find(|w| w[0].timestamp == w[1].timestamp && w[0].symbol == w[1].symbol)
    {
        return Err(BacktestError::DataOrder {
            symbol: pair[1].symbol.clone(),
            timestamp: pair[1].timestamp,
        });
    }
    Ok(ticks)
}

/// A single-use replay of one tick series.
pub struct Backtester {
    mode: BacktestMode,
    providers: ProviderFactory,
    show_progress: bool,
}

impl Backtester {
    pub fn new(config: Arc<TradingConfig>, providers: ProviderFactory) -> Self {
        Self {
            mode: BacktestMode::new(config),
            providers,
            show_progress: true,
        }
    }

    /// Shows or hides the progress bar. Shown by default.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn mode(&self) -> &BacktestMode {
        &self.mode
    }

    /// Replays `ticks` and reports on the account afterwards. Trades still
    /// open at the end are valued at their last price, not closed.
    pub async fn run(self, ticks: Vec<Tick>) -> Result<BacktestReport, BacktestError> {
        let config = self.mode.config();
        let ticks = prepare_ticks(ticks, &config.currencies)?;
        if ticks.is_empty() {
            return Err(BacktestError::DataUnavailable);
        }

        let mut providers: HashMap<String, Box<dyn SignalProvider>> = HashMap::new();
        for symbol in &config.currencies {
            providers.insert(symbol.clone(), (self.providers)(symbol)?);
        }

        self.mode.initialize().await?;
        let account = self.mode.account().clone();
        let starting_value = account.starting_value();

        let progress_bar = if self.show_progress {
            ProgressBar::new(ticks.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress_bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("=>-"),
        );

        let mut peak = starting_value;
        let mut max_drawdown = Decimal::ZERO;
        let mut errors = 0;

        for tick in &ticks {
            progress_bar.inc(1);
            let Some(provider) = providers.get_mut(&tick.symbol) else {
                continue;
            };
            match provider.next_reading(tick) {
                Ok(reading) => match self
                    .mode
                    .on_signal(&tick.symbol, reading, tick.price, tick.timestamp)
                    .await
                {
                    Ok(Some(TradeEvent::Opened(trade))) => {
                        debug!(trade = %trade.id, symbol = %trade.symbol, price = %trade.entry_price, "Opened");
                    }
                    Ok(Some(TradeEvent::Closed(trade))) => {
                        debug!(trade = %trade.id, symbol = %trade.symbol, profit = ?trade.profit(), "Closed");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(symbol = %tick.symbol, at = %tick.timestamp, error = %e, "Tick could not be executed");
                        errors += 1;
                    }
                },
                Err(e) => {
                    warn!(symbol = %tick.symbol, at = %tick.timestamp, error = %e, "Signal provider failed; tick skipped");
                    errors += 1;
                }
            }

            let equity = account.get_total_value()?;
            if equity > peak {
                peak = equity;
            } else if peak > Decimal::ZERO {
                max_drawdown = max_drawdown.max((peak - equity) / peak);
            }
        }

        progress_bar.finish_with_message("Replay complete.");

        let mut trades = account.trade_history();
        trades.extend(account.active_trades().iter().cloned());
        trades.sort_by_key(|t| t.id);
        let (wins, losses) = trades
            .iter()
            .filter_map(Trade::profit)
            .fold((0, 0), |(w, l), p| {
                if p > Decimal::ZERO { (w + 1, l) } else { (w, l + 1) }
            });

        let final_value = account.get_total_value()?;
        let profit = if starting_value.is_zero() {
            None
        } else {
            Some(account.get_profit()?)
        };

        info!(
            %starting_value,
            %final_value,
            trades = trades.len(),
            wins,
            losses,
            %max_drawdown,
            "Backtest finished"
        );

        Ok(BacktestReport {
            starting_value,
            final_value,
            profit,
            trades,
            wins,
            losses,
            max_drawdown,
            ticks: ticks.len(),
            errors,
        })
    }
}
