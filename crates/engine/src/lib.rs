//! # Meridian Engine
//!
//! Runs an `ExecutionMode` against a stream of ticks. Every tracked currency
//! gets its own evaluation task with its own signal provider, so a slow
//! exchange answer on one currency never holds up another.

use chrono::{DateTime, Utc};
use configuration::EngineSettings;
use core_types::Tick;
use executor::{ExecutionMode, Trade};
use signals::ProviderFactory;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod error;
pub mod feed;
pub mod monitor;
pub mod unit;

pub use error::EngineError;
pub use feed::PriceFeed;
pub use monitor::{Monitor, PortfolioSnapshot};
pub use unit::{CurrencyUnit, UnitReport};

/// The orchestrator for Live and Simulation trading.
pub struct Engine {
    mode: Arc<dyn ExecutionMode>,
    providers: ProviderFactory,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        mode: Arc<dyn ExecutionMode>,
        providers: ProviderFactory,
        settings: EngineSettings,
    ) -> Self {
        Self {
            mode,
            providers,
            settings,
        }
    }

    pub fn mode(&self) -> &Arc<dyn ExecutionMode> {
        &self.mode
    }

    /// Routes `feed` to the currency tasks until the feed ends or `shutdown`
    /// fires. The mode must already be initialized.
    ///
    /// Returns `Halted` if live trading was halted during the run. Cancelling
    /// `shutdown` stops the run; the run never cancels the caller's token.
    pub async fn run(
        &self,
        mut feed: mpsc::Receiver<Tick>,
        shutdown: CancellationToken,
    ) -> Result<UnitReport, EngineError> {
        let config = self.mode.config();
        if config.currencies.is_empty() {
            return Err(EngineError::Configuration(
                "no currencies to track".to_string(),
            ));
        }

        // Units and the monitor stop with the run; a halt stops the run.
        let shutdown = shutdown.child_token();
        let mut routes: HashMap<String, mpsc::Sender<Tick>> = HashMap::new();
        let mut units = JoinSet::new();
        for symbol in &config.currencies {
            let provider = (self.providers)(symbol)?;
            let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
            routes.insert(symbol.clone(), tx);
            let unit = CurrencyUnit::new(symbol.clone(), provider, self.mode.clone(), rx);
            let (symbol, token) = (symbol.clone(), shutdown.clone());
            units.spawn(async move { (symbol, unit.run(token).await) });
        }

        let monitor = tokio::spawn(
            Monitor::new(
                self.mode.clone(),
                Duration::from_secs(self.settings.monitor_interval_secs.max(1)),
            )
            .run(shutdown.clone()),
        );
        info!(mode = %self.mode.kind(), currencies = routes.len(), "Engine running");

        loop {
            let tick = tokio::select! {
                _ = shutdown.cancelled() => break,
                tick = feed.recv() => match tick {
                    Some(tick) => tick,
                    None => break,
                },
            };
            let Some(route) = routes.get(&tick.symbol) else {
                debug!(symbol = %tick.symbol, "Dropping tick for untracked symbol");
                continue;
            };
            match route.try_send(tick) {
                Ok(()) => {}
                Err(TrySendError::Full(tick)) => {
                    warn!(symbol = %tick.symbol, "Evaluation lagging; tick dropped");
                }
                Err(TrySendError::Closed(tick)) => {
                    debug!(symbol = %tick.symbol, "Evaluation task gone; tick dropped");
                }
            }
        }

        // Closing the routes lets each unit drain what it already has.
        drop(routes);
        let mut summary = UnitReport::default();
        let mut halted = None;
        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((_, Ok(report))) => summary.merge(&report),
                Ok((_, Err(EngineError::Halted(reason)))) => {
                    halted.get_or_insert(reason);
                }
                Ok((symbol, Err(e))) => error!(%symbol, error = %e, "Evaluation task failed"),
                Err(e) => error!(error = %e, "Evaluation task panicked"),
            }
        }

        shutdown.cancel();
        if let Err(e) = monitor.await {
            warn!(error = %e, "Monitor task ended abnormally");
        }

        match halted {
            Some(reason) => Err(EngineError::Halted(reason)),
            None => {
                info!(
                    ticks = summary.ticks,
                    opened = summary.opened,
                    closed = summary.closed,
                    errors = summary.errors,
                    "Engine stopped"
                );
                Ok(summary)
            }
        }
    }

    /// Closes every active trade at its last known price. Failures are
    /// logged and the remaining trades are still attempted.
    pub async fn close_all(&self, at: DateTime<Utc>) -> Vec<Trade> {
        let active = self.mode.account().active_trades();
        let mut closed = Vec::with_capacity(active.len());
        for trade in active.iter() {
            match self.mode.close_manually(&trade.symbol, at).await {
                Ok(Some(trade)) => closed.push(trade),
                Ok(None) => {}
                Err(e) => error!(trade = %trade.id, symbol = %trade.symbol, error = %e, "Manual close failed"),
            }
        }
        info!(closed = closed.len(), "Closed all active trades");
        closed
    }

    /// A snapshot of the account as the monitor sees it.
    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot::capture(self.mode.account())
    }
}
