use crate::error::EngineError;
use core_types::Tick;
use executor::{ExecutionMode, ExecutorError, TradeEvent};
use signals::SignalProvider;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one currency's evaluation task did during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub ticks: u64,
    pub opened: u64,
    pub closed: u64,
    pub errors: u64,
    pub paused_ticks: u64,
}

impl UnitReport {
    pub fn merge(&mut self, other: &UnitReport) {
        self.ticks += other.ticks;
        self.opened += other.opened;
        self.closed += other.closed;
        self.errors += other.errors;
        self.paused_ticks += other.paused_ticks;
    }
}

/// The evaluation unit for one tracked currency. It is the only writer of
/// that currency's signal state and the only caller of `on_signal` for it.
pub struct CurrencyUnit {
    symbol: String,
    provider: Box<dyn SignalProvider>,
    mode: Arc<dyn ExecutionMode>,
    ticks: mpsc::Receiver<Tick>,
}

impl CurrencyUnit {
    pub fn new(
        symbol: impl Into<String>,
        provider: Box<dyn SignalProvider>,
        mode: Arc<dyn ExecutionMode>,
        ticks: mpsc::Receiver<Tick>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            provider,
            mode,
            ticks,
        }
    }

    /// Processes ticks until the channel closes or `shutdown` fires. A halt
    /// reported by the mode cancels `shutdown` for every other task too.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<UnitReport, EngineError> {
        let mut report = UnitReport::default();
        let mut paused = false;

        loop {
            let tick = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                tick = self.ticks.recv() => match tick {
                    Some(tick) => tick,
                    None => break,
                },
            };
            report.ticks += 1;

            let reading = match self.provider.next_reading(&tick) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Signal provider failed; tick skipped");
                    report.errors += 1;
                    continue;
                }
            };

            match self
                .mode
                .on_signal(&self.symbol, reading, tick.price, tick.timestamp)
                .await
            {
                Ok(Some(TradeEvent::Opened(_))) => report.opened += 1,
                Ok(Some(TradeEvent::Closed(_))) => report.closed += 1,
                Ok(None) => {}
                Err(ExecutorError::LiveHalted(reason)) => {
                    shutdown.cancel();
                    return Err(EngineError::Halted(reason));
                }
                Err(ExecutorError::TradingPaused(_)) => {
                    if !paused {
                        warn!(symbol = %self.symbol, "Currency paused; no new entries until it resumes");
                    }
                    paused = true;
                    report.paused_ticks += 1;
                    continue;
                }
                Err(e) => {
                    warn!(symbol = %self.symbol, error = %e, "Signal evaluation failed");
                    report.errors += 1;
                }
            }
            if paused {
                info!(symbol = %self.symbol, "Currency trading again");
                paused = false;
            }
            debug!(symbol = %self.symbol, price = %tick.price, confluence = reading.confluence, "Tick evaluated");
        }

        Ok(report)
    }
}
