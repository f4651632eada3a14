use executor::{Account, ExecutionMode};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Account valuation at one instant, built from an active-trade snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub active_trades: usize,
    /// Mark-to-market result of the open trades, where prices are known.
    pub unrealized: Decimal,
    pub total_value: Option<Decimal>,
    pub profit: Option<Decimal>,
}

impl PortfolioSnapshot {
    pub fn capture(account: &Account) -> Self {
        let trades = account.active_trades();
        let unrealized = trades
            .iter()
            .filter_map(|t| account.market().price(&t.symbol).map(|p| t.unrealized(p)))
            .sum();
        Self {
            active_trades: trades.len(),
            unrealized,
            total_value: account.get_total_value().ok(),
            profit: account.get_profit().ok(),
        }
    }
}

/// Periodically logs the account's valuation without touching its state.
pub struct Monitor {
    mode: Arc<dyn ExecutionMode>,
    interval: Duration,
}

impl Monitor {
    pub fn new(mode: Arc<dyn ExecutionMode>, interval: Duration) -> Self {
        Self { mode, interval }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = PortfolioSnapshot::capture(self.mode.account());
                    match snapshot.total_value {
                        Some(total) => info!(
                            mode = %self.mode.kind(),
                            active = snapshot.active_trades,
                            unrealized = %snapshot.unrealized,
                            %total,
                            profit = ?snapshot.profit,
                            "Portfolio"
                        ),
                        None => debug!(active = snapshot.active_trades, "Portfolio not yet priced"),
                    }
                }
            }
        }
        debug!("Monitor stopped");
    }
}
