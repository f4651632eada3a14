use crate::account::Account;
use crate::desk::{SyntheticVenue, TradeDesk, TradeEvent};
use crate::error::ExecutorError;
use crate::market::MarketBoard;
use crate::modes::simulation::start_synthetic_session;
use crate::modes::ExecutionMode;
use crate::trade::Trade;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::TradingConfig;
use core_types::{CloseReason, ModeKind, SignalReading};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Replays history. Fills like `SimulationMode`, but owns an account that
/// nothing else touches and is driven one tick at a time by the backtester.
pub struct BacktestMode {
    desk: TradeDesk<SyntheticVenue>,
}

impl BacktestMode {
    pub fn new(config: Arc<TradingConfig>) -> Self {
        let market = Arc::new(MarketBoard::new(config.currencies.iter().cloned()));
        let account = Arc::new(Account::new("backtest", market));
        Self {
            desk: TradeDesk::new(config, account, SyntheticVenue),
        }
    }
}

#[async_trait]
impl ExecutionMode for BacktestMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Backtesting
    }

    fn account(&self) -> &Arc<Account> {
        self.desk.account()
    }

    fn config(&self) -> &TradingConfig {
        self.desk.config()
    }

    async fn initialize(&self) -> Result<(), ExecutorError> {
        start_synthetic_session(self.account(), self.config().starting_value)
    }

    async fn on_signal(
        &self,
        symbol: &str,
        reading: SignalReading,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutorError> {
        self.desk.on_signal(symbol, reading, price, at).await
    }

    async fn settle(
        &self,
        trade: &Trade,
        reason: CloseReason,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Trade, ExecutorError> {
        self.desk.settle(trade, reason, price, at).await
    }

    async fn close_manually(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Trade>, ExecutorError> {
        self.desk.close_manually(symbol, at).await
    }
}
