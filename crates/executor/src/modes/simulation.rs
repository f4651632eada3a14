use crate::account::Account;
use crate::desk::{SyntheticVenue, TradeDesk, TradeEvent};
use crate::error::ExecutorError;
use crate::market::MarketBoard;
use crate::modes::ExecutionMode;
use crate::trade::Trade;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::TradingConfig;
use core_types::{CloseReason, Commissions, ModeKind, SignalReading};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

/// Paper trading on live prices: fills at the signal price, no commission,
/// no orders sent anywhere.
pub struct SimulationMode {
    desk: TradeDesk<SyntheticVenue>,
}

impl SimulationMode {
    pub fn new(config: Arc<TradingConfig>, username: impl Into<String>) -> Self {
        let market = Arc::new(MarketBoard::new(config.currencies.iter().cloned()));
        let account = Arc::new(Account::new(username, market));
        Self {
            desk: TradeDesk::new(config, account, SyntheticVenue),
        }
    }
}

/// Seeds a synthetic account with the configured starting fiat.
pub(crate) fn start_synthetic_session(
    account: &Account,
    starting_value: Decimal,
) -> Result<(), ExecutorError> {
    account.begin_session(starting_value, Commissions::default())?;
    if starting_value > Decimal::ZERO {
        account.wallet().credit_fiat(starting_value)?;
    }
    Ok(())
}

#[async_trait]
impl ExecutionMode for SimulationMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Simulation
    }

    fn account(&self) -> &Arc<Account> {
        self.desk.account()
    }

    fn config(&self) -> &TradingConfig {
        self.desk.config()
    }

    async fn initialize(&self) -> Result<(), ExecutorError> {
        start_synthetic_session(self.account(), self.config().starting_value)?;
        info!(starting_value = %self.config().starting_value, "Simulation account ready");
        Ok(())
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
