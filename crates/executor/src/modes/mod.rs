use crate::account::Account;
use crate::desk::TradeEvent;
use crate::error::ExecutorError;
use crate::trade::Trade;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use configuration::TradingConfig;
use core_types::{CloseReason, ModeKind, SignalReading};
use rust_decimal::Decimal;
use std::sync::Arc;

pub mod backtest;
pub mod live;
pub mod simulation;

pub use backtest::BacktestMode;
pub use live::{GatewayVenue, LiveMode};
pub use simulation::SimulationMode;

/// The contract every way of trading fulfils. Implementations differ only in
/// where fills and prices come from; the trading rules are shared.
#[async_trait]
pub trait ExecutionMode: Send + Sync {
    fn kind(&self) -> ModeKind;

    fn account(&self) -> &Arc<Account>;

    fn config(&self) -> &TradingConfig;

    /// Starts the session: seeds balances and fixes the starting value and
    /// commission rates. Fails with `AlreadyInitialized` on a second call.
    async fn initialize(&self) -> Result<(), ExecutorError>;

    /// Evaluates one reading for one tracked currency at `price`.
    async fn on_signal(
        &self,
        symbol: &str,
        reading: SignalReading,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Option<TradeEvent>, ExecutorError>;

    /// Closes an active trade.
    async fn settle(
        &self,
        trade: &Trade,
        reason: CloseReason,
        price: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Trade, ExecutorError>;

    /// Closes the active trade on `symbol`, if any, at its last known price.
    async fn close_manually(
        &self,
        symbol: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Trade>, ExecutorError>;
}
