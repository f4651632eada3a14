use crate::active::ActiveTrades;
use crate::error::ExecutorError;
use crate::market::MarketBoard;
use crate::trade::{Trade, TradeId};
use crate::wallet::Wallet;
use core_types::Commissions;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::info;

#[derive(Debug, Clone, Copy)]
struct Session {
    starting_value: Decimal,
    commissions: Commissions,
}

/// One trading account: wallet, open trades, history and the session
/// parameters fixed when trading starts.
#[derive(Debug)]
pub struct Account {
    username: String,
    wallet: Wallet,
    market: Arc<MarketBoard>,
    trades: ActiveTrades,
    session: OnceLock<Session>,
    next_id: AtomicU64,
}

impl Account {
    pub fn new(username: impl Into<String>, market: Arc<MarketBoard>) -> Self {
        Self {
            username: username.into(),
            wallet: Wallet::new(),
            market,
            trades: ActiveTrades::default(),
            session: OnceLock::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Fixes the starting valuation and commission rates. Only the first
    /// call succeeds.
    pub fn begin_session(
        &self,
        starting_value: Decimal,
        commissions: Commissions,
    ) -> Result<(), ExecutorError> {
        self.session
            .set(Session {
                starting_value,
                commissions,
            })
            .map_err(|_| ExecutorError::AlreadyInitialized)?;
        info!(user = %self.username, %starting_value, taker = %commissions.taker, "Session started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.session.get().is_some()
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn market(&self) -> &MarketBoard {
        &self.market
    }

    pub fn starting_value(&self) -> Decimal {
        self.session
            .get()
            .map(|s| s.starting_value)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn commissions(&self) -> Commissions {
        self.session
            .get()
            .map(|s| s.commissions)
            .unwrap_or_default()
    }

    pub fn next_trade_id(&self) -> TradeId {
        TradeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn open_trade(&self, trade: Trade) -> Result<(), ExecutorError> {
        self.trades.insert(trade)
    }

    pub fn replace_active(&self, trade: Trade) -> Result<(), ExecutorError> {
        self.trades.replace(trade)
    }

    pub fn close_trade(&self, trade: Trade) -> Result<(), ExecutorError> {
        self.trades.retire(trade)
    }

    pub fn active_trades(&self) -> Arc<Vec<Trade>> {
        self.trades.snapshot()
    }

    pub fn active_trade_for(&self, symbol: &str) -> Option<Trade> {
        self.trades.find(symbol)
    }

    pub fn trade_history(&self) -> Vec<Trade> {
        self.trades.history()
    }

    pub fn fiat(&self) -> Decimal {
        self.wallet.fiat()
    }

    pub fn get_total_value(&self) -> Result<Decimal, ExecutorError> {
        self.wallet.total_value(&self.market)
    }

    /// `(total - start) / start`, as a fraction.
    pub fn get_profit(&self) -> Result<Decimal, ExecutorError> {
        let start = self.starting_value();
        if start.is_zero() {
            return Err(ExecutorError::UndefinedProfit);
        }
        Ok((self.get_total_value()? - start) / start)
    }
}
